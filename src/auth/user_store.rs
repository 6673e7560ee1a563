//! User storage
//!
//! Accounts live in `rpg_users`, keyed by email. Email uniqueness comes from a
//! conditional insert and updates are guarded by the record's `version`.

use crate::api::ApiError;
use crate::auth::models::User;
use crate::store::{Condition, StoreClient, StoreError, TableSchema, UpdateSet};
use crate::validation::{Validator, EMAIL_RX};
use bcrypt::{hash, verify};
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

pub const USERS: TableSchema = TableSchema::new("rpg_users", "email");

#[derive(Debug, Error)]
pub enum UserError {
    #[error("a user with this email address already exists")]
    DuplicateEmail,
    #[error("unable to update the record due to an edit conflict")]
    EditConflict,
    #[error("password hashing failed: {0}")]
    Password(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::DuplicateEmail => {
                let mut errors = BTreeMap::new();
                errors.insert(
                    "email".to_string(),
                    "a user with this email address already exists".to_string(),
                );
                ApiError::FailedValidation(errors)
            }
            UserError::EditConflict => ApiError::EditConflict,
            UserError::Store(err) => err.into(),
            other => ApiError::internal(other),
        }
    }
}

/// User storage over the partitioned store.
#[derive(Clone)]
pub struct UserRepository {
    store: StoreClient,
    bcrypt_cost: u32,
}

impl UserRepository {
    pub fn new(store: StoreClient, bcrypt_cost: u32) -> Self {
        Self { store, bcrypt_cost }
    }

    /// Builds a new, activated account with a hashed password. Not persisted.
    pub fn new_user(&self, name: &str, email: &str, password: &str) -> Result<User, UserError> {
        Ok(User {
            email: email.to_string(),
            name: name.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            password_hash: self.hash_password(password)?,
            activated: true,
            version: 1,
        })
    }

    pub fn hash_password(&self, plaintext: &str) -> Result<String, UserError> {
        Ok(hash(plaintext, self.bcrypt_cost)?)
    }

    /// Checks `plaintext` against the stored hash.
    pub fn password_matches(&self, user: &User, plaintext: &str) -> Result<bool, UserError> {
        Ok(verify(plaintext, &user.password_hash)?)
    }

    pub fn insert(&self, user: &User) -> Result<(), UserError> {
        let unique_email = Condition::attribute_not_exists(USERS.partition_key);
        match self.store.put(&USERS, user, Some(&unique_email)) {
            Ok(()) => {
                info!(email = %user.email, "Created user");
                Ok(())
            }
            Err(StoreError::ConditionFailed) => Err(UserError::DuplicateEmail),
            Err(err) => Err(err.into()),
        }
    }

    pub fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.store.get(&USERS, &USERS.key(email))
    }

    pub fn delete(&self, email: &str) -> Result<(), StoreError> {
        self.store.delete(&USERS, &USERS.key(email))
    }

    /// Writes the mutable fields of `user` if nobody else changed the record
    /// since it was read. Bumps `user.version` on success.
    pub fn update(&self, user: &mut User) -> Result<(), UserError> {
        let updates = UpdateSet::new()
            .set("name", user.name.clone())
            .set("password_hash", user.password_hash.clone())
            .set("activated", user.activated)
            .increment("version", 1);
        let unchanged = Condition::attribute_equals("version", user.version);

        match self
            .store
            .update(&USERS, &USERS.key(user.email.as_str()), &updates, Some(&unchanged))
        {
            Ok(_) => {
                user.version += 1;
                debug!(email = %user.email, version = user.version, "Updated user");
                Ok(())
            }
            // A concurrent delete is a conflict from the caller's point of view.
            Err(StoreError::ConditionFailed) | Err(StoreError::NotFound) => {
                Err(UserError::EditConflict)
            }
            Err(err) => Err(err.into()),
        }
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(EMAIL_RX.is_match(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 bytes long");
    v.check(password.len() <= 72, "password", "must not be more than 72 bytes long");
}

/// Validates a registration. The password is checked before it is hashed.
pub fn validate_registration(v: &mut Validator, name: &str, email: &str, password: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(v, email);
    validate_password_plaintext(v, password);
}
