//! Capability codes granted to users.

use crate::auth::models::User;
use crate::store::{Projection, StoreClient, StoreError, TableSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

pub const PERMISSIONS: TableSchema = TableSchema::with_sort_key("rpg_permissions", "email", "code");

pub const WORLDS_READ: &str = "worlds:read";
pub const WORLDS_WRITE: &str = "worlds:write";
pub const CHARACTERS_READ: &str = "characters:read";
pub const CHARACTERS_WRITE: &str = "characters:write";

/// Set of codes held by one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Where `require_permission` gets a user's grants from.
pub trait PermissionSource: Send + Sync {
    fn permissions_for(&self, user: &User) -> Result<Permissions, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct PermissionRow {
    email: String,
    code: String,
}

/// Grants stored one row per `(email, code)`.
#[derive(Clone)]
pub struct PermissionRepository {
    store: StoreClient,
}

impl PermissionRepository {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    pub fn grant(&self, email: &str, codes: &[String]) -> Result<(), StoreError> {
        for code in codes {
            let row = PermissionRow {
                email: email.to_string(),
                code: code.clone(),
            };
            self.store.put(&PERMISSIONS, &row, None)?;
        }
        info!(email = %email, codes = ?codes, "Granted permissions");
        Ok(())
    }

    pub fn get_all_for_user(&self, email: &str) -> Result<Permissions, StoreError> {
        let rows: Vec<PermissionRow> = self.store.query(
            &PERMISSIONS,
            email,
            Some(&Projection::new(["email", "code"])),
        )?;
        Ok(rows.into_iter().map(|row| row.code).collect())
    }
}

impl PermissionSource for PermissionRepository {
    fn permissions_for(&self, user: &User) -> Result<Permissions, StoreError> {
        self.get_all_for_user(&user.email)
    }
}
