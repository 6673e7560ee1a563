//! Opaque bearer tokens.
//!
//! A token is 16 random bytes encoded as unpadded base32 (26 characters).
//! Only the hex SHA-256 digest of the plaintext is stored; the plaintext is
//! handed out once at issuance and never retained or logged.

use crate::store::{StoreClient, StoreError, TableSchema};
use crate::validation::Validator;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

pub const TOKENS: TableSchema = TableSchema::new("rpg_usertokens", "hash");

/// Length of an encoded plaintext token.
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

const TOKEN_ENTROPY_BYTES: usize = 16;
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Activation,
    Authentication,
}

/// Stored token record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub hash: String,
    pub email: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

/// What the client receives on issuance.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub email: String,
    pub expiry: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenStore {
    store: StoreClient,
}

impl TokenStore {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Generates, persists and returns a new token for `email`.
    pub fn issue(
        &self,
        email: &str,
        ttl: Duration,
        scope: TokenScope,
    ) -> Result<IssuedToken, StoreError> {
        let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let plaintext = encode_base32(&bytes);

        let record = Token {
            hash: hash_token(&plaintext),
            email: email.to_string(),
            expiry: Utc::now() + ttl,
            scope,
        };
        self.store.put(&TOKENS, &record, None)?;
        debug!(email = %email, scope = ?scope, "Issued token");

        Ok(IssuedToken {
            token: plaintext,
            email: record.email,
            expiry: record.expiry,
        })
    }

    /// Looks a token up by the digest of `plaintext`. Malformed, unknown and
    /// expired tokens all fail with `NotFound`; malformed ones never reach
    /// the store.
    pub fn resolve(&self, plaintext: &str) -> Result<Token, StoreError> {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, plaintext);
        if !v.is_valid() {
            return Err(StoreError::NotFound);
        }

        let token: Token = self
            .store
            .get(&TOKENS, &TOKENS.key(hash_token(plaintext)))?;
        if token.expiry <= Utc::now() {
            return Err(StoreError::NotFound);
        }
        Ok(token)
    }
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_PLAINTEXT_LEN,
        "token",
        "must be 26 bytes long",
    );
}

/// Hex SHA-256 of the plaintext, the token's storage key.
pub fn hash_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// RFC 4648 base32 without padding.
pub fn encode_base32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for &byte in bytes {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}
