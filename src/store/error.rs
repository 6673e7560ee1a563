use super::Key;
use thiserror::Error;

/// Errors surfaced by the store client.
///
/// Variants are distinct so handlers can map `NotFound` to 404 and the rest
/// to conflict or server-error responses.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("record not found")]
    NotFound,

    #[error("conditional check failed")]
    ConditionFailed,

    #[error("store unavailable: {0}")]
    Transport(#[from] rusqlite::Error),

    /// A batched delete stopped part way. `deleted` were removed, `remaining`
    /// were not attempted or belong to the failed sub-batch.
    #[error("batch delete stopped after {} keys ({} remaining): {source}", .deleted.len(), .remaining.len())]
    PartialBatch {
        deleted: Vec<Key>,
        remaining: Vec<Key>,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
