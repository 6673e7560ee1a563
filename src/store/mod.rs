//! Partitioned key-value store client.
//!
//! Every repository persists through [`StoreClient`]. Records are serialised
//! to attribute maps with serde and addressed by a partition key plus an
//! optional sort key, as described by a [`TableSchema`].

mod client;
mod error;
mod expression;

pub use client::{StoreClient, BATCH_WRITE_LIMIT};
pub use error::StoreError;
pub use expression::{Condition, Item, Key, Projection, TableSchema, UpdateSet};
