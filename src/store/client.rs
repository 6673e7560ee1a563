//! SQLite-backed partitioned store.
//!
//! Logical tables share one physical table keyed by
//! `(table_name, partition_value, sort_value)`; items are stored as JSON
//! attribute maps.

use super::expression::canonical;
use super::{Condition, Item, Key, Projection, StoreError, TableSchema, UpdateSet};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum number of keys applied per batched write.
pub const BATCH_WRITE_LIMIT: usize = 25;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS items (
    table_name TEXT NOT NULL,
    partition_value TEXT NOT NULL,
    sort_value TEXT NOT NULL DEFAULT '',
    item_json TEXT NOT NULL,
    PRIMARY KEY (table_name, partition_value, sort_value)
) WITHOUT ROWID;
"#;

/// Serialization-aware client shared by every repository.
#[derive(Clone)]
pub struct StoreClient {
    conn: Arc<Mutex<Connection>>,
}

impl StoreClient {
    /// Opens (or creates) the store at `db_path`.
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!(path = db_path, "Store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Volatile store, mostly useful in tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Writes `record`, replacing any item with the same key unless
    /// `condition` rejects the existing item.
    pub fn put<T: Serialize>(
        &self,
        table: &TableSchema,
        record: &T,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError> {
        let item = to_item(record)?;
        let (partition, sort) = table.storage_key(&table.key_of(&item)?)?;
        let json = serde_json::to_string(&item)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(condition) = condition {
            let existing = load(&tx, table, &partition, &sort)?;
            if !condition.evaluate(existing.as_ref()) {
                debug!(table = table.name, "Conditional put rejected");
                return Err(StoreError::ConditionFailed);
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO items (table_name, partition_value, sort_value, item_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![table.name, partition, sort, json],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Fetches the item at `key`, failing with `NotFound` if absent.
    pub fn get<T: DeserializeOwned>(&self, table: &TableSchema, key: &Key) -> Result<T, StoreError> {
        let (partition, sort) = table.storage_key(key)?;
        let conn = self.conn.lock();
        let item = load(&conn, table, &partition, &sort)?.ok_or(StoreError::NotFound)?;
        from_item(item)
    }

    /// Returns every item in the partition, ordered by sort key.
    pub fn query<T: DeserializeOwned>(
        &self,
        table: &TableSchema,
        partition: impl Into<Value>,
        projection: Option<&Projection>,
    ) -> Result<Vec<T>, StoreError> {
        let partition = canonical(&partition.into())?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT item_json FROM items
             WHERE table_name = ?1 AND partition_value = ?2
             ORDER BY sort_value ASC",
        )?;
        let rows = stmt
            .query_map(params![table.name, partition], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|json| {
                let item: Item = serde_json::from_str(json)?;
                let item = match projection {
                    Some(projection) => projection.apply(item),
                    None => item,
                };
                from_item(item)
            })
            .collect()
    }

    /// Applies `updates` to the item at `key` and returns the new attributes.
    ///
    /// Fails with `NotFound` if the item does not exist and with
    /// `ConditionFailed` if `condition` rejects it.
    pub fn update(
        &self,
        table: &TableSchema,
        key: &Key,
        updates: &UpdateSet,
        condition: Option<&Condition>,
    ) -> Result<Item, StoreError> {
        let (partition, sort) = table.storage_key(key)?;
        if let Some(name) = updates.attribute_names().find(|n| table.is_key_attribute(n)) {
            return Err(StoreError::Serialization(format!(
                "cannot update key attribute {name}"
            )));
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut item = load(&tx, table, &partition, &sort)?.ok_or(StoreError::NotFound)?;
        if let Some(condition) = condition {
            if !condition.evaluate(Some(&item)) {
                debug!(table = table.name, "Conditional update rejected");
                return Err(StoreError::ConditionFailed);
            }
        }
        updates.apply(&mut item)?;

        tx.execute(
            "UPDATE items SET item_json = ?4
             WHERE table_name = ?1 AND partition_value = ?2 AND sort_value = ?3",
            params![table.name, partition, sort, serde_json::to_string(&item)?],
        )?;
        tx.commit()?;
        Ok(item)
    }

    /// Removes the item at `key`. Deleting a missing item is not an error.
    pub fn delete(&self, table: &TableSchema, key: &Key) -> Result<(), StoreError> {
        let (partition, sort) = table.storage_key(key)?;
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM items
             WHERE table_name = ?1 AND partition_value = ?2 AND sort_value = ?3",
            params![table.name, partition, sort],
        )?;
        Ok(())
    }

    /// Deletes `keys` in sub-batches of [`BATCH_WRITE_LIMIT`].
    ///
    /// Each sub-batch is atomic; the whole call is not. On failure the error
    /// lists the keys already deleted and the ones left to retry.
    pub fn batch_delete(&self, table: &TableSchema, keys: &[Key]) -> Result<(), StoreError> {
        let mut deleted: Vec<Key> = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(BATCH_WRITE_LIMIT) {
            if let Err(source) = self.delete_chunk(table, chunk) {
                warn!(
                    table = table.name,
                    deleted = deleted.len(),
                    remaining = keys.len() - deleted.len(),
                    error = %source,
                    "Batch delete stopped"
                );
                let remaining = keys[deleted.len()..].to_vec();
                return Err(StoreError::PartialBatch {
                    deleted,
                    remaining,
                    source: Box::new(source),
                });
            }
            deleted.extend_from_slice(chunk);
        }

        debug!(table = table.name, count = deleted.len(), "Batch delete complete");
        Ok(())
    }

    fn delete_chunk(&self, table: &TableSchema, chunk: &[Key]) -> Result<(), StoreError> {
        let storage_keys = chunk
            .iter()
            .map(|key| table.storage_key(key))
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "DELETE FROM items
                 WHERE table_name = ?1 AND partition_value = ?2 AND sort_value = ?3",
            )?;
            for (partition, sort) in &storage_keys {
                stmt.execute(params![table.name, partition, sort])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn load(
    conn: &Connection,
    table: &TableSchema,
    partition: &str,
    sort: &str,
) -> Result<Option<Item>, StoreError> {
    let json: Option<String> = conn
        .query_row(
            "SELECT item_json FROM items
             WHERE table_name = ?1 AND partition_value = ?2 AND sort_value = ?3",
            params![table.name, partition, sort],
            |row| row.get(0),
        )
        .optional()?;

    json.map(|json| serde_json::from_str(&json).map_err(StoreError::from))
        .transpose()
}

fn to_item<T: Serialize>(record: &T) -> Result<Item, StoreError> {
    match serde_json::to_value(record)? {
        Value::Object(item) => Ok(item),
        other => Err(StoreError::Serialization(format!(
            "record must serialise to an attribute map, got {other}"
        ))),
    }
}

fn from_item<T: DeserializeOwned>(item: Item) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(item))?)
}
