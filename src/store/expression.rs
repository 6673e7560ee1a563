//! Keys, conditions, update sets and projections.

use super::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record serialised to its attribute map.
pub type Item = Map<String, Value>;

/// Logical table description: name plus key attribute names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub partition_key: &'static str,
    pub sort_key: Option<&'static str>,
}

impl TableSchema {
    pub const fn new(name: &'static str, partition_key: &'static str) -> Self {
        Self {
            name,
            partition_key,
            sort_key: None,
        }
    }

    pub const fn with_sort_key(
        name: &'static str,
        partition_key: &'static str,
        sort_key: &'static str,
    ) -> Self {
        Self {
            name,
            partition_key,
            sort_key: Some(sort_key),
        }
    }

    /// Key for a table addressed by partition key only.
    pub fn key(&self, partition: impl Into<Value>) -> Key {
        Key::default().with(self.partition_key, partition)
    }

    /// Key for a table with a sort key.
    pub fn composite_key(&self, partition: impl Into<Value>, sort: impl Into<Value>) -> Key {
        let key = self.key(partition);
        match self.sort_key {
            Some(sort_key) => key.with(sort_key, sort),
            None => key,
        }
    }

    pub fn is_key_attribute(&self, name: &str) -> bool {
        name == self.partition_key || self.sort_key == Some(name)
    }

    /// Extracts the key attributes from a full record.
    pub(crate) fn key_of(&self, item: &Item) -> Result<Key, StoreError> {
        let mut key = Key::default();
        for name in self.key_attributes() {
            let value = item.get(name).ok_or_else(|| {
                StoreError::Serialization(format!(
                    "record for table {} is missing key attribute {name}",
                    self.name
                ))
            })?;
            key = key.with(name, value.clone());
        }
        Ok(key)
    }

    /// Canonical `(partition, sort)` strings for a key, checking it carries
    /// exactly this table's key attributes.
    pub(crate) fn storage_key(&self, key: &Key) -> Result<(String, String), StoreError> {
        let expected = self.key_attributes().count();
        if key.0.len() != expected {
            return Err(StoreError::Serialization(format!(
                "key for table {} must have exactly {expected} attribute(s), got {}",
                self.name,
                key.0.len()
            )));
        }

        let partition = key
            .get(self.partition_key)
            .ok_or_else(|| self.missing(self.partition_key))
            .and_then(canonical)?;
        let sort = match self.sort_key {
            Some(name) => key
                .get(name)
                .ok_or_else(|| self.missing(name))
                .and_then(canonical)?,
            None => String::new(),
        };
        Ok((partition, sort))
    }

    fn key_attributes(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.partition_key).chain(self.sort_key)
    }

    fn missing(&self, name: &str) -> StoreError {
        StoreError::Serialization(format!(
            "key for table {} is missing attribute {name}",
            self.name
        ))
    }
}

/// Canonical string form of a key attribute value.
pub(crate) fn canonical(value: &Value) -> Result<String, StoreError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(StoreError::Serialization(format!(
            "key attributes must be scalar, got {other}"
        ))),
    }
}

/// Key attributes of a single record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Item);

impl Key {
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn attributes(&self) -> &Item {
        &self.0
    }
}

/// Server-evaluated predicate over the existing item.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    AttributeNotExists(String),
    AttributeEquals(String, Value),
}

impl Condition {
    pub fn attribute_not_exists(name: &str) -> Self {
        Condition::AttributeNotExists(name.to_string())
    }

    pub fn attribute_equals(name: &str, value: impl Into<Value>) -> Self {
        Condition::AttributeEquals(name.to_string(), value.into())
    }

    pub(crate) fn evaluate(&self, existing: Option<&Item>) -> bool {
        match self {
            Condition::AttributeNotExists(name) => {
                existing.map_or(true, |item| !item.contains_key(name))
            }
            Condition::AttributeEquals(name, expected) => {
                existing.and_then(|item| item.get(name)) == Some(expected)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum UpdateAction {
    Set(Value),
    Remove,
    Increment(i64),
}

/// Attribute-level partial mutation. Attributes not named are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSet {
    actions: Vec<(String, UpdateAction)>,
}

impl UpdateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.actions
            .push((name.to_string(), UpdateAction::Set(value.into())));
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.actions.push((name.to_string(), UpdateAction::Remove));
        self
    }

    /// Adds `by` to a numeric attribute, treating a missing one as zero.
    pub fn increment(mut self, name: &str, by: i64) -> Self {
        self.actions
            .push((name.to_string(), UpdateAction::Increment(by)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|(name, _)| name.as_str())
    }

    pub(crate) fn apply(&self, item: &mut Item) -> Result<(), StoreError> {
        for (name, action) in &self.actions {
            match action {
                UpdateAction::Set(value) => {
                    item.insert(name.clone(), value.clone());
                }
                UpdateAction::Remove => {
                    item.remove(name);
                }
                UpdateAction::Increment(by) => {
                    let current = match item.get(name) {
                        None => 0,
                        Some(value) => value.as_i64().ok_or_else(|| {
                            StoreError::Serialization(format!(
                                "cannot increment non-integer attribute {name}"
                            ))
                        })?,
                    };
                    let next = current.checked_add(*by).ok_or_else(|| {
                        StoreError::Serialization(format!("increment of {name} overflows"))
                    })?;
                    item.insert(name.clone(), Value::from(next));
                }
            }
        }
        Ok(())
    }
}

/// Restricts which attributes a query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection(Vec<String>);

impl Projection {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub(crate) fn apply(&self, mut item: Item) -> Item {
        item.retain(|name, _| self.0.iter().any(|kept| kept == name));
        item
    }
}
