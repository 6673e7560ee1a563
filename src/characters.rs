//! Characters belonging to a world, partitioned by `worldId`.
//!
//! Free-form attributes are persisted as a JSON string under `AttributesJSON`
//! and decoded again on read.

use crate::store::{Key, Projection, StoreClient, StoreError, TableSchema, UpdateSet};
use crate::validation::Validator;
use crate::worlds::now_rfc3339;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

pub const CHARACTERS: TableSchema = TableSchema::with_sort_key("rpg_characters", "worldId", "id");

/// Stored character record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub world_id: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub intro: String,
    #[serde(rename = "AttributesJSON", default)]
    pub attributes_json: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Character {
    pub fn attributes(&self) -> Result<Map<String, Value>, serde_json::Error> {
        if self.attributes_json.is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&self.attributes_json)
    }

    pub fn set_attributes(&mut self, attributes: &Map<String, Value>) -> Result<(), serde_json::Error> {
        self.attributes_json = serde_json::to_string(attributes)?;
        Ok(())
    }
}

/// API form of a character, with attributes decoded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterView {
    pub world_id: String,
    pub id: String,
    pub name: String,
    pub intro: String,
    pub attributes: Map<String, Value>,
    pub cover_image: String,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl CharacterView {
    pub fn from_character(character: &Character) -> Result<Self, StoreError> {
        Ok(Self {
            world_id: character.world_id.clone(),
            id: character.id.clone(),
            name: character.name.clone(),
            intro: character.intro.clone(),
            attributes: character.attributes()?,
            cover_image: character.cover_image.clone(),
            owner_id: character.owner_id.clone(),
            created_at: character.created_at.clone(),
            updated_at: character.updated_at.clone(),
        })
    }
}

#[derive(Clone)]
pub struct CharacterRepository {
    store: StoreClient,
}

impl CharacterRepository {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    pub fn insert(&self, character: &mut Character) -> Result<(), StoreError> {
        character.id = Uuid::new_v4().to_string();
        character.created_at = now_rfc3339();
        character.updated_at = String::new();

        self.store.put(&CHARACTERS, character, None)?;
        info!(world = %character.world_id, character = %character.id, "Created character");
        Ok(())
    }

    pub fn get(&self, world_id: &str, id: &str) -> Result<Character, StoreError> {
        self.store
            .get(&CHARACTERS, &CHARACTERS.composite_key(world_id, id))
    }

    pub fn list(&self, world_id: &str) -> Result<Vec<Character>, StoreError> {
        self.store.query(&CHARACTERS, world_id, None)
    }

    /// Keys of every character in the world, fetched key-only.
    pub fn list_keys(&self, world_id: &str) -> Result<Vec<Key>, StoreError> {
        let key_only = Projection::new([CHARACTERS.partition_key, "id"]);
        self.store.query(&CHARACTERS, world_id, Some(&key_only))
    }

    pub fn update(&self, world_id: &str, id: &str, character: &mut Character) -> Result<(), StoreError> {
        character.updated_at = now_rfc3339();

        let updates = UpdateSet::new()
            .set("AttributesJSON", character.attributes_json.clone())
            .set("name", character.name.clone())
            .set("intro", character.intro.clone())
            .set("updatedAt", character.updated_at.clone())
            .set("coverImage", character.cover_image.clone());
        self.store.update(
            &CHARACTERS,
            &CHARACTERS.composite_key(world_id, id),
            &updates,
            None,
        )?;
        Ok(())
    }

    pub fn delete(&self, world_id: &str, id: &str) -> Result<(), StoreError> {
        self.store
            .delete(&CHARACTERS, &CHARACTERS.composite_key(world_id, id))
    }

    pub fn delete_by_keys(&self, keys: &[Key]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.store.batch_delete(&CHARACTERS, keys)
    }
}

pub fn validate_character(v: &mut Validator, character: &Character) {
    v.check(!character.name.is_empty(), "name", "must be provided");
    v.check(
        character.name.chars().count() < 200,
        "name",
        "must not be more than 200 characters long",
    );
}
