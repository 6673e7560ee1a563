//! Worlds owned by a user, partitioned by `userId`.

use crate::api::ApiError;
use crate::objects::{upload_cover_image, BlobError, ObjectStore};
use crate::store::{StoreClient, StoreError, TableSchema, UpdateSet};
use crate::validation::{unique, Validator};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub const WORLDS: TableSchema = TableSchema::with_sort_key("rpg_worlds", "userId", "id");

const MAX_GENRES: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct World {
    pub user_id: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<WorldError> for ApiError {
    fn from(err: WorldError) -> Self {
        match err {
            WorldError::Blob(err) => err.into(),
            WorldError::Store(err) => err.into(),
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn cover_destination(world_id: &str) -> String {
    format!("{world_id}/world/cover.png")
}

#[derive(Clone)]
pub struct WorldRepository {
    store: StoreClient,
    objects: ObjectStore,
}

impl WorldRepository {
    pub fn new(store: StoreClient, objects: ObjectStore) -> Self {
        Self { store, objects }
    }

    /// Assigns an id and creation time, uploads the cover (`cover_image`
    /// holds the base64 payload on entry, the public URL on return) and stores
    /// the world.
    pub fn insert(&self, world: &mut World) -> Result<(), WorldError> {
        world.id = Uuid::new_v4().to_string();
        world.cover_image =
            upload_cover_image(&self.objects, &world.cover_image, &cover_destination(&world.id))?;
        world.created_at = now_rfc3339();
        world.updated_at = String::new();

        self.store.put(&WORLDS, world, None)?;
        info!(user = %world.user_id, world = %world.id, "Created world");
        Ok(())
    }

    pub fn get(&self, user_id: &str, id: &str) -> Result<World, StoreError> {
        self.store.get(&WORLDS, &WORLDS.composite_key(user_id, id))
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<World>, StoreError> {
        self.store.query(&WORLDS, user_id, None)
    }

    /// Writes the editable fields of `world`. When `image_updated` is set the
    /// cover is re-uploaded from the base64 payload in `cover_image`.
    pub fn update(
        &self,
        user_id: &str,
        id: &str,
        world: &mut World,
        image_updated: bool,
    ) -> Result<(), WorldError> {
        if image_updated {
            world.cover_image =
                upload_cover_image(&self.objects, &world.cover_image, &cover_destination(id))?;
        }
        world.updated_at = now_rfc3339();

        let updates = UpdateSet::new()
            .set("name", world.name.clone())
            .set("intro", world.intro.clone())
            .set("genres", world.genres.clone())
            .set("coverImage", world.cover_image.clone())
            .set("updatedAt", world.updated_at.clone());
        self.store
            .update(&WORLDS, &WORLDS.composite_key(user_id, id), &updates, None)?;
        Ok(())
    }

    pub fn delete(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        self.store.delete(&WORLDS, &WORLDS.composite_key(user_id, id))
    }
}

pub fn validate_world(v: &mut Validator, world: &World) {
    v.check(!world.name.is_empty(), "name", "must be provided");
    v.check(
        world.name.chars().count() < 200,
        "name",
        "must not be more than 200 characters long",
    );
    v.check(unique(&world.genres), "genres", "must not contain duplicate values");
    v.check(
        world.genres.len() <= MAX_GENRES,
        "genres",
        "must not contain more than 5 genres",
    );
}
