//! Domain repositories shared by the route handlers.

use crate::characters::CharacterRepository;
use crate::objects::ObjectStore;
use crate::store::{StoreClient, StoreError};
use crate::worlds::WorldRepository;
use tracing::{info, warn};

#[derive(Clone)]
pub struct Services {
    pub worlds: WorldRepository,
    pub characters: CharacterRepository,
}

impl Services {
    pub fn new(store: StoreClient, objects: ObjectStore) -> Self {
        Self {
            worlds: WorldRepository::new(store.clone(), objects),
            characters: CharacterRepository::new(store),
        }
    }

    /// Deletes a world and every character in it.
    ///
    /// Characters go first; if their batch delete fails the world record is
    /// kept so the whole operation can be retried.
    pub fn delete_world(&self, user_id: &str, world_id: &str) -> Result<(), StoreError> {
        // Ownership check: character partitions are keyed by world only.
        self.worlds.get(user_id, world_id)?;

        let keys = self.characters.list_keys(world_id)?;
        if let Err(err) = self.characters.delete_by_keys(&keys) {
            warn!(world = %world_id, error = %err, "Character cleanup failed, keeping world");
            return Err(err);
        }

        self.worlds.delete(user_id, world_id)?;
        info!(world = %world_id, characters = keys.len(), "Deleted world");
        Ok(())
    }
}
