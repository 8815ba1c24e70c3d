//! In-memory world state storage.

use async_trait::async_trait;
use dashmap::DashMap;
use dollhouse_domain::{PlayerKey, WorldState};

use crate::infrastructure::ports::{RepoError, WorldStateRepo};

/// Process-local store keyed by (player, scenario). States are cloned in and out, so a
/// caller holding a copy never observes another writer's changes.
#[derive(Default)]
pub struct InMemoryWorldStore {
    states: DashMap<PlayerKey, WorldState>,
}

impl InMemoryWorldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl WorldStateRepo for InMemoryWorldStore {
    async fn get(&self, key: &PlayerKey) -> Result<Option<WorldState>, RepoError> {
        Ok(self.states.get(key).map(|entry| entry.value().clone()))
    }

    async fn save(&self, key: &PlayerKey, state: &WorldState) -> Result<(), RepoError> {
        self.states.insert(key.clone(), state.clone());
        Ok(())
    }

    async fn delete(&self, key: &PlayerKey) -> Result<(), RepoError> {
        self.states.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_get_delete_round() {
        let store = InMemoryWorldStore::new();
        let key = PlayerKey::new("alice", "attic");
        assert!(store.get(&key).await.unwrap().is_none());

        let mut state = WorldState::blank();
        state.turn = 4;
        store.save(&key, &state).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().map(|s| s.turn), Some(4));

        let other = PlayerKey::new("bob", "attic");
        assert!(store.get(&other).await.unwrap().is_none());

        store.delete(&key).await.unwrap();
        assert!(store.is_empty());
    }
}
