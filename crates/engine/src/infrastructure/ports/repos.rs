//! Repository port for the authoritative world state.

use async_trait::async_trait;
use dollhouse_domain::{PlayerKey, WorldState};

use super::error::RepoError;

/// One world state per (player, scenario). `save` replaces the stored value wholesale.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorldStateRepo: Send + Sync {
    async fn get(&self, key: &PlayerKey) -> Result<Option<WorldState>, RepoError>;
    async fn save(&self, key: &PlayerKey, state: &WorldState) -> Result<(), RepoError>;
    async fn delete(&self, key: &PlayerKey) -> Result<(), RepoError>;
}
