//! World state manager: the only path through which a player's state is read or written.

use std::sync::Arc;

use dollhouse_domain::{
    apply, Applied, DomainError, PlayerKey, ScenarioAssets, StateDelta, WorldState,
};

use crate::infrastructure::ports::{RepoError, WorldStateRepo};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Apply one stage's delta and log every fragment that had to be dropped.
pub fn apply_logged(
    stage: &'static str,
    world: &WorldState,
    delta: &StateDelta,
    assets: &ScenarioAssets,
) -> Result<Applied, DomainError> {
    let applied = apply(world, delta, assets)?;
    for fragment in &applied.dropped {
        tracing::warn!(
            stage,
            field = fragment.field,
            reference = %fragment.reference,
            reason = fragment.reason,
            "Dropped delta fragment"
        );
    }
    Ok(applied)
}

pub struct WorldStateManager {
    repo: Arc<dyn WorldStateRepo>,
}

impl WorldStateManager {
    pub fn new(repo: Arc<dyn WorldStateRepo>) -> Self {
        Self { repo }
    }

    /// The stored state, created from scenario defaults on first access.
    pub async fn get_state(
        &self,
        key: &PlayerKey,
        assets: &ScenarioAssets,
    ) -> Result<WorldState, RepoError> {
        if let Some(state) = self.repo.get(key).await? {
            return Ok(state);
        }
        let state = WorldState::from_scenario(assets);
        self.repo.save(key, &state).await?;
        tracing::info!(player = %key, "Created world state from scenario defaults");
        Ok(state)
    }

    /// Read, apply and store in one step. Returns the new state.
    pub async fn apply_delta(
        &self,
        key: &PlayerKey,
        delta: &StateDelta,
        assets: &ScenarioAssets,
    ) -> Result<WorldState, StateError> {
        let current = self.get_state(key, assets).await?;
        let applied = apply_logged("apply_delta", &current, delta, assets)?;
        self.repo.save(key, &applied.state).await?;
        Ok(applied.state)
    }

    pub async fn persist(&self, key: &PlayerKey, state: &WorldState) -> Result<(), RepoError> {
        self.repo.save(key, state).await
    }

    /// Drop the stored state and start over from scenario defaults.
    pub async fn reset(
        &self,
        key: &PlayerKey,
        assets: &ScenarioAssets,
    ) -> Result<WorldState, RepoError> {
        self.repo.delete(key).await?;
        let state = WorldState::from_scenario(assets);
        self.repo.save(key, &state).await?;
        tracing::info!(player = %key, "World state reset");
        Ok(state)
    }
}
