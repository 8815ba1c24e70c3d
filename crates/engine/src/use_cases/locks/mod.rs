//! Lock manager: reveals locked content once its condition holds.
//!
//! Unlocking is a one-way door. A lock that was unlocked stays unlocked even if its
//! condition stops holding, and an already-unlocked lock never fires again.

use std::sync::Arc;

use dollhouse_domain::{
    EvalContext, LockId, MemoryEntry, MemoryKind, NpcId, ScenarioAssets, StateDelta, WorldState,
};
use serde::Serialize;

use crate::infrastructure::ports::ClockPort;

/// Importance of the memory an allowed NPC receives when a secret is revealed.
pub const SECRET_MEMORY_IMPORTANCE: f32 = 9.5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockedInfo {
    pub lock_id: LockId,
    pub title: String,
    pub description: String,
    pub reveal_trigger: Option<String>,
    pub allowed_npcs: Vec<NpcId>,
}

#[derive(Debug, Clone, Default)]
pub struct LockCheck {
    pub unlocked: Vec<UnlockedInfo>,
    pub delta: StateDelta,
}

pub struct LockManager {
    clock: Arc<dyn ClockPort>,
}

impl LockManager {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self { clock }
    }

    /// Unlock every still-locked lock whose condition holds.
    ///
    /// The delta sets the lock, emits the reveal trigger as an event, and gives each
    /// allowed NPC a high-importance memory of the secret.
    pub fn check_unlocks(&self, world: &WorldState, assets: &ScenarioAssets) -> LockCheck {
        let ctx = EvalContext::for_scenario(world, assets);
        let mut check = LockCheck::default();

        for lock in &assets.locks {
            if world.is_unlocked(lock.lock_id.as_str()) || !lock.condition.evaluate(&ctx) {
                continue;
            }

            check.delta.set_lock(lock.lock_id.clone(), true);
            if let Some(trigger) = &lock.reveal_trigger {
                check.delta.push_event(trigger.clone());
            }
            for npc_id in &lock.allowed_npcs {
                if world.npc(npc_id.as_str()).is_none() {
                    tracing::warn!(lock_id = %lock.lock_id, npc_id = %npc_id, "Lock allows unknown NPC");
                    continue;
                }
                check.delta.append_memory(
                    npc_id.clone(),
                    MemoryEntry::new(
                        format!("[secret] {}: {}", lock.title, lock.description),
                        MemoryKind::UnlockedSecret,
                        SECRET_MEMORY_IMPORTANCE,
                        world.turn,
                        self.clock.now(),
                    ),
                );
            }

            tracing::info!(lock_id = %lock.lock_id, turn = world.turn, "Lock unlocked");
            check.unlocked.push(UnlockedInfo {
                lock_id: lock.lock_id.clone(),
                title: lock.title.clone(),
                description: lock.description.clone(),
                reveal_trigger: lock.reveal_trigger.clone(),
                allowed_npcs: lock.allowed_npcs.clone(),
            });
        }

        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{attic, attic_world, fixed_clock};
    use dollhouse_domain::apply;

    #[test]
    fn stays_locked_until_condition_holds() {
        let assets = attic();
        let world = attic_world();

        let check = LockManager::new(fixed_clock()).check_unlocks(&world, &assets);

        assert!(check.unlocked.is_empty());
        assert!(check.delta.is_empty());
    }

    #[test]
    fn unlock_reveals_and_remembers() {
        let assets = attic();
        let mut world = attic_world();
        if let Some(brother) = world.npcs.get_mut("brother") {
            brother.stats.insert("affection".to_string(), 75);
        }
        let manager = LockManager::new(fixed_clock());

        let check = manager.check_unlocks(&world, &assets);

        assert_eq!(check.unlocked.len(), 1);
        assert_eq!(check.unlocked[0].lock_id, LockId::new("diary"));
        assert!(check.delta.locks[&LockId::new("diary")]);
        assert_eq!(check.delta.events, vec!["diary_revealed"]);
        let memory = &check.delta.memory_updates["brother"].append[0];
        assert_eq!(memory.kind, MemoryKind::UnlockedSecret);
        assert_eq!(memory.importance, SECRET_MEMORY_IMPORTANCE);
        assert!(memory.description.contains("Brother's diary"));
    }

    #[test]
    fn unlocked_lock_never_fires_again() {
        let assets = attic();
        let mut world = attic_world();
        if let Some(brother) = world.npcs.get_mut("brother") {
            brother.stats.insert("affection".to_string(), 75);
        }
        let manager = LockManager::new(fixed_clock());
        let first = manager.check_unlocks(&world, &assets);
        let mut world = apply(&world, &first.delta, &assets).unwrap().state;
        assert!(world.is_unlocked("diary"));

        // Condition no longer holds: the lock stays open and nothing fires.
        if let Some(brother) = world.npcs.get_mut("brother") {
            brother.stats.insert("affection".to_string(), 10);
        }
        let second = manager.check_unlocks(&world, &assets);
        assert!(second.unlocked.is_empty());
        assert!(second.delta.is_empty());
        assert!(world.is_unlocked("diary"));
    }
}
