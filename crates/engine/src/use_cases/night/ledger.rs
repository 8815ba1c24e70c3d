use std::collections::BTreeMap;

use dollhouse_domain::{MemoryEntry, NpcId, NpcMemory, NpcPlan, StateDelta, WorldState};

use super::StatChanges;

/// Working copy of every NPC's memory plus the delta that reproduces it.
///
/// Every write goes to both, in the order `apply` replays them: reset, append, plan.
pub(super) struct NightLedger {
    working: BTreeMap<NpcId, NpcMemory>,
    delta: StateDelta,
    descriptions: Vec<String>,
}

impl NightLedger {
    pub(super) fn new(world: &WorldState) -> Self {
        Self {
            working: world
                .npcs
                .iter()
                .map(|(id, state)| (id.clone(), state.memory.clone()))
                .collect(),
            delta: StateDelta::new(),
            descriptions: Vec::new(),
        }
    }

    pub(super) fn memory(&self, npc_id: &NpcId) -> Option<&NpcMemory> {
        self.working.get(npc_id)
    }

    pub(super) fn remember(&mut self, npc_id: &NpcId, entry: MemoryEntry) {
        if let Some(memory) = self.working.get_mut(npc_id) {
            memory.record(entry.clone());
        }
        self.delta.append_memory(npc_id.clone(), entry);
    }

    pub(super) fn reset_importance(&mut self, npc_id: &NpcId, turn: u32) {
        if let Some(memory) = self.working.get_mut(npc_id) {
            memory.reset_importance(turn);
        }
        self.delta
            .memory_updates
            .entry(npc_id.clone())
            .or_default()
            .reset_importance = Some(turn);
    }

    pub(super) fn set_plan(&mut self, npc_id: &NpcId, plan: NpcPlan) {
        if let Some(memory) = self.working.get_mut(npc_id) {
            memory.plan = Some(plan.clone());
        }
        self.delta
            .memory_updates
            .entry(npc_id.clone())
            .or_default()
            .plan = Some(plan);
    }

    /// Accumulates: two pairs moving the same stat sum up.
    pub(super) fn add_stats(&mut self, changes: StatChanges) {
        for (npc_id, stats) in changes {
            for (stat, change) in stats {
                self.delta.add_stat(npc_id.clone(), stat, change);
            }
        }
    }

    pub(super) fn describe(&mut self, line: impl Into<String>) {
        self.descriptions.push(line.into());
    }

    pub(super) fn finish(self) -> (StateDelta, Vec<String>) {
        (self.delta, self.descriptions)
    }
}
