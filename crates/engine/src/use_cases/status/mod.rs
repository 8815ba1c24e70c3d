//! Status effect manager: ages timed effects and reverts the expired ones.

use dollhouse_domain::{StateDelta, StatusEffect, WorldState};

#[derive(Debug, Clone, Default)]
pub struct StatusTick {
    /// Effects removed by this tick. Their reversals are already in `delta`.
    pub expired: Vec<StatusEffect>,
    pub delta: StateDelta,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusEffectManager;

impl StatusEffectManager {
    pub fn new() -> Self {
        Self
    }

    /// One turn passes for every timed effect.
    ///
    /// An effect with one turn left expires now: it is removed and its reversal delta is
    /// folded in. Indefinite effects are left alone.
    pub fn tick(&self, world: &WorldState) -> StatusTick {
        let mut tick = StatusTick::default();

        for effect in &world.status_effects {
            if effect.is_indefinite() {
                continue;
            }
            if effect.remaining_turns > 1 {
                tick.delta.status_effects.tick.insert(effect.effect_id);
                continue;
            }
            tracing::debug!(
                effect_id = %effect.effect_id,
                target = %effect.target,
                reason = %effect.reason,
                "Status effect expired"
            );
            tick.delta.status_effects.remove.insert(effect.effect_id);
            tick.delta.merge_from(effect.reversal_delta.clone());
            tick.expired.push(effect.clone());
        }

        tick
    }
}
