use dollhouse_domain::{
    apply, compile_effects, EffectContext, EndingMatch, EvalContext, ItemAction, ItemDefinition,
    ItemId, NpcId, ScenarioAssets, StateDelta, WorldState,
};
use serde::{Deserialize, Serialize};

use crate::use_cases::ending::EndingChecker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    ItemNotHeld,
    ActionUnknown,
    PreconditionFailed,
}

impl RejectionCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ItemNotHeld => "ITEM_NOT_HELD",
            Self::ActionUnknown => "ACTION_UNKNOWN",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
        }
    }
}

/// Why an item use was refused. A rejected use produces no delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{reason}")]
pub struct ItemRejection {
    pub code: RejectionCode,
    pub item_id: ItemId,
    pub action_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUseRequest {
    pub item_id: ItemId,
    pub action_id: Option<String>,
    /// Free-text target, e.g. `doghole`.
    pub target: Option<String>,
    pub target_npc: Option<NpcId>,
}

/// A request that passed validation, bound to the declared item and action.
#[derive(Debug, Clone)]
pub struct ValidatedUse<'a> {
    pub item: &'a ItemDefinition,
    pub action: &'a ItemAction,
    pub active_npc: Option<NpcId>,
}

/// The effects of a validated use, computed against the current world without applying.
#[derive(Debug, Clone)]
pub struct SimulatedUse<'a> {
    pub validated: ValidatedUse<'a>,
    pub delta: StateDelta,
    pub consumed: bool,
    /// The ending the world would reach if this delta were applied.
    pub ending_preview: Option<EndingMatch>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemUseOutcome {
    pub item_id: ItemId,
    pub action_id: String,
    pub delta: StateDelta,
    pub consumed: bool,
    pub message: String,
    pub ending_preview: Option<EndingMatch>,
}

/// Validate, simulate, commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemUseResolver {
    endings: EndingChecker,
}

impl ItemUseResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &self,
        request: &ItemUseRequest,
        world: &WorldState,
        assets: &ScenarioAssets,
    ) -> Result<ItemUseOutcome, ItemRejection> {
        let validated = self.validate(request, world, assets)?;
        let simulated = self.simulate(validated, world, assets);
        Ok(self.commit(simulated))
    }

    pub fn validate<'a>(
        &self,
        request: &ItemUseRequest,
        world: &WorldState,
        assets: &'a ScenarioAssets,
    ) -> Result<ValidatedUse<'a>, ItemRejection> {
        let reject = |code: RejectionCode, action_id: Option<&str>, reason: String| ItemRejection {
            code,
            item_id: request.item_id.clone(),
            action_id: action_id.map(str::to_string),
            reason,
        };

        if !world.has_item(request.item_id.as_str()) {
            return Err(reject(
                RejectionCode::ItemNotHeld,
                request.action_id.as_deref(),
                format!("You don't have the {}.", request.item_id.as_str().replace('_', " ")),
            ));
        }
        let Some(item) = assets.item(request.item_id.as_str()) else {
            return Err(reject(
                RejectionCode::ActionUnknown,
                request.action_id.as_deref(),
                format!("Nothing happens with the {}.", request.item_id),
            ));
        };

        let Some(action) = self.select_action(item, request, world, assets) else {
            return Err(reject(
                RejectionCode::ActionUnknown,
                request.action_id.as_deref(),
                format!("You can't do that with the {}.", item.name),
            ));
        };

        let active_npc = request.target_npc.clone().or_else(|| {
            action
                .target
                .as_deref()
                .filter(|t| world.npc(t).is_some())
                .map(NpcId::new)
        });
        let ctx = EvalContext::for_scenario(world, assets).with_active_npc(active_npc.as_ref());
        if !action.allowed_when.evaluate(&ctx) {
            return Err(reject(
                RejectionCode::PreconditionFailed,
                Some(action.action_id.as_str()),
                action
                    .failure_message
                    .clone()
                    .unwrap_or_else(|| format!("You can't use the {} like that here.", item.name)),
            ));
        }

        Ok(ValidatedUse {
            item,
            action,
            active_npc,
        })
    }

    pub fn simulate<'a>(
        &self,
        validated: ValidatedUse<'a>,
        world: &WorldState,
        assets: &ScenarioAssets,
    ) -> SimulatedUse<'a> {
        let source = format!("item:{}", validated.item.item_id);
        let compiled = compile_effects(
            &validated.action.effects,
            &EffectContext::new(world, assets, &source).with_active_npc(validated.active_npc.as_ref()),
        );
        if !compiled.unresolved.is_empty() {
            tracing::warn!(
                item_id = %validated.item.item_id,
                action_id = %validated.action.action_id,
                unresolved = ?compiled.unresolved,
                "Item action referenced NPCs that could not be resolved"
            );
        }

        let mut delta = compiled.delta;
        let consumed = validated.item.kind.is_consumed_on_use();
        if consumed {
            delta.remove_item(validated.item.item_id.clone());
        }

        let ending_preview = match apply(world, &delta, assets) {
            Ok(applied) if world.ending.is_none() => {
                self.endings.check_ending(&applied.state, assets)
            }
            _ => None,
        };

        SimulatedUse {
            validated,
            delta,
            consumed,
            ending_preview,
        }
    }

    pub fn commit(&self, simulated: SimulatedUse<'_>) -> ItemUseOutcome {
        let SimulatedUse {
            validated,
            delta,
            consumed,
            ending_preview,
        } = simulated;
        tracing::info!(
            item_id = %validated.item.item_id,
            action_id = %validated.action.action_id,
            consumed,
            "Item used"
        );
        ItemUseOutcome {
            item_id: validated.item.item_id.clone(),
            action_id: validated.action.action_id.clone(),
            message: validated
                .action
                .success_message
                .clone()
                .unwrap_or_else(|| format!("You use the {}.", validated.item.name)),
            delta,
            consumed,
            ending_preview,
        }
    }

    /// Explicit action id, then an action aimed at the requested target, then the only
    /// action, then the first action whose precondition holds, then the first action.
    fn select_action<'a>(
        &self,
        item: &'a ItemDefinition,
        request: &ItemUseRequest,
        world: &WorldState,
        assets: &ScenarioAssets,
    ) -> Option<&'a ItemAction> {
        if let Some(action_id) = &request.action_id {
            return item.actions.iter().find(|a| a.action_id == *action_id);
        }

        let wanted: Vec<String> = request
            .target
            .iter()
            .map(|t| normalize_target(t))
            .chain(request.target_npc.iter().map(|n| normalize_target(n.as_str())))
            .collect();
        if !wanted.is_empty() {
            let aimed = item.actions.iter().find(|a| {
                a.target
                    .as_deref()
                    .is_some_and(|t| wanted.contains(&normalize_target(t)))
            });
            if aimed.is_some() {
                return aimed;
            }
        }

        if item.actions.len() == 1 {
            return item.actions.first();
        }

        item.actions
            .iter()
            .find(|a| {
                let active = a.target.as_deref().filter(|t| world.npc(t).is_some()).map(NpcId::new);
                a.allowed_when.evaluate(
                    &EvalContext::for_scenario(world, assets).with_active_npc(active.as_ref()),
                )
            })
            .or_else(|| item.actions.first())
    }
}

fn normalize_target(target: &str) -> String {
    target
        .trim()
        .trim_start_matches("the ")
        .to_lowercase()
        .replace(' ', "_")
}
