use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::{normalize_var_key, Effect, ScenarioAssets, ACTIVE_NPC_ALIASES, ALL_NPCS};
use crate::condition::Condition;

/// An authoring problem found at load time. Never fatal: the engine degrades around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub location: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

pub(super) fn validate(assets: &ScenarioAssets) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for (name, bounds) in &assets.stats {
        if bounds.min > bounds.max {
            issues.push(ValidationIssue::new(format!("stats.{}", name), "min is greater than max"));
        }
    }
    for (name, spec) in &assets.vars {
        let bounds = spec.bounds();
        if bounds.min > bounds.max {
            issues.push(ValidationIssue::new(format!("vars.{}", name), "min is greater than max"));
        }
    }

    duplicates(&mut issues, "npcs", assets.npcs.iter().map(|n| n.npc_id.as_str()));
    duplicates(&mut issues, "rules", assets.rules.iter().map(|r| r.rule_id.as_str()));
    duplicates(&mut issues, "locks", assets.locks.iter().map(|l| l.lock_id.as_str()));
    duplicates(&mut issues, "items", assets.items.iter().map(|i| i.item_id.as_str()));
    duplicates(&mut issues, "endings", assets.endings.iter().map(|e| e.ending_id.as_str()));

    for npc in &assets.npcs {
        for stat in npc.stats.keys() {
            if !assets.declares_stat(stat) {
                issues.push(ValidationIssue::new(
                    format!("npcs.{}.stats.{}", npc.npc_id, stat),
                    "stat is not declared in the stat schema",
                ));
            }
        }
    }

    for rule in &assets.rules {
        let at = format!("rules.{}", rule.rule_id);
        condition(&mut issues, &format!("{}.when", at), &rule.when);
        effects(&mut issues, assets, &at, &rule.effects);
    }

    for lock in &assets.locks {
        let at = format!("locks.{}", lock.lock_id);
        condition(&mut issues, &format!("{}.condition", at), &lock.condition);
        for npc_id in &lock.allowed_npcs {
            if assets.npc(npc_id.as_str()).is_none() {
                issues.push(ValidationIssue::new(
                    format!("{}.allowed_npcs", at),
                    format!("unknown npc '{}'", npc_id),
                ));
            }
        }
    }

    for item in &assets.items {
        let at = format!("items.{}", item.item_id);
        if let Some(acquire) = &item.acquire {
            condition(&mut issues, &format!("{}.acquire.condition", at), &acquire.condition);
        }
        for action in &item.actions {
            let at = format!("{}.actions.{}", at, action.action_id);
            condition(&mut issues, &format!("{}.allowed_when", at), &action.allowed_when);
            effects(&mut issues, assets, &at, &action.effects);
        }
    }

    for ending in &assets.endings {
        let at = format!("endings.{}", ending.ending_id);
        condition(&mut issues, &format!("{}.condition", at), &ending.condition);
        effects(&mut issues, assets, &at, &ending.on_enter);
    }

    issues
}

fn duplicates<'a>(
    issues: &mut Vec<ValidationIssue>,
    section: &str,
    ids: impl Iterator<Item = &'a str>,
) {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            issues.push(ValidationIssue::new(
                format!("{}.{}", section, id),
                "duplicate id",
            ));
        }
    }
}

fn condition(issues: &mut Vec<ValidationIssue>, at: &str, condition: &Condition) {
    if let Some(err) = condition.error() {
        issues.push(ValidationIssue::new(
            at,
            format!("malformed condition '{}': {}", condition.source(), err),
        ));
    }
}

fn effects(issues: &mut Vec<ValidationIssue>, assets: &ScenarioAssets, at: &str, effects: &[Effect]) {
    for effect in effects {
        match effect {
            Effect::NpcStatAdd { npc, stat, .. }
            | Effect::NpcStatSub { npc, stat, .. }
            | Effect::TimedStat { npc, stat, .. } => {
                npc_reference(issues, assets, at, npc);
                if !assets.declares_stat(stat) {
                    issues.push(ValidationIssue::new(
                        at,
                        format!("effect uses undeclared stat '{}'", stat),
                    ));
                }
            }
            Effect::SetStatus { npc, .. } => npc_reference(issues, assets, at, npc),
            Effect::VarAdd { key, .. } | Effect::VarSub { key, .. } | Effect::VarSet { key, .. } => {
                if assets.var_spec(normalize_var_key(key)).is_none() {
                    issues.push(ValidationIssue::new(
                        at,
                        format!("effect uses undeclared var '{}'", key),
                    ));
                }
            }
            Effect::ClearStatus { target } if target != "player" => {
                npc_reference(issues, assets, at, target)
            }
            _ => {}
        }
    }
}

fn npc_reference(issues: &mut Vec<ValidationIssue>, assets: &ScenarioAssets, at: &str, npc: &str) {
    if ACTIVE_NPC_ALIASES.contains(&npc) || npc == ALL_NPCS || assets.npc(npc).is_some() {
        return;
    }
    issues.push(ValidationIssue::new(at, format!("unknown npc '{}'", npc)));
}

#[cfg(test)]
mod tests {
    use crate::scenario::ScenarioAssets;

    #[test]
    fn reports_authoring_problems() {
        let assets: ScenarioAssets = serde_json::from_value(serde_json::json!({
            "scenario_id": "s",
            "title": "S",
            "stats": { "affection": { "min": 10, "max": 0 } },
            "npcs": [
                { "npc_id": "brother", "name": "Brother", "stats": { "courage": 3 } },
                { "npc_id": "brother", "name": "Twin" }
            ],
            "rules": [
                {
                    "rule_id": "r1",
                    "when": "vars.x >=",
                    "effects": [ { "type": "npc_stat_add", "npc": "ghost", "stat": "affection", "value": 1 } ]
                }
            ],
            "locks": [
                { "lock_id": "diary", "title": "Diary", "condition": "true", "allowed_npcs": ["mother"] }
            ]
        }))
        .unwrap();

        let locations: Vec<String> = assets.validate().into_iter().map(|i| i.location).collect();
        assert_eq!(
            locations,
            vec![
                "stats.affection",
                "npcs.brother",
                "npcs.brother.stats.courage",
                "rules.r1.when",
                "rules.r1",
                "locks.diary.allowed_npcs",
            ]
        );
    }

    #[test]
    fn clean_scenario_has_no_issues() {
        let assets: ScenarioAssets = serde_json::from_value(serde_json::json!({
            "scenario_id": "s",
            "title": "S",
            "stats": { "affection": {} },
            "vars": { "humanity": { "initial": 50 } },
            "npcs": [ { "npc_id": "brother", "name": "Brother", "stats": { "affection": 3 } } ],
            "rules": [
                {
                    "rule_id": "comfort",
                    "when": "intent == 'comfort'",
                    "effects": [
                        { "type": "npc_stat_add", "npc": "__active__", "stat": "affection", "value": 2 },
                        { "type": "var_add", "key": "vars.humanity", "value": 1 }
                    ]
                }
            ]
        }))
        .unwrap();
        assert!(assets.validate().is_empty());
    }
}
