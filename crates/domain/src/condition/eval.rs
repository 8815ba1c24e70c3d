use std::cmp::Ordering;

use super::lexer::CmpOp;
use super::parser::{Expr, Operand};
use super::EvalContext;
use crate::value_objects::StateValue;

pub fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> bool {
    match expr {
        Expr::Or(terms) => terms.iter().any(|t| evaluate(t, ctx)),
        Expr::And(terms) => terms.iter().all(|t| evaluate(t, ctx)),
        Expr::Not(inner) => !evaluate(inner, ctx),
        Expr::Truthy(operand) => resolve(operand, ctx).is_some_and(|v| v.is_truthy()),
        Expr::HasItem(item) => ctx.world.inventory.contains(item.as_str()),
        Expr::Compare { lhs, op, rhs } => match (resolve(lhs, ctx), resolve(rhs, ctx)) {
            (Some(l), Some(r)) => compare(&l, *op, &r),
            // Unknown identifiers never satisfy a comparison, whatever the operator.
            _ => false,
        },
    }
}

pub fn mentions_inventory(expr: &Expr) -> bool {
    match expr {
        Expr::Or(terms) | Expr::And(terms) => terms.iter().any(mentions_inventory),
        Expr::Not(inner) => mentions_inventory(inner),
        Expr::HasItem(_) => true,
        Expr::Compare { .. } | Expr::Truthy(_) => false,
    }
}

fn compare(lhs: &StateValue, op: CmpOp, rhs: &StateValue) -> bool {
    let ordering = match (lhs, rhs) {
        (StateValue::Number(a), StateValue::Number(b)) => Some(a.cmp(b)),
        (StateValue::Text(a), StateValue::Text(b)) => (a == b).then_some(Ordering::Equal),
        (StateValue::Bool(a), StateValue::Bool(b)) => (a == b).then_some(Ordering::Equal),
        (StateValue::Null, StateValue::Null) => Some(Ordering::Equal),
        _ => None,
    };
    match op {
        CmpOp::Eq => ordering == Some(Ordering::Equal),
        CmpOp::Ne => ordering != Some(Ordering::Equal),
        CmpOp::Gt => ordering == Some(Ordering::Greater),
        CmpOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        CmpOp::Lt => ordering == Some(Ordering::Less),
        CmpOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
    }
}

fn resolve(operand: &Operand, ctx: &EvalContext<'_>) -> Option<StateValue> {
    let segments = match operand {
        Operand::Literal(value) => return Some(value.clone()),
        Operand::Path(segments) => segments,
    };
    let world = ctx.world;
    let parts: Vec<&str> = segments.iter().map(String::as_str).collect();

    match parts.as_slice() {
        ["npc", npc_ref, field] => {
            let npc = match *npc_ref {
                "target" | "__active__" => world.npcs.get(ctx.active_npc?.as_str())?,
                id => world.npcs.get(id)?,
            };
            if *field == "status" {
                return Some(StateValue::Text(npc.status.clone()));
            }
            npc.stats.get(*field).map(|v| StateValue::Number(*v))
        }
        ["vars" | "player", name] => world.vars.get(*name).cloned(),
        ["flags", name] => Some(world.flags.get(*name).cloned().unwrap_or_default()),
        ["locks", id] => world.locks.get(*id).map(|v| StateValue::Bool(*v)),
        ["system", "turn"] | ["turn"] => Some(StateValue::Number(i64::from(world.turn))),
        ["system", "turn_limit"] | ["turn_limit"] => {
            ctx.turn_limit.map(|limit| StateValue::Number(i64::from(limit)))
        }
        ["intent"] => ctx.intent.map(StateValue::from),
        ["tool"] => ctx.tool.map(StateValue::from),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::condition::{evaluate_condition, Condition, EvalContext};
    use crate::ids::{ItemId, LockId, NpcId};
    use crate::value_objects::StateValue;
    use crate::world::{NpcState, WorldState};

    fn world() -> WorldState {
        let mut world = WorldState::blank();
        let mut brother = NpcState::new("alive");
        brother.stats.insert("affection".into(), 72);
        world.npcs.insert(NpcId::new("brother"), brother);
        world.npcs.insert(NpcId::new("stepmother"), NpcState::new("sleeping"));
        world.vars.insert("location".into(), StateValue::text("player_room"));
        world.vars.insert("humanity".into(), StateValue::Number(40));
        world.flags.insert("door_open".into(), StateValue::Bool(true));
        world.inventory.insert(ItemId::new("brass_key"));
        world.locks.insert(LockId::new("diary"), false);
        world.turn = 5;
        world
    }

    fn check(source: &str) -> bool {
        let world = world();
        let ctx = EvalContext::new(&world).with_turn_limit(Some(5));
        evaluate_condition(source, &ctx)
    }

    #[test]
    fn compares_stats_vars_and_flags() {
        assert!(check("npc.brother.affection >= 70"));
        assert!(check("vars.location == 'player_room'"));
        assert!(check("player.humanity < 50"));
        assert!(check("flags.door_open == true"));
        assert!(check("npc.stepmother.status == \"sleeping\""));
        assert!(!check("npc.brother.affection > 72"));
    }

    #[test]
    fn unset_flags_compare_equal_to_null() {
        assert!(check("flags.ending == null"));
        assert!(!check("flags.ending"));
    }

    #[test]
    fn unknown_identifiers_are_false() {
        assert!(!check("npc.ghost.affection >= 0"));
        assert!(!check("vars.missing != 3"));
        assert!(!check("npc.brother.courage < 100"));
        assert!(!check("weather == 'rain'"));
    }

    #[test]
    fn absurdly_nested_scenario_condition_is_just_false() {
        let source = format!("{}flags.door_open{}", "(".repeat(100_000), ")".repeat(100_000));
        let condition = Condition::new(source);
        assert!(condition.error().is_some());
        let world = world();
        assert!(!condition.evaluate(&EvalContext::new(&world)));
    }

    #[test]
    fn connectives_and_inventory() {
        assert!(check("has_item(brass_key) and not has_item(candle)"));
        assert!(check("has_item('candle') || system.turn == turn_limit"));
        assert!(check("!(locks.diary == true) && (turn >= 5)"));
    }

    #[test]
    fn mismatched_types_are_unequal() {
        assert!(!check("vars.humanity == '40'"));
        assert!(check("vars.humanity != '40'"));
        assert!(!check("vars.location > 3"));
    }

    #[test]
    fn intent_and_active_npc_come_from_context() {
        let world = world();
        let brother = NpcId::new("brother");
        let ctx = EvalContext::new(&world)
            .with_intent(Some("comfort"))
            .with_tool(Some("npc_talk"))
            .with_active_npc(Some(&brother));
        assert!(evaluate_condition(
            "intent == 'comfort' and tool == 'npc_talk' and npc.target.affection > 70",
            &ctx
        ));
        assert!(!evaluate_condition("intent == 'comfort'", &EvalContext::new(&world)));
    }

    #[test]
    fn malformed_conditions_evaluate_false() {
        let condition = Condition::new("vars.humanity >=");
        assert!(condition.error().is_some());
        let world = world();
        assert!(!condition.evaluate(&EvalContext::new(&world)));
    }

    #[test]
    fn empty_condition_always_holds() {
        let world = world();
        assert!(Condition::new("  ").evaluate(&EvalContext::new(&world)));
    }

    #[test]
    fn serializes_as_source_text() {
        let condition: Condition = serde_json::from_str("\"has_item(brass_key)\"").unwrap();
        assert!(condition.references_inventory());
        assert_eq!(
            serde_json::to_string(&condition).unwrap(),
            "\"has_item(brass_key)\""
        );
    }
}
