use dollhouse_domain::{
    AcquireMethod, EvalContext, ItemDefinition, ItemId, ScenarioAssets, StateDelta, WorldState,
};

/// Flag recording that an item was acquired once, so a consumed item is not handed back by
/// the next scan while its condition still holds.
pub fn acquired_flag(item_id: &ItemId) -> String {
    format!("acquired_{}", item_id)
}

#[derive(Debug, Clone, Default)]
pub struct Acquisition {
    pub items: Vec<ItemId>,
    pub delta: StateDelta,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PickupRefusal {
    #[error("There is no {0} here.")]
    UnknownItem(String),
    #[error("You already have the {0}.")]
    AlreadyHeld(String),
    #[error("The {0} cannot simply be picked up.")]
    NotPickable(String),
    #[error("You cannot reach the {0} from here.")]
    ConditionUnmet(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ItemAcquirer;

impl ItemAcquirer {
    pub fn new() -> Self {
        Self
    }

    /// Items with an `auto` acquisition whose condition is newly satisfied.
    pub fn scan(&self, world: &WorldState, assets: &ScenarioAssets) -> Acquisition {
        let ctx = EvalContext::for_scenario(world, assets);
        let mut acquisition = Acquisition::default();

        for item in &assets.items {
            let Some(acquire) = &item.acquire else {
                continue;
            };
            if acquire.method != AcquireMethod::Auto || !self.is_new(item, world) {
                continue;
            }
            if acquire.condition.evaluate(&ctx) {
                tracing::info!(item_id = %item.item_id, "Item acquired");
                self.grant(item, &mut acquisition.delta);
                acquisition.items.push(item.item_id.clone());
            }
        }

        acquisition
    }

    /// Explicit pickup of `item_id` by the player.
    pub fn pick_up(
        &self,
        item_id: &str,
        world: &WorldState,
        assets: &ScenarioAssets,
    ) -> Result<StateDelta, PickupRefusal> {
        let item = assets
            .item(item_id)
            .ok_or_else(|| PickupRefusal::UnknownItem(item_id.replace('_', " ")))?;
        if !self.is_new(item, world) {
            return Err(PickupRefusal::AlreadyHeld(item.name.clone()));
        }
        let acquire = item
            .acquire
            .as_ref()
            .filter(|a| a.method != AcquireMethod::Reward)
            .ok_or_else(|| PickupRefusal::NotPickable(item.name.clone()))?;
        if !acquire
            .condition
            .evaluate(&EvalContext::for_scenario(world, assets))
        {
            return Err(PickupRefusal::ConditionUnmet(item.name.clone()));
        }

        let mut delta = StateDelta::new();
        self.grant(item, &mut delta);
        Ok(delta)
    }

    fn is_new(&self, item: &ItemDefinition, world: &WorldState) -> bool {
        !world.has_item(item.item_id.as_str())
            && !world
                .flag(&acquired_flag(&item.item_id))
                .is_some_and(|v| v.is_truthy())
    }

    fn grant(&self, item: &ItemDefinition, delta: &mut StateDelta) {
        delta.add_item(item.item_id.clone());
        delta.set_flag(acquired_flag(&item.item_id), true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{attic, attic_world};
    use dollhouse_domain::{apply, StateValue};

    #[test]
    fn pick_up_respects_acquire_condition() {
        let assets = attic();
        let mut world = attic_world();
        let acquirer = ItemAcquirer::new();

        let delta = acquirer.pick_up("brass_key", &world, &assets).unwrap();
        assert!(delta.inventory_add.contains("brass_key"));

        world
            .vars
            .insert("location".to_string(), StateValue::text("kitchen"));
        assert_eq!(
            acquirer.pick_up("brass_key", &world, &assets),
            Err(PickupRefusal::ConditionUnmet("Brass key".to_string()))
        );
        assert_eq!(
            acquirer.pick_up("crowbar", &world, &assets),
            Err(PickupRefusal::UnknownItem("crowbar".to_string()))
        );
    }

    #[test]
    fn manual_pickup_of_auto_item_still_checks_condition() {
        let assets = attic();
        let world = attic_world();
        assert_eq!(
            ItemAcquirer::new().pick_up("music_box", &world, &assets),
            Err(PickupRefusal::ConditionUnmet("Music box".to_string()))
        );
    }

    #[test]
    fn scan_grants_auto_items_once() {
        let assets = attic();
        let mut world = attic_world();
        let acquirer = ItemAcquirer::new();
        assert!(acquirer.scan(&world, &assets).items.is_empty());

        if let Some(brother) = world.npcs.get_mut("brother") {
            brother.stats.insert("affection".to_string(), 85);
        }
        let acquisition = acquirer.scan(&world, &assets);
        assert_eq!(acquisition.items, vec![ItemId::new("music_box")]);

        let mut world = apply(&world, &acquisition.delta, &assets).unwrap().state;
        assert!(world.has_item("music_box"));
        assert!(acquirer.scan(&world, &assets).items.is_empty());

        // Given away: still not re-acquired while the condition holds.
        world.inventory.clear();
        assert!(acquirer.scan(&world, &assets).items.is_empty());
    }
}
