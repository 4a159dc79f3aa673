#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Drives one simulation step at a time over the shared map and registry.
//!
//! A tick flushes deferred spawns, leases the registry cursor to visit every
//! entity exactly once, lets each entity's [`Behavior`] act, then reaps the
//! dead from both the map and the registry.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use rat_game_core::{EntityId, EntityKind, MapError, MovementError, RegistryError, TileKind};
use rat_game_system_movement::{MoveOutcome, MovementHandler};
use rat_game_system_spawning::{SpawnError, SpawnQueue, SpawnReport};
use rat_game_world::{ContextualMap, EntityHandle, EntityRegistry};
use thiserror::Error;
use tracing::{debug, info, trace};

/// Failures that abort a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TickError {
    /// Deferred spawns could not be applied.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// The registry refused the lease or the reap.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// A wandering entity could not evaluate its move.
    #[error(transparent)]
    Movement(#[from] MovementError),
    /// The map rejected an update.
    #[error(transparent)]
    Map(#[from] MapError),
}

/// What an entity does when the tick visits it.
#[derive(Debug)]
pub enum Behavior {
    /// Wanders the map, moving whenever the proposed step is unblocked.
    Wander(MovementHandler),
    /// Stays put and damages every non-hazard co-occupant, decaying as it acts.
    Hazard {
        /// Health removed from each victim per tick.
        damage: i32,
    },
    /// Does nothing.
    Inert,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Moved,
    Blocked,
    Stayed,
    Struck(usize),
    Idle,
}

impl Behavior {
    fn act(&mut self, entity: &EntityHandle, map: &ContextualMap) -> Result<Action, TickError> {
        match self {
            Self::Wander(handler) => match handler.evaluate(map)? {
                MoveOutcome::Stay => Ok(Action::Stayed),
                MoveOutcome::Proposed(proposal) => {
                    if handler.commit(map, &proposal)? {
                        Ok(Action::Moved)
                    } else {
                        trace!(
                            entity = %entity.id(),
                            to = %proposal.to().cell(),
                            blockers = proposal.blocking().len(),
                            "move blocked"
                        );
                        Ok(Action::Blocked)
                    }
                }
            },
            Self::Hazard { damage } => {
                let mut victims = BTreeSet::new();
                for node in map.occupied_nodes_of(entity)? {
                    for occupant in node.occupants() {
                        if occupant.kind().is_hazard() || occupant.is_dead() {
                            continue;
                        }
                        if victims.insert(occupant.id()) {
                            let remaining = occupant.damage(*damage);
                            trace!(
                                hazard = %entity.id(),
                                victim = %occupant.id(),
                                remaining,
                                "hazard hit"
                            );
                        }
                    }
                }
                let _ = entity.damage(1);
                Ok(Action::Struck(victims.len()))
            }
            Self::Inert => Ok(Action::Idle),
        }
    }
}

/// Parameters used to pick a behaviour for entities without an explicit one.
#[derive(Clone, Debug)]
pub struct BehaviorRules {
    /// Base seed mixed with each entity id to seed its movement handler.
    pub seed: u64,
    /// Damage dealt by hazards to each co-occupant per tick.
    pub hazard_damage: i32,
    /// Tiles wandering entities refuse to enter.
    pub tile_blacklist: Vec<TileKind>,
    /// Entities whose presence blocks a wandering entity's destination.
    pub entity_blacklist: Vec<EntityKind>,
}

impl Default for BehaviorRules {
    fn default() -> Self {
        Self {
            seed: 0,
            hazard_damage: 1,
            tile_blacklist: vec![TileKind::Grass],
            entity_blacklist: vec![EntityKind::NoEntry],
        }
    }
}

impl BehaviorRules {
    /// Chooses the default behaviour for `entity` based on its kind.
    #[must_use]
    pub fn behavior_for(&self, entity: &EntityHandle) -> Behavior {
        match entity.kind() {
            EntityKind::Rat | EntityKind::DeathRat => {
                let seed = self
                    .seed
                    .wrapping_add(entity.id().get().wrapping_mul(0x9e37_79b9_7f4a_7c15));
                Behavior::Wander(
                    MovementHandler::new(Arc::clone(entity), seed)
                        .with_tile_blacklist(self.tile_blacklist.iter().copied())
                        .with_entity_blacklist(self.entity_blacklist.iter().copied()),
                )
            }
            kind if kind.is_hazard() => Behavior::Hazard {
                damage: self.hazard_damage,
            },
            _ => Behavior::Inert,
        }
    }
}

/// Summary of a single tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// One-based tick number.
    pub tick: u64,
    /// Entities that joined during the spawn flush.
    pub spawned: usize,
    /// Spawn requests dropped because their placement was invalid.
    pub rejected: usize,
    /// Entities visited by the cursor.
    pub visited: usize,
    /// Wanderers that changed cell.
    pub moved: usize,
    /// Wanderers whose destination was blocked.
    pub blocked: usize,
    /// Wanderers with no traversable neighbour.
    pub stayed: usize,
    /// Victims damaged by hazards.
    pub hits: usize,
    /// Entities removed at the end of the tick.
    pub reaped: Vec<EntityId>,
    /// Registered entities after reaping.
    pub population: usize,
}

/// Owns per-entity behaviours and advances the shared world one tick at a time.
#[derive(Debug)]
pub struct TickDriver {
    map: Arc<ContextualMap>,
    registry: Arc<EntityRegistry>,
    spawns: Arc<SpawnQueue>,
    rules: BehaviorRules,
    behaviors: BTreeMap<EntityId, Behavior>,
    /// Spawns flushed by a tick that then failed to lease the registry.
    unreported: SpawnReport,
    tick: u64,
}

impl TickDriver {
    /// Creates a driver over the shared simulation state.
    #[must_use]
    pub fn new(
        map: Arc<ContextualMap>,
        registry: Arc<EntityRegistry>,
        spawns: Arc<SpawnQueue>,
        rules: BehaviorRules,
    ) -> Self {
        Self {
            map,
            registry,
            spawns,
            rules,
            behaviors: BTreeMap::new(),
            unreported: SpawnReport::default(),
            tick: 0,
        }
    }

    /// Overrides the behaviour of one entity.
    pub fn assign(&mut self, id: EntityId, behavior: Behavior) {
        let _ = self.behaviors.insert(id, behavior);
    }

    /// Behaviour currently bound to the entity, if it has been visited or assigned.
    #[must_use]
    pub fn behavior(&self, id: EntityId) -> Option<&Behavior> {
        self.behaviors.get(&id)
    }

    /// Shared spatial map.
    #[must_use]
    pub fn map(&self) -> &Arc<ContextualMap> {
        &self.map
    }

    /// Shared entity registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Shared queue of deferred spawns.
    #[must_use]
    pub fn spawns(&self) -> &Arc<SpawnQueue> {
        &self.spawns
    }

    /// Number of ticks completed so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.tick
    }

    /// Advances the simulation by one tick.
    pub fn tick(&mut self) -> Result<TickReport, TickError> {
        let fresh = self.spawns.flush(&self.registry, &self.map)?;
        let mut flushed = std::mem::take(&mut self.unreported);
        flushed.spawned.extend(fresh.spawned);
        flushed.rejected.extend(fresh.rejected);

        let lease = match self.registry.lease() {
            Ok(lease) => Some(lease),
            Err(RegistryError::EmptyRegistry) => None,
            Err(error) => {
                self.unreported = flushed;
                return Err(error.into());
            }
        };

        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            spawned: flushed.spawned.len(),
            rejected: flushed.rejected.len(),
            ..TickReport::default()
        };

        if let Some(lease) = { lease } {
            for entity in lease {
                report.visited += 1;
                if entity.is_dead() || !self.map.contains(entity.id()) {
                    continue;
                }
                let rules = &self.rules;
                let behavior = self
                    .behaviors
                    .entry(entity.id())
                    .or_insert_with(|| rules.behavior_for(&entity));
                match behavior.act(&entity, &self.map)? {
                    Action::Moved => report.moved += 1,
                    Action::Blocked => report.blocked += 1,
                    Action::Stayed => report.stayed += 1,
                    Action::Struck(hits) => report.hits += hits,
                    Action::Idle => {}
                }
            }
        } else {
            debug!(tick = self.tick, "nothing to visit");
        }

        report.reaped = self.reap()?;
        report.population = self.registry.size();
        info!(
            tick = report.tick,
            spawned = report.spawned,
            moved = report.moved,
            blocked = report.blocked,
            stayed = report.stayed,
            hits = report.hits,
            reaped = report.reaped.len(),
            population = report.population,
            "tick complete"
        );
        Ok(report)
    }

    fn reap(&mut self) -> Result<Vec<EntityId>, TickError> {
        let mut reaped: BTreeSet<EntityId> = self
            .map
            .collect_dead()
            .iter()
            .map(|entity| entity.id())
            .collect();
        reaped.extend(
            self.registry
                .entities()
                .iter()
                .filter(|entity| entity.is_dead())
                .map(|entity| entity.id()),
        );
        let reaped: Vec<EntityId> = reaped.into_iter().collect();
        if reaped.is_empty() {
            return Ok(reaped);
        }

        let removed = self.registry.remove_entities(&reaped)?;
        for id in &reaped {
            let _ = self.behaviors.remove(id);
        }
        debug!(removed, "reaped dead entities");
        Ok(reaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rat_game_core::{CellCoord, SequentialIds, TileGrid};
    use rat_game_world::Entity;

    #[test]
    fn rules_assign_behaviour_by_kind() {
        let ids = SequentialIds::new();
        let rules = BehaviorRules::default();
        let cell = CellCoord::new(0, 0);

        let rat = Entity::spawn(&ids, EntityKind::Rat, cell, 1);
        let gas = Entity::spawn(&ids, EntityKind::Gas, cell, 1);
        let sign = Entity::spawn(&ids, EntityKind::NoEntry, cell, 1);

        assert!(matches!(rules.behavior_for(&rat), Behavior::Wander(_)));
        assert!(matches!(rules.behavior_for(&gas), Behavior::Hazard { damage: 1 }));
        assert!(matches!(rules.behavior_for(&sign), Behavior::Inert));
    }

    #[test]
    fn hazard_hits_each_victim_once_across_its_cells() {
        let ids = SequentialIds::new();
        let map = ContextualMap::new(TileGrid::uniform(1, 2, TileKind::Path));
        let gas = Entity::spawn(&ids, EntityKind::Gas, CellCoord::new(0, 0), 3);
        let rat = Entity::spawn(&ids, EntityKind::Rat, CellCoord::new(0, 0), 5);
        map.restore(&gas, &[CellCoord::new(0, 1)]).expect("placed");
        map.restore(&rat, &[CellCoord::new(0, 1)]).expect("placed");

        let action = Behavior::Hazard { damage: 2 }.act(&gas, &map).expect("acted");
        assert_eq!(action, Action::Struck(1));
        assert_eq!(rat.health(), 3);
        assert_eq!(gas.health(), 2);
    }
}
