//! Per-tile occupant bookkeeping.

use std::{
    collections::BTreeSet,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use rat_game_core::{CellCoord, EntityId, Tile};

use crate::entity::EntityHandle;

/// One tile of the spatial map together with the entities standing on it.
///
/// Readers always receive copies of the occupant list, so a concurrent sweep
/// never tears a reader's view. Only [`crate::ContextualMap`] mutates nodes.
#[derive(Debug)]
pub struct OccupancyNode {
    tile: Tile,
    occupants: RwLock<Vec<EntityHandle>>,
}

impl OccupancyNode {
    pub(crate) fn new(tile: Tile) -> Self {
        Self {
            tile,
            occupants: RwLock::new(Vec::new()),
        }
    }

    /// Tile owned by the node.
    #[must_use]
    pub const fn tile(&self) -> &Tile {
        &self.tile
    }

    /// Cell covered by the node.
    #[must_use]
    pub const fn cell(&self) -> CellCoord {
        self.tile.cell()
    }

    /// Snapshot of the entities currently on the node, in arrival order.
    #[must_use]
    pub fn occupants(&self) -> Vec<EntityHandle> {
        self.read().clone()
    }

    /// Identifiers of the entities currently on the node.
    #[must_use]
    pub fn occupant_ids(&self) -> Vec<EntityId> {
        self.read().iter().map(|entity| entity.id()).collect()
    }

    /// Reports whether the entity is on the node.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.read().iter().any(|entity| entity.id() == id)
    }

    /// Number of entities on the node.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Reports whether the node is unoccupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub(crate) fn insert(&self, entity: &EntityHandle) {
        let mut occupants = self.write();
        if !occupants.iter().any(|existing| existing.id() == entity.id()) {
            occupants.push(Arc::clone(entity));
        }
    }

    pub(crate) fn remove(&self, id: EntityId) -> bool {
        let mut occupants = self.write();
        let before = occupants.len();
        occupants.retain(|entity| entity.id() != id);
        occupants.len() != before
    }

    pub(crate) fn remove_all(&self, ids: &BTreeSet<EntityId>) -> usize {
        let mut occupants = self.write();
        let before = occupants.len();
        occupants.retain(|entity| !ids.contains(&entity.id()));
        before - occupants.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<EntityHandle>> {
        self.occupants.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<EntityHandle>> {
        self.occupants.write().unwrap_or_else(PoisonError::into_inner)
    }
}
