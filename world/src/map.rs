//! Spatial map tracking which entities occupy which tiles.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use rat_game_core::{CellCoord, Direction, EntityId, MapError, Tile, TileGrid};
use tracing::{debug, trace};

use crate::{
    entity::EntityHandle,
    node::OccupancyNode,
    snapshot::{EntityRecord, OccupancySnapshot},
};

/// Grid of occupancy nodes plus a reverse index from entity to occupied cells.
///
/// Every operation takes `&self`, so the map is shared between the tick
/// driver, movement evaluation, and renderers through an `Arc`. The reverse
/// index lock is always taken before any node lock.
#[derive(Debug)]
pub struct ContextualMap {
    rows: u32,
    columns: u32,
    nodes: Vec<OccupancyNode>,
    index: RwLock<BTreeMap<EntityId, Registration>>,
}

#[derive(Debug)]
struct Registration {
    entity: EntityHandle,
    cells: Vec<CellCoord>,
}

impl ContextualMap {
    /// Builds one node per tile of the provided grid.
    #[must_use]
    pub fn new(grid: TileGrid) -> Self {
        let rows = grid.rows();
        let columns = grid.columns();
        let nodes = grid.into_tiles().into_iter().map(OccupancyNode::new).collect();
        Self {
            rows,
            columns,
            nodes,
            index: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of rows in the grid.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of columns in the grid.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Reports whether the cell lies inside the grid.
    #[must_use]
    pub const fn in_bounds(&self, cell: CellCoord) -> bool {
        cell.row() < self.rows && cell.column() < self.columns
    }

    /// Node covering the provided cell.
    pub fn node(&self, cell: CellCoord) -> Result<&OccupancyNode, MapError> {
        self.node_index(cell)
            .and_then(|index| self.nodes.get(index))
            .ok_or_else(|| MapError::out_of_bounds(cell))
    }

    /// Tile covering the provided cell.
    pub fn tile(&self, cell: CellCoord) -> Result<&Tile, MapError> {
        self.node(cell).map(OccupancyNode::tile)
    }

    /// All nodes in row-major order.
    pub fn nodes(&self) -> impl Iterator<Item = &OccupancyNode> {
        self.nodes.iter()
    }

    /// Reports whether the entity is registered with the map.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.read_index().contains_key(&id)
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_index().len()
    }

    /// Reports whether no entity is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_index().is_empty()
    }

    /// Handles of every registered entity ordered by identifier.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityHandle> {
        self.read_index()
            .values()
            .map(|registration| Arc::clone(&registration.entity))
            .collect()
    }

    /// Registers the entity at the node matching its current position.
    pub fn place(&self, entity: &EntityHandle) -> Result<(), MapError> {
        let mut index = self.write_index();
        if index.contains_key(&entity.id()) {
            return Err(MapError::AlreadyPlaced(entity.id()));
        }

        let origin = entity.position();
        let node = self.node(origin)?;
        node.insert(entity);
        let _ = index.insert(
            entity.id(),
            Registration {
                entity: Arc::clone(entity),
                cells: vec![origin],
            },
        );
        debug!(entity = %entity.id(), kind = ?entity.kind(), cell = %origin, "placed entity");
        Ok(())
    }

    /// Detaches the entity from every node it occupies and registers it
    /// solely at `target`, updating its position to match.
    ///
    /// Legality of the move is the movement handler's concern; only
    /// structural consistency is enforced here.
    pub fn move_to(&self, entity: &EntityHandle, target: &OccupancyNode) -> Result<(), MapError> {
        let mut index = self.write_index();
        let registration = index
            .get_mut(&entity.id())
            .ok_or(MapError::NotPresent(entity.id()))?;
        let destination = target.cell();
        let node = self.node(destination)?;

        for previous in registration.cells.drain(..) {
            if let Ok(previous) = self.node(previous) {
                let _ = previous.remove(entity.id());
            }
        }
        node.insert(&registration.entity);
        registration.cells.push(destination);
        registration.entity.set_position(destination);
        trace!(entity = %entity.id(), cell = %destination, "moved entity");
        Ok(())
    }

    /// Adds `node` to the entity's occupied nodes without leaving any other.
    pub fn occupy(&self, entity: &EntityHandle, node: &OccupancyNode) -> Result<(), MapError> {
        self.occupy_many(entity, [node])
    }

    /// Adds every node to the entity's occupied nodes.
    ///
    /// All nodes are validated before any is modified.
    pub fn occupy_many<'n, I>(&self, entity: &EntityHandle, nodes: I) -> Result<(), MapError>
    where
        I: IntoIterator<Item = &'n OccupancyNode>,
    {
        let cells: Vec<CellCoord> = nodes.into_iter().map(OccupancyNode::cell).collect();
        let mut index = self.write_index();
        let registration = index
            .get_mut(&entity.id())
            .ok_or(MapError::NotPresent(entity.id()))?;

        let own_nodes = cells
            .iter()
            .map(|cell| self.node(*cell))
            .collect::<Result<Vec<_>, _>>()?;

        for node in own_nodes {
            if registration.cells.contains(&node.cell()) {
                continue;
            }
            node.insert(&registration.entity);
            registration.cells.push(node.cell());
        }
        trace!(entity = %entity.id(), occupied = registration.cells.len(), "extended occupation");
        Ok(())
    }

    /// Node matching the entity's current position.
    pub fn origin_of(&self, entity: &EntityHandle) -> Result<&OccupancyNode, MapError> {
        self.node(entity.position())
    }

    /// Every node the entity occupies, in the order they were acquired.
    pub fn occupied_nodes_of(
        &self,
        entity: &EntityHandle,
    ) -> Result<Vec<&OccupancyNode>, MapError> {
        let index = self.read_index();
        let registration = index
            .get(&entity.id())
            .ok_or(MapError::NotPresent(entity.id()))?;
        registration
            .cells
            .iter()
            .map(|cell| self.node(*cell))
            .collect()
    }

    /// Reports whether a step from `from` in `direction` stays on the grid.
    #[must_use]
    pub fn can_traverse(&self, direction: Direction, from: &OccupancyNode) -> bool {
        direction
            .step(from.cell())
            .map_or(false, |cell| self.in_bounds(cell))
    }

    /// Neighbour reached by a step from `from` in `direction`.
    pub fn traverse(
        &self,
        direction: Direction,
        from: &OccupancyNode,
    ) -> Result<&OccupancyNode, MapError> {
        direction
            .step(from.cell())
            .and_then(|cell| self.node(cell).ok())
            .ok_or_else(|| MapError::step_out_of_bounds(from.cell(), direction))
    }

    /// Removes every dead entity from the nodes and the reverse index,
    /// returning the reaped handles.
    ///
    /// The dead set is fixed before the sweep starts, so an entity dying
    /// mid-sweep is reaped on the next call rather than half-removed.
    pub fn collect_dead(&self) -> Vec<EntityHandle> {
        let mut index = self.write_index();
        let dead: BTreeSet<EntityId> = index
            .values()
            .filter(|registration| registration.entity.is_dead())
            .map(|registration| registration.entity.id())
            .collect();
        if dead.is_empty() {
            return Vec::new();
        }

        let mut detached = 0;
        for node in &self.nodes {
            detached += node.remove_all(&dead);
        }

        let reaped: Vec<EntityHandle> = dead
            .iter()
            .filter_map(|id| index.remove(id))
            .map(|registration| registration.entity)
            .collect();
        debug!(reaped = reaped.len(), detached, "collected dead entities");
        reaped
    }

    /// Places the entity and extends it over `cells`, as when resuming a save.
    ///
    /// Cells are validated before the entity is placed.
    pub fn restore(&self, entity: &EntityHandle, cells: &[CellCoord]) -> Result<(), MapError> {
        let nodes = cells
            .iter()
            .map(|cell| self.node(*cell))
            .collect::<Result<Vec<_>, _>>()?;
        self.place(entity)?;
        self.occupy_many(entity, nodes)
    }

    /// Captures the registered entities and their occupied cells.
    #[must_use]
    pub fn snapshot(&self) -> OccupancySnapshot {
        let index = self.read_index();
        let entities = index
            .values()
            .map(|registration| EntityRecord {
                id: registration.entity.id(),
                kind: registration.entity.kind(),
                health: registration.entity.health(),
                position: registration.entity.position(),
                cells: registration.cells.clone(),
            })
            .collect();
        OccupancySnapshot {
            rows: self.rows,
            columns: self.columns,
            entities,
        }
    }

    fn node_index(&self, cell: CellCoord) -> Option<usize> {
        if !self.in_bounds(cell) {
            return None;
        }
        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        Some(row * width + column)
    }

    fn read_index(&self) -> RwLockReadGuard<'_, BTreeMap<EntityId, Registration>> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, BTreeMap<EntityId, Registration>> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }
}
