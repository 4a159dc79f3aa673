//! Shared entity handles.

use std::sync::{
    atomic::{AtomicI32, AtomicU64, Ordering},
    Arc,
};

use rat_game_core::{CellCoord, EntityId, EntityKind, IdGenerator};

/// Reference-counted handle through which the map, the registry, and
/// behaviours all observe the same entity.
pub type EntityHandle = Arc<Entity>;

/// Mobile actor living on the grid.
///
/// Identity and kind are fixed at construction. Position and health are
/// updated in place, so every holder of the handle observes changes without
/// the entity ever being copied.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    position: AtomicU64,
    health: AtomicI32,
}

impl Entity {
    /// Creates a new entity, drawing its identifier from `ids`.
    #[must_use]
    pub fn spawn(
        ids: &dyn IdGenerator,
        kind: EntityKind,
        cell: CellCoord,
        health: i32,
    ) -> EntityHandle {
        Self::with_id(ids.next_id(), kind, cell, health)
    }

    /// Recreates an entity with a known identifier, e.g. when resuming a save.
    #[must_use]
    pub fn with_id(id: EntityId, kind: EntityKind, cell: CellCoord, health: i32) -> EntityHandle {
        Arc::new(Self {
            id,
            kind,
            position: AtomicU64::new(pack(cell)),
            health: AtomicI32::new(health),
        })
    }

    /// Stable identifier assigned at creation.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Kind tag used for blacklist matching.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Cell the entity currently considers its origin.
    #[must_use]
    pub fn position(&self) -> CellCoord {
        unpack(self.position.load(Ordering::Acquire))
    }

    /// Overwrites the entity's position.
    ///
    /// The spatial map calls this when committing a move; callers that set it
    /// directly are responsible for keeping the map in step.
    pub fn set_position(&self, cell: CellCoord) {
        self.position.store(pack(cell), Ordering::Release);
    }

    /// Current health.
    #[must_use]
    pub fn health(&self) -> i32 {
        self.health.load(Ordering::Acquire)
    }

    /// Overwrites the current health.
    pub fn set_health(&self, health: i32) {
        self.health.store(health, Ordering::Release);
    }

    /// Subtracts `amount` from health, returning the remaining health.
    pub fn damage(&self, amount: i32) -> i32 {
        self.health.fetch_sub(amount, Ordering::AcqRel) - amount
    }

    /// Dead entities have no health left.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.health() <= 0
    }
}

fn pack(cell: CellCoord) -> u64 {
    (u64::from(cell.row()) << 32) | u64::from(cell.column())
}

fn unpack(packed: u64) -> CellCoord {
    let row = u32::try_from(packed >> 32).unwrap_or(u32::MAX);
    let column = u32::try_from(packed & u64::from(u32::MAX)).unwrap_or(u32::MAX);
    CellCoord::new(row, column)
}
