//! Serializable occupancy records handed to the persistence layer.

use rat_game_core::{CellCoord, EntityId, EntityKind};
use serde::{Deserialize, Serialize};

/// Registered entities and their occupied cells at one instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancySnapshot {
    /// Number of rows in the captured grid.
    pub rows: u32,
    /// Number of columns in the captured grid.
    pub columns: u32,
    /// One record per registered entity, ordered by identifier.
    pub entities: Vec<EntityRecord>,
}

impl OccupancySnapshot {
    /// Highest identifier present, used to seed an id generator on resume.
    #[must_use]
    pub fn highest_id(&self) -> Option<EntityId> {
        self.entities.iter().map(|record| record.id).max()
    }
}

/// State of a single entity inside an [`OccupancySnapshot`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Identifier of the entity.
    pub id: EntityId,
    /// Kind of the entity.
    pub kind: EntityKind,
    /// Health at capture time.
    pub health: i32,
    /// Origin cell at capture time.
    pub position: CellCoord,
    /// Occupied cells in acquisition order; the origin comes first after a move.
    pub cells: Vec<CellCoord>,
}
