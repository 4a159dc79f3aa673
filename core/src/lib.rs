#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the rat game simulation.
//!
//! This crate defines the vocabulary that connects the spatial map, the
//! entity registry, and the pure systems built on top of them. Tiles and
//! entity kinds are closed tag sets so that blacklists reduce to set
//! containment, and every recoverable failure is expressed as one of the
//! typed errors declared at the bottom of this file.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cardinal movement directions available to entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// Movement toward decreasing row indices.
    North,
    /// Movement toward increasing column indices.
    East,
    /// Movement toward increasing row indices.
    South,
    /// Movement toward decreasing column indices.
    West,
}

impl Direction {
    /// Every direction in clockwise order starting from north.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Order in which movement handlers evaluate neighbours unless configured otherwise.
    pub const DEFAULT_EVALUATION_ORDER: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::West,
        Direction::South,
    ];

    /// Direction pointing the opposite way.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::West => Self::East,
        }
    }

    /// Row and column deltas applied by a single step in this direction.
    #[must_use]
    pub const fn offset(self) -> (i64, i64) {
        match self {
            Self::North => (-1, 0),
            Self::East => (0, 1),
            Self::South => (1, 0),
            Self::West => (0, -1),
        }
    }

    /// Cell reached by stepping once from `cell` in this direction.
    ///
    /// Returns `None` when the step would leave the representable coordinate
    /// space. Grid bounds are the caller's concern.
    #[must_use]
    pub fn step(self, cell: CellCoord) -> Option<CellCoord> {
        match self {
            Self::North => cell
                .row()
                .checked_sub(1)
                .map(|row| CellCoord::new(row, cell.column())),
            Self::South => cell
                .row()
                .checked_add(1)
                .map(|row| CellCoord::new(row, cell.column())),
            Self::East => cell
                .column()
                .checked_add(1)
                .map(|column| CellCoord::new(cell.row(), column)),
            Self::West => cell
                .column()
                .checked_sub(1)
                .map(|column| CellCoord::new(cell.row(), column)),
        }
    }

    /// Derives the direction leading from `from` to an orthogonally adjacent `to`.
    #[must_use]
    pub fn between(from: CellCoord, to: CellCoord) -> Option<Self> {
        let column_diff = from.column().abs_diff(to.column());
        let row_diff = from.row().abs_diff(to.row());
        if column_diff + row_diff != 1 {
            return None;
        }

        if column_diff == 1 {
            if to.column() > from.column() {
                Some(Self::East)
            } else {
                Some(Self::West)
            }
        } else if to.row() > from.row() {
            Some(Self::South)
        } else {
            Some(Self::North)
        }
    }
}

/// Location of a single grid cell expressed as row and column indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    row: u32,
    column: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Computes the Manhattan distance between two cell coordinates.
    #[must_use]
    pub fn manhattan_distance(self, other: CellCoord) -> u32 {
        self.column().abs_diff(other.column()) + self.row().abs_diff(other.row())
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// Terrain variants a tile may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TileKind {
    /// Open lawn that walkers normally avoid.
    Grass,
    /// Walkable corridor.
    Path,
    /// Covered corridor; walkable but hides its occupants from above.
    Tunnel,
}

impl TileKind {
    /// Traversability a tile of this kind receives when none is given explicitly.
    #[must_use]
    pub const fn default_traversable(self) -> bool {
        match self {
            Self::Grass => false,
            Self::Path | Self::Tunnel => true,
        }
    }
}

/// Immutable description of a single grid tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    cell: CellCoord,
    kind: TileKind,
    traversable: bool,
}

impl Tile {
    /// Creates a tile with an explicit traversability flag.
    #[must_use]
    pub const fn new(cell: CellCoord, kind: TileKind, traversable: bool) -> Self {
        Self {
            cell,
            kind,
            traversable,
        }
    }

    /// Creates a tile whose traversability follows its kind.
    #[must_use]
    pub const fn of_kind(cell: CellCoord, kind: TileKind) -> Self {
        Self::new(cell, kind, kind.default_traversable())
    }

    /// Cell the tile covers.
    #[must_use]
    pub const fn cell(&self) -> CellCoord {
        self.cell
    }

    /// Terrain kind used for blacklist matching.
    #[must_use]
    pub const fn kind(&self) -> TileKind {
        self.kind
    }

    /// Reports whether walkers may stand on the tile.
    #[must_use]
    pub const fn is_traversable(&self) -> bool {
        self.traversable
    }
}

/// Rectangular, row-major layout of tiles supplied by the level loader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    rows: u32,
    columns: u32,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// Creates a grid where every tile has the same kind.
    #[must_use]
    pub fn uniform(rows: u32, columns: u32, kind: TileKind) -> Self {
        let mut tiles = Vec::with_capacity(cell_count(rows, columns));
        for row in 0..rows {
            for column in 0..columns {
                tiles.push(Tile::of_kind(CellCoord::new(row, column), kind));
            }
        }
        Self {
            rows,
            columns,
            tiles,
        }
    }

    /// Validates and wraps a row-major tile list.
    ///
    /// Every tile must sit in the slot that matches its own cell.
    pub fn from_tiles(rows: u32, columns: u32, tiles: Vec<Tile>) -> Result<Self, MapError> {
        let expected = cell_count(rows, columns);
        if tiles.len() != expected {
            return Err(MapError::MalformedGrid {
                expected,
                actual: tiles.len(),
            });
        }

        let grid = Self {
            rows,
            columns,
            tiles,
        };
        for (index, tile) in grid.tiles.iter().enumerate() {
            let slot = grid.cell_at(index);
            if tile.cell() != slot {
                return Err(MapError::MisplacedTile {
                    slot,
                    found: tile.cell(),
                });
            }
        }
        Ok(grid)
    }

    /// Replaces the tile stored at the provided tile's cell.
    pub fn with_tile(mut self, tile: Tile) -> Result<Self, MapError> {
        let index = self
            .index(tile.cell())
            .ok_or_else(|| MapError::out_of_bounds(tile.cell()))?;
        self.tiles[index] = tile;
        Ok(self)
    }

    /// Number of rows contained in the grid.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of columns contained in the grid.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Reports whether the cell lies inside the grid.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.row() < self.rows && cell.column() < self.columns
    }

    /// Tile covering the provided cell, if any.
    #[must_use]
    pub fn tile(&self, cell: CellCoord) -> Option<&Tile> {
        self.index(cell).and_then(|index| self.tiles.get(index))
    }

    /// All tiles in row-major order.
    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Consumes the grid, yielding its row-major tiles.
    #[must_use]
    pub fn into_tiles(self) -> Vec<Tile> {
        self.tiles
    }

    /// Row-major slot index of an in-bounds cell.
    #[must_use]
    pub fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        Some(row * width + column)
    }

    fn cell_at(&self, index: usize) -> CellCoord {
        let width = usize::try_from(self.columns).unwrap_or(usize::MAX).max(1);
        let row = u32::try_from(index / width).unwrap_or(u32::MAX);
        let column = u32::try_from(index % width).unwrap_or(u32::MAX);
        CellCoord::new(row, column)
    }
}

fn cell_count(rows: u32, columns: u32) -> usize {
    let count = u64::from(rows) * u64::from(columns);
    usize::try_from(count).unwrap_or(usize::MAX)
}

/// Unique identifier assigned to an entity at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kinds of entities that can inhabit the map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// Ordinary wandering rat.
    Rat,
    /// Predatory rat that other rats avoid.
    DeathRat,
    /// Stationary explosive.
    Bomb,
    /// Spreading gas cloud covering several tiles.
    Gas,
    /// Poisoned bait.
    Poison,
    /// Barrier that walkers refuse to enter.
    NoEntry,
    /// Sterilisation field.
    Sterilisation,
}

impl EntityKind {
    /// Reports whether the kind harms other entities sharing its tiles.
    #[must_use]
    pub const fn is_hazard(self) -> bool {
        matches!(
            self,
            Self::Bomb | Self::Gas | Self::Poison | Self::Sterilisation
        )
    }
}

/// Source of unique entity identifiers injected into entity construction.
pub trait IdGenerator: Send + Sync {
    /// Allocates the next identifier. Identifiers never repeat.
    fn next_id(&self) -> EntityId;
}

/// Monotonic identifier source backed by an atomic counter.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Creates a generator whose first identifier is zero.
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a generator whose first identifier is `first`.
    ///
    /// Save-file resume uses this to continue after the highest stored id.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> EntityId {
        EntityId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Failures reported by the spatial map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MapError {
    /// The entity has already been placed into the map.
    #[error("entity {0} is already placed")]
    AlreadyPlaced(EntityId),
    /// The entity is not registered with the map.
    #[error("entity {0} is not present in the map")]
    NotPresent(EntityId),
    /// A coordinate or traversal fell outside the grid.
    #[error("cell ({row}, {column}) lies outside the grid")]
    OutOfBounds {
        /// Row of the offending coordinate.
        row: i64,
        /// Column of the offending coordinate.
        column: i64,
    },
    /// The tile list does not cover the declared dimensions.
    #[error("tile grid expected {expected} tiles but received {actual}")]
    MalformedGrid {
        /// Number of tiles implied by the dimensions.
        expected: usize,
        /// Number of tiles supplied.
        actual: usize,
    },
    /// A tile was supplied in a slot that does not match its own cell.
    #[error("tile for cell {found} was supplied in slot {slot}")]
    MisplacedTile {
        /// Slot the tile occupied in the row-major list.
        slot: CellCoord,
        /// Cell the tile claims to cover.
        found: CellCoord,
    },
}

impl MapError {
    /// Builds an out-of-bounds error for an unsigned cell.
    #[must_use]
    pub fn out_of_bounds(cell: CellCoord) -> Self {
        Self::OutOfBounds {
            row: i64::from(cell.row()),
            column: i64::from(cell.column()),
        }
    }

    /// Builds an out-of-bounds error for a step leaving `cell` in `direction`.
    #[must_use]
    pub fn step_out_of_bounds(cell: CellCoord, direction: Direction) -> Self {
        let (row_delta, column_delta) = direction.offset();
        Self::OutOfBounds {
            row: i64::from(cell.row()) + row_delta,
            column: i64::from(cell.column()) + column_delta,
        }
    }
}

/// Failures reported by the entity registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A cursor is checked out, so the requested operation is forbidden.
    #[error("a traversal cursor is currently checked out")]
    ConcurrentAccess,
    /// There are no entities to traverse.
    #[error("the registry holds no entities")]
    EmptyRegistry,
    /// The cursor being released was not issued by the outstanding checkout.
    #[error("the released cursor was not issued by this registry's active lease")]
    OwnershipMismatch,
}

/// Failures reported by movement handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MovementError {
    /// A configuration value was rejected.
    #[error("invalid movement configuration: {0}")]
    Misconfiguration(&'static str),
    /// The spatial map rejected a query made during evaluation.
    #[error(transparent)]
    Map(#[from] MapError),
}
