//! Procedural level layout: grass fields crossed by walkable corridors.

use std::collections::BTreeSet;

use rand::Rng;
use rat_game_core::{CellCoord, MapError, Tile, TileGrid, TileKind};

/// Rows between consecutive horizontal corridors.
const CORRIDOR_SPACING: usize = 3;

/// A generated grid plus the cells walkers may start on.
#[derive(Debug)]
pub(crate) struct Level {
    pub(crate) grid: TileGrid,
    pub(crate) open_cells: Vec<CellCoord>,
}

impl Level {
    pub(crate) fn is_open(&self, cell: CellCoord) -> bool {
        self.grid.tile(cell).is_some_and(Tile::is_traversable)
    }
}

/// Lays out horizontal corridors joined by random vertical connectors and
/// turns a share of the corridor tiles into tunnels.
pub(crate) fn generate<R: Rng>(rows: u32, columns: u32, rng: &mut R) -> Result<Level, MapError> {
    let last_row = rows.saturating_sub(1);
    let corridors: Vec<u32> = (0..rows)
        .step_by(CORRIDOR_SPACING)
        .map(|row| (row + 1).min(last_row))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let width = to_index(columns);
    let mut kinds = vec![TileKind::Grass; to_index(rows).saturating_mul(width)];
    let slot = |row: u32, column: u32| to_index(row) * width + to_index(column);

    for &row in &corridors {
        for column in 0..columns {
            kinds[slot(row, column)] = TileKind::Path;
        }
    }
    for pair in corridors.windows(2) {
        let connectors = if rng.gen_bool(0.5) { 2 } else { 1 };
        for _ in 0..connectors {
            let column = rng.gen_range(0..columns);
            for row in pair[0]..=pair[1] {
                kinds[slot(row, column)] = TileKind::Path;
            }
        }
    }
    for kind in &mut kinds {
        if *kind == TileKind::Path && rng.gen_ratio(1, 8) {
            *kind = TileKind::Tunnel;
        }
    }

    let mut tiles = Vec::with_capacity(kinds.len());
    let mut open_cells = Vec::new();
    for row in 0..rows {
        for column in 0..columns {
            let cell = CellCoord::new(row, column);
            let tile = Tile::of_kind(cell, kinds[slot(row, column)]);
            if tile.is_traversable() {
                open_cells.push(cell);
            }
            tiles.push(tile);
        }
    }

    Ok(Level {
        grid: TileGrid::from_tiles(rows, columns, tiles)?,
        open_cells,
    })
}

fn to_index(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
