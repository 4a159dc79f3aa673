//! Simulation parameters loaded from TOML and overridden by flags.

use std::{fs, io::ErrorKind, path::Path};

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Largest grid, in tiles, a run may allocate.
const MAX_TILES: u64 = 4_000_000;

/// Tunables for a headless simulation run.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub(crate) struct SimulationConfig {
    pub(crate) rows: u32,
    pub(crate) columns: u32,
    pub(crate) ticks: u64,
    pub(crate) seed: u64,
    /// Rats placed before the first tick.
    pub(crate) rats: usize,
    pub(crate) rat_health: i32,
    /// Health removed from each rat standing in the gas cloud per tick.
    pub(crate) gas_damage: i32,
    /// Pause between ticks; zero runs flat out.
    pub(crate) tick_interval_ms: u64,
    /// Rats submitted by the spawner thread while the simulation runs.
    pub(crate) late_spawns: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rows: 13,
            columns: 20,
            ticks: 30,
            seed: 0x7a75_0f0a,
            rats: 8,
            rat_health: 6,
            gas_damage: 2,
            tick_interval_ms: 0,
            late_spawns: 4,
        }
    }
}

impl SimulationConfig {
    /// Loads configuration from `path`, falling back to defaults on errors.
    pub(crate) fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<SimulationConfig>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("Config not found at {}. Using defaults", path.display());
                Self::default()
            }
            Err(err) => {
                warn!("Failed to read {}: {err}. Using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Rejects parameters the simulation cannot run with.
    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(
            self.rows > 0 && self.columns > 0,
            "grid must have at least one row and one column, got {}x{}",
            self.rows,
            self.columns
        );
        let tiles = u64::from(self.rows) * u64::from(self.columns);
        ensure!(
            tiles <= MAX_TILES,
            "grid of {}x{} exceeds the {MAX_TILES} tile limit",
            self.rows,
            self.columns
        );
        ensure!(self.rat_health > 0, "rat_health must be positive");
        ensure!(self.gas_damage >= 0, "gas_damage must not be negative");
        Ok(())
    }
}
