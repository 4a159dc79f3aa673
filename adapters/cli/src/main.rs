#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a headless rat-game simulation.
//!
//! The simulation ticks on a background thread while a spawner thread keeps
//! submitting rats, which exercises the deferred spawn path. Per-tick
//! summaries go to stderr and the final occupancy snapshot is printed to
//! stdout as JSON.

mod config;
mod level;

use std::{
    path::PathBuf,
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rat_game_core::{CellCoord, Direction, EntityKind, SequentialIds};
use rat_game_system_spawning::{SpawnQueue, SpawnRequest};
use rat_game_system_tick::{BehaviorRules, TickDriver, TickReport};
use rat_game_world::{ContextualMap, Entity, EntityRegistry, OccupancySnapshot};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{config::SimulationConfig, level::Level};

/// Ticks a gas cloud survives before it dissipates.
const GAS_LIFETIME: i32 = 12;

#[derive(Parser, Debug)]
#[command(name = "rat-game", version, about = "Run a headless rat-game simulation")]
struct Args {
    /// TOML file with simulation parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to simulate
    #[arg(long)]
    ticks: Option<u64>,

    /// Seed for level generation, placement and movement
    #[arg(long)]
    seed: Option<u64>,

    /// Rats placed before the first tick
    #[arg(long)]
    rats: Option<usize>,

    /// Grid rows
    #[arg(long)]
    rows: Option<u32>,

    /// Grid columns
    #[arg(long)]
    columns: Option<u32>,
}

impl Args {
    fn resolve(&self) -> Result<SimulationConfig> {
        let mut config = self
            .config
            .as_deref()
            .map(SimulationConfig::load_from_path)
            .unwrap_or_default();
        if let Some(ticks) = self.ticks {
            config.ticks = ticks;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(rats) = self.rats {
            config.rats = rats;
        }
        if let Some(rows) = self.rows {
            config.rows = rows;
        }
        if let Some(columns) = self.columns {
            config.columns = columns;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Entry point for the rat-game command-line interface.
fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let config = Args::parse().resolve().context("invalid simulation parameters")?;
    info!(?config, "starting simulation");
    let snapshot = run(&config)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("failed to encode snapshot")?
    );
    Ok(())
}

fn run(config: &SimulationConfig) -> Result<OccupancySnapshot> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let level = level::generate(config.rows, config.columns, &mut rng)
        .context("failed to generate level")?;
    info!(open = level.open_cells.len(), "generated level");

    let ids = SequentialIds::new();
    let spawns = Arc::new(SpawnQueue::new());
    for &cell in level.open_cells.choose_multiple(&mut rng, config.rats) {
        spawns.request(SpawnRequest::new(Entity::spawn(
            &ids,
            EntityKind::Rat,
            cell,
            config.rat_health,
        )));
    }
    if let Some(&centre) = level.open_cells.choose(&mut rng) {
        spawns.request(gas_cloud(&level, &ids, centre));
    }
    let late_cells: Vec<CellCoord> = level
        .open_cells
        .choose_multiple(&mut rng, config.late_spawns)
        .copied()
        .collect();

    let map = Arc::new(ContextualMap::new(level.grid));
    let rules = BehaviorRules {
        seed: config.seed,
        hazard_damage: config.gas_damage,
        ..BehaviorRules::default()
    };
    let mut driver = TickDriver::new(
        Arc::clone(&map),
        Arc::new(EntityRegistry::with_seed(config.seed)),
        Arc::clone(&spawns),
        rules,
    );
    let interval = Duration::from_millis(config.tick_interval_ms);
    let ticks = config.ticks;
    let (reports, received) = mpsc::channel::<TickReport>();

    thread::scope(|scope| -> Result<()> {
        let spawner = scope.spawn(|| {
            for cell in late_cells {
                thread::sleep(interval);
                let rat = Entity::spawn(&ids, EntityKind::Rat, cell, config.rat_health);
                spawns.request(SpawnRequest::new(rat));
            }
        });
        let ticker = scope.spawn(move || {
            for _ in 0..ticks {
                let report = driver.tick()?;
                if reports.send(report).is_err() {
                    break;
                }
                thread::sleep(interval);
            }
            Ok::<_, rat_game_system_tick::TickError>(driver.ticks())
        });

        for report in received {
            eprintln!("{}", summary(&report));
        }

        let completed = ticker
            .join()
            .map_err(|_| anyhow!("tick thread panicked"))?
            .context("tick failed")?;
        spawner
            .join()
            .map_err(|_| anyhow!("spawner thread panicked"))?;
        info!(completed, pending = spawns.len(), "simulation finished");
        Ok(())
    })?;

    Ok(map.snapshot())
}

/// Gas covering `centre` and its open neighbours.
fn gas_cloud(level: &Level, ids: &SequentialIds, centre: CellCoord) -> SpawnRequest {
    let extra = Direction::ALL
        .into_iter()
        .filter_map(|direction| direction.step(centre))
        .filter(|cell| level.is_open(*cell))
        .collect();
    SpawnRequest::covering(
        Entity::spawn(ids, EntityKind::Gas, centre, GAS_LIFETIME),
        extra,
    )
}

fn summary(report: &TickReport) -> String {
    format!(
        "tick {:>4}  spawned {:>2}  moved {:>3}  blocked {:>3}  stayed {:>3}  hits {:>3}  \
         reaped {:>2}  population {:>3}",
        report.tick,
        report.spawned,
        report.moved,
        report.blocked,
        report.stayed,
        report.hits,
        report.reaped.len(),
        report.population,
    )
}
