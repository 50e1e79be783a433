//! # npcraft Sim
//!
//! Headless simulation of patrolling NPCs and wandering players, driven by
//! the npcraft engine against an in-memory world.
//!
//! Usage: `npcraft-sim [config.toml] [--write-config]` (defaults to
//! `npcraft.toml`). `--write-config` writes the resolved, clamped settings
//! back to the file before running.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod config;
mod sim;

use anyhow::Result;
use npcraft_core::NpcEventKind;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{SimConfig, CONFIG_FILE};
use crate::sim::Simulation;

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("npcraft=info".parse()?))
        .init();

    info!("npcraft simulation starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut path = PathBuf::from(CONFIG_FILE);
    let mut write_config = false;
    for arg in std::env::args().skip(1) {
        if arg == "--write-config" {
            write_config = true;
        } else {
            path = PathBuf::from(arg);
        }
    }

    let config = SimConfig::load_from(&path);
    if write_config {
        config.save_to(&path)?;
    }

    let report = Simulation::new(config)?.run();

    info!(
        "Simulated {} ticks with {} NPCs, {} patrol cycles",
        report.ticks,
        report.npcs,
        report.count(NpcEventKind::PatrolCycleComplete)
    );
    for (kind, count) in report.events.iter().filter(|(_, n)| *n > 0) {
        info!("  {:?}: {}", kind, count);
    }
    info!("npcraft simulation complete");
    Ok(())
}
