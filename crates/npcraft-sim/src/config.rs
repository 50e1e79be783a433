//! Simulation configuration.
//!
//! Loaded from `npcraft.toml`. Missing or invalid files fall back to
//! defaults so the simulation always starts.

use npcraft_core::{NpcConfig, NpcraftError, NpcraftResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Configuration file name.
pub const CONFIG_FILE: &str = "npcraft.toml";

/// Simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // === Run ===
    /// Number of ticks to simulate
    pub ticks: u32,
    /// Simulated milliseconds per tick
    pub tick_millis: u64,
    /// RNG seed (None = random)
    pub seed: Option<u64>,

    // === World ===
    /// Highest solid y of the flat floor
    pub floor_y: i32,
    /// Number of patrolling NPCs
    pub npc_count: usize,
    /// Half-width of each NPC's square patrol
    pub patrol_radius: f64,
    /// Number of wandering players
    pub player_count: usize,

    // === Player behaviour (per tick probabilities) ===
    /// Chance a player toggles sneaking
    pub sneak_chance: f64,
    /// Chance a player swings their arm
    pub swing_chance: f64,
    /// Chance a player right-clicks a random NPC
    pub click_chance: f64,
    /// Chance a player hits a random NPC
    pub hit_chance: f64,

    /// Engine settings
    pub npc: NpcConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ticks: 1200,
            tick_millis: 50,
            seed: None,

            floor_y: 63,
            npc_count: 4,
            patrol_radius: 6.0,
            player_count: 3,

            sneak_chance: 0.02,
            swing_chance: 0.03,
            click_chance: 0.005,
            hit_chance: 0.005,

            npc: NpcConfig::default(),
        }
    }
}

impl SimConfig {
    /// Read, parse and validate a config file.
    pub fn read_from<P: AsRef<Path>>(path: P) -> NpcraftResult<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self =
            toml::from_str(&contents).map_err(|e| NpcraftError::Config(e.to_string()))?;
        config.validate();
        Ok(config)
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }

        match Self::read_from(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Ignoring {}: {e}", path.display());
                Self::default()
            },
        }
    }

    /// Write the resolved configuration, creating parent directories.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> NpcraftResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| NpcraftError::Config(e.to_string()))?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp values to usable ranges.
    pub fn validate(&mut self) {
        self.tick_millis = self.tick_millis.clamp(1, 1000);
        self.npc_count = self.npc_count.min(256);
        self.player_count = self.player_count.min(64);
        self.patrol_radius = self.patrol_radius.clamp(2.0, 64.0);

        for chance in [
            &mut self.sneak_chance,
            &mut self.swing_chance,
            &mut self.click_chance,
            &mut self.hit_chance,
        ] {
            *chance = chance.clamp(0.0, 1.0);
        }

        self.npc.validate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimConfig::load_from(dir.path().join(CONFIG_FILE));
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let mut config = SimConfig::default();
        config.ticks = 42;
        config.seed = Some(7);
        config.npc.motion.speed = 0.5;

        config.save_to(&path).unwrap();

        assert_eq!(SimConfig::load_from(&path), config);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "npc_count = 2\n\n[npc.proximity]\nevent_scan_interval = 20\n",
        )
        .unwrap();

        let config = SimConfig::load_from(&path);

        assert_eq!(config.npc_count, 2);
        assert_eq!(config.npc.proximity.event_scan_interval, 20);
        assert_eq!(config.npc.proximity.look_at_interval, 5);
        assert_eq!(config.ticks, SimConfig::default().ticks);
    }

    #[test]
    fn test_invalid_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "ticks = \"lots\"").unwrap();

        assert_eq!(SimConfig::load_from(&path), SimConfig::default());
    }

    #[test]
    fn test_read_errors_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = SimConfig::read_from(dir.path().join(CONFIG_FILE));
        assert!(matches!(missing, Err(NpcraftError::Io(_))));

        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[npc\n").unwrap();
        assert!(matches!(SimConfig::read_from(&path), Err(NpcraftError::Config(_))));
    }

    #[test]
    fn test_bad_engine_values_are_clamped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "[npc.pathfinding]\nlos_sample_step = 0.0\nfallback_step = -2.0\n\n\
             [npc.motion]\nspeed = -1.0\narrival_threshold = -0.5\n\n\
             [npc.proximity]\nlook_at_interval = 0\nevent_scan_interval = 0\n",
        )
        .unwrap();

        let config = SimConfig::load_from(&path);

        assert!(config.npc.pathfinding.los_sample_step > 0.0);
        assert!(config.npc.pathfinding.fallback_step > 0.0);
        assert!(config.npc.motion.speed > 0.0);
        assert_eq!(config.npc.motion.arrival_threshold, 0.0);
        assert_eq!(config.npc.proximity.look_at_interval, 1);
        assert_eq!(config.npc.proximity.event_scan_interval, 1);
    }

    #[test]
    fn test_validate_clamps_chances() {
        let mut config = SimConfig {
            swing_chance: 3.0,
            hit_chance: -1.0,
            patrol_radius: 0.5,
            ..SimConfig::default()
        };
        config.validate();
        assert_eq!(config.swing_chance, 1.0);
        assert_eq!(config.hit_chance, 0.0);
        assert_eq!(config.patrol_radius, 2.0);
    }
}
