//! Tunable parameters for pathfinding, motion and proximity scanning.
//!
//! All structs use `#[serde(default)]` so partial config files only need to
//! name the values they override.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pathfinder search limits and geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfinderConfig {
    /// Maximum number of node expansions before falling back
    pub max_iterations: usize,
    /// Nodes farther than this from the start cell are not explored
    pub max_search_radius: f64,
    /// Below this start/target distance the target is returned directly
    pub direct_path_distance: f64,
    /// A node this close to the goal cell counts as arrival
    pub goal_tolerance: f64,
    /// Highest step up between neighbouring cells
    pub max_jump_height: i32,
    /// Deepest step down between neighbouring cells
    pub max_drop_height: i32,
    /// Spacing of line-of-sight samples
    pub los_sample_step: f64,
    /// Step length of the straight-line fallback
    pub fallback_step: f64,
    /// Perpendicular offsets tried when the fallback hits an obstacle
    pub side_step_offsets: Vec<f64>,
    /// Upper bound on fallback samples
    pub max_fallback_steps: usize,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            max_search_radius: 50.0,
            direct_path_distance: 2.0,
            goal_tolerance: 1.5,
            max_jump_height: 1,
            max_drop_height: 3,
            los_sample_step: 0.5,
            fallback_step: 1.0,
            side_step_offsets: vec![2.0, 3.0],
            max_fallback_steps: 256,
        }
    }
}

impl PathfinderConfig {
    /// Clamp limits and step sizes to usable ranges.
    pub fn validate(&mut self) {
        self.max_iterations = self.max_iterations.clamp(1, 100_000);
        self.max_search_radius = self.max_search_radius.clamp(1.0, 256.0);
        self.direct_path_distance = self.direct_path_distance.clamp(0.0, 16.0);
        self.goal_tolerance = self.goal_tolerance.clamp(0.0, 8.0);
        self.max_jump_height = self.max_jump_height.clamp(0, 8);
        self.max_drop_height = self.max_drop_height.clamp(0, 32);

        // Zero or negative steps never advance along the segment.
        self.los_sample_step = self.los_sample_step.clamp(0.05, 2.0);
        self.fallback_step = self.fallback_step.clamp(0.1, 4.0);
        self.side_step_offsets.retain(|offset| offset.is_finite() && *offset > 0.0);
        self.max_fallback_steps = self.max_fallback_steps.clamp(1, 4096);
    }
}

/// Per-tick motion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Distance moved per tick
    pub speed: f64,
    /// Distance at which a target counts as reached
    pub arrival_threshold: f64,
    /// Ticks between motion steps
    pub tick_interval: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed: 0.25,
            arrival_threshold: 1.5,
            tick_interval: 1,
        }
    }
}

impl MotionConfig {
    /// Clamp speed, threshold and cadence to usable ranges.
    pub fn validate(&mut self) {
        self.speed = self.speed.clamp(0.01, 4.0);
        self.arrival_threshold = self.arrival_threshold.clamp(0.0, 16.0);
        self.tick_interval = self.tick_interval.max(1);
    }
}

/// Proximity scan cadence and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Ticks between look-at scans
    pub look_at_interval: u32,
    /// Ticks between event-detection scans
    pub event_scan_interval: u32,
    /// Proximity range given to new NPCs
    pub default_range: f64,
    /// Players farther than this are never looked at
    pub max_look_distance: f64,
    /// A swing younger than this counts as a punch (milliseconds)
    pub punch_window_ms: u64,
    /// Swing records older than this are purged (milliseconds)
    pub punch_retention_ms: u64,
    /// Damage at or below this from a player is treated as a left click
    pub left_click_damage_threshold: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            look_at_interval: 5,
            event_scan_interval: 10,
            default_range: 5.0,
            max_look_distance: 64.0,
            punch_window_ms: 500,
            punch_retention_ms: 1000,
            left_click_damage_threshold: 1.0,
        }
    }
}

impl ProximityConfig {
    /// Clamp intervals, ranges and windows to usable ranges.
    pub fn validate(&mut self) {
        self.look_at_interval = self.look_at_interval.max(1);
        self.event_scan_interval = self.event_scan_interval.max(1);
        self.default_range = self.default_range.clamp(0.0, 128.0);
        self.max_look_distance = self.max_look_distance.clamp(0.0, 256.0);
        self.punch_retention_ms = self.punch_retention_ms.max(self.punch_window_ms);
        self.left_click_damage_threshold = self.left_click_damage_threshold.max(0.0);
    }

    /// Punch window as a duration.
    #[must_use]
    pub const fn punch_window(&self) -> Duration {
        Duration::from_millis(self.punch_window_ms)
    }

    /// Punch record retention as a duration.
    #[must_use]
    pub const fn punch_retention(&self) -> Duration {
        Duration::from_millis(self.punch_retention_ms)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcConfig {
    /// Pathfinder settings
    pub pathfinding: PathfinderConfig,
    /// Motion settings
    pub motion: MotionConfig,
    /// Proximity engine settings
    pub proximity: ProximityConfig,
}

impl NpcConfig {
    /// Validate every section.
    pub fn validate(&mut self) {
        self.pathfinding.validate();
        self.motion.validate();
        self.proximity.validate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_survive_validation() {
        let mut config = NpcConfig::default();
        config.validate();
        assert_eq!(config, NpcConfig::default());
    }

    #[test]
    fn test_validate_rejects_stalling_values() {
        let mut config = NpcConfig::default();
        config.pathfinding.los_sample_step = 0.0;
        config.pathfinding.fallback_step = -1.0;
        config.pathfinding.side_step_offsets = vec![-2.0, 0.0, 3.0];
        config.pathfinding.max_iterations = 0;
        config.motion.speed = -0.25;
        config.motion.arrival_threshold = -1.0;
        config.motion.tick_interval = 0;
        config.proximity.look_at_interval = 0;
        config.proximity.event_scan_interval = 0;
        config.proximity.punch_retention_ms = 100;

        config.validate();

        assert!(config.pathfinding.los_sample_step > 0.0);
        assert!(config.pathfinding.fallback_step > 0.0);
        assert_eq!(config.pathfinding.side_step_offsets, vec![3.0]);
        assert_eq!(config.pathfinding.max_iterations, 1);
        assert!(config.motion.speed > 0.0);
        assert_eq!(config.motion.arrival_threshold, 0.0);
        assert_eq!(config.motion.tick_interval, 1);
        assert_eq!(config.proximity.look_at_interval, 1);
        assert_eq!(config.proximity.event_scan_interval, 1);
        assert_eq!(config.proximity.punch_retention_ms, 500);
    }
}
