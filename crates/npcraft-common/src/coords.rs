//! Coordinate types for block cells and entity locations.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::ids::WorldId;

/// Integer block coordinate in a voxel world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    /// X coordinate
    pub x: i32,
    /// Y coordinate (height)
    pub y: i32,
    /// Z coordinate
    pub z: i32,
}

impl BlockPos {
    /// Creates a new block coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the block containing a continuous position.
    #[must_use]
    pub fn containing(pos: DVec3) -> Self {
        Self {
            x: pos.x.floor() as i32,
            y: pos.y.floor() as i32,
            z: pos.z.floor() as i32,
        }
    }

    /// Returns this coordinate shifted by the given deltas.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Cell directly above.
    #[must_use]
    pub const fn above(self) -> Self {
        self.offset(0, 1, 0)
    }

    /// Cell directly below.
    #[must_use]
    pub const fn below(self) -> Self {
        self.offset(0, -1, 0)
    }

    /// Standing point of the cell: horizontal centre, feet at the cell floor.
    #[must_use]
    pub fn center(self) -> DVec3 {
        DVec3::new(
            f64::from(self.x) + 0.5,
            f64::from(self.y),
            f64::from(self.z) + 0.5,
        )
    }

    /// Euclidean distance between two cells.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        let dz = f64::from(self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Position and orientation of an entity in a specific world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// World the location belongs to
    pub world: WorldId,
    /// Continuous position (feet)
    pub pos: DVec3,
    /// Yaw in degrees (0 = facing +Z, 90 = facing -X)
    pub yaw: f32,
    /// Pitch in degrees (negative = looking up)
    pub pitch: f32,
}

impl Location {
    /// Creates a location with zero orientation.
    #[must_use]
    pub const fn new(world: WorldId, x: f64, y: f64, z: f64) -> Self {
        Self {
            world,
            pos: DVec3::new(x, y, z),
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    /// Creates a location from a vector with zero orientation.
    #[must_use]
    pub const fn at(world: WorldId, pos: DVec3) -> Self {
        Self {
            world,
            pos,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    /// Returns a copy with the given orientation.
    #[must_use]
    pub const fn with_rotation(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    /// Returns a copy moved to another position, keeping world and orientation.
    #[must_use]
    pub const fn with_pos(mut self, pos: DVec3) -> Self {
        self.pos = pos;
        self
    }

    /// Returns true if both locations are in the same world.
    #[must_use]
    pub fn same_world(&self, other: &Self) -> bool {
        self.world == other.world
    }

    /// Euclidean distance, or infinity across worlds.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        if self.same_world(other) {
            self.pos.distance(other.pos)
        } else {
            f64::INFINITY
        }
    }

    /// Block containing this location.
    #[must_use]
    pub fn block(&self) -> BlockPos {
        BlockPos::containing(self.pos)
    }
}

/// Yaw in degrees for facing along a horizontal direction.
///
/// Uses the Minecraft convention: 0 faces +Z, 90 faces -X.
#[must_use]
pub fn yaw_towards(dx: f64, dz: f64) -> f32 {
    (-dx).atan2(dz).to_degrees() as f32
}

/// Pitch in degrees for looking along a direction, clamped to [-90, 90].
#[must_use]
pub fn pitch_towards(dx: f64, dy: f64, dz: f64) -> f32 {
    let horizontal = (dx * dx + dz * dz).sqrt();
    (-(dy.atan2(horizontal)).to_degrees()).clamp(-90.0, 90.0) as f32
}
