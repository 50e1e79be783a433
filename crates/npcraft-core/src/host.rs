//! Narrow interfaces to the host game server.
//!
//! The engine never owns world or entity state. Everything it reads or writes
//! goes through these traits, implemented by the server integration (or by
//! [`crate::mock::MockHost`] in tests).

use npcraft_common::{AgentId, BlockPos, EntityHandle, Location, PlayerId, WorldId};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Coarse block classification needed for navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Block {
    /// Empty space
    #[default]
    Air,
    /// Full solid block
    Solid,
    /// Water or lava
    Liquid,
    /// Grass, flowers and other non-colliding plants
    Vegetation,
    /// Fences and walls (collide higher than one block)
    Fence,
    /// Solid but harmful to stand on (cactus, magma)
    Hazard,
}

impl Block {
    /// Check if an entity can occupy this cell.
    #[must_use]
    pub const fn is_passable(self) -> bool {
        matches!(self, Self::Air | Self::Liquid | Self::Vegetation)
    }

    /// Check if an entity can stand on top of this block.
    #[must_use]
    pub const fn is_standable(self) -> bool {
        matches!(self, Self::Solid)
    }
}

/// Read-only voxel queries.
pub trait VoxelWorld {
    /// Get the block at a cell.
    fn block_at(&self, world: WorldId, pos: BlockPos) -> Block;

    /// Check if a cell can be occupied.
    fn is_passable(&self, world: WorldId, pos: BlockPos) -> bool {
        self.block_at(world, pos).is_passable()
    }

    /// Check if a cell is solid ground that can be stood on.
    fn is_solid_ground(&self, world: WorldId, pos: BlockPos) -> bool {
        self.block_at(world, pos).is_standable()
    }
}

/// Hand used for an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hand {
    /// Main hand
    Main,
    /// Off hand
    Off,
}

/// Reported cause of damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageCause {
    /// Melee hit by an entity
    EntityAttack,
    /// Arrow or other projectile
    Projectile,
    /// Explosion
    Explosion,
    /// Anything else
    Other,
}

/// Player state observed by a scan or an interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    /// Player id
    pub id: PlayerId,
    /// Current location
    pub location: Location,
    /// Whether the player is sneaking
    pub sneaking: bool,
}

/// Entity read/write surface.
pub trait EntityHost {
    /// Check if a handle still refers to a live entity.
    fn is_valid(&self, handle: EntityHandle) -> bool;

    /// Search all loaded entities for one with this id.
    fn find_entity(&self, id: AgentId) -> Option<EntityHandle>;

    /// Get an entity's location.
    fn location(&self, handle: EntityHandle) -> Option<Location>;

    /// Move an entity. Returns false if the handle is stale.
    fn set_location(&self, handle: EntityHandle, location: &Location) -> bool;

    /// Players inside the box of half-extents `(rx, ry, rz)` around `center`.
    fn players_within(&self, center: &Location, rx: f64, ry: f64, rz: f64) -> Vec<PlayerSnapshot>;
}

/// Everything the engine needs from the host.
pub trait HostWorld: VoxelWorld + EntityHost + Send + Sync {}

impl<T: VoxelWorld + EntityHost + Send + Sync> HostWorld for T {}

/// Wall-clock source used for punch windows.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
