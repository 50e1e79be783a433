//! In-memory host for tests and headless simulation.

use ahash::AHashMap;
use npcraft_common::{AgentId, BlockPos, EntityHandle, Location, PlayerId, WorldId};
use parking_lot::{Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::host::{Block, Clock, EntityHost, PlayerSnapshot, VoxelWorld};

#[derive(Debug, Clone, Copy)]
struct MockEntity {
    id: AgentId,
    location: Location,
}

#[derive(Debug, Default)]
struct MockState {
    /// Highest solid y of the flat floor, per world
    floors: AHashMap<WorldId, i32>,
    /// Overrides on top of the floor
    blocks: AHashMap<(WorldId, BlockPos), Block>,
    entities: AHashMap<u64, MockEntity>,
    next_handle: u64,
    players: Vec<PlayerSnapshot>,
}

/// Mock world: flat floors, block overrides, entities and players.
#[derive(Debug, Default)]
pub struct MockHost {
    state: RwLock<MockState>,
}

impl MockHost {
    /// Create an empty host (every cell is air).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host whose `world` is solid at and below `floor_y`.
    #[must_use]
    pub fn flat(world: WorldId, floor_y: i32) -> Self {
        let host = Self::new();
        host.set_floor(world, floor_y);
        host
    }

    /// Make `world` solid at and below `floor_y`.
    pub fn set_floor(&self, world: WorldId, floor_y: i32) {
        self.state.write().floors.insert(world, floor_y);
    }

    /// Override a single block.
    pub fn set_block(&self, world: WorldId, pos: BlockPos, block: Block) {
        self.state.write().blocks.insert((world, pos), block);
    }

    /// Override every block in the inclusive box between two corners.
    pub fn fill(&self, world: WorldId, from: BlockPos, to: BlockPos, block: Block) {
        let mut state = self.state.write();
        for x in from.x.min(to.x)..=from.x.max(to.x) {
            for y in from.y.min(to.y)..=from.y.max(to.y) {
                for z in from.z.min(to.z)..=from.z.max(to.z) {
                    state.blocks.insert((world, BlockPos::new(x, y, z)), block);
                }
            }
        }
    }

    /// Spawn an entity and return its handle.
    pub fn spawn_entity(&self, id: AgentId, location: Location) -> EntityHandle {
        let mut state = self.state.write();
        state.next_handle += 1;
        let raw = state.next_handle;
        state.entities.insert(raw, MockEntity { id, location });
        EntityHandle::from_raw(raw)
    }

    /// Remove an entity. Its handle becomes invalid.
    pub fn despawn_entity(&self, handle: EntityHandle) -> bool {
        self.state.write().entities.remove(&handle.raw()).is_some()
    }

    /// Replace an entity's handle, keeping id and location.
    ///
    /// Simulates a chunk reload: the old handle goes stale while the entity
    /// can still be found by id.
    pub fn reload_entity(&self, handle: EntityHandle) -> Option<EntityHandle> {
        let mut state = self.state.write();
        let entity = state.entities.remove(&handle.raw())?;
        state.next_handle += 1;
        let raw = state.next_handle;
        state.entities.insert(raw, entity);
        Some(EntityHandle::from_raw(raw))
    }

    /// Add or replace a player.
    pub fn add_player(&self, id: PlayerId, location: Location) {
        let mut state = self.state.write();
        state.players.retain(|p| p.id != id);
        state.players.push(PlayerSnapshot {
            id,
            location,
            sneaking: false,
        });
    }

    /// Remove a player.
    pub fn remove_player(&self, id: PlayerId) {
        self.state.write().players.retain(|p| p.id != id);
    }

    /// Move a player.
    pub fn move_player(&self, id: PlayerId, location: Location) {
        if let Some(player) = self.state.write().players.iter_mut().find(|p| p.id == id) {
            player.location = location;
        }
    }

    /// Set a player's sneaking state.
    pub fn set_sneaking(&self, id: PlayerId, sneaking: bool) {
        if let Some(player) = self.state.write().players.iter_mut().find(|p| p.id == id) {
            player.sneaking = sneaking;
        }
    }

    /// Current snapshot of a player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<PlayerSnapshot> {
        self.state.read().players.iter().find(|p| p.id == id).copied()
    }
}

impl VoxelWorld for MockHost {
    fn block_at(&self, world: WorldId, pos: BlockPos) -> Block {
        let state = self.state.read();
        if let Some(block) = state.blocks.get(&(world, pos)) {
            return *block;
        }
        match state.floors.get(&world) {
            Some(&floor) if pos.y <= floor => Block::Solid,
            _ => Block::Air,
        }
    }
}

impl EntityHost for MockHost {
    fn is_valid(&self, handle: EntityHandle) -> bool {
        self.state.read().entities.contains_key(&handle.raw())
    }

    fn find_entity(&self, id: AgentId) -> Option<EntityHandle> {
        self.state
            .read()
            .entities
            .iter()
            .find(|(_, e)| e.id == id)
            .map(|(raw, _)| EntityHandle::from_raw(*raw))
    }

    fn location(&self, handle: EntityHandle) -> Option<Location> {
        self.state
            .read()
            .entities
            .get(&handle.raw())
            .map(|e| e.location)
    }

    fn set_location(&self, handle: EntityHandle, location: &Location) -> bool {
        match self.state.write().entities.get_mut(&handle.raw()) {
            Some(entity) => {
                entity.location = *location;
                true
            },
            None => false,
        }
    }

    fn players_within(&self, center: &Location, rx: f64, ry: f64, rz: f64) -> Vec<PlayerSnapshot> {
        self.state
            .read()
            .players
            .iter()
            .filter(|p| p.location.world == center.world)
            .filter(|p| {
                let d = p.location.pos - center.pos;
                d.x.abs() <= rx && d.y.abs() <= ry && d.z.abs() <= rz
            })
            .copied()
            .collect()
    }
}

/// Clock advanced by hand.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: WorldId = WorldId::new(3);

    #[test]
    fn test_floor_and_overrides() {
        let host = MockHost::flat(W, 63);
        assert_eq!(host.block_at(W, BlockPos::new(0, 63, 0)), Block::Solid);
        assert_eq!(host.block_at(W, BlockPos::new(0, 64, 0)), Block::Air);
        assert_eq!(host.block_at(WorldId::new(9), BlockPos::new(0, 0, 0)), Block::Air);

        host.set_block(W, BlockPos::new(0, 63, 0), Block::Liquid);
        assert!(host.is_passable(W, BlockPos::new(0, 63, 0)));
        assert!(!host.is_solid_ground(W, BlockPos::new(0, 63, 0)));
    }

    #[test]
    fn test_reload_invalidates_old_handle() {
        let host = MockHost::new();
        let id = AgentId::new();
        let handle = host.spawn_entity(id, Location::new(W, 0.0, 64.0, 0.0));

        let reloaded = host.reload_entity(handle);

        assert!(!host.is_valid(handle));
        assert_eq!(host.find_entity(id), reloaded);
    }

    #[test]
    fn test_players_within_is_a_box() {
        let host = MockHost::new();
        let near = PlayerId::new();
        let far = PlayerId::new();
        host.add_player(near, Location::new(W, 3.0, 64.0, 3.0));
        host.add_player(far, Location::new(W, 6.0, 64.0, 0.0));

        let found = host.players_within(&Location::new(W, 0.0, 64.0, 0.0), 5.0, 5.0, 5.0);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, near);
    }
}
