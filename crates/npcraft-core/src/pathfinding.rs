//! A* pathfinding over the voxel grid.
//!
//! Cells are block coordinates. A cell is walkable when the feet and head
//! cells are passable and the cell below is standable ground. Neighbours are
//! the 26 surrounding cells, limited by the jump and drop heights.
//!
//! The Euclidean heuristic is admissible but not consistent with vertical
//! diagonal moves, so paths are best-effort rather than optimal. Raw paths
//! are simplified by skipping waypoints with a clear line of sight, and a
//! straight-line march is used when the search runs out of budget.

use ahash::{AHashMap, AHashSet};
use glam::DVec3;
use npcraft_common::{BlockPos, Location, WorldId};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, trace};

use crate::config::PathfinderConfig;
use crate::host::VoxelWorld;

/// Search node. Identity is the cell coordinate only.
#[derive(Debug, Clone, Copy)]
struct PathNode {
    pos: BlockPos,
    g: f64,
    h: f64,
    parent: Option<usize>,
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.pos == other.pos
    }
}

impl Eq for PathNode {}

impl std::hash::Hash for PathNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.pos.hash(state);
    }
}

/// Open-set entry ordered for a min-heap on (f, h, coordinate).
#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f: f64,
    h: f64,
    pos: BlockPos,
    node: usize,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap pops the greatest entry.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.pos.cmp(&self.pos))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

/// Offsets of the 26 cells surrounding a cell.
fn neighbor_offsets() -> impl Iterator<Item = (i32, i32, i32)> {
    (-1..=1).flat_map(|dx| {
        (-1..=1).flat_map(move |dy| {
            (-1..=1)
                .filter(move |&dz| dx != 0 || dy != 0 || dz != 0)
                .map(move |dz| (dx, dy, dz))
        })
    })
}

/// Grid pathfinder.
#[derive(Debug, Clone, Default)]
pub struct Pathfinder {
    config: PathfinderConfig,
}

impl Pathfinder {
    /// Creates a pathfinder with the given limits.
    #[must_use]
    pub fn new(config: PathfinderConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &PathfinderConfig {
        &self.config
    }

    /// Computes waypoints from `start` to `target`.
    ///
    /// Returns an empty list when the locations are in different worlds and a
    /// single waypoint when they are already close. When the search exhausts
    /// its budget the straight-line fallback is returned instead, which may
    /// clip minor obstacles.
    pub fn find_path<W: VoxelWorld + ?Sized>(
        &self,
        world: &W,
        start: &Location,
        target: &Location,
    ) -> Vec<Location> {
        if !start.same_world(target) {
            debug!(
                "No path across worlds {:?} -> {:?}",
                start.world, target.world
            );
            return Vec::new();
        }

        if start.distance(target) < self.config.direct_path_distance {
            return vec![*target];
        }

        match self.search(world, start, target) {
            Some(raw) => {
                let simplified = self.simplify(world, start, raw);
                trace!("Simplified path to {} waypoints", simplified.len());
                simplified
            },
            None => self.find_simplified_path(world, start, target),
        }
    }

    /// Runs A* and returns the raw waypoint list, or `None` when exhausted.
    fn search<W: VoxelWorld + ?Sized>(
        &self,
        world: &W,
        start: &Location,
        target: &Location,
    ) -> Option<Vec<Location>> {
        let world_id = start.world;
        let start_cell = start.block();
        let goal = target.block();

        let mut nodes = vec![PathNode {
            pos: start_cell,
            g: 0.0,
            h: start_cell.distance(goal),
            parent: None,
        }];
        let mut open = BinaryHeap::new();
        open.push(OpenEntry {
            f: nodes[0].h,
            h: nodes[0].h,
            pos: start_cell,
            node: 0,
        });
        let mut best_g: AHashMap<BlockPos, f64> = AHashMap::new();
        best_g.insert(start_cell, 0.0);
        let mut closed: AHashSet<BlockPos> = AHashSet::new();
        let mut expanded = 0usize;

        while let Some(entry) = open.pop() {
            // Stale entry for a cell already expanded with a lower cost.
            if !closed.insert(entry.pos) {
                continue;
            }

            let current = nodes[entry.node];
            if current.pos == goal || current.pos.distance(goal) <= self.config.goal_tolerance {
                trace!(
                    "Path found after {} expansions ({} nodes)",
                    expanded,
                    nodes.len()
                );
                return Some(Self::reconstruct(
                    &nodes,
                    entry.node,
                    world_id,
                    target,
                    current.pos == goal,
                ));
            }

            expanded += 1;
            if expanded > self.config.max_iterations {
                break;
            }

            for (dx, dy, dz) in neighbor_offsets() {
                let next = current.pos.offset(dx, dy, dz);
                if closed.contains(&next) {
                    continue;
                }
                if next.distance(start_cell) > self.config.max_search_radius {
                    continue;
                }
                if !self.is_walkable(world, world_id, current.pos, next) {
                    continue;
                }

                let g = current.g + current.pos.distance(next);
                if best_g.get(&next).is_some_and(|&known| known <= g) {
                    continue;
                }
                best_g.insert(next, g);

                let h = next.distance(goal);
                nodes.push(PathNode {
                    pos: next,
                    g,
                    h,
                    parent: Some(entry.node),
                });
                open.push(OpenEntry {
                    f: g + h,
                    h,
                    pos: next,
                    node: nodes.len() - 1,
                });
            }
        }

        debug!(
            "Search from {} to {} exhausted after {} expansions, using fallback",
            start_cell, goal, expanded
        );
        None
    }

    /// Walks parent links back to the start and converts cells to waypoints.
    fn reconstruct(
        nodes: &[PathNode],
        end: usize,
        world: WorldId,
        target: &Location,
        reached_goal: bool,
    ) -> Vec<Location> {
        let mut cells = Vec::new();
        let mut cursor = Some(end);
        while let Some(index) = cursor {
            cells.push(nodes[index].pos);
            cursor = nodes[index].parent;
        }
        cells.reverse();

        let mut waypoints: Vec<Location> = cells
            .iter()
            .skip(1)
            .map(|cell| Location::at(world, cell.center()))
            .collect();

        match waypoints.last_mut() {
            Some(last) if reached_goal => *last = *target,
            _ => waypoints.push(*target),
        }
        waypoints
    }

    /// Drops waypoints that can be skipped with a clear line of sight.
    fn simplify<W: VoxelWorld + ?Sized>(
        &self,
        world: &W,
        start: &Location,
        waypoints: Vec<Location>,
    ) -> Vec<Location> {
        if waypoints.len() <= 1 {
            return waypoints;
        }

        let mut result = Vec::with_capacity(waypoints.len());
        let mut from = start.pos;
        let mut next = 0;
        while next < waypoints.len() {
            let farthest = (next + 1..waypoints.len())
                .rev()
                .find(|&j| self.has_line_of_sight(world, start.world, from, waypoints[j].pos))
                .unwrap_or(next);
            result.push(waypoints[farthest]);
            from = waypoints[farthest].pos;
            next = farthest + 1;
        }
        result
    }

    /// Straight-line march toward the target with side-steps around obstacles.
    ///
    /// Used when the A* search fails. The result may walk into minor
    /// obstacles: when no side-step is possible the current position and the
    /// raw target are appended and marching stops.
    pub fn find_simplified_path<W: VoxelWorld + ?Sized>(
        &self,
        world: &W,
        start: &Location,
        target: &Location,
    ) -> Vec<Location> {
        let world_id = start.world;
        let step = self.config.fallback_step;
        let mut path = Vec::new();
        let mut current = start.pos;
        let mut samples = 0usize;

        loop {
            let to_target = target.pos - current;
            let horizontal = DVec3::new(to_target.x, 0.0, to_target.z);
            if horizontal.length() <= step || samples >= self.config.max_fallback_steps {
                path.push(*target);
                break;
            }
            samples += 1;

            let dir = horizontal.normalize_or_zero();
            let probe = current + dir * step;
            if let Some(pos) = self.snap_to_ground(world, world_id, probe) {
                current = pos;
                path.push(Location::at(world_id, current));
                continue;
            }

            let perpendicular = DVec3::new(-dir.z, 0.0, dir.x);
            let side_step = self
                .config
                .side_step_offsets
                .iter()
                .flat_map(|&offset| [offset, -offset])
                .find_map(|offset| {
                    self.snap_to_ground(world, world_id, current + perpendicular * offset)
                });

            if let Some(pos) = side_step {
                current = pos;
                path.push(Location::at(world_id, current));
            } else {
                path.push(Location::at(world_id, current));
                path.push(*target);
                break;
            }
        }

        debug!(
            "Fallback path with {} waypoints after {} samples",
            path.len(),
            samples
        );
        path
    }

    /// Moves a point vertically onto the nearest standable cell in the
    /// jump/drop window, preferring the current height.
    fn snap_to_ground<W: VoxelWorld + ?Sized>(
        &self,
        world: &W,
        world_id: WorldId,
        point: DVec3,
    ) -> Option<DVec3> {
        let cell = BlockPos::containing(point);
        let rises = 1..=self.config.max_jump_height;
        let drops = (1..=self.config.max_drop_height).map(|d| -d);
        std::iter::once(0)
            .chain(rises)
            .chain(drops)
            .map(|dy| cell.offset(0, dy, 0))
            .find(|&candidate| self.is_standable(world, world_id, candidate))
            .map(|found| DVec3::new(point.x, f64::from(found.y), point.z))
    }

    /// Check if an entity can stand in `cell`.
    pub fn is_standable<W: VoxelWorld + ?Sized>(
        &self,
        world: &W,
        world_id: WorldId,
        cell: BlockPos,
    ) -> bool {
        world.is_passable(world_id, cell)
            && world.is_passable(world_id, cell.above())
            && world.is_solid_ground(world_id, cell.below())
    }

    /// Check if an entity can move from `from` into the neighbouring `to`.
    pub fn is_walkable<W: VoxelWorld + ?Sized>(
        &self,
        world: &W,
        world_id: WorldId,
        from: BlockPos,
        to: BlockPos,
    ) -> bool {
        let dy = to.y - from.y;
        if dy > self.config.max_jump_height || dy < -self.config.max_drop_height {
            return false;
        }
        self.is_standable(world, world_id, to)
    }

    /// Check that feet and head cells are passable along a segment.
    pub fn has_line_of_sight<W: VoxelWorld + ?Sized>(
        &self,
        world: &W,
        world_id: WorldId,
        from: DVec3,
        to: DVec3,
    ) -> bool {
        let delta = to - from;
        let length = delta.length();
        if length < f64::EPSILON {
            return true;
        }

        let samples = (length / self.config.los_sample_step).ceil() as usize;
        (1..=samples).all(|i| {
            let t = (i as f64 * self.config.los_sample_step / length).min(1.0);
            let feet = BlockPos::containing(from + delta * t);
            world.is_passable(world_id, feet) && world.is_passable(world_id, feet.above())
        })
    }

    /// Check if a one-block obstacle directly ahead has to be jumped.
    ///
    /// True when the cell ahead at feet level is standable ground while the
    /// two cells above it and the head-room above the agent are clear.
    pub fn needs_jump<W: VoxelWorld + ?Sized>(
        &self,
        world: &W,
        position: &Location,
        target: &Location,
    ) -> bool {
        if !position.same_world(target) {
            return false;
        }

        let delta = target.pos - position.pos;
        let dir = DVec3::new(delta.x, 0.0, delta.z).normalize_or_zero();
        if dir == DVec3::ZERO {
            return false;
        }

        let world_id = position.world;
        let ahead = BlockPos::containing(position.pos + dir);
        let overhead = position.block().above().above();
        world.is_solid_ground(world_id, ahead)
            && world.is_passable(world_id, ahead.above())
            && world.is_passable(world_id, ahead.above().above())
            && world.is_passable(world_id, overhead)
    }
}
