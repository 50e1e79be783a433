//! Per-NPC motion state machine.
//!
//! The controller is pure: it owns targets, queues and pause flags, and
//! [`MotionController::step`] turns the NPC's current location into the next
//! location plus any patrol events. Reading and writing the host entity is the
//! caller's job.

use npcraft_common::{yaw_towards, AgentId, Location};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::MotionConfig;

/// Reasons a motion command did not take effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MotionError {
    /// Waypoint list was empty
    #[error("No waypoints given")]
    EmptyWaypoints,

    /// Command requires an active walk
    #[error("NPC is not walking")]
    NotWalking,

    /// Command requires an active patrol
    #[error("NPC is not patrolling")]
    NotPatrolling,

    /// Already paused
    #[error("Already paused")]
    AlreadyPaused,

    /// Not paused
    #[error("Not paused")]
    NotPaused,

    /// The host entity could not be resolved
    #[error("Entity for NPC {0} is gone")]
    EntityGone(AgentId),

    /// Target is in a different world than the NPC
    #[error("Target is in another world")]
    CrossWorld,
}

/// Result type for motion commands.
pub type MotionResult<T> = Result<T, MotionError>;

/// Top-level motion mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MotionState {
    /// Not moving
    #[default]
    Idle,
    /// Walking to a single target
    WalkingToPoint,
    /// Walking a queue of waypoints once
    WalkingPath,
    /// Walking a waypoint loop repeatedly
    Patrolling,
}

/// Event produced by a motion step.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionEvent {
    /// A patrol waypoint was reached
    PointReached {
        /// The waypoint
        location: Location,
        /// Its index in the patrol loop
        index: usize,
    },
    /// The patrol loop was completed and refilled
    CycleComplete {
        /// Completed cycles so far
        cycle: u32,
    },
}

/// Outcome of one motion step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionStep {
    /// New location to write to the entity, if it moved
    pub moved_to: Option<Location>,
    /// Patrol events raised this step
    pub events: Vec<MotionEvent>,
    /// Motion reached a terminal state this step
    pub finished: bool,
}

/// Motion state machine for one NPC.
#[derive(Debug, Clone)]
pub struct MotionController {
    config: MotionConfig,
    state: MotionState,
    target: Option<Location>,
    queue: VecDeque<Location>,
    patrol_loop: Vec<Location>,
    paused: bool,
    patrol_paused: bool,
    cycles: u32,
}

impl Default for MotionController {
    fn default() -> Self {
        Self::new(MotionConfig::default())
    }
}

impl MotionController {
    /// Create an idle controller.
    #[must_use]
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            state: MotionState::Idle,
            target: None,
            queue: VecDeque::new(),
            patrol_loop: Vec::new(),
            paused: false,
            patrol_paused: false,
            cycles: 0,
        }
    }

    /// Motion settings.
    #[must_use]
    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Current mode.
    #[must_use]
    pub const fn state(&self) -> MotionState {
        self.state
    }

    /// Check if any walk or patrol is active.
    #[must_use]
    pub fn is_walking(&self) -> bool {
        self.state != MotionState::Idle
    }

    /// Check if a patrol is active.
    #[must_use]
    pub fn is_patrolling(&self) -> bool {
        self.state == MotionState::Patrolling
    }

    /// Check if walking is paused.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Check if patrolling is paused.
    #[must_use]
    pub const fn is_patrol_paused(&self) -> bool {
        self.patrol_paused
    }

    /// Current target.
    #[must_use]
    pub const fn target(&self) -> Option<&Location> {
        self.target.as_ref()
    }

    /// Waypoints queued after the current target.
    pub fn queued(&self) -> impl Iterator<Item = &Location> {
        self.queue.iter()
    }

    /// Stored patrol loop (empty unless patrolling).
    #[must_use]
    pub fn patrol_loop(&self) -> &[Location] {
        &self.patrol_loop
    }

    /// Completed patrol cycles.
    #[must_use]
    pub const fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Walk to a single location, replacing any walk or patrol.
    pub fn walk_to(&mut self, location: Location) {
        self.end_patrol();
        self.queue.clear();
        self.target = Some(location);
        self.state = MotionState::WalkingToPoint;
        self.paused = false;
        self.patrol_paused = false;
        debug!("Walking to {:?}", location.pos);
    }

    /// Walk a list of waypoints once.
    pub fn walk_path(&mut self, locations: Vec<Location>) -> MotionResult<()> {
        if locations.is_empty() {
            return Err(MotionError::EmptyWaypoints);
        }
        self.end_patrol();
        self.queue = locations.into();
        self.target = self.queue.pop_front();
        self.state = MotionState::WalkingPath;
        self.paused = false;
        self.patrol_paused = false;
        debug!("Walking path of {} waypoints", self.queue.len() + 1);
        Ok(())
    }

    /// Patrol a waypoint loop until stopped.
    pub fn start_patrolling(&mut self, locations: Vec<Location>) -> MotionResult<()> {
        if locations.is_empty() {
            return Err(MotionError::EmptyWaypoints);
        }
        self.stop();
        self.queue = locations.iter().copied().collect();
        self.patrol_loop = locations;
        self.target = self.queue.pop_front();
        self.state = MotionState::Patrolling;
        debug!("Patrolling {} waypoints", self.patrol_loop.len());
        Ok(())
    }

    /// Pause the active walk.
    pub fn pause_walking(&mut self) -> MotionResult<()> {
        if !self.is_walking() {
            return Err(MotionError::NotWalking);
        }
        if self.paused {
            return Err(MotionError::AlreadyPaused);
        }
        self.paused = true;
        Ok(())
    }

    /// Resume a paused walk.
    pub fn resume_walking(&mut self) -> MotionResult<()> {
        if !self.is_walking() {
            return Err(MotionError::NotWalking);
        }
        if !self.paused {
            return Err(MotionError::NotPaused);
        }
        self.paused = false;
        Ok(())
    }

    /// Pause the active patrol.
    pub fn pause_patrolling(&mut self) -> MotionResult<()> {
        if !self.is_patrolling() {
            return Err(MotionError::NotPatrolling);
        }
        if self.patrol_paused {
            return Err(MotionError::AlreadyPaused);
        }
        self.patrol_paused = true;
        Ok(())
    }

    /// Resume a paused patrol.
    pub fn resume_patrolling(&mut self) -> MotionResult<()> {
        if !self.is_patrolling() {
            return Err(MotionError::NotPatrolling);
        }
        if !self.patrol_paused {
            return Err(MotionError::NotPaused);
        }
        self.patrol_paused = false;
        Ok(())
    }

    /// End the patrol. The current leg, if any, is finished as a plain walk.
    pub fn stop_patrolling(&mut self) -> MotionResult<()> {
        if !self.is_patrolling() {
            return Err(MotionError::NotPatrolling);
        }
        self.end_patrol();
        self.queue.clear();
        if self.target.is_some() {
            self.state = MotionState::WalkingToPoint;
            debug!("Patrol stopped, finishing current leg");
        } else {
            self.stop();
        }
        Ok(())
    }

    /// Full reset to idle.
    pub fn stop(&mut self) {
        self.end_patrol();
        self.state = MotionState::Idle;
        self.target = None;
        self.queue.clear();
        self.paused = false;
    }

    fn end_patrol(&mut self) {
        self.patrol_loop.clear();
        self.patrol_paused = false;
        self.cycles = 0;
    }

    /// Advance one tick from `current`.
    pub fn step(&mut self, current: &Location) -> MotionStep {
        let mut out = MotionStep::default();
        if !self.is_walking() || self.paused || (self.is_patrolling() && self.patrol_paused) {
            return out;
        }

        let target = match self.target {
            Some(target) => target,
            None => match self.queue.pop_front() {
                Some(next) => {
                    self.target = Some(next);
                    next
                },
                None => {
                    self.stop();
                    out.finished = true;
                    return out;
                },
            },
        };

        if !target.same_world(current) {
            debug!("Target left the NPC's world, stopping");
            self.stop();
            out.finished = true;
            return out;
        }

        let distance = current.distance(&target);
        if distance <= self.config.arrival_threshold {
            self.arrive(target, &mut out);
            return out;
        }

        let delta = target.pos - current.pos;
        let step = self.config.speed.min(distance);
        let pos = current.pos + delta / distance * step;
        let yaw = yaw_towards(delta.x, delta.z);
        trace!("Step towards {:?}, {:.2} left", target.pos, distance - step);
        out.moved_to = Some(current.with_pos(pos).with_rotation(yaw, 0.0));
        out
    }

    fn arrive(&mut self, reached: Location, out: &mut MotionStep) {
        if self.is_patrolling() {
            let index = self.patrol_loop.len().saturating_sub(self.queue.len() + 1);
            out.events.push(MotionEvent::PointReached {
                location: reached,
                index,
            });
        }

        if let Some(next) = self.queue.pop_front() {
            self.target = Some(next);
        } else if self.is_patrolling() {
            self.cycles += 1;
            out.events.push(MotionEvent::CycleComplete { cycle: self.cycles });
            self.queue = self.patrol_loop.iter().copied().collect();
            self.target = self.queue.pop_front();
            debug!("Patrol cycle {} complete", self.cycles);
        } else {
            debug!("Arrived at {:?}", reached.pos);
            self.stop();
            out.finished = true;
        }
    }
}
