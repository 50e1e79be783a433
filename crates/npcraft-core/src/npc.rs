//! NPC agent handle and command API.
//!
//! An [`Npc`] is a cheap cloneable handle around one agent's motion state,
//! event handlers and proximity settings. Commands resolve the host entity
//! first and report `Err` when they did not take effect.

use npcraft_common::{AgentId, EntityHandle, Location, PlayerId};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

use crate::config::MotionConfig;
use crate::events::{dispatch_to, EventBus, EventPayload, NpcEvent, NpcEventKind};
use crate::host::{HostWorld, PlayerSnapshot};
use crate::motion::{MotionController, MotionError, MotionEvent, MotionResult, MotionState};
use crate::pathfinding::Pathfinder;
use crate::registry::NpcRegistry;
use crate::scheduler::{Scheduler, TaskHandle};

/// Hook that consumes right-clicks instead of raising click events.
pub type ConversationHook = Arc<dyn Fn(&Npc, &PlayerSnapshot) + Send + Sync>;

/// Collaborators shared by every NPC of one engine.
#[derive(Clone)]
pub(crate) struct NpcContext {
    pub host: Arc<dyn HostWorld>,
    pub scheduler: Arc<dyn Scheduler>,
    pub pathfinder: Arc<Pathfinder>,
    pub registry: Weak<Mutex<NpcRegistry>>,
    pub motion: MotionConfig,
    pub default_range: f64,
}

struct NpcState {
    motion: MotionController,
    handle: Option<EntityHandle>,
    task: Option<TaskHandle>,
    proximity_range: f64,
    look_at_players: bool,
    followed_player: Option<PlayerId>,
    conversation: Option<ConversationHook>,
    removed: bool,
}

struct NpcShared {
    id: AgentId,
    ctx: NpcContext,
    state: Mutex<NpcState>,
    events: Mutex<EventBus>,
}

impl Drop for NpcShared {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().task.take() {
            task.cancel();
        }
    }
}

/// Handle to one NPC.
#[derive(Clone)]
pub struct Npc {
    inner: Arc<NpcShared>,
}

impl std::fmt::Debug for Npc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Npc")
            .field("id", &self.inner.id)
            .field("state", &self.motion_state())
            .finish()
    }
}

impl PartialEq for Npc {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Npc {
    pub(crate) fn new(id: AgentId, ctx: NpcContext, handle: Option<EntityHandle>) -> Self {
        let state = NpcState {
            motion: MotionController::new(ctx.motion.clone()),
            handle,
            task: None,
            proximity_range: ctx.default_range.max(0.0),
            look_at_players: false,
            followed_player: None,
            conversation: None,
            removed: false,
        };
        Self {
            inner: Arc::new(NpcShared {
                id,
                ctx,
                state: Mutex::new(state),
                events: Mutex::new(EventBus::new()),
            }),
        }
    }

    /// Agent id.
    #[must_use]
    pub fn id(&self) -> AgentId {
        self.inner.id
    }

    /// Resolves the host entity: own cached handle, then the registry's
    /// cached handle, then a host lookup by id. Refreshes both caches.
    pub fn resolve_handle(&self) -> Option<EntityHandle> {
        let host = &self.inner.ctx.host;
        let cached = self.inner.state.lock().handle;
        if let Some(handle) = cached.filter(|h| host.is_valid(*h)) {
            return Some(handle);
        }

        let registry = self.inner.ctx.registry.upgrade();
        let from_registry = registry
            .as_ref()
            .and_then(|r| r.lock().cached_handle(self.inner.id))
            .filter(|h| host.is_valid(*h));
        let handle = match from_registry {
            Some(handle) => handle,
            None => {
                let found = host.find_entity(self.inner.id)?;
                if let Some(registry) = &registry {
                    registry.lock().cache_handle(self.inner.id, found);
                }
                found
            },
        };

        trace!("Re-resolved handle for NPC {}", self.inner.id);
        self.inner.state.lock().handle = Some(handle);
        Some(handle)
    }

    fn entity(&self) -> MotionResult<(EntityHandle, Location)> {
        let gone = MotionError::EntityGone(self.inner.id);
        if self.inner.state.lock().removed {
            return Err(gone);
        }
        let handle = self.resolve_handle().ok_or_else(|| gone.clone())?;
        let location = self.inner.ctx.host.location(handle).ok_or(gone)?;
        Ok((handle, location))
    }

    fn check_world<'a>(
        at: &Location,
        targets: impl IntoIterator<Item = &'a Location>,
    ) -> MotionResult<()> {
        if targets.into_iter().all(|t| t.same_world(at)) {
            Ok(())
        } else {
            Err(MotionError::CrossWorld)
        }
    }

    /// Current entity location.
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        self.entity().ok().map(|(_, location)| location)
    }

    /// Current motion mode.
    #[must_use]
    pub fn motion_state(&self) -> MotionState {
        self.inner.state.lock().motion.state()
    }

    /// Snapshot of the motion controller.
    #[must_use]
    pub fn motion(&self) -> MotionController {
        self.inner.state.lock().motion.clone()
    }

    /// Check if any walk or patrol is active.
    #[must_use]
    pub fn is_walking(&self) -> bool {
        self.inner.state.lock().motion.is_walking()
    }

    /// Check if a patrol is active.
    #[must_use]
    pub fn is_patrolling(&self) -> bool {
        self.inner.state.lock().motion.is_patrolling()
    }

    /// Walk straight to `target`.
    pub fn walk_to(&self, target: Location) -> MotionResult<()> {
        let (_, at) = self.entity()?;
        Self::check_world(&at, [&target])?;
        self.inner.state.lock().motion.walk_to(target);
        self.ensure_task();
        Ok(())
    }

    /// Walk a list of waypoints once.
    pub fn walk_path(&self, waypoints: Vec<Location>) -> MotionResult<()> {
        let (_, at) = self.entity()?;
        Self::check_world(&at, &waypoints)?;
        self.inner.state.lock().motion.walk_path(waypoints)?;
        self.ensure_task();
        Ok(())
    }

    /// Plan a path with the pathfinder and walk it.
    pub fn navigate_to(&self, target: Location) -> MotionResult<()> {
        let (_, at) = self.entity()?;
        Self::check_world(&at, [&target])?;
        let host: &dyn HostWorld = &*self.inner.ctx.host;
        let path = self.inner.ctx.pathfinder.find_path(host, &at, &target);
        debug!("NPC {} navigating via {} waypoints", self.inner.id, path.len());
        self.walk_path(path)
    }

    /// Patrol a waypoint loop until stopped.
    pub fn start_patrolling(&self, waypoints: Vec<Location>) -> MotionResult<()> {
        let (_, at) = self.entity()?;
        Self::check_world(&at, &waypoints)?;
        self.inner.state.lock().motion.start_patrolling(waypoints)?;
        self.ensure_task();
        Ok(())
    }

    /// Pause the active walk.
    pub fn pause_walking(&self) -> MotionResult<()> {
        self.entity()?;
        self.inner.state.lock().motion.pause_walking()
    }

    /// Resume a paused walk.
    pub fn resume_walking(&self) -> MotionResult<()> {
        self.entity()?;
        self.inner.state.lock().motion.resume_walking()?;
        self.ensure_task();
        Ok(())
    }

    /// Pause the active patrol.
    pub fn pause_patrolling(&self) -> MotionResult<()> {
        self.entity()?;
        self.inner.state.lock().motion.pause_patrolling()
    }

    /// Resume a paused patrol.
    pub fn resume_patrolling(&self) -> MotionResult<()> {
        self.entity()?;
        self.inner.state.lock().motion.resume_patrolling()?;
        self.ensure_task();
        Ok(())
    }

    /// End the patrol, finishing the current leg as a plain walk.
    pub fn stop_patrolling(&self) -> MotionResult<()> {
        self.entity()?;
        let mut state = self.inner.state.lock();
        state.motion.stop_patrolling()?;
        if !state.motion.is_walking() {
            cancel_task(&mut state);
        }
        Ok(())
    }

    /// Stop all motion.
    pub fn stop_walking(&self) -> MotionResult<()> {
        self.entity()?;
        let mut state = self.inner.state.lock();
        state.motion.stop();
        cancel_task(&mut state);
        Ok(())
    }

    /// Move the entity immediately. Motion state is left untouched.
    pub fn teleport(&self, location: Location) -> MotionResult<()> {
        let (handle, _) = self.entity()?;
        if self.inner.ctx.host.set_location(handle, &location) {
            Ok(())
        } else {
            Err(MotionError::EntityGone(self.inner.id))
        }
    }

    /// Proximity range for scans.
    #[must_use]
    pub fn proximity_range(&self) -> f64 {
        self.inner.state.lock().proximity_range
    }

    /// Set the proximity range. Negative and NaN values become zero.
    pub fn set_proximity_range(&self, range: f64) {
        self.inner.state.lock().proximity_range = range.max(0.0);
    }

    /// Check if the NPC turns to face nearby players.
    #[must_use]
    pub fn look_at_players(&self) -> bool {
        self.inner.state.lock().look_at_players
    }

    /// Enable or disable turning to face nearby players.
    pub fn set_look_at_players(&self, enabled: bool) {
        self.inner.state.lock().look_at_players = enabled;
        self.update_monitoring();
    }

    /// Player looked at in preference to the nearest one.
    #[must_use]
    pub fn followed_player(&self) -> Option<PlayerId> {
        self.inner.state.lock().followed_player
    }

    /// Set or clear the followed player.
    pub fn follow_player(&self, player: Option<PlayerId>) {
        self.inner.state.lock().followed_player = player;
    }

    /// Current conversation hook.
    #[must_use]
    pub fn conversation_hook(&self) -> Option<ConversationHook> {
        self.inner.state.lock().conversation.clone()
    }

    /// Set or clear the conversation hook.
    pub fn set_conversation_hook(&self, hook: Option<ConversationHook>) {
        self.inner.state.lock().conversation = hook;
    }

    /// Register a handler for `kind`.
    pub fn on_event<F>(&self, kind: NpcEventKind, handler: F)
    where
        F: Fn(&NpcEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.lock().on(kind, Arc::new(handler));
        self.update_monitoring();
    }

    /// Remove all handlers for `kind`. Returns how many were removed.
    pub fn remove_event_handlers(&self, kind: NpcEventKind) -> usize {
        let removed = self.inner.events.lock().remove(kind);
        self.update_monitoring();
        removed
    }

    /// Remove every handler.
    pub fn remove_all_event_handlers(&self) {
        self.inner.events.lock().clear();
        self.update_monitoring();
    }

    /// Number of handlers registered for `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: NpcEventKind) -> usize {
        self.inner.events.lock().count(kind)
    }

    /// Check if any proximity-class handler is registered.
    #[must_use]
    pub fn has_proximity_handlers(&self) -> bool {
        self.inner.events.lock().has_proximity_handlers()
    }

    /// Run this NPC's handlers for `event`. Returns how many succeeded.
    ///
    /// No NPC lock is held while handlers run.
    pub fn dispatch(&self, event: &NpcEvent) -> usize {
        let handlers = self.inner.events.lock().handlers(event.kind());
        dispatch_to(&handlers, event)
    }

    fn update_monitoring(&self) {
        let wants = self.inner.state.lock().look_at_players
            || self.inner.events.lock().has_proximity_handlers();
        if let Some(registry) = self.inner.ctx.registry.upgrade() {
            registry.lock().set_monitored(self.inner.id, wants);
        }
    }

    /// Rotate the entity in place.
    pub(crate) fn face(&self, yaw: f32, pitch: f32) -> bool {
        match self.entity() {
            Ok((handle, at)) => self
                .inner
                .ctx
                .host
                .set_location(handle, &at.with_rotation(yaw, pitch)),
            Err(_) => false,
        }
    }

    fn ensure_task(&self) {
        {
            let state = self.inner.state.lock();
            if state.removed || state.task.as_ref().is_some_and(|t| !t.is_cancelled()) {
                return;
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let task = self.inner.ctx.scheduler.run_every(
            self.inner.ctx.motion.tick_interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Npc { inner }.step();
                }
            }),
        );

        let mut state = self.inner.state.lock();
        if state.task.as_ref().is_some_and(|t| !t.is_cancelled()) {
            task.cancel();
        } else {
            trace!("Scheduled motion task {} for NPC {}", task.id(), self.inner.id);
            state.task = Some(task);
        }
    }

    /// One motion tick.
    fn step(&self) {
        let Some(handle) = self.resolve_handle() else {
            self.lose_entity();
            return;
        };
        let Some(at) = self.inner.ctx.host.location(handle) else {
            self.lose_entity();
            return;
        };

        let step = self.inner.state.lock().motion.step(&at);
        if let Some(moved) = step.moved_to {
            if !self.inner.ctx.host.set_location(handle, &moved) {
                self.lose_entity();
                return;
            }
        }

        for event in step.events {
            let payload = match event {
                MotionEvent::PointReached { location, index } => {
                    EventPayload::PatrolPointReached { location, index }
                },
                MotionEvent::CycleComplete { cycle } => EventPayload::PatrolCycleComplete { cycle },
            };
            self.dispatch(&NpcEvent::new(self.inner.id, None, payload));
        }

        if step.finished {
            let mut state = self.inner.state.lock();
            if !state.motion.is_walking() {
                cancel_task(&mut state);
            }
        }
    }

    fn lose_entity(&self) {
        warn!("Entity for NPC {} is gone, stopping motion", self.inner.id);
        let mut state = self.inner.state.lock();
        state.motion.stop();
        state.handle = None;
        cancel_task(&mut state);
    }

    /// Stop motion and drop handlers. Later commands fail with `EntityGone`.
    pub(crate) fn cleanup(&self) {
        {
            let mut state = self.inner.state.lock();
            state.motion.stop();
            cancel_task(&mut state);
            state.removed = true;
            state.conversation = None;
            state.followed_player = None;
        }
        self.inner.events.lock().clear();
        debug!("Cleaned up NPC {}", self.inner.id);
    }

    /// Check if the NPC was removed from its engine.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.inner.state.lock().removed
    }

    #[cfg(test)]
    pub(crate) fn task(&self) -> Option<TaskHandle> {
        self.inner.state.lock().task.clone()
    }
}

fn cancel_task(state: &mut NpcState) {
    if let Some(task) = state.task.take() {
        task.cancel();
    }
}
