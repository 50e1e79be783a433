//! Proximity event engine.
//!
//! Owns the NPC registry and two periodic scans:
//! - a look-at scan that turns NPCs towards nearby players;
//! - an event scan that raises sneak and punch events.
//!
//! It also classifies host interaction and damage events into NPC events.
//! Scans snapshot the registry first and dispatch after every lock is
//! released.

use ahash::{AHashMap, AHashSet};
use glam::DVec3;
use npcraft_common::{
    pitch_towards, yaw_towards, AgentId, Location, NpcraftError, NpcraftResult, PlayerId,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, info, trace};

use crate::config::NpcConfig;
use crate::events::{EventPayload, NpcEvent, NpcEventKind};
use crate::host::{Clock, DamageCause, Hand, HostWorld, PlayerSnapshot, SystemClock};
use crate::npc::{Npc, NpcContext};
use crate::pathfinding::Pathfinder;
use crate::registry::NpcRegistry;
use crate::scheduler::{Scheduler, TaskHandle};

/// Per-player state carried between event scans.
#[derive(Debug, Default)]
struct PlayerTracking {
    /// Sneak state observed by the previous scan
    sneaking: AHashMap<PlayerId, bool>,
    /// Time of each player's latest unconsumed swing
    punches: AHashMap<PlayerId, Instant>,
}

struct EngineShared {
    host: Arc<dyn HostWorld>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    pathfinder: Arc<Pathfinder>,
    config: NpcConfig,
    registry: Arc<Mutex<NpcRegistry>>,
    tracking: Mutex<PlayerTracking>,
    tasks: Mutex<Vec<TaskHandle>>,
}

/// NPC registry plus proximity scanning and interaction dispatch.
#[derive(Clone)]
pub struct ProximityEngine {
    shared: Arc<EngineShared>,
}

impl std::fmt::Debug for ProximityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProximityEngine")
            .field("registry", &*self.shared.registry.lock())
            .field("running", &self.is_running())
            .finish()
    }
}

impl ProximityEngine {
    /// Create an engine using the system clock.
    #[must_use]
    pub fn new(host: Arc<dyn HostWorld>, scheduler: Arc<dyn Scheduler>, config: NpcConfig) -> Self {
        Self::with_clock(host, scheduler, Arc::new(SystemClock), config)
    }

    /// Create an engine with an explicit clock.
    ///
    /// Out-of-range settings are clamped first.
    #[must_use]
    pub fn with_clock(
        host: Arc<dyn HostWorld>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
        mut config: NpcConfig,
    ) -> Self {
        config.validate();
        let pathfinder = Arc::new(Pathfinder::new(config.pathfinding.clone()));
        Self {
            shared: Arc::new(EngineShared {
                host,
                scheduler,
                clock,
                pathfinder,
                config,
                registry: Arc::new(Mutex::new(NpcRegistry::new())),
                tracking: Mutex::new(PlayerTracking::default()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &NpcConfig {
        &self.shared.config
    }

    /// Shared pathfinder.
    #[must_use]
    pub fn pathfinder(&self) -> &Pathfinder {
        &self.shared.pathfinder
    }

    /// Schedule both scans. Calling it again while running does nothing.
    pub fn start(&self) {
        let mut tasks = self.shared.tasks.lock();
        if !tasks.is_empty() {
            debug!("Proximity engine already running");
            return;
        }

        let proximity = &self.shared.config.proximity;
        let weak = Arc::downgrade(&self.shared);
        tasks.push(self.shared.scheduler.run_every(
            proximity.look_at_interval,
            Box::new(scan_task(weak.clone(), Self::scan_look_at)),
        ));
        tasks.push(self.shared.scheduler.run_every(
            proximity.event_scan_interval,
            Box::new(scan_task(weak, Self::scan_events)),
        ));
        info!(
            "Proximity engine started (look-at every {} ticks, events every {} ticks)",
            proximity.look_at_interval, proximity.event_scan_interval
        );
    }

    /// Cancel both scans and remove every NPC.
    pub fn shutdown(&self) {
        for task in self.shared.tasks.lock().drain(..) {
            task.cancel();
        }
        let npcs = self.shared.registry.lock().drain();
        let count = npcs.len();
        for npc in npcs {
            npc.cleanup();
        }
        *self.shared.tracking.lock() = PlayerTracking::default();
        info!("Proximity engine shut down, removed {} NPCs", count);
    }

    /// Check if the scans are scheduled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.shared.tasks.lock().is_empty()
    }

    /// Wrap the host entity with this id as an NPC and track it.
    pub fn spawn_npc(&self, id: AgentId) -> NpcraftResult<Npc> {
        if self.shared.registry.lock().contains(id) {
            return Err(NpcraftError::AlreadyTracked(id));
        }
        let handle = self
            .shared
            .host
            .find_entity(id)
            .ok_or(NpcraftError::EntityMissing(id))?;

        let ctx = NpcContext {
            host: Arc::clone(&self.shared.host),
            scheduler: Arc::clone(&self.shared.scheduler),
            pathfinder: Arc::clone(&self.shared.pathfinder),
            registry: Arc::downgrade(&self.shared.registry),
            motion: self.shared.config.motion.clone(),
            default_range: self.shared.config.proximity.default_range,
        };
        let npc = Npc::new(id, ctx, Some(handle));
        self.shared.registry.lock().insert(npc.clone(), Some(handle))?;
        debug!("Tracking NPC {}", id);
        Ok(npc)
    }

    /// Look up a tracked NPC.
    #[must_use]
    pub fn npc(&self, id: AgentId) -> Option<Npc> {
        self.shared.registry.lock().get(id)
    }

    /// All tracked NPCs in insertion order.
    #[must_use]
    pub fn npcs(&self) -> Vec<Npc> {
        self.shared.registry.lock().tracked()
    }

    /// Number of tracked NPCs.
    #[must_use]
    pub fn npc_count(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Check if an NPC is in the proximity view.
    #[must_use]
    pub fn is_monitored(&self, id: AgentId) -> bool {
        self.shared.registry.lock().is_monitored(id)
    }

    /// Stop tracking an NPC, cancelling its motion and dropping its handlers.
    pub fn remove_npc(&self, id: AgentId) -> bool {
        let removed = self.shared.registry.lock().remove(id);
        match removed {
            Some(npc) => {
                npc.cleanup();
                debug!("Removed NPC {}", id);
                true
            },
            None => false,
        }
    }

    /// Host hook: the NPC's entity was removed from the world.
    pub fn handle_entity_removed(&self, id: AgentId) -> bool {
        self.remove_npc(id)
    }

    /// Add or remove an NPC from the visibility view.
    pub fn set_visibility_managed(&self, id: AgentId, managed: bool) -> bool {
        self.shared.registry.lock().set_visibility_managed(id, managed)
    }

    /// Host hook: a player joined. Returns the NPCs to show to them.
    pub fn handle_player_join(&self, player: PlayerId) -> Vec<AgentId> {
        let visible = self.shared.registry.lock().visibility_managed();
        debug!("Player {} joined, {} managed NPCs", player, visible.len());
        visible
    }

    /// Host hook: a player left. Their sneak and punch state is dropped.
    pub fn handle_player_quit(&self, player: PlayerId) {
        let mut tracking = self.shared.tracking.lock();
        tracking.sneaking.remove(&player);
        tracking.punches.remove(&player);
    }

    /// Host hook: a player swung their arm.
    pub fn handle_player_swing(&self, player: PlayerId) {
        let now = self.shared.clock.now();
        self.shared.tracking.lock().punches.insert(player, now);
    }

    /// Host hook: a player right-clicked an NPC.
    ///
    /// A conversation hook consumes the click. Returns the raised kind.
    pub fn handle_interact(
        &self,
        id: AgentId,
        player: &PlayerSnapshot,
        hand: Hand,
    ) -> Option<NpcEventKind> {
        let npc = self.npc(id)?;
        if let Some(hook) = npc.conversation_hook() {
            trace!("Click on NPC {} consumed by conversation", id);
            hook(&npc, player);
            return None;
        }

        let payload = if player.sneaking {
            EventPayload::ShiftRightClicked { hand }
        } else {
            EventPayload::RightClicked { hand }
        };
        Some(Self::raise(&npc, Some(player.id), payload))
    }

    /// Host hook: a player interacted at a point on an NPC.
    pub fn handle_interact_at(
        &self,
        id: AgentId,
        player: &PlayerSnapshot,
        position: DVec3,
        hand: Hand,
    ) -> bool {
        match self.npc(id) {
            Some(npc) => {
                Self::raise(
                    &npc,
                    Some(player.id),
                    EventPayload::PlayerInteractAt { position, hand },
                );
                true
            },
            None => false,
        }
    }

    /// Host hook: an NPC took damage.
    ///
    /// A player hit at or below the left-click threshold for both raw and
    /// final damage is a left click. Everything else is `Damaged`.
    pub fn handle_damage(
        &self,
        id: AgentId,
        attacker: Option<&PlayerSnapshot>,
        damage: f64,
        final_damage: f64,
        cause: DamageCause,
    ) -> Option<NpcEventKind> {
        let npc = self.npc(id)?;
        let threshold = self.shared.config.proximity.left_click_damage_threshold;
        let payload = match attacker {
            Some(player) if damage <= threshold && final_damage <= threshold => {
                if player.sneaking {
                    EventPayload::ShiftLeftClicked { damage }
                } else {
                    EventPayload::LeftClicked { damage }
                }
            },
            _ => EventPayload::Damaged {
                damage,
                final_damage,
                cause,
            },
        };
        Some(Self::raise(&npc, attacker.map(|p| p.id), payload))
    }

    fn raise(npc: &Npc, player: Option<PlayerId>, payload: EventPayload) -> NpcEventKind {
        let event = NpcEvent::new(npc.id(), player, payload);
        npc.dispatch(&event);
        event.kind()
    }

    /// Players within `range` of `at`, with their distances.
    fn players_in_range(&self, at: &Location, range: f64) -> Vec<(PlayerSnapshot, f64)> {
        self.shared
            .host
            .players_within(at, range, range, range)
            .into_iter()
            .filter(|p| p.location.same_world(at))
            .map(|p| {
                let distance = at.distance(&p.location);
                (p, distance)
            })
            .filter(|(_, distance)| *distance <= range)
            .collect()
    }

    /// Turn look-at NPCs towards the followed or nearest player in range.
    pub fn scan_look_at(&self) {
        let npcs = self.shared.registry.lock().monitored();
        let max_distance = self.shared.config.proximity.max_look_distance;

        for npc in npcs {
            if !npc.look_at_players() {
                continue;
            }
            let Some(at) = npc.location() else {
                continue;
            };

            let nearby = self.players_in_range(&at, npc.proximity_range());
            let followed = npc
                .followed_player()
                .and_then(|id| nearby.iter().find(|(p, _)| p.id == id));
            let chosen = followed.or_else(|| nearby.iter().min_by(|a, b| a.1.total_cmp(&b.1)));
            let Some((player, distance)) = chosen else {
                continue;
            };
            if *distance > max_distance {
                continue;
            }

            let delta = player.location.pos - at.pos;
            let yaw = yaw_towards(delta.x, delta.z);
            let pitch = pitch_towards(delta.x, delta.y, delta.z);
            if npc.face(yaw, pitch) {
                trace!("NPC {} looking at {} (yaw {:.1})", npc.id(), player.id, yaw);
            }
        }
    }

    /// Raise sneak-start and punch events for players near monitored NPCs.
    pub fn scan_events(&self) {
        let now = self.shared.clock.now();
        let proximity = &self.shared.config.proximity;
        let retention = proximity.punch_retention();
        let window = proximity.punch_window();

        let (previous, punches) = {
            let mut tracking = self.shared.tracking.lock();
            tracking
                .punches
                .retain(|_, swung| now.saturating_duration_since(*swung) <= retention);
            (tracking.sneaking.clone(), tracking.punches.clone())
        };

        let npcs = self.shared.registry.lock().monitored();
        let mut observed: AHashMap<PlayerId, bool> = AHashMap::new();
        let mut fired_punches: AHashSet<PlayerId> = AHashSet::new();
        let mut pending: Vec<(Npc, NpcEvent)> = Vec::new();

        // Look-at-only NPCs must not touch sneak or punch state.
        for npc in npcs.into_iter().filter(Npc::has_proximity_handlers) {
            let Some(at) = npc.location() else {
                continue;
            };
            for (player, distance) in self.players_in_range(&at, npc.proximity_range()) {
                observed.insert(player.id, player.sneaking);

                let was_sneaking = previous.get(&player.id).copied().unwrap_or(false);
                if player.sneaking && !was_sneaking {
                    pending.push((
                        npc.clone(),
                        NpcEvent::new(
                            npc.id(),
                            Some(player.id),
                            EventPayload::PlayerSneakingNearby {
                                distance,
                                location: player.location,
                            },
                        ),
                    ));
                }

                let punched = punches
                    .get(&player.id)
                    .is_some_and(|swung| now.saturating_duration_since(*swung) <= window);
                if punched {
                    fired_punches.insert(player.id);
                    pending.push((
                        npc.clone(),
                        NpcEvent::new(
                            npc.id(),
                            Some(player.id),
                            EventPayload::PlayerPunchingNearby {
                                distance,
                                location: player.location,
                            },
                        ),
                    ));
                }
            }
        }

        {
            let mut tracking = self.shared.tracking.lock();
            tracking.sneaking = observed;
            for player in &fired_punches {
                tracking.punches.remove(player);
            }
        }

        if !pending.is_empty() {
            trace!("Event scan raised {} events", pending.len());
        }
        for (npc, event) in pending {
            npc.dispatch(&event);
        }
    }
}

fn scan_task(
    weak: Weak<EngineShared>,
    scan: fn(&ProximityEngine),
) -> impl FnMut() + Send + 'static {
    move || {
        if let Some(shared) = weak.upgrade() {
            scan(&ProximityEngine { shared });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ManualClock, MockHost};
    use crate::scheduler::TickScheduler;
    use npcraft_common::WorldId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const W: WorldId = WorldId::new(1);

    struct Fixture {
        host: Arc<MockHost>,
        scheduler: Arc<TickScheduler>,
        clock: Arc<ManualClock>,
        engine: ProximityEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let host = Arc::new(MockHost::flat(W, 63));
            let scheduler = Arc::new(TickScheduler::new());
            let clock = Arc::new(ManualClock::new());
            let engine = ProximityEngine::with_clock(
                Arc::clone(&host) as Arc<dyn HostWorld>,
                Arc::clone(&scheduler) as Arc<dyn Scheduler>,
                Arc::clone(&clock) as Arc<dyn Clock>,
                NpcConfig::default(),
            );
            Self {
                host,
                scheduler,
                clock,
                engine,
            }
        }

        fn spawn(&self, x: f64, z: f64) -> Npc {
            let id = AgentId::new();
            self.host.spawn_entity(id, loc(x, 64.0, z));
            self.engine.spawn_npc(id).unwrap()
        }

        fn player(&self, x: f64, y: f64, z: f64) -> PlayerId {
            let id = PlayerId::new();
            self.host.add_player(id, loc(x, y, z));
            id
        }
    }

    fn loc(x: f64, y: f64, z: f64) -> Location {
        Location::new(W, x, y, z)
    }

    fn count(npc: &Npc, kind: NpcEventKind) -> Arc<AtomicUsize> {
        let counter = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&counter);
        npc.on_event(kind, move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        counter
    }

    #[test]
    fn test_spawn_requires_entity_and_unique_id() {
        let fx = Fixture::new();
        let ghost = AgentId::new();
        assert!(matches!(
            fx.engine.spawn_npc(ghost),
            Err(NpcraftError::EntityMissing(id)) if id == ghost
        ));

        let npc = fx.spawn(0.0, 0.0);
        assert!(matches!(
            fx.engine.spawn_npc(npc.id()),
            Err(NpcraftError::AlreadyTracked(_))
        ));
        assert_eq!(fx.engine.npc_count(), 1);
    }

    #[test]
    fn test_sneak_fires_once_per_edge() {
        let fx = Fixture::new();
        fx.engine.start();
        let npc = fx.spawn(0.0, 0.0);
        let sneaks = count(&npc, NpcEventKind::PlayerSneakingNearby);
        let player = fx.player(2.0, 64.0, 0.0);
        fx.host.set_sneaking(player, true);

        fx.scheduler.run_ticks(50);
        assert_eq!(sneaks.load(Ordering::SeqCst), 1);

        fx.host.set_sneaking(player, false);
        fx.scheduler.run_ticks(10);
        fx.host.set_sneaking(player, true);
        fx.scheduler.run_ticks(10);
        assert_eq!(sneaks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sneak_payload_carries_distance() {
        let fx = Fixture::new();
        let npc = fx.spawn(0.0, 0.0);
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        npc.on_event(NpcEventKind::PlayerSneakingNearby, move |event| {
            *sink.lock() = Some(event.clone());
            Ok(())
        });
        let player = fx.player(3.0, 64.0, 4.0);
        fx.host.set_sneaking(player, true);

        fx.engine.scan_events();

        let event = seen.lock().clone().unwrap();
        assert_eq!(event.player(), Some(player));
        match event.payload() {
            EventPayload::PlayerSneakingNearby { distance, location } => {
                assert!((distance - 5.0).abs() < 1e-9);
                assert_eq!(location.pos, DVec3::new(3.0, 64.0, 4.0));
            },
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_punch_consumed_after_firing() {
        let fx = Fixture::new();
        fx.engine.start();
        let npc = fx.spawn(0.0, 0.0);
        let punches = count(&npc, NpcEventKind::PlayerPunchingNearby);
        let player = fx.player(1.0, 64.0, 1.0);

        fx.engine.handle_player_swing(player);
        fx.scheduler.run_ticks(10);
        assert_eq!(punches.load(Ordering::SeqCst), 1);

        fx.clock.advance(Duration::from_millis(100));
        fx.scheduler.run_ticks(10);
        assert_eq!(punches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_punch_seen_by_every_npc_in_range() {
        let fx = Fixture::new();
        let first = fx.spawn(0.0, 0.0);
        let second = fx.spawn(2.0, 0.0);
        let a = count(&first, NpcEventKind::PlayerPunchingNearby);
        let b = count(&second, NpcEventKind::PlayerPunchingNearby);
        let player = fx.player(1.0, 64.0, 0.0);

        fx.engine.handle_player_swing(player);
        fx.engine.scan_events();
        fx.engine.scan_events();

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_old_punch_ignored_and_purged() {
        let fx = Fixture::new();
        let npc = fx.spawn(0.0, 0.0);
        let punches = count(&npc, NpcEventKind::PlayerPunchingNearby);
        let player = fx.player(1.0, 64.0, 1.0);

        fx.engine.handle_player_swing(player);
        fx.clock.advance(Duration::from_millis(600));
        fx.engine.scan_events();
        assert_eq!(punches.load(Ordering::SeqCst), 0);
        assert_eq!(fx.engine.shared.tracking.lock().punches.len(), 1);

        fx.clock.advance(Duration::from_millis(600));
        fx.engine.scan_events();
        assert!(fx.engine.shared.tracking.lock().punches.is_empty());
    }

    #[test]
    fn test_out_of_range_players_ignored() {
        let fx = Fixture::new();
        let npc = fx.spawn(0.0, 0.0);
        let sneaks = count(&npc, NpcEventKind::PlayerSneakingNearby);
        let corner = fx.player(4.0, 64.0, 4.0);
        fx.host.set_sneaking(corner, true);

        fx.engine.scan_events();
        assert_eq!(sneaks.load(Ordering::SeqCst), 0);

        npc.set_proximity_range(6.0);
        fx.engine.scan_events();
        assert_eq!(sneaks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unmonitored_npc_gets_no_proximity_events() {
        let fx = Fixture::new();
        let npc = fx.spawn(0.0, 0.0);
        let clicks = count(&npc, NpcEventKind::RightClicked);
        let player = fx.player(1.0, 64.0, 0.0);
        fx.host.set_sneaking(player, true);
        fx.engine.handle_player_swing(player);

        fx.engine.scan_events();

        assert!(!fx.engine.is_monitored(npc.id()));
        assert_eq!(clicks.load(Ordering::SeqCst), 0);
        assert_eq!(fx.engine.shared.tracking.lock().punches.len(), 1);
    }

    #[test]
    fn test_right_click_classification() {
        let fx = Fixture::new();
        let npc = fx.spawn(0.0, 0.0);
        let plain = count(&npc, NpcEventKind::RightClicked);
        let shift = count(&npc, NpcEventKind::ShiftRightClicked);
        let id = fx.player(1.0, 64.0, 0.0);
        let mut player = fx.host.player(id).unwrap();

        assert_eq!(
            fx.engine.handle_interact(npc.id(), &player, Hand::Main),
            Some(NpcEventKind::RightClicked)
        );
        player.sneaking = true;
        assert_eq!(
            fx.engine.handle_interact(npc.id(), &player, Hand::Off),
            Some(NpcEventKind::ShiftRightClicked)
        );
        assert_eq!(plain.load(Ordering::SeqCst), 1);
        assert_eq!(shift.load(Ordering::SeqCst), 1);
        assert_eq!(fx.engine.handle_interact(AgentId::new(), &player, Hand::Main), None);
    }

    #[test]
    fn test_conversation_hook_consumes_click() {
        let fx = Fixture::new();
        let npc = fx.spawn(0.0, 0.0);
        let clicks = count(&npc, NpcEventKind::RightClicked);
        let talked = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&talked);
        npc.set_conversation_hook(Some(Arc::new(move |_, _| {
            sink.fetch_add(1, Ordering::SeqCst);
        })));
        let id = fx.player(1.0, 64.0, 0.0);
        let player = fx.host.player(id).unwrap();

        assert_eq!(fx.engine.handle_interact(npc.id(), &player, Hand::Main), None);

        assert_eq!(talked.load(Ordering::SeqCst), 1);
        assert_eq!(clicks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_interact_at_reports_position() {
        let fx = Fixture::new();
        let npc = fx.spawn(0.0, 0.0);
        let hits = count(&npc, NpcEventKind::PlayerInteractAt);
        let id = fx.player(1.0, 64.0, 0.0);
        let player = fx.host.player(id).unwrap();

        assert!(fx
            .engine
            .handle_interact_at(npc.id(), &player, DVec3::new(0.1, 1.2, 0.0), Hand::Main));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_damage_classification() {
        let fx = Fixture::new();
        let npc = fx.spawn(0.0, 0.0);
        let id = fx.player(1.0, 64.0, 0.0);
        let mut player = fx.host.player(id).unwrap();
        let cause = DamageCause::EntityAttack;

        let classify = |player: Option<&PlayerSnapshot>, damage, final_damage| {
            fx.engine
                .handle_damage(npc.id(), player, damage, final_damage, cause)
        };
        assert_eq!(classify(Some(&player), 0.5, 0.5), Some(NpcEventKind::LeftClicked));
        assert_eq!(classify(Some(&player), 1.0, 1.0), Some(NpcEventKind::LeftClicked));
        assert_eq!(classify(Some(&player), 1.0, 1.5), Some(NpcEventKind::Damaged));
        assert_eq!(classify(Some(&player), 4.0, 2.0), Some(NpcEventKind::Damaged));
        assert_eq!(classify(None, 0.5, 0.5), Some(NpcEventKind::Damaged));
        player.sneaking = true;
        assert_eq!(
            classify(Some(&player), 0.0, 0.0),
            Some(NpcEventKind::ShiftLeftClicked)
        );
    }

    #[test]
    fn test_look_at_prefers_followed_player() {
        let fx = Fixture::new();
        let npc = fx.spawn(0.0, 0.0);
        npc.set_look_at_players(true);
        let east = fx.player(3.0, 64.0, 0.0);
        fx.player(0.0, 64.0, -2.0);

        fx.engine.scan_look_at();
        let yaw = npc.location().unwrap().yaw;
        assert!((yaw.abs() - 180.0).abs() < 1e-3);

        npc.follow_player(Some(east));
        fx.engine.scan_look_at();
        let facing = npc.location().unwrap();
        assert!((facing.yaw + 90.0).abs() < 1e-3);
        assert!(facing.pitch.abs() < 1e-3);
    }

    #[test]
    fn test_look_at_pitch_and_range() {
        let fx = Fixture::new();
        let npc = fx.spawn(0.0, 0.0);
        npc.set_look_at_players(true);
        let above = fx.player(3.0, 67.0, 0.0);

        fx.engine.scan_look_at();
        assert!((npc.location().unwrap().pitch + 45.0).abs() < 1e-3);

        fx.host.move_player(above, loc(9.0, 64.0, 0.0));
        npc.teleport(loc(0.0, 64.0, 0.0)).unwrap();
        fx.engine.scan_look_at();
        let facing = npc.location().unwrap();
        assert_eq!(facing.yaw, 0.0);
        assert_eq!(facing.pitch, 0.0);
    }

    #[test]
    fn test_look_at_ignores_players_past_max_distance() {
        let fx = Fixture::new();
        let npc = fx.spawn(0.0, 0.0);
        npc.set_look_at_players(true);
        npc.set_proximity_range(100.0);
        let far = fx.player(70.0, 66.0, 0.0);

        fx.engine.scan_look_at();
        let facing = npc.location().unwrap();
        assert_eq!(facing.yaw, 0.0);
        assert_eq!(facing.pitch, 0.0);

        fx.host.move_player(far, loc(60.0, 64.0, 0.0));
        fx.engine.scan_look_at();
        assert!((npc.location().unwrap().yaw + 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_look_at_only_npc_leaves_punches_for_others() {
        let fx = Fixture::new();
        let watcher = fx.spawn(0.0, 0.0);
        watcher.set_look_at_players(true);
        let guard = fx.spawn(20.0, 0.0);
        let punches = count(&guard, NpcEventKind::PlayerPunchingNearby);
        let sneaks = count(&guard, NpcEventKind::PlayerSneakingNearby);
        let player = fx.player(1.0, 64.0, 0.0);
        assert!(fx.engine.is_monitored(watcher.id()));

        fx.host.set_sneaking(player, true);
        fx.engine.handle_player_swing(player);
        fx.engine.scan_events();
        assert_eq!(punches.load(Ordering::SeqCst), 0);
        assert_eq!(fx.engine.shared.tracking.lock().punches.len(), 1);

        fx.host.move_player(player, loc(19.0, 64.0, 0.0));
        fx.clock.advance(Duration::from_millis(100));
        fx.engine.scan_events();
        assert_eq!(punches.load(Ordering::SeqCst), 1);
        assert_eq!(sneaks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_engine_clamps_config() {
        let host = Arc::new(MockHost::flat(W, 63));
        let scheduler = Arc::new(TickScheduler::new());
        let mut config = NpcConfig::default();
        config.pathfinding.los_sample_step = 0.0;
        config.motion.speed = -1.0;
        config.proximity.event_scan_interval = 0;

        let engine = ProximityEngine::new(
            Arc::clone(&host) as Arc<dyn HostWorld>,
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            config,
        );

        assert!(engine.pathfinder().config().los_sample_step > 0.0);
        assert_eq!(engine.pathfinder().config(), &engine.config().pathfinding);
        assert!(engine.config().motion.speed > 0.0);
        assert_eq!(engine.config().proximity.event_scan_interval, 1);

        engine.start();
        let id = AgentId::new();
        host.spawn_entity(id, loc(0.0, 64.0, 0.0));
        let npc = engine.spawn_npc(id).unwrap();
        npc.walk_to(loc(3.0, 64.0, 0.0)).unwrap();
        scheduler.run_ticks(400);
        assert!(!npc.is_walking());
    }

    #[test]
    fn test_look_at_runs_on_schedule() {
        let fx = Fixture::new();
        fx.engine.start();
        fx.engine.start();
        assert_eq!(fx.scheduler.active_tasks(), 2);
        let npc = fx.spawn(0.0, 0.0);
        npc.set_look_at_players(true);
        fx.player(-3.0, 64.0, 0.0);

        fx.scheduler.run_ticks(4);
        assert_eq!(npc.location().unwrap().yaw, 0.0);
        fx.scheduler.run_ticks(1);
        assert!((npc.location().unwrap().yaw - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_handler_may_remove_npcs_during_scan() {
        let fx = Fixture::new();
        let first = fx.spawn(0.0, 0.0);
        let second = fx.spawn(1.0, 0.0);
        let second_id = second.id();
        let engine = fx.engine.clone();
        first.on_event(NpcEventKind::PlayerSneakingNearby, move |_| {
            engine.remove_npc(second_id);
            Ok(())
        });
        let second_sneaks = count(&second, NpcEventKind::PlayerSneakingNearby);
        let player = fx.player(0.5, 64.0, 0.0);
        fx.host.set_sneaking(player, true);

        fx.engine.scan_events();

        assert_eq!(second_sneaks.load(Ordering::SeqCst), 0);
        assert!(fx.engine.npc(second_id).is_none());
        assert_eq!(fx.engine.npc_count(), 1);
    }

    #[test]
    fn test_scan_tolerates_reloaded_handle() {
        let fx = Fixture::new();
        let id = AgentId::new();
        let handle = fx.host.spawn_entity(id, loc(0.0, 64.0, 0.0));
        let npc = fx.engine.spawn_npc(id).unwrap();
        let sneaks = count(&npc, NpcEventKind::PlayerSneakingNearby);
        let player = fx.player(1.0, 64.0, 0.0);
        fx.host.set_sneaking(player, true);

        fx.host.reload_entity(handle).unwrap();
        fx.engine.scan_events();

        assert_eq!(sneaks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_player_quit_forgets_state() {
        let fx = Fixture::new();
        let npc = fx.spawn(0.0, 0.0);
        let sneaks = count(&npc, NpcEventKind::PlayerSneakingNearby);
        let player = fx.player(1.0, 64.0, 0.0);
        fx.host.set_sneaking(player, true);
        fx.engine.scan_events();

        fx.engine.handle_player_swing(player);
        fx.engine.handle_player_quit(player);
        fx.engine.scan_events();

        assert_eq!(sneaks.load(Ordering::SeqCst), 2);
        assert!(fx.engine.shared.tracking.lock().punches.is_empty());

        fx.host.remove_player(player);
        fx.engine.handle_player_quit(player);
        fx.engine.scan_events();
        assert_eq!(sneaks.load(Ordering::SeqCst), 2);
        assert!(fx.engine.shared.tracking.lock().sneaking.is_empty());
    }

    #[test]
    fn test_visibility_view_on_join() {
        let fx = Fixture::new();
        let shown = fx.spawn(0.0, 0.0);
        fx.spawn(5.0, 0.0);

        assert!(fx.engine.set_visibility_managed(shown.id(), true));
        assert!(!fx.engine.set_visibility_managed(AgentId::new(), true));
        assert_eq!(fx.engine.handle_player_join(PlayerId::new()), vec![shown.id()]);

        fx.engine.handle_entity_removed(shown.id());
        assert!(fx.engine.handle_player_join(PlayerId::new()).is_empty());
    }

    #[test]
    fn test_shutdown_cancels_everything() {
        let fx = Fixture::new();
        fx.engine.start();
        let npc = fx.spawn(0.0, 0.0);
        npc.walk_to(loc(20.0, 64.0, 0.0)).unwrap();
        assert_eq!(fx.scheduler.active_tasks(), 3);

        fx.engine.shutdown();

        assert!(!fx.engine.is_running());
        assert_eq!(fx.engine.npc_count(), 0);
        assert_eq!(fx.scheduler.active_tasks(), 0);
        assert!(npc.is_removed());
    }
}
