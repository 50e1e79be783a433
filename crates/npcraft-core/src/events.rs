//! NPC events and the per-NPC event bus.
//!
//! Handlers run synchronously on the tick that raised the event, in
//! registration order. A handler that fails or panics is logged and skipped;
//! the remaining handlers still run.

use ahash::AHashMap;
use glam::DVec3;
use npcraft_common::{AgentId, Location, PlayerId};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

use crate::host::{DamageCause, Hand};

/// Kind of an NPC event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NpcEventKind {
    /// Player right-clicked the NPC
    RightClicked,
    /// Sneaking player right-clicked the NPC
    ShiftRightClicked,
    /// Player hit the NPC for negligible damage
    LeftClicked,
    /// Sneaking player hit the NPC for negligible damage
    ShiftLeftClicked,
    /// NPC took real damage
    Damaged,
    /// Patrol waypoint reached
    PatrolPointReached,
    /// Full patrol loop completed
    PatrolCycleComplete,
    /// Nearby player started sneaking
    PlayerSneakingNearby,
    /// Nearby player swung their arm
    PlayerPunchingNearby,
    /// Player interacted at a point on the NPC
    PlayerInteractAt,
}

impl NpcEventKind {
    /// Check if handlers of this kind need proximity scanning.
    #[must_use]
    pub const fn is_proximity(self) -> bool {
        matches!(self, Self::PlayerSneakingNearby | Self::PlayerPunchingNearby)
    }

    /// Get all event kinds.
    #[must_use]
    pub const fn all() -> [Self; 10] {
        [
            Self::RightClicked,
            Self::ShiftRightClicked,
            Self::LeftClicked,
            Self::ShiftLeftClicked,
            Self::Damaged,
            Self::PatrolPointReached,
            Self::PatrolCycleComplete,
            Self::PlayerSneakingNearby,
            Self::PlayerPunchingNearby,
            Self::PlayerInteractAt,
        ]
    }
}

/// Event-specific data.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Right click
    RightClicked {
        /// Hand used
        hand: Hand,
    },
    /// Right click while sneaking
    ShiftRightClicked {
        /// Hand used
        hand: Hand,
    },
    /// Attack gesture
    LeftClicked {
        /// Reported damage
        damage: f64,
    },
    /// Attack gesture while sneaking
    ShiftLeftClicked {
        /// Reported damage
        damage: f64,
    },
    /// Real damage
    Damaged {
        /// Raw damage
        damage: f64,
        /// Damage after reductions
        final_damage: f64,
        /// Cause reported by the host
        cause: DamageCause,
    },
    /// Patrol waypoint reached
    PatrolPointReached {
        /// The waypoint that was reached
        location: Location,
        /// Index of the waypoint in the patrol loop
        index: usize,
    },
    /// Patrol loop finished
    PatrolCycleComplete {
        /// Number of completed cycles, starting at 1
        cycle: u32,
    },
    /// Sneak started nearby
    PlayerSneakingNearby {
        /// Player distance from the NPC
        distance: f64,
        /// Player location
        location: Location,
    },
    /// Swing nearby
    PlayerPunchingNearby {
        /// Player distance from the NPC
        distance: f64,
        /// Player location
        location: Location,
    },
    /// Interaction at a point
    PlayerInteractAt {
        /// Clicked point relative to the NPC
        position: DVec3,
        /// Hand used
        hand: Hand,
    },
}

impl EventPayload {
    /// Kind of this payload.
    #[must_use]
    pub const fn kind(&self) -> NpcEventKind {
        match self {
            Self::RightClicked { .. } => NpcEventKind::RightClicked,
            Self::ShiftRightClicked { .. } => NpcEventKind::ShiftRightClicked,
            Self::LeftClicked { .. } => NpcEventKind::LeftClicked,
            Self::ShiftLeftClicked { .. } => NpcEventKind::ShiftLeftClicked,
            Self::Damaged { .. } => NpcEventKind::Damaged,
            Self::PatrolPointReached { .. } => NpcEventKind::PatrolPointReached,
            Self::PatrolCycleComplete { .. } => NpcEventKind::PatrolCycleComplete,
            Self::PlayerSneakingNearby { .. } => NpcEventKind::PlayerSneakingNearby,
            Self::PlayerPunchingNearby { .. } => NpcEventKind::PlayerPunchingNearby,
            Self::PlayerInteractAt { .. } => NpcEventKind::PlayerInteractAt,
        }
    }
}

/// An event raised for one NPC.
#[derive(Debug, Clone, PartialEq)]
pub struct NpcEvent {
    npc: AgentId,
    player: Option<PlayerId>,
    payload: EventPayload,
}

impl NpcEvent {
    /// Creates an event.
    #[must_use]
    pub const fn new(npc: AgentId, player: Option<PlayerId>, payload: EventPayload) -> Self {
        Self {
            npc,
            player,
            payload,
        }
    }

    /// NPC the event belongs to.
    #[must_use]
    pub const fn npc(&self) -> AgentId {
        self.npc
    }

    /// Player that triggered the event, if any.
    #[must_use]
    pub const fn player(&self) -> Option<PlayerId> {
        self.player
    }

    /// Event kind.
    #[must_use]
    pub const fn kind(&self) -> NpcEventKind {
        self.payload.kind()
    }

    /// Event data.
    #[must_use]
    pub const fn payload(&self) -> &EventPayload {
        &self.payload
    }
}

/// Registered event handler.
pub type EventHandler = Arc<dyn Fn(&NpcEvent) -> anyhow::Result<()> + Send + Sync>;

/// Per-NPC mapping from event kind to handlers.
#[derive(Default)]
pub struct EventBus {
    handlers: AHashMap<NpcEventKind, Vec<EventHandler>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<(NpcEventKind, usize)> = NpcEventKind::all()
            .into_iter()
            .map(|kind| (kind, self.count(kind)))
            .filter(|(_, n)| *n > 0)
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler for `kind`.
    pub fn on(&mut self, kind: NpcEventKind, handler: EventHandler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Removes every handler for `kind`, returning how many were removed.
    pub fn remove(&mut self, kind: NpcEventKind) -> usize {
        self.handlers.remove(&kind).map_or(0, |list| list.len())
    }

    /// Removes all handlers.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Number of handlers for `kind`.
    #[must_use]
    pub fn count(&self, kind: NpcEventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Check if any proximity-class handler is registered.
    #[must_use]
    pub fn has_proximity_handlers(&self) -> bool {
        self.handlers
            .iter()
            .any(|(kind, list)| kind.is_proximity() && !list.is_empty())
    }

    /// Snapshot of the handlers for `kind`, in call order.
    #[must_use]
    pub fn handlers(&self, kind: NpcEventKind) -> Vec<EventHandler> {
        self.handlers.get(&kind).cloned().unwrap_or_default()
    }

    /// Runs every handler for the event's kind. Returns how many succeeded.
    pub fn dispatch(&self, event: &NpcEvent) -> usize {
        dispatch_to(&self.handlers(event.kind()), event)
    }
}

/// Runs handlers in order, isolating failures.
pub fn dispatch_to(handlers: &[EventHandler], event: &NpcEvent) -> usize {
    let mut succeeded = 0;
    for handler in handlers {
        match catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(Ok(())) => succeeded += 1,
            Ok(Err(e)) => warn!(
                "Handler for {:?} on NPC {} failed: {e:#}",
                event.kind(),
                event.npc()
            ),
            Err(_) => warn!(
                "Handler for {:?} on NPC {} panicked",
                event.kind(),
                event.npc()
            ),
        }
    }
    succeeded
}
