//! # npcraft Core
//!
//! NPC movement and interaction engine for a voxel game server.
//!
//! This crate provides:
//! - Host traits for voxel queries, entities and scheduling
//! - A* pathfinding with jump/drop limits and a straight-line fallback
//! - Per-NPC motion state machine (walk, walk path, patrol, pause)
//! - Per-NPC event bus with ordered, isolated handlers
//! - Proximity engine for look-at, sneak and punch detection
//! - In-memory mock host for tests and simulation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod events;
pub mod host;
pub mod mock;
pub mod motion;
pub mod npc;
pub mod pathfinding;
pub mod proximity;
pub mod registry;
pub mod scheduler;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::events::*;
    pub use crate::host::*;
    pub use crate::mock::*;
    pub use crate::motion::*;
    pub use crate::npc::*;
    pub use crate::pathfinding::*;
    pub use crate::proximity::*;
    pub use crate::registry::*;
    pub use crate::scheduler::*;
    pub use npcraft_common::prelude::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    const W: WorldId = WorldId::new(7);

    #[test]
    fn test_patrol_scenario_end_to_end() {
        let host = Arc::new(MockHost::flat(W, 63));
        let scheduler = Arc::new(TickScheduler::new());
        let engine = ProximityEngine::new(
            Arc::clone(&host) as Arc<dyn HostWorld>,
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            NpcConfig::default(),
        );
        engine.start();

        let id = AgentId::new();
        host.spawn_entity(id, Location::new(W, 0.0, 64.0, 0.0));
        let npc = engine.spawn_npc(id).unwrap();

        let log: Arc<Mutex<Vec<EventPayload>>> = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            NpcEventKind::PatrolPointReached,
            NpcEventKind::PatrolCycleComplete,
        ] {
            let log = Arc::clone(&log);
            npc.on_event(kind, move |event| {
                log.lock().push(event.payload().clone());
                Ok(())
            });
        }

        let points = vec![
            Location::new(W, 5.0, 64.0, 0.0),
            Location::new(W, 5.0, 64.0, 5.0),
            Location::new(W, 0.0, 64.0, 5.0),
        ];
        npc.start_patrolling(points.clone()).unwrap();

        let mut ticks = 0;
        while ticks < 500
            && !log
                .lock()
                .iter()
                .any(|p| matches!(p, EventPayload::PatrolCycleComplete { .. }))
        {
            scheduler.tick();
            ticks += 1;
        }

        let expected = vec![
            EventPayload::PatrolPointReached { location: points[0], index: 0 },
            EventPayload::PatrolPointReached { location: points[1], index: 1 },
            EventPayload::PatrolPointReached { location: points[2], index: 2 },
            EventPayload::PatrolCycleComplete { cycle: 1 },
        ];
        assert_eq!(*log.lock(), expected);
        assert!(npc.is_patrolling());
        assert_eq!(npc.motion().target(), Some(&points[0]));

        let before = npc.location().unwrap();
        scheduler.run_ticks(4);
        let after = npc.location().unwrap();
        assert!(after.distance(&points[0]) < before.distance(&points[0]));
    }
}
