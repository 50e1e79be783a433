//! NPC registry with its tracked, proximity and visibility views.
//!
//! Views are kept in insertion order and scans always work on a snapshot, so
//! handlers may add or remove NPCs while a scan is dispatching.

use ahash::AHashMap;
use npcraft_common::{AgentId, EntityHandle, NpcraftError, NpcraftResult};

use crate::npc::Npc;

struct TrackedNpc {
    npc: Npc,
    handle: Option<EntityHandle>,
}

/// All NPCs owned by one engine.
#[derive(Default)]
pub struct NpcRegistry {
    order: Vec<AgentId>,
    entries: AHashMap<AgentId, TrackedNpc>,
    monitored: Vec<AgentId>,
    visibility: Vec<AgentId>,
}

impl std::fmt::Debug for NpcRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NpcRegistry")
            .field("tracked", &self.order.len())
            .field("monitored", &self.monitored.len())
            .field("visibility", &self.visibility.len())
            .finish()
    }
}

impl NpcRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an NPC to the tracked view.
    pub fn insert(&mut self, npc: Npc, handle: Option<EntityHandle>) -> NpcraftResult<()> {
        let id = npc.id();
        if self.entries.contains_key(&id) {
            return Err(NpcraftError::AlreadyTracked(id));
        }
        self.order.push(id);
        self.entries.insert(id, TrackedNpc { npc, handle });
        Ok(())
    }

    /// Remove an NPC from every view.
    pub fn remove(&mut self, id: AgentId) -> Option<Npc> {
        let entry = self.entries.remove(&id)?;
        self.order.retain(|other| *other != id);
        self.monitored.retain(|other| *other != id);
        self.visibility.retain(|other| *other != id);
        Some(entry.npc)
    }

    /// Remove every NPC, returning them in insertion order.
    pub fn drain(&mut self) -> Vec<Npc> {
        self.monitored.clear();
        self.visibility.clear();
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .map(|entry| entry.npc)
            .collect()
    }

    /// Look up an NPC.
    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<Npc> {
        self.entries.get(&id).map(|entry| entry.npc.clone())
    }

    /// Check if an NPC is tracked.
    #[must_use]
    pub fn contains(&self, id: AgentId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of tracked NPCs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if no NPCs are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Snapshot of all tracked NPCs.
    #[must_use]
    pub fn tracked(&self) -> Vec<Npc> {
        self.snapshot(&self.order)
    }

    /// Snapshot of the proximity-monitored NPCs.
    #[must_use]
    pub fn monitored(&self) -> Vec<Npc> {
        self.snapshot(&self.monitored)
    }

    fn snapshot(&self, ids: &[AgentId]) -> Vec<Npc> {
        ids.iter()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| entry.npc.clone())
            .collect()
    }

    /// Check if an NPC is in the proximity view.
    #[must_use]
    pub fn is_monitored(&self, id: AgentId) -> bool {
        self.monitored.contains(&id)
    }

    /// Add or remove a tracked NPC from the proximity view.
    pub fn set_monitored(&mut self, id: AgentId, monitored: bool) {
        set_membership(&self.entries, &mut self.monitored, id, monitored);
    }

    /// Add or remove a tracked NPC from the visibility view.
    pub fn set_visibility_managed(&mut self, id: AgentId, managed: bool) -> bool {
        set_membership(&self.entries, &mut self.visibility, id, managed)
    }

    /// Ids in the visibility view.
    #[must_use]
    pub fn visibility_managed(&self) -> Vec<AgentId> {
        self.visibility.clone()
    }

    /// Last handle recorded for an NPC.
    #[must_use]
    pub fn cached_handle(&self, id: AgentId) -> Option<EntityHandle> {
        self.entries.get(&id).and_then(|entry| entry.handle)
    }

    /// Record a fresh handle for an NPC.
    pub fn cache_handle(&mut self, id: AgentId, handle: EntityHandle) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.handle = Some(handle);
        }
    }
}

fn set_membership(
    entries: &AHashMap<AgentId, TrackedNpc>,
    view: &mut Vec<AgentId>,
    id: AgentId,
    member: bool,
) -> bool {
    if !entries.contains_key(&id) {
        return false;
    }
    let present = view.contains(&id);
    if member && !present {
        view.push(id);
    } else if !member && present {
        view.retain(|other| *other != id);
    }
    true
}
