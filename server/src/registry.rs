//! Client membership tracking and round-start id compaction.
//!
//! The registry is the only owner of the active session list. It hands out
//! provisional ids on admission and reassigns every id to a dense `1..N`
//! range when a round starts, so board markers and score entries never have
//! to account for ids of participants who left between rounds. The cost of
//! that choice is that an id is not a stable identity across rounds; only
//! the display name is durable, and clients recover their own id from the
//! id-to-name map broadcast after each round start.

use crate::session::ClientSession;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;

/// Pure id assignment: maps an ordered list of display names onto the dense
/// id range `1..=N`. Invoked only at round-start boundaries.
pub fn compact_id_map(names: &[String]) -> Vec<(u32, String)> {
    names
        .iter()
        .enumerate()
        .map(|(index, name)| (index as u32 + 1, name.clone()))
        .collect()
}

/// The set of live sessions, in admission order.
///
/// Guarded by its own lock (held by the game server), distinct from the
/// round-state lock, so membership reads during broadcast never contend
/// with claim resolution.
pub struct ClientRegistry {
    next_id: u32,
    members: Vec<Arc<ClientSession>>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            members: Vec::new(),
        }
    }

    /// Registers a freshly accepted connection and assigns it a provisional
    /// id, unique among current members until the next compaction.
    pub fn admit(&mut self, writer: OwnedWriteHalf, addr: SocketAddr) -> Arc<ClientSession> {
        let id = self.next_id;
        self.next_id += 1;
        let session = Arc::new(ClientSession::new(id, addr, writer));
        info!("Client {id} connected from {addr}");
        self.members.push(Arc::clone(&session));
        session
    }

    /// Removes a session from membership. Identity is the session object
    /// itself, not its id, because ids are reassigned between rounds.
    pub fn remove(&mut self, session: &Arc<ClientSession>) -> bool {
        let before = self.members.len();
        self.members.retain(|member| !Arc::ptr_eq(member, session));
        before != self.members.len()
    }

    /// Stable snapshot of all active sessions, for fan-out without holding
    /// the registry lock across socket writes.
    pub fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.members
            .iter()
            .filter(|session| session.is_active())
            .cloned()
            .collect()
    }

    /// Active sessions that have completed JOIN, as `(id, name)` pairs in
    /// registry order. This is the participant set for barriers and rounds.
    pub fn named_roster(&self) -> Vec<(u32, String)> {
        self.members
            .iter()
            .filter(|session| session.is_active())
            .filter_map(|session| session.name().map(|name| (session.id(), name)))
            .collect()
    }

    pub fn named_active_count(&self) -> usize {
        self.named_roster().len()
    }

    /// True if another active, named session already holds `name`. A name
    /// whose holder has disconnected is deliberately free for the taking.
    pub fn name_in_use(&self, name: &str, requester: &Arc<ClientSession>) -> bool {
        self.members
            .iter()
            .filter(|session| session.is_active() && !Arc::ptr_eq(session, requester))
            .any(|session| session.name().as_deref() == Some(name))
    }

    /// Binds `name` to `session` unless another active session already holds
    /// it. Check and bind form one critical section under the registry lock,
    /// so two concurrent JOINs racing on the same name cannot both win.
    pub fn try_bind_name(&mut self, name: &str, session: &Arc<ClientSession>) -> bool {
        if self.name_in_use(name, session) {
            return false;
        }
        session.set_name(name);
        true
    }

    /// Reassigns ids for a new round: active named participants get the
    /// dense range `1..=N` in registry order, remaining active sessions are
    /// renumbered after them so ids stay unique within the member list, and
    /// the admission counter continues past everything assigned here.
    /// Returns the round roster.
    pub fn compact_ids(&mut self) -> Vec<(u32, String, Arc<ClientSession>)> {
        let participants: Vec<Arc<ClientSession>> = self
            .members
            .iter()
            .filter(|session| session.is_active() && session.name().is_some())
            .cloned()
            .collect();

        let names: Vec<String> = participants
            .iter()
            .filter_map(|session| session.name())
            .collect();
        let id_map = compact_id_map(&names);

        let mut roster = Vec::with_capacity(participants.len());
        for (session, (id, name)) in participants.into_iter().zip(id_map) {
            session.set_id(id);
            roster.push((id, name, session));
        }

        let mut next = roster.len() as u32 + 1;
        for session in &self.members {
            if session.is_active() && session.name().is_none() {
                session.set_id(next);
                next += 1;
            }
        }
        self.next_id = next;

        roster
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
