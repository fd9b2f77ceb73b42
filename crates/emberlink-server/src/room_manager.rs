use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use emberlink_core::room_code::{CODE_ALPHABET, CODE_LENGTH, generate_room_code};
use emberlink_core::time::unix_millis_now;

/// Per-client sender for outbound JSON frames.
/// Bounded so a slow reader cannot grow server memory; all sends go
/// through `try_send` and are never awaited.
pub type ClientSender = mpsc::Sender<Bytes>;

/// Live connection handles for one room member.
#[derive(Clone)]
pub struct ClientLink {
    pub sender: ClientSender,
    /// Cancelled to force-close the member's connection: the socket task
    /// selects on this token, so cancellation produces a real disconnect
    /// rather than a silently orphaned client.
    pub shutdown: CancellationToken,
}

/// One room member. `link` is `None` for members registered through the
/// REST join check before their socket arrives.
struct Member {
    link: Option<ClientLink>,
}

struct RoomEntry {
    members: HashMap<String, Member>,
    created_at_ms: u64,
    last_activity: Instant,
}

/// Typed failures from room operations.
#[derive(Debug, PartialEq, Eq)]
pub enum RoomError {
    RoomNotFound(String),
}

impl std::fmt::Display for RoomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoomNotFound(code) => write!(f, "room not found: {code}"),
        }
    }
}

impl std::error::Error for RoomError {}

/// Point-in-time view of a room for the status endpoint.
#[derive(Debug)]
pub struct RoomStatus {
    pub peers: Vec<String>,
    pub created_at_ms: u64,
}

/// Owns every live room: code generation, membership, relay fan-out, and
/// idle eviction. Constructed per process (or per test) and shared behind
/// `Arc<RwLock<..>>`; all mutation is serialized by that lock.
pub struct RoomManager {
    rooms: HashMap<String, RoomEntry>,
    code_alphabet: String,
    code_length: usize,
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(CODE_ALPHABET, CODE_LENGTH)
    }
}

impl RoomManager {
    pub fn new(code_alphabet: impl Into<String>, code_length: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            code_alphabet: code_alphabet.into(),
            code_length,
        }
    }

    /// Create an empty room and return its code. Codes are drawn in a
    /// retry loop so they stay short and unpredictable; a collision with
    /// a live room just redraws.
    pub fn create_room(&mut self) -> String {
        let code = loop {
            let candidate = generate_room_code(&self.code_alphabet, self.code_length);
            if !self.rooms.contains_key(&candidate) {
                break candidate;
            }
        };
        self.rooms.insert(
            code.clone(),
            RoomEntry {
                members: HashMap::new(),
                created_at_ms: unix_millis_now(),
                last_activity: Instant::now(),
            },
        );
        code
    }

    /// Add a member to a room, returning the ids of the members already
    /// present (excluding the joiner) so the caller can open signaling to
    /// each. With `link: None` only membership bookkeeping happens; the
    /// REST join check uses this before a socket exists.
    ///
    /// A duplicate `client_id` silently replaces the prior send handle.
    pub fn join(
        &mut self,
        code: &str,
        client_id: &str,
        link: Option<ClientLink>,
    ) -> Result<Vec<String>, RoomError> {
        let entry = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;

        let peers: Vec<String> = entry
            .members
            .keys()
            .filter(|id| id.as_str() != client_id)
            .cloned()
            .collect();

        entry.members.insert(client_id.to_string(), Member { link });
        entry.last_activity = Instant::now();
        Ok(peers)
    }

    /// Remove a member. Returns `true` if the room was destroyed because
    /// it became empty. Leaving a non-member or an absent room is a
    /// no-op, not an error.
    pub fn leave(&mut self, code: &str, client_id: &str) -> bool {
        let Some(entry) = self.rooms.get_mut(code) else {
            return false;
        };
        if entry.members.remove(client_id).is_none() {
            return false;
        }
        if entry.members.is_empty() {
            self.rooms.remove(code);
            tracing::info!(room = code, "Room destroyed (last member left)");
            return true;
        }
        entry.last_activity = Instant::now();
        false
    }

    /// Push one pre-serialized frame to every linked member except
    /// `exclude`. `Bytes` makes the per-recipient clone free.
    ///
    /// Send outcomes are collected per recipient and dead handles are
    /// evicted after the loop, so one failing member never aborts
    /// delivery to the rest.
    pub fn broadcast(
        &mut self,
        code: &str,
        frame: Bytes,
        exclude: Option<&str>,
    ) -> Result<(), RoomError> {
        let entry = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;
        entry.last_activity = Instant::now();

        let mut dead: Vec<String> = Vec::new();
        for (id, member) in &entry.members {
            if exclude == Some(id.as_str()) {
                continue;
            }
            let Some(link) = member.link.as_ref() else {
                continue;
            };
            if let Err(e) = link.sender.try_send(frame.clone()) {
                tracing::debug!(
                    client_id = %id, room = code, error = %e,
                    "Dead peer in broadcast, evicting"
                );
                dead.push(id.clone());
            }
        }

        for id in &dead {
            if let Some(member) = entry.members.remove(id)
                && let Some(link) = member.link
            {
                link.shutdown.cancel();
            }
        }
        if !dead.is_empty() && entry.members.is_empty() {
            self.rooms.remove(code);
            tracing::info!(room = code, "Room destroyed (all members dead)");
        }
        Ok(())
    }

    /// Send one frame to a single member. Signaling is best-effort: an
    /// absent or unlinked target is silently skipped.
    pub fn relay_direct(&mut self, code: &str, to: &str, frame: Bytes) -> Result<(), RoomError> {
        let entry = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;
        entry.last_activity = Instant::now();

        if let Some(member) = entry.members.get(to)
            && let Some(link) = member.link.as_ref()
            && let Err(e) = link.sender.try_send(frame)
        {
            tracing::debug!(
                client_id = to, room = code, error = %e,
                "Failed direct relay (slow or disconnected target)"
            );
        }
        Ok(())
    }

    /// Remove a room unconditionally. Idempotent: deleting an absent
    /// code is a no-op.
    pub fn delete(&mut self, code: &str) {
        if self.rooms.remove(code).is_some() {
            tracing::debug!(room = code, "Room deleted");
        }
    }

    pub fn status(&self, code: &str) -> Option<RoomStatus> {
        self.rooms.get(code).map(|entry| RoomStatus {
            peers: entry.members.keys().cloned().collect(),
            created_at_ms: entry.created_at_ms,
        })
    }

    /// (live rooms, connected members) for the health endpoint.
    pub fn stats(&self) -> (usize, usize) {
        let connected = self
            .rooms
            .values()
            .flat_map(|e| e.members.values())
            .filter(|m| m.link.is_some())
            .count();
        (self.rooms.len(), connected)
    }

    /// Evict every room idle longer than `max_idle`, force-closing each
    /// member's connection. Returns the number of rooms removed. This is
    /// the only path that proactively terminates connections.
    pub fn sweep_idle(&mut self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_activity) > max_idle)
            .map(|(code, _)| code.clone())
            .collect();

        for code in &expired {
            if let Some(entry) = self.rooms.remove(code) {
                for (id, member) in entry.members {
                    if let Some(link) = member.link {
                        link.shutdown.cancel();
                        tracing::debug!(client_id = %id, room = %code, "Closed idle connection");
                    }
                }
                tracing::info!(room = %code, "Room expired (idle past TTL)");
            }
        }
        expired.len()
    }

    #[cfg(test)]
    pub fn room_exists(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberlink_core::room_code::is_valid_room_code;

    fn make_link() -> (ClientLink, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(256);
        (
            ClientLink {
                sender: tx,
                shutdown: CancellationToken::new(),
            },
            rx,
        )
    }

    #[test]
    fn create_room_returns_valid_code() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();
        assert!(is_valid_room_code(&code, CODE_ALPHABET, CODE_LENGTH));
        assert!(mgr.room_exists(&code));
    }

    #[test]
    fn created_codes_are_unique_among_live_rooms() {
        let mut mgr = RoomManager::default();
        let mut codes = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(codes.insert(mgr.create_room()));
        }
    }

    #[test]
    fn code_generation_redraws_on_collision() {
        // A 1-char code over a 2-char alphabet collides constantly; the
        // retry loop must still find the free code.
        let mut mgr = RoomManager::new("AB", 1);
        let first = mgr.create_room();
        let second = mgr.create_room();
        assert_ne!(first, second);
    }

    #[test]
    fn join_returns_peers_excluding_joiner() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();

        let (link1, _rx1) = make_link();
        let peers = mgr.join(&code, "u1", Some(link1)).unwrap();
        assert!(peers.is_empty());

        let (link2, _rx2) = make_link();
        let peers = mgr.join(&code, "u2", Some(link2)).unwrap();
        assert_eq!(peers, vec!["u1".to_string()]);
    }

    #[test]
    fn join_nonexistent_room_fails_without_creating_it() {
        let mut mgr = RoomManager::default();
        let (link, _rx) = make_link();
        let result = mgr.join("ZZZZZZ", "u1", Some(link));
        assert!(matches!(result, Err(RoomError::RoomNotFound(_))));
        assert!(!mgr.room_exists("ZZZZZZ"));
    }

    #[test]
    fn join_without_link_registers_membership_only() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();
        mgr.join(&code, "u1", None).unwrap();

        let status = mgr.status(&code).unwrap();
        assert_eq!(status.peers, vec!["u1".to_string()]);
        // no linked connection yet
        assert_eq!(mgr.stats(), (1, 0));
    }

    #[test]
    fn duplicate_client_id_overwrites_prior_handle() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();

        let (old_link, mut old_rx) = make_link();
        mgr.join(&code, "u1", Some(old_link)).unwrap();
        let (new_link, mut new_rx) = make_link();
        mgr.join(&code, "u1", Some(new_link)).unwrap();

        let (other, _rx) = make_link();
        mgr.join(&code, "u2", Some(other)).unwrap();
        mgr.broadcast(&code, Bytes::from_static(b"hi"), Some("u2"))
            .unwrap();

        assert_eq!(new_rx.try_recv().unwrap(), Bytes::from_static(b"hi"));
        assert!(old_rx.try_recv().is_err());
        // still one member slot for u1
        assert_eq!(mgr.status(&code).unwrap().peers.len(), 2);
    }

    #[test]
    fn delete_is_unconditional_and_idempotent() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();
        let (link, _rx) = make_link();
        mgr.join(&code, "u1", Some(link)).unwrap();

        mgr.delete(&code);
        assert!(!mgr.room_exists(&code));
        // deleting again (or a code that never existed) is a no-op
        mgr.delete(&code);
        mgr.delete("ZZZZZZ");
    }

    #[test]
    fn leave_last_member_destroys_room_immediately() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();
        let (link, _rx) = make_link();
        mgr.join(&code, "u1", Some(link)).unwrap();

        assert!(mgr.leave(&code, "u1"));
        assert!(!mgr.room_exists(&code));
        assert!(mgr.status(&code).is_none());
    }

    #[test]
    fn leave_keeps_room_while_members_remain() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();
        let (link1, _rx1) = make_link();
        let (link2, _rx2) = make_link();
        mgr.join(&code, "u1", Some(link1)).unwrap();
        mgr.join(&code, "u2", Some(link2)).unwrap();

        assert!(!mgr.leave(&code, "u2"));
        assert!(mgr.room_exists(&code));
        assert_eq!(mgr.status(&code).unwrap().peers, vec!["u1".to_string()]);
    }

    #[test]
    fn leave_is_idempotent() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();
        let (link, _rx) = make_link();
        mgr.join(&code, "u1", Some(link)).unwrap();

        assert!(!mgr.leave(&code, "ghost"));
        assert!(!mgr.leave("ZZZZZZ", "u1"));
        assert!(mgr.room_exists(&code));
    }

    #[test]
    fn broadcast_excludes_sender_and_reaches_others_once() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();
        let (link1, mut rx1) = make_link();
        let (link2, mut rx2) = make_link();
        let (link3, mut rx3) = make_link();
        mgr.join(&code, "u1", Some(link1)).unwrap();
        mgr.join(&code, "u2", Some(link2)).unwrap();
        mgr.join(&code, "u3", Some(link3)).unwrap();

        mgr.broadcast(&code, Bytes::from_static(b"hello"), Some("u1"))
            .unwrap();

        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), Bytes::from_static(b"hello"));
        assert!(rx2.try_recv().is_err());
        assert_eq!(rx3.try_recv().unwrap(), Bytes::from_static(b"hello"));
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn broadcast_evicts_dead_peer_without_aborting_delivery() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();

        let (dead_link, dead_rx) = make_link();
        let dead_token = dead_link.shutdown.clone();
        let (live_link, mut live_rx) = make_link();
        mgr.join(&code, "dead", Some(dead_link)).unwrap();
        mgr.join(&code, "live", Some(live_link)).unwrap();
        drop(dead_rx); // channel closed, try_send will fail

        mgr.broadcast(&code, Bytes::from_static(b"x"), None).unwrap();

        assert_eq!(live_rx.try_recv().unwrap(), Bytes::from_static(b"x"));
        let status = mgr.status(&code).unwrap();
        assert_eq!(status.peers, vec!["live".to_string()]);
        assert!(dead_token.is_cancelled());
    }

    #[test]
    fn broadcast_on_absent_room_errors() {
        let mut mgr = RoomManager::default();
        let result = mgr.broadcast("ZZZZZZ", Bytes::from_static(b"x"), None);
        assert!(matches!(result, Err(RoomError::RoomNotFound(_))));
    }

    #[test]
    fn relay_direct_sends_to_target_only() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();
        let (link1, mut rx1) = make_link();
        let (link2, mut rx2) = make_link();
        mgr.join(&code, "u1", Some(link1)).unwrap();
        mgr.join(&code, "u2", Some(link2)).unwrap();

        mgr.relay_direct(&code, "u2", Bytes::from_static(b"offer"))
            .unwrap();

        assert_eq!(rx2.try_recv().unwrap(), Bytes::from_static(b"offer"));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn relay_direct_to_absent_target_is_silent() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();
        let (link, mut rx) = make_link();
        mgr.join(&code, "u1", Some(link)).unwrap();

        mgr.relay_direct(&code, "ghost", Bytes::from_static(b"offer"))
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn sweep_removes_stale_rooms_and_closes_connections() {
        let mut mgr = RoomManager::default();
        let stale = mgr.create_room();
        let fresh = mgr.create_room();

        let (link, _rx) = make_link();
        let token = link.shutdown.clone();
        mgr.join(&stale, "u1", Some(link)).unwrap();

        mgr.rooms.get_mut(&stale).unwrap().last_activity =
            Instant::now() - Duration::from_secs(600);

        let removed = mgr.sweep_idle(Duration::from_secs(300));
        assert_eq!(removed, 1);
        assert!(!mgr.room_exists(&stale));
        assert!(mgr.room_exists(&fresh));
        assert!(token.is_cancelled());
    }

    #[test]
    fn sweep_spares_rooms_within_ttl() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();
        let (link, _rx) = make_link();
        mgr.join(&code, "u1", Some(link)).unwrap();

        assert_eq!(mgr.sweep_idle(Duration::from_secs(300)), 0);
        assert!(mgr.room_exists(&code));
    }

    #[test]
    fn relay_refreshes_activity() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();
        let (link, _rx) = make_link();
        mgr.join(&code, "u1", Some(link)).unwrap();

        // age the room, then let a relay touch it back to life
        mgr.rooms.get_mut(&code).unwrap().last_activity =
            Instant::now() - Duration::from_secs(600);
        mgr.broadcast(&code, Bytes::from_static(b"x"), None).unwrap();

        assert_eq!(mgr.sweep_idle(Duration::from_secs(300)), 0);
        assert!(mgr.room_exists(&code));
    }

    #[test]
    fn status_reports_peers_and_creation_time() {
        let mut mgr = RoomManager::default();
        let code = mgr.create_room();
        let (link, _rx) = make_link();
        mgr.join(&code, "u1", Some(link)).unwrap();
        mgr.join(&code, "u2", None).unwrap();

        let status = mgr.status(&code).unwrap();
        let mut peers = status.peers;
        peers.sort();
        assert_eq!(peers, vec!["u1".to_string(), "u2".to_string()]);
        assert!(status.created_at_ms > 0);
    }
}
