//! Session registry keyed by remote identity
//!
//! The registry owns every live [`PeerSession`]. All access goes through
//! the room coordinator's event loop, so no internal locking is needed;
//! completions that raced a removal simply fail their registry lookup.

use super::session::PeerSession;
use super::transport::PeerTransport;
use log::{debug, warn};
use std::collections::HashMap;

pub struct PeerRegistry<T: PeerTransport> {
    sessions: HashMap<String, PeerSession<T>>,
}

impl<T: PeerTransport> PeerRegistry<T> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Insert a session, returning any session previously registered under
    /// the same identity so the caller can close it
    pub fn insert(&mut self, session: PeerSession<T>) -> Option<PeerSession<T>> {
        let remote_id = session.remote_id().to_string();
        let previous = self.sessions.insert(remote_id.clone(), session);
        if previous.is_some() {
            warn!("Replaced existing session for peer {}", remote_id);
        } else {
            debug!("Registered session for peer {} ({} total)", remote_id, self.sessions.len());
        }
        previous
    }

    pub fn get_mut(&mut self, remote_id: &str) -> Option<&mut PeerSession<T>> {
        self.sessions.get_mut(remote_id)
    }

    pub fn get(&self, remote_id: &str) -> Option<&PeerSession<T>> {
        self.sessions.get(remote_id)
    }

    pub fn contains(&self, remote_id: &str) -> bool {
        self.sessions.contains_key(remote_id)
    }

    /// Remove and hand back a session for teardown
    pub fn remove(&mut self, remote_id: &str) -> Option<PeerSession<T>> {
        let session = self.sessions.remove(remote_id);
        if session.is_some() {
            debug!("Removed session for peer {} ({} left)", remote_id, self.sessions.len());
        }
        session
    }

    /// Remove every session (room exit), handing them back for teardown
    pub fn drain(&mut self) -> Vec<PeerSession<T>> {
        self.sessions.drain().map(|(_, session)| session).collect()
    }

    pub fn peer_ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<T: PeerTransport> Default for PeerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::transport::fake::FakeTransport;
    use super::super::PeerRole;
    use super::*;

    fn session(remote_id: &str) -> PeerSession<FakeTransport> {
        PeerSession::new(
            remote_id.to_string(),
            PeerRole::Caller,
            FakeTransport::default(),
            4,
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = PeerRegistry::new();
        assert!(registry.insert(session("alice")).is_none());
        assert!(registry.insert(session("bob")).is_none());

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("alice"));
        assert!(registry.get_mut("alice").is_some());
        assert!(registry.get("carol").is_none());
    }

    #[test]
    fn test_insert_replaces_same_identity() {
        let mut registry = PeerRegistry::new();
        assert!(registry.insert(session("alice")).is_none());
        let previous = registry.insert(session("alice"));
        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_hands_session_back() {
        let mut registry = PeerRegistry::new();
        registry.insert(session("alice"));

        let removed = registry.remove("alice");
        assert!(removed.is_some());
        assert_eq!(removed.as_ref().map(|s| s.remote_id()), Some("alice"));
        assert!(registry.remove("alice").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drain_empties_registry() {
        let mut registry = PeerRegistry::new();
        registry.insert(session("alice"));
        registry.insert(session("bob"));

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }
}
