//! Client registry: identity -> outbound sink.

use crate::errors::VcError;
use crate::sink::ClientSink;
use std::collections::HashMap;
use uuid::Uuid;

/// Live client sessions keyed by identity.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    sessions: HashMap<String, ClientSink>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under the sink's identity.
    ///
    /// A previous session for the same identity whose sink is already
    /// revoked or closed is replaced; a live one is not.
    ///
    /// # Errors
    ///
    /// `DuplicateIdentity` if a live session holds the identity.
    pub fn register(&mut self, sink: ClientSink) -> Result<(), VcError> {
        let identity = sink.identity().to_string();
        if let Some(existing) = self.sessions.get(&identity) {
            if !existing.is_closed() {
                return Err(VcError::DuplicateIdentity(identity));
            }
        }
        self.sessions.insert(identity, sink);
        Ok(())
    }

    /// Remove the session for `client_id`. Idempotent.
    pub fn unregister(&mut self, client_id: &str) -> Option<ClientSink> {
        self.sessions.remove(client_id)
    }

    /// Remove the session only if it is still the one identified by
    /// `session_id`, so a stale connection cannot evict its replacement.
    pub fn unregister_session(&mut self, client_id: &str, session_id: Uuid) -> Option<ClientSink> {
        match self.sessions.get(client_id) {
            Some(sink) if sink.session_id() == session_id => self.sessions.remove(client_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<&ClientSink> {
        self.sessions.get(client_id)
    }

    #[must_use]
    pub fn contains(&self, client_id: &str) -> bool {
        self.sessions.contains_key(client_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cloned handles for every registered session.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ClientSink> {
        self.sessions.values().cloned().collect()
    }

    /// Cloned handles for sessions whose identity satisfies `eligible`.
    #[must_use]
    pub fn snapshot_where(&self, eligible: impl Fn(&str) -> bool) -> Vec<ClientSink> {
        self.sessions
            .iter()
            .filter(|(identity, _)| eligible(identity))
            .map(|(_, sink)| sink.clone())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn sink(id: &str) -> (ClientSink, mpsc::Receiver<crate::sink::Payload>) {
        ClientSink::channel(id, 8, CancellationToken::new())
    }

    #[test]
    fn test_register_rejects_live_duplicate() {
        let mut registry = ClientRegistry::new();
        let (first, _rx1) = sink("x1");
        let (second, _rx2) = sink("x1");

        registry.register(first).unwrap();
        assert_eq!(
            registry.register(second),
            Err(VcError::DuplicateIdentity("x1".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_replaces_revoked_session() {
        let mut registry = ClientRegistry::new();
        let (first, _rx1) = sink("x1");
        let (second, _rx2) = sink("x1");
        let second_id = second.session_id();

        registry.register(first.clone()).unwrap();
        first.revoke();
        registry.register(second).unwrap();

        assert_eq!(registry.get("x1").unwrap().session_id(), second_id);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut registry = ClientRegistry::new();
        let (s, _rx) = sink("x1");
        registry.register(s).unwrap();

        assert!(registry.unregister("x1").is_some());
        assert!(registry.unregister("x1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_session_ignores_stale_session() {
        let mut registry = ClientRegistry::new();
        let (old, _rx1) = sink("x1");
        let (new, _rx2) = sink("x1");
        let old_id = old.session_id();

        registry.register(old.clone()).unwrap();
        old.revoke();
        registry.register(new).unwrap();

        assert!(registry.unregister_session("x1", old_id).is_none());
        assert!(registry.contains("x1"));
    }

    #[test]
    fn test_snapshot_where_filters_identities() {
        let mut registry = ClientRegistry::new();
        let mut receivers = Vec::new();
        for id in ["voter", "watcher"] {
            let (s, rx) = sink(id);
            registry.register(s).unwrap();
            receivers.push(rx);
        }

        let voters = registry.snapshot_where(|id| id == "voter");
        assert_eq!(voters.len(), 1);
        assert_eq!(voters.first().map(ClientSink::identity), Some("voter"));
        assert_eq!(registry.snapshot().len(), 2);
    }
}
