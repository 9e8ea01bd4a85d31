//! Session lookup, admission and expiry sweeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::session::{ClientState, Session, SessionSnapshot};
use crate::topic::PredefinedAliases;

/// Result of an expiry sweep. Lost sessions stay registered (their queues
/// keep accumulating); expired ones have been removed and need their
/// resources torn down by the caller.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub lost: Vec<Arc<Session>>,
    pub expired: Vec<Arc<Session>>,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    predefined: Arc<PredefinedAliases>,
    config: Arc<GatewayConfig>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            predefined: PredefinedAliases::from_config(&config.predefined_aliases),
            config,
        }
    }

    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(client_id).cloned()
    }

    /// Finds or admits a session for `client_id`. Returns the session and
    /// whether an existing one was resumed.
    ///
    /// # Errors
    /// `MaxSessionsReached` when admission would exceed the configured cap.
    pub fn create_or_resume(&self, client_id: &str) -> Result<(Arc<Session>, bool)> {
        if let Some(existing) = self.get(client_id) {
            return Ok((existing, true));
        }

        let mut sessions = self.sessions.write();
        // second look under the write lock
        if let Some(existing) = sessions.get(client_id) {
            return Ok((Arc::clone(existing), true));
        }
        if sessions.len() >= self.config.max_sessions {
            return Err(GatewayError::MaxSessionsReached(self.config.max_sessions));
        }

        let session = Arc::new(Session::new(
            client_id,
            Arc::clone(&self.predefined),
            &self.config,
        ));
        sessions.insert(client_id.to_string(), Arc::clone(&session));
        info!(client_id, "session created");
        Ok((session, false))
    }

    pub fn remove(&self, client_id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(client_id);
        if removed.is_some() {
            debug!(client_id, "session removed");
        }
        removed
    }

    #[must_use]
    pub fn predefined(&self) -> Arc<PredefinedAliases> {
        Arc::clone(&self.predefined)
    }

    #[must_use]
    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .read()
            .values()
            .map(|session| session.snapshot())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Walks every session once: keepalive overruns become LOST, expired
    /// sessions are removed. Queued traffic keeps accumulating for LOST
    /// sessions until queue-full or expiry.
    #[must_use]
    pub fn sweep(&self, now: Instant) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        let sessions = self.all();
        for session in sessions {
            let mut inner = session.lock();
            if inner.expired(now) {
                drop(inner);
                if self.remove(session.client_id()).is_some() {
                    outcome.expired.push(session);
                }
                continue;
            }
            if inner.keepalive_expired(&self.config, now)
                && inner.transition(ClientState::Lost).is_ok()
            {
                debug!(client_id = session.client_id(), "session lost (keepalive)");
                drop(inner);
                outcome.lost.push(session);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry(max_sessions: usize) -> SessionRegistry {
        SessionRegistry::new(Arc::new(
            GatewayConfig::default().with_max_sessions(max_sessions),
        ))
    }

    #[test]
    fn create_then_resume() {
        let registry = registry(4);
        let (first, resumed) = registry.create_or_resume("a").unwrap();
        assert!(!resumed);

        let (second, resumed) = registry.create_or_resume("a").unwrap();
        assert!(resumed);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn admission_cap() {
        let registry = registry(2);
        registry.create_or_resume("a").unwrap();
        registry.create_or_resume("b").unwrap();
        assert!(matches!(
            registry.create_or_resume("c"),
            Err(GatewayError::MaxSessionsReached(2))
        ));
        // resuming an admitted client still works at the cap
        assert!(registry.create_or_resume("a").is_ok());
    }

    #[test]
    fn sweep_marks_lost() {
        let registry = registry(4);
        let (session, _) = registry.create_or_resume("a").unwrap();
        {
            let mut inner = session.lock();
            inner.transition(ClientState::Active).unwrap();
            inner.keep_alive = Duration::from_secs(10);
        }

        let outcome = registry.sweep(Instant::now() + Duration::from_secs(16));
        assert_eq!(outcome.lost.len(), 1);
        assert!(outcome.expired.is_empty());
        assert_eq!(session.state(), ClientState::Lost);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sweep_removes_expired() {
        let registry = registry(4);
        let (session, _) = registry.create_or_resume("a").unwrap();
        {
            let mut inner = session.lock();
            inner.transition(ClientState::Active).unwrap();
            inner.session_expiry = 5;
        }

        let outcome = registry.sweep(Instant::now() + Duration::from_secs(6));
        assert_eq!(outcome.expired.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn sweep_leaves_healthy_sessions() {
        let registry = registry(4);
        let (session, _) = registry.create_or_resume("a").unwrap();
        {
            let mut inner = session.lock();
            inner.transition(ClientState::Active).unwrap();
            inner.keep_alive = Duration::from_secs(60);
        }

        let outcome = registry.sweep(Instant::now() + Duration::from_secs(10));
        assert!(outcome.lost.is_empty());
        assert!(outcome.expired.is_empty());
        assert_eq!(session.state(), ClientState::Active);
    }
}
