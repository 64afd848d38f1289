//! Synchronized store for the single live session.
//!
//! At most one session exists process-wide. Every operation re-reads the
//! store at invocation time; nothing retains its own copy of connection state
//! across calls. Lock critical sections are short and never held across an
//! `.await`; readers clone out the cheap `Client` handle instead.

use std::{
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use engine_core::VerificationFlow;
use matrix_sdk::Client;

/// The single authenticated, connected state for one user/device pair.
#[derive(Debug, Clone)]
pub struct Session {
    /// Live connection handle (internally reference-counted, cheap to clone).
    pub client: Client,
    /// Authenticated user ID.
    pub user_id: String,
    /// Server-assigned device ID.
    pub device_id: String,
    /// On-disk store backing this session; erased on logout.
    pub storage_path: PathBuf,
    /// Active verification flow, if any.
    pub verification: Option<VerificationFlow>,
}

impl Session {
    /// Create a session with no active verification flow.
    pub fn new(
        client: Client,
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        storage_path: PathBuf,
    ) -> Self {
        Self {
            client,
            user_id: user_id.into(),
            device_id: device_id.into(),
            storage_path,
            verification: None,
        }
    }
}

/// Reader/writer access to the optional live session.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<Option<Session>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current session, if one is installed.
    pub fn get(&self) -> Option<Session> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install a session, replacing any previous one atomically.
    pub fn set(&self, session: Session) {
        *self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Remove the session, releasing the connection handle before returning.
    ///
    /// Returns the removed session so callers can finish cleanup (storage
    /// erasure) after the handle is no longer observable through the store.
    pub fn clear(&self) -> Option<Session> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Replace the active verification flow. No-op without a session.
    pub fn set_flow(&self, flow: VerificationFlow) {
        if let Some(session) = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            session.verification = Some(flow);
        }
    }

    /// Current verification flow, if any.
    pub fn flow(&self) -> Option<VerificationFlow> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|session| session.verification.clone())
    }

    /// Remove and return the active verification flow.
    ///
    /// Clearing is unconditional: it succeeds regardless of any remote call
    /// that may follow, so cancellation is locally irreversible.
    pub fn take_flow(&self) -> Option<VerificationFlow> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .and_then(|session| session.verification.take())
    }

    /// Mutate the active flow in place.
    pub fn with_flow_mut<T>(&self, f: impl FnOnce(&mut VerificationFlow) -> T) -> Option<T> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .and_then(|session| session.verification.as_mut())
            .map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn session_for(user_id: &str, device_id: &str) -> Session {
        // No store or network is touched when building against a fixed URL.
        let client = Client::builder()
            .homeserver_url("https://matrix.example.org")
            .build()
            .await
            .expect("client build");
        Session::new(
            client,
            user_id,
            device_id,
            PathBuf::from("/tmp/engine-test").join(user_id.trim_start_matches('@')),
        )
    }

    #[tokio::test]
    async fn replacing_the_session_drops_the_previous_identity() {
        let store = SessionStore::new();
        store.set(session_for("@alice:example.org", "ALICEDEV").await);
        store.set_flow(VerificationFlow::new("flow-1", "OTHERDEV"));
        assert!(store.flow().is_some());

        // Installing a second identity is an atomic swap: nothing of the
        // first session, its flow included, stays reachable.
        store.set(session_for("@bob:example.org", "BOBDEV").await);

        let current = store.get().expect("session installed");
        assert_eq!(current.user_id, "@bob:example.org");
        assert_eq!(current.device_id, "BOBDEV");
        assert!(store.flow().is_none());
    }

    #[tokio::test]
    async fn clear_releases_the_session() {
        let store = SessionStore::new();
        store.set(session_for("@alice:example.org", "ALICEDEV").await);

        let removed = store.clear().expect("session was installed");
        assert_eq!(removed.user_id, "@alice:example.org");
        assert!(store.get().is_none());
    }

    #[test]
    fn empty_store_has_no_session_or_flow() {
        let store = SessionStore::new();
        assert!(store.get().is_none());
        assert!(store.flow().is_none());
        assert!(store.clear().is_none());
    }

    #[test]
    fn flow_mutations_without_session_are_noops() {
        let store = SessionStore::new();
        store.set_flow(VerificationFlow::new("flow-1", "DEVICE2"));
        assert!(store.flow().is_none());
        assert!(store.take_flow().is_none());
        assert!(store.with_flow_mut(|_| ()).is_none());
    }
}
