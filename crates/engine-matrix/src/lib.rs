//! matrix-sdk integration for the messaging client engine.
//!
//! [`Engine`] is the request/response facade handed to presentation layers:
//! one authenticated session, one-shot sync, paginated encryption-aware
//! history retrieval, and the interactive device-verification flow. All
//! state lives in the synchronized [`SessionStore`]; conflicting operations
//! are serialized rather than raced.

use std::path::PathBuf;

use engine_core::{
    CompletionWaitPolicy, EngineError, LoginOutcome, MessagePage, PaginationCursor, RoomInfo,
    ShortCode, VerificationStatus,
};
use tokio::sync::Mutex;

/// Session lifecycle: login, restore, logout.
pub mod auth;
/// Tracing bootstrap.
pub mod logging;
/// Identifier parsing and SDK error wrapping.
pub mod map;
/// Synchronized store for the single live session.
pub mod session;
/// One-shot incremental synchronization.
pub mod sync;
/// Room list, history pagination, and message sending.
pub mod timeline;
/// Device-verification engine.
pub mod verify;

pub use session::{Session, SessionStore};
pub use sync::SyncGate;

/// Client engine facade.
///
/// All methods are async and may be invoked concurrently; session mutations
/// (login/logout) are serialized through an auth gate and sync requests
/// through a sync gate, so the second conflicting caller waits instead of
/// corrupting the session store.
#[derive(Debug)]
pub struct Engine {
    data_dir: PathBuf,
    store: SessionStore,
    auth_gate: Mutex<()>,
    sync_gate: SyncGate,
    wait_policy: CompletionWaitPolicy,
}

impl Engine {
    /// Create an engine storing per-identity session data under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            store: SessionStore::new(),
            auth_gate: Mutex::new(()),
            sync_gate: SyncGate::default(),
            wait_policy: CompletionWaitPolicy::default(),
        }
    }

    /// Authenticate and install the single live session.
    pub async fn login(
        &self,
        server_url: &str,
        user_identifier: &str,
        secret: &str,
    ) -> Result<LoginOutcome, EngineError> {
        let _serialized = self.auth_gate.lock().await;
        auth::login(&self.store, &self.data_dir, server_url, user_identifier, secret).await
    }

    /// Current identity, if a session is installed. Never fails.
    pub async fn restore_session(&self) -> Option<String> {
        auth::restore_session(&self.store)
    }

    /// Invalidate remotely (best effort) and clear all local session state.
    pub async fn logout(&self) -> Result<String, EngineError> {
        let _serialized = self.auth_gate.lock().await;
        auth::logout(&self.store).await
    }

    /// Perform exactly one bounded delta pull.
    pub async fn sync_once(&self) -> Result<String, EngineError> {
        sync::sync_once(&self.store, &self.sync_gate).await?;
        Ok("Synced successfully".to_owned())
    }

    /// Joined rooms for the current user.
    pub async fn list_rooms(&self) -> Result<Vec<RoomInfo>, EngineError> {
        timeline::list_rooms(&self.store).await
    }

    /// Fetch one backward page of room history.
    pub async fn fetch_page(
        &self,
        room_id: &str,
        limit: u16,
        cursor: Option<PaginationCursor>,
    ) -> Result<MessagePage, EngineError> {
        timeline::fetch_page(&self.store, room_id, limit, cursor).await
    }

    /// Send a plain-text message; returns the event ID.
    pub async fn send_message(&self, room_id: &str, body: &str) -> Result<String, EngineError> {
        timeline::send_message(&self.store, room_id, body).await
    }

    /// Account trust summary.
    pub async fn verification_status(&self) -> Result<VerificationStatus, EngineError> {
        verify::status(&self.store).await
    }

    /// Start the interactive verification flow against another device.
    pub async fn request_verification(&self) -> Result<String, EngineError> {
        verify::request_verification(&self.store, &self.sync_gate).await
    }

    /// Poll for short codes; `Ok(None)` means keep polling.
    ///
    /// Presentation adapters exposing a codes-or-error shape map `Ok(None)`
    /// to their "not ready" error string; terminal outcomes (cancelled,
    /// unsupported, no active flow) already arrive as errors with stable
    /// codes.
    pub async fn poll_short_codes(&self) -> Result<Option<Vec<ShortCode>>, EngineError> {
        verify::poll_short_codes(&self.store).await
    }

    /// Confirm the short codes match.
    pub async fn confirm_match(&self) -> Result<String, EngineError> {
        verify::confirm_match(&self.store, &self.sync_gate, self.wait_policy).await
    }

    /// Cancel the active verification flow.
    pub async fn cancel_verification(&self) -> Result<String, EngineError> {
        verify::cancel(&self.store).await
    }

    /// Mark the active flow timed out after caller-side polling exhaustion.
    ///
    /// Callers still invoke [`Engine::cancel_verification`] afterwards to
    /// release server-side flow state.
    pub fn mark_verification_timed_out(&self) -> Result<(), EngineError> {
        verify::mark_timed_out(&self.store)
    }

    /// Establish trust from an offline recovery key.
    pub async fn verify_with_recovery_key(
        &self,
        recovery_key: &str,
    ) -> Result<String, EngineError> {
        verify::verify_with_recovery_key(&self.store, recovery_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::ErrorCategory;

    fn engine() -> (Engine, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        (Engine::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn every_operation_requires_a_session() {
        let (engine, _dir) = engine();

        assert!(engine.restore_session().await.is_none());
        assert_eq!(engine.logout().await.expect_err("logout").code, "not_authenticated");
        assert_eq!(engine.sync_once().await.expect_err("sync").code, "not_authenticated");
        assert_eq!(
            engine.list_rooms().await.expect_err("rooms").code,
            "not_authenticated"
        );
        assert_eq!(
            engine
                .fetch_page("!room:example.org", 50, None)
                .await
                .expect_err("page")
                .code,
            "not_authenticated"
        );
        assert_eq!(
            engine
                .send_message("!room:example.org", "hi")
                .await
                .expect_err("send")
                .code,
            "not_authenticated"
        );
        assert_eq!(
            engine
                .verification_status()
                .await
                .expect_err("status")
                .code,
            "not_authenticated"
        );
    }

    #[tokio::test]
    async fn login_validation_fails_without_touching_storage() {
        let (engine, dir) = engine();

        let err = engine
            .login("https://matrix.example.org", "@alice:example.org", "")
            .await
            .expect_err("empty password");
        assert_eq!(err.category, ErrorCategory::InputValidation);
        assert!(engine.restore_session().await.is_none());
        assert_eq!(
            std::fs::read_dir(dir.path()).expect("read dir").count(),
            0,
            "no storage directory may be created"
        );
    }

    #[tokio::test]
    async fn timeout_marking_requires_an_active_flow() {
        let (engine, _dir) = engine();
        let err = engine
            .mark_verification_timed_out()
            .expect_err("no flow active");
        assert_eq!(err.code, "no_active_flow");
    }
}
