//! One-shot incremental synchronization.

use engine_core::EngineError;
use matrix_sdk::config::SyncSettings;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{map, session::SessionStore};

/// Serializes overlapping sync requests.
///
/// The incremental-delta protocol is not safe to run concurrently against the
/// same connection, so every route into sync (post-login, post-confirmation,
/// manual refresh) funnels through [`sync_once`] holding this gate.
#[derive(Debug, Default)]
pub struct SyncGate {
    gate: Mutex<()>,
}

/// Perform exactly one bounded delta pull into the live connection.
///
/// Idempotent: with no server-side changes this is a no-op beyond network
/// cost. Fails with `NotAuthenticated` without a session and `Transport` on
/// network failure.
pub async fn sync_once(store: &SessionStore, gate: &SyncGate) -> Result<(), EngineError> {
    let session = store.get().ok_or_else(EngineError::not_authenticated)?;

    let _serialized = gate.gate.lock().await;
    debug!(user_id = %session.user_id, "running one-shot sync");
    session
        .client
        .sync_once(SyncSettings::default())
        .await
        .map(|_| ())
        .map_err(|err| map::transport("during sync", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sync_without_session_reports_not_authenticated() {
        let store = SessionStore::new();
        let gate = SyncGate::default();
        let err = sync_once(&store, &gate).await.expect_err("must fail");
        assert_eq!(err.code, "not_authenticated");
    }
}
