//! Session lifecycle: login, restore, logout.

use std::{
    fs,
    path::{Path, PathBuf},
};

use engine_core::{EngineError, LoginOutcome};
use matrix_sdk::{Client, config::SyncSettings};
use tracing::{debug, info, warn};

use crate::{
    map,
    session::{Session, SessionStore},
};

/// Fixed display name attached to newly created devices.
pub const DEVICE_DISPLAY_NAME: &str = "Messaging Engine (Rust)";

/// Strip protocol-reserved characters so a user identifier is filesystem-safe.
pub fn sanitize_user_identifier(user_id: &str) -> String {
    user_id
        .replace('@', "")
        .replace([':', '/', '\\'], "_")
}

/// Deterministic per-identity storage directory under `data_dir`.
pub fn storage_path_for(data_dir: &Path, user_id: &str) -> PathBuf {
    data_dir.join(sanitize_user_identifier(user_id))
}

/// Validate the homeserver URL before any network call.
pub fn validate_server_url(server_url: &str) -> Result<(), EngineError> {
    let trimmed = server_url.trim();
    if trimmed.is_empty() {
        return Err(EngineError::invalid_input("homeserver URL is required"));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(EngineError::invalid_input(
            "homeserver URL must start with http:// or https://",
        ));
    }
    Ok(())
}

/// Authenticate against the homeserver and install the session.
///
/// The per-identity storage directory is recreated from scratch: any
/// pre-existing data at that path is discarded first, which makes re-login
/// idempotent at the cost of always dropping a previous unsynced local copy.
/// On failure at any later step the directory is removed again (fail-clean)
/// and no session is installed.
pub async fn login(
    store: &SessionStore,
    data_dir: &Path,
    server_url: &str,
    user_identifier: &str,
    secret: &str,
) -> Result<LoginOutcome, EngineError> {
    validate_server_url(server_url)?;
    if user_identifier.trim().is_empty() {
        return Err(EngineError::invalid_input("user identifier is required"));
    }
    if secret.is_empty() {
        return Err(EngineError::invalid_input("password is required"));
    }

    let storage_path = storage_path_for(data_dir, user_identifier);
    if storage_path.exists() {
        debug!(path = %storage_path.display(), "clearing pre-existing session storage");
        fs::remove_dir_all(&storage_path)
            .map_err(|err| map::storage("while clearing old session storage", err))?;
    }
    fs::create_dir_all(&storage_path)
        .map_err(|err| map::storage("while creating session storage", err))?;

    match connect_and_authenticate(server_url, user_identifier, secret, &storage_path).await {
        Ok((client, user_id, device_id)) => {
            info!(%user_id, %device_id, "login and initial sync completed");
            let outcome = LoginOutcome {
                success: true,
                user_id: user_id.clone(),
                device_id: device_id.clone(),
                message: "Login successful - encryption enabled".to_owned(),
            };
            store.set(Session::new(client, user_id, device_id, storage_path));
            Ok(outcome)
        }
        Err(err) => {
            remove_storage_best_effort(&storage_path);
            Err(err)
        }
    }
}

async fn connect_and_authenticate(
    server_url: &str,
    user_identifier: &str,
    secret: &str,
    storage_path: &Path,
) -> Result<(Client, String, String), EngineError> {
    let client = Client::builder()
        .homeserver_url(server_url.trim())
        .sqlite_store(storage_path, None)
        .build()
        .await
        .map_err(|err| map::transport("while connecting to the homeserver", err))?;

    let response = client
        .matrix_auth()
        .login_username(user_identifier.trim(), secret)
        .initial_device_display_name(DEVICE_DISPLAY_NAME)
        .send()
        .await
        .map_err(|err| map::remote_rejected("during login", "login_failed", err))?;

    let user_id = response.user_id.to_string();
    let device_id = response.device_id.to_string();
    debug!(%user_id, %device_id, "authenticated, running initial sync");

    // Populate the session minimally before handing it to the caller.
    client
        .sync_once(SyncSettings::default())
        .await
        .map_err(|err| map::transport("during initial sync", err))?;

    Ok((client, user_id, device_id))
}

/// Current identity, if a session is installed. Never fails.
pub fn restore_session(store: &SessionStore) -> Option<String> {
    store.get().map(|session| session.user_id)
}

/// Invalidate the session remotely (best effort) and clear all local state.
///
/// Local cleanup is unconditional: store clearing and storage erasure run
/// even when the remote invalidation fails, and that sub-failure is still
/// surfaced to the caller afterwards.
pub async fn logout(store: &SessionStore) -> Result<String, EngineError> {
    let session = store.get().ok_or_else(EngineError::not_authenticated)?;

    let remote_result = session.client.logout().await;
    if let Err(err) = &remote_result {
        warn!(%err, "remote logout failed, continuing local cleanup");
    }

    // Release the handle before touching the on-disk store.
    let cleared = store.clear();
    drop(cleared);

    if session.storage_path.exists() {
        fs::remove_dir_all(&session.storage_path)
            .map_err(|err| map::storage("while clearing session storage", err))?;
    }

    remote_result.map_err(|err| map::transport("during remote logout", err))?;
    info!(user_id = %session.user_id, "logged out");
    Ok("Logged out successfully".to_owned())
}

fn remove_storage_best_effort(storage_path: &Path) {
    if storage_path.exists()
        && let Err(err) = fs::remove_dir_all(storage_path)
    {
        warn!(path = %storage_path.display(), %err, "failed to remove partial session storage");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_protocol_reserved_characters() {
        assert_eq!(
            sanitize_user_identifier("@alice:example.org"),
            "alice_example.org"
        );
        assert_eq!(sanitize_user_identifier("a/b\\c"), "a_b_c");
    }

    #[test]
    fn storage_path_is_deterministic() {
        let dir = Path::new("/tmp/engine");
        assert_eq!(
            storage_path_for(dir, "@alice:example.org"),
            storage_path_for(dir, "@alice:example.org")
        );
        assert_eq!(
            storage_path_for(dir, "@alice:example.org"),
            dir.join("alice_example.org")
        );
    }

    #[test]
    fn rejects_urls_without_recognized_scheme() {
        assert!(validate_server_url("https://matrix.example.org").is_ok());
        assert!(validate_server_url("http://localhost:8008").is_ok());

        let err = validate_server_url("matrix.example.org").expect_err("scheme required");
        assert_eq!(err.code, "invalid_input");
        assert!(validate_server_url("").is_err());
        assert!(validate_server_url("   ").is_err());
    }

    #[tokio::test]
    async fn empty_password_fails_before_any_storage_is_created() {
        let store = SessionStore::new();
        let data_dir = tempfile::tempdir().expect("tempdir");

        let err = login(
            &store,
            data_dir.path(),
            "https://matrix.example.org",
            "@alice:example.org",
            "",
        )
        .await
        .expect_err("empty password must fail");

        assert_eq!(err.category, engine_core::ErrorCategory::InputValidation);
        assert!(store.get().is_none());
        assert!(!storage_path_for(data_dir.path(), "@alice:example.org").exists());
    }

    #[tokio::test]
    async fn invalid_scheme_fails_before_any_storage_is_created() {
        let store = SessionStore::new();
        let data_dir = tempfile::tempdir().expect("tempdir");

        let err = login(
            &store,
            data_dir.path(),
            "matrix.example.org",
            "@alice:example.org",
            "secret",
        )
        .await
        .expect_err("bad scheme must fail");

        assert_eq!(err.category, engine_core::ErrorCategory::InputValidation);
        assert!(store.get().is_none());
        assert_eq!(
            fs::read_dir(data_dir.path()).expect("read dir").count(),
            0,
            "no storage directory may be created"
        );
    }

    #[test]
    fn restore_session_is_empty_without_login() {
        let store = SessionStore::new();
        assert_eq!(restore_session(&store), None);
    }

    #[tokio::test]
    async fn logout_without_session_reports_not_authenticated() {
        let store = SessionStore::new();
        let err = logout(&store).await.expect_err("must fail");
        assert_eq!(err.code, "not_authenticated");
    }
}
