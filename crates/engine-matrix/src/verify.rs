//! Interactive device-verification (SAS) engine and recovery-key fallback.
//!
//! Polling is caller-paced: nothing here owns a timer except the bounded
//! post-confirmation completion wait, which is a status poll, never a
//! mutating retry.

use engine_core::{
    CompletionWaitPolicy, EngineError, ErrorCategory, FlowState, ShortCode, VerificationFlow,
    VerificationStatus,
};
use matrix_sdk::{Client, encryption::verification::VerificationRequest, ruma::OwnedUserId};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    map,
    session::SessionStore,
    sync::{self, SyncGate},
};

fn no_active_flow() -> EngineError {
    EngineError::new(
        ErrorCategory::NotFound,
        "no_active_flow",
        "no verification flow is active",
    )
}

fn cross_signing_unavailable() -> EngineError {
    EngineError::new(
        ErrorCategory::ProtocolUnsupported,
        "cross_signing_unavailable",
        "cross-signing is not available for this account",
    )
}

fn session_user_id(client: &Client) -> Result<OwnedUserId, EngineError> {
    client.user_id().map(ToOwned::to_owned).ok_or_else(|| {
        EngineError::new(
            ErrorCategory::Internal,
            "user_id_unavailable",
            "session has no user id",
        )
    })
}

/// Account trust summary. Pure read; never mutates flow state.
pub async fn status(store: &SessionStore) -> Result<VerificationStatus, EngineError> {
    let session = store.get().ok_or_else(EngineError::not_authenticated)?;

    let status = session
        .client
        .encryption()
        .cross_signing_status()
        .await
        .ok_or_else(cross_signing_unavailable)?;

    let is_verified = status.is_complete();
    Ok(VerificationStatus {
        needs_verification: !is_verified,
        is_verified,
    })
}

/// Request interactive verification from the user's other devices.
///
/// Syncs first so device lists are fresh, then asks each other device in
/// turn; the first that accepts the request determines the flow. The new flow
/// starts in `Requested` and moves to `Ready` once observed by the poller.
pub async fn request_verification(
    store: &SessionStore,
    gate: &SyncGate,
) -> Result<String, EngineError> {
    let session = store.get().ok_or_else(EngineError::not_authenticated)?;

    if let Some(flow) = store.flow()
        && !flow.state().is_terminal()
    {
        return Err(EngineError::invalid_input(
            "a verification flow is already active; cancel it first",
        ));
    }

    let encryption = session.client.encryption();
    if encryption.cross_signing_status().await.is_none() {
        return Err(cross_signing_unavailable());
    }

    // Device lists must be fresh before enumerating candidates.
    sync::sync_once(store, gate).await?;

    let user_id = session_user_id(&session.client)?;
    let devices = encryption
        .get_user_devices(&user_id)
        .await
        .map_err(|err| map::transport("while listing devices", err))?;

    let candidates: Vec<_> = devices
        .devices()
        .filter(|device| device.device_id().as_str() != session.device_id)
        .collect();

    if candidates.is_empty() {
        return Err(EngineError::new(
            ErrorCategory::NotFound,
            "no_other_devices",
            "no other devices found for this account",
        ));
    }

    debug!(candidates = candidates.len(), "requesting verification");

    for device in candidates {
        match device.request_verification().await {
            Ok(request) => {
                let flow_id = request.flow_id().to_string();
                let peer = device.device_id().to_string();
                info!(%flow_id, peer_device = %peer, "verification requested");
                store.set_flow(VerificationFlow::new(flow_id, peer));

                return Ok(format!(
                    "Verification request sent to device '{}'",
                    device.display_name().unwrap_or("unknown device"),
                ));
            }
            Err(err) => {
                warn!(device_id = %device.device_id(), %err, "verification request rejected");
            }
        }
    }

    Err(EngineError::new(
        ErrorCategory::RemoteRejected,
        "all_requests_failed",
        "no device accepted the verification request",
    ))
}

/// Poll for short codes.
///
/// `Ok(None)` means not ready yet; keep polling. A peer cancellation is
/// reported as a `Cancelled` error exactly once; the flow is cleared so the
/// next poll sees `no_active_flow`. Once codes materialize the flow moves to
/// `ShortCodeReady` and subsequent polls return the cached codes.
pub async fn poll_short_codes(
    store: &SessionStore,
) -> Result<Option<Vec<ShortCode>>, EngineError> {
    let session = store.get().ok_or_else(EngineError::not_authenticated)?;
    let flow = store.flow().ok_or_else(no_active_flow)?;

    if flow.state() == FlowState::ShortCodeReady
        && let Some(codes) = flow.short_codes.clone()
    {
        return Ok(Some(codes));
    }

    let user_id = session_user_id(&session.client)?;
    let request = lookup_request(&session.client, &user_id, &flow.flow_id).await?;

    if request.is_cancelled() {
        store.take_flow();
        return Err(EngineError::new(
            ErrorCategory::Cancelled,
            "verification_cancelled",
            "verification was cancelled by the other device",
        ));
    }

    if !request.is_ready() {
        return Ok(None);
    }

    if flow.state() == FlowState::Requested {
        store
            .with_flow_mut(|flow| flow.transition(FlowState::Ready))
            .transpose()?;
    }

    let sas = request
        .start_sas()
        .await
        .map_err(|err| map::transport("while starting short-code verification", err))?
        .ok_or_else(|| {
            EngineError::new(
                ErrorCategory::ProtocolUnsupported,
                "sas_unsupported",
                "the other device does not support short-code verification",
            )
        })?;

    sas.accept()
        .await
        .map_err(|err| map::transport("while accepting short-code verification", err))?;

    let Some(emoji) = sas.emoji() else {
        // Accepted but codes have not materialized; caller polls again.
        return Ok(None);
    };

    let codes: Vec<ShortCode> = emoji
        .iter()
        .map(|emoji| ShortCode {
            symbol: emoji.symbol.to_string(),
            label: emoji.description.to_string(),
        })
        .collect();

    store
        .with_flow_mut(|flow| flow.set_short_codes(codes.clone()))
        .transpose()?;
    info!(flow_id = %flow.flow_id, codes = codes.len(), "short codes ready");
    Ok(Some(codes))
}

/// Confirm the short codes match on this side.
///
/// Valid only from `ShortCodeReady`. Remote completion is asynchronous: the
/// bounded wait below observes it but a slow remote is a soft status, not an
/// error, since cryptographic state is already locally consistent once the
/// local confirm call succeeds. Ends with a sync pass so released key material is
/// pulled down before the caller proceeds.
pub async fn confirm_match(
    store: &SessionStore,
    gate: &SyncGate,
    policy: CompletionWaitPolicy,
) -> Result<String, EngineError> {
    let session = store.get().ok_or_else(EngineError::not_authenticated)?;
    let flow = store.flow().ok_or_else(no_active_flow)?;

    if flow.state() != FlowState::ShortCodeReady {
        return Err(EngineError::invalid_input(
            "no short codes to confirm yet; keep polling",
        ));
    }

    let user_id = session_user_id(&session.client)?;
    let request = lookup_request(&session.client, &user_id, &flow.flow_id).await?;

    let sas = request
        .start_sas()
        .await
        .map_err(|err| map::transport("while resuming short-code verification", err))?
        .ok_or_else(|| {
            EngineError::new(
                ErrorCategory::ProtocolUnsupported,
                "sas_unsupported",
                "the other device does not support short-code verification",
            )
        })?;

    sas.confirm()
        .await
        .map_err(|err| map::transport("while confirming short codes", err))?;

    let mut completed = false;
    for _ in 0..policy.max_attempts() {
        sleep(policy.interval()).await;

        if let Some(request) = session
            .client
            .encryption()
            .get_verification_request(&user_id, &flow.flow_id)
            .await
            && request.is_done()
        {
            completed = true;
            break;
        }
    }

    store
        .with_flow_mut(|flow| flow.transition(FlowState::Confirmed))
        .transpose()?;
    store.take_flow();

    // Pull newly released key material before handing control back.
    sync::sync_once(store, gate).await?;

    if completed {
        info!(flow_id = %flow.flow_id, "verification complete");
        Ok("Verification confirmed and complete".to_owned())
    } else {
        info!(flow_id = %flow.flow_id, "verification confirmed, remote completion pending");
        Ok("Verification confirmed; remote completion still pending".to_owned())
    }
}

/// Cancel the active flow.
///
/// The local flow id is cleared before the remote cancel is attempted, so
/// cancellation is locally irreversible regardless of network outcome; a
/// remote failure is logged, not propagated.
pub async fn cancel(store: &SessionStore) -> Result<String, EngineError> {
    let session = store.get().ok_or_else(EngineError::not_authenticated)?;
    let flow = store.take_flow().ok_or_else(no_active_flow)?;

    let user_id = session_user_id(&session.client)?;
    match session
        .client
        .encryption()
        .get_verification_request(&user_id, &flow.flow_id)
        .await
    {
        Some(request) => {
            if let Err(err) = request.cancel().await {
                warn!(flow_id = %flow.flow_id, %err, "remote cancel failed, flow cleared locally");
            }
        }
        None => {
            debug!(flow_id = %flow.flow_id, "flow unknown to connection, nothing to cancel remotely");
        }
    }

    info!(flow_id = %flow.flow_id, "verification cancelled");
    Ok("Verification cancelled".to_owned())
}

/// Establish trust from an offline recovery key, without a second device.
pub async fn verify_with_recovery_key(
    store: &SessionStore,
    recovery_key: &str,
) -> Result<String, EngineError> {
    if recovery_key.trim().is_empty() {
        return Err(EngineError::new(
            ErrorCategory::InputValidation,
            "empty_recovery_key",
            "recovery key is required",
        ));
    }

    let session = store.get().ok_or_else(EngineError::not_authenticated)?;

    session
        .client
        .encryption()
        .recovery()
        .recover(recovery_key.trim())
        .await
        .map_err(|err| {
            map::remote_rejected("while verifying with recovery key", "invalid_key", err)
        })?;

    info!(user_id = %session.user_id, "recovery key verification completed");
    Ok("Recovery key verification completed".to_owned())
}

/// Transition the active flow to `TimedOut` after caller-side polling
/// exhaustion. The caller still cancels afterwards to release remote state.
pub fn mark_timed_out(store: &SessionStore) -> Result<(), EngineError> {
    store
        .with_flow_mut(VerificationFlow::mark_timed_out)
        .ok_or_else(no_active_flow)?
}

async fn lookup_request(
    client: &Client,
    user_id: &OwnedUserId,
    flow_id: &str,
) -> Result<VerificationRequest, EngineError> {
    client
        .encryption()
        .get_verification_request(user_id, flow_id)
        .await
        .ok_or_else(|| {
            EngineError::new(
                ErrorCategory::NotFound,
                "flow_not_found",
                format!("verification flow '{flow_id}' is unknown to the connection"),
            )
        })
}
