//! Identifier parsing and SDK error wrapping.
//!
//! Remote and transport failures are wrapped with the stage they surfaced in
//! so callers can tell "during login" from "during initial sync". The engine
//! never retries them; retry policy belongs to the caller.

use engine_core::{EngineError, ErrorCategory};
use matrix_sdk::ruma::OwnedRoomId;

/// Parse a room identifier, failing with `InputValidation` before any network call.
pub fn parse_room_id(value: &str) -> Result<OwnedRoomId, EngineError> {
    value.parse::<OwnedRoomId>().map_err(|err| {
        EngineError::new(
            ErrorCategory::InputValidation,
            "invalid_room_id",
            format!("invalid room id '{value}': {err}"),
        )
    })
}

/// Wrap an SDK failure as a transport error for the given stage.
pub fn transport(stage: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::transport(stage, err.to_string())
}

/// Wrap an SDK failure the server actively rejected (credentials, permission).
pub fn remote_rejected(stage: &str, code: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::new(
        ErrorCategory::RemoteRejected,
        code,
        format!("{stage}: {err}"),
    )
}

/// Wrap a local filesystem failure around the session store directory.
pub fn storage(stage: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::new(
        ErrorCategory::Storage,
        "storage_error",
        format!("{stage}: {err}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_room_id() {
        let err = parse_room_id("not-a-room-id").expect_err("invalid room id must fail");
        assert_eq!(err.code, "invalid_room_id");
        assert_eq!(err.category, ErrorCategory::InputValidation);
    }

    #[test]
    fn accepts_well_formed_room_id() {
        assert!(parse_room_id("!room:example.org").is_ok());
    }

    #[test]
    fn transport_errors_carry_the_failing_stage() {
        let err = transport("during initial sync", "connection refused");
        assert!(err.message.contains("during initial sync"));
        assert_eq!(err.category, ErrorCategory::Transport);
    }
}
