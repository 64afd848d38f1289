use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad error category used for user-facing handling and caller retry decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Empty/malformed fields, bad URLs, malformed room identifiers.
    InputValidation,
    /// No live session exists.
    NotAuthenticated,
    /// Room or verification flow absent.
    NotFound,
    /// Server refused: bad credentials, permission denied.
    RemoteRejected,
    /// Network or timeout failure talking to the homeserver.
    Transport,
    /// Peer or account lacks a required capability.
    ProtocolUnsupported,
    /// Explicit cancellation by either side.
    Cancelled,
    /// Caller-observed polling exhaustion.
    TimedOut,
    /// Local persistence failure (session store directory handling).
    Storage,
    /// Internal engine bug or unclassified SDK failure.
    Internal,
}

/// Stable engine error payload crossing the facade boundary.
///
/// The boundary flattens this to a single human-readable string via
/// `Display`; `category` and `code` stay stable for programmatic handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct EngineError {
    /// High-level error category.
    pub category: ErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl EngineError {
    /// Construct a new engine error.
    pub fn new(
        category: ErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Validation failure, detected before any network call.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::InputValidation, "invalid_input", message)
    }

    /// No live session is installed.
    pub fn not_authenticated() -> Self {
        Self::new(
            ErrorCategory::NotAuthenticated,
            "not_authenticated",
            "not logged in",
        )
    }

    /// Transport failure wrapped with the stage it surfaced in.
    pub fn transport(stage: &str, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::Transport,
            "transport_error",
            format!("{stage}: {}", message.into()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_not_authenticated_code_stable() {
        let err = EngineError::not_authenticated();
        assert_eq!(err.code, "not_authenticated");
        assert_eq!(err.category, ErrorCategory::NotAuthenticated);
    }

    #[test]
    fn wraps_transport_errors_with_stage() {
        let err = EngineError::transport("during initial sync", "connection reset");
        assert_eq!(err.category, ErrorCategory::Transport);
        assert!(err.message.starts_with("during initial sync:"));
    }

    #[test]
    fn renders_single_user_visible_string() {
        let err = EngineError::invalid_input("homeserver URL must start with http:// or https://");
        let rendered = err.to_string();
        assert!(rendered.contains("invalid_input"));
        assert!(rendered.contains("homeserver URL"));
    }
}
