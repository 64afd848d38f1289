//! Protocol-free core of the messaging client engine.
//!
//! This crate defines the error taxonomy, the boundary payload types, the
//! single timeline normalization point, and the device-verification flow
//! state machine. It performs no I/O and knows nothing about the underlying
//! protocol SDK.

/// Timeline event classification and page assembly.
pub mod classify;
/// Stable engine error types.
pub mod error;
/// Verification flow state machine and completion-wait policy.
pub mod flow;
/// Boundary payload types.
pub mod types;

pub use classify::{
    ClassifiedEvent, ENCRYPTED_BODY, ENCRYPTED_SENDER, MessageContent, assemble_page,
    normalize_event,
};
pub use error::{EngineError, ErrorCategory};
pub use flow::{CompletionWaitPolicy, FlowState, VerificationFlow};
pub use types::{
    LoginOutcome, Message, MessagePage, PaginationCursor, RoomInfo, ShortCode, VerificationStatus,
};
