//! Device-verification flow state machine.
//!
//! One flow may be active per session. Transitions into terminal states are
//! monotonic: once `Confirmed`, `Cancelled`, `TimedOut`, or `Failed`, no
//! further transition is possible without creating a new flow.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, ErrorCategory},
    types::ShortCode,
};

/// State of one in-progress device-trust negotiation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FlowState {
    /// Request sent; waiting for a peer device to accept.
    Requested,
    /// Peer accepted; the SAS sub-protocol can be engaged.
    Ready,
    /// Short codes are available for human comparison.
    ShortCodeReady,
    /// Recovery-key path in progress (no peer device involved).
    RecoveryPending,
    /// Trust established.
    Confirmed,
    /// Either side cancelled.
    Cancelled,
    /// Caller declared the flow timed out after polling exhaustion.
    TimedOut,
    /// Negotiation failed.
    Failed,
}

impl FlowState {
    /// Whether this state absorbs all further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Cancelled | Self::TimedOut | Self::Failed
        )
    }
}

/// One verification flow instance, mirrored in the session store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationFlow {
    /// Protocol-assigned flow identifier.
    pub flow_id: String,
    /// Device the request was accepted by.
    pub peer_device_id: String,
    /// Current state.
    pub state: FlowState,
    /// Short codes, available from `ShortCodeReady` onward.
    pub short_codes: Option<Vec<ShortCode>>,
}

impl VerificationFlow {
    /// Create a flow in the `Requested` state.
    pub fn new(flow_id: impl Into<String>, peer_device_id: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            peer_device_id: peer_device_id.into(),
            state: FlowState::Requested,
            short_codes: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Transition to `next`, rejecting departures from terminal states and
    /// transitions the protocol does not allow.
    pub fn transition(&mut self, next: FlowState) -> Result<(), EngineError> {
        if self.state.is_terminal() {
            return Err(self.invalid_transition(next));
        }

        let allowed = match (self.state, next) {
            (FlowState::Requested, FlowState::Ready) => true,
            (FlowState::Ready, FlowState::ShortCodeReady) => true,
            (FlowState::ShortCodeReady, FlowState::Confirmed) => true,
            (FlowState::RecoveryPending, FlowState::Confirmed | FlowState::Failed) => true,
            // Cancellation and timeout are reachable from any live state.
            (_, FlowState::Cancelled | FlowState::TimedOut) => true,
            _ => false,
        };

        if !allowed {
            return Err(self.invalid_transition(next));
        }

        self.state = next;
        Ok(())
    }

    /// Attach short codes and move to `ShortCodeReady`.
    pub fn set_short_codes(&mut self, codes: Vec<ShortCode>) -> Result<(), EngineError> {
        self.transition(FlowState::ShortCodeReady)?;
        self.short_codes = Some(codes);
        Ok(())
    }

    /// Mark the flow timed out after caller-side polling exhaustion.
    pub fn mark_timed_out(&mut self) -> Result<(), EngineError> {
        self.transition(FlowState::TimedOut)
    }

    fn invalid_transition(&self, next: FlowState) -> EngineError {
        EngineError::new(
            ErrorCategory::Internal,
            "invalid_flow_transition",
            format!(
                "verification flow '{}' cannot move from {:?} to {next:?}",
                self.flow_id, self.state
            ),
        )
    }
}

/// Bounded status-poll schedule for post-confirmation completion.
///
/// This is the engine's only internal retry: a status poll, never a mutating
/// retry. A wait window that elapses is a soft status, not an error.
#[derive(Debug, Clone, Copy)]
pub struct CompletionWaitPolicy {
    max_attempts: u32,
    interval: Duration,
}

impl CompletionWaitPolicy {
    /// Create a policy (`max_attempts >= 1`).
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Number of status polls before giving up the wait.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between status polls.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total wall-clock budget of the wait window.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for CompletionWaitPolicy {
    fn default() -> Self {
        Self::new(20, Duration::from_millis(500))
    }
}
