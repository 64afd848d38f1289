use serde::{Deserialize, Serialize};

/// Opaque backward-pagination continuation token, scoped to one room.
///
/// Cursors are minted by `fetch_page` and consumed by the next `fetch_page`
/// for the same room. They are not portable across rooms or across re-login;
/// the room scope is carried so misuse can be rejected before a network call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationCursor {
    /// Room the cursor was minted for.
    pub room_id: String,
    /// Server continuation token.
    pub token: String,
}

/// Normalized display-ready message, uniform across decryption outcomes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Sender user ID, or the `"[Encrypted]"` sentinel for undecryptable entries.
    pub sender: String,
    /// Flat text body; emote bodies carry a `"* "` prefix.
    pub body: String,
    /// Server-assigned timestamp in milliseconds since Unix epoch.
    pub timestamp_ms: u64,
}

/// One page of room history, oldest-first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePage {
    /// Messages in chat-rendering order (oldest first).
    pub messages: Vec<Message>,
    /// Whether another backward page is worth requesting.
    pub has_more: bool,
    /// Cursor for the next backward page, when the server supplied one.
    pub next_cursor: Option<PaginationCursor>,
}

/// Lightweight room metadata for room lists.
///
/// Absent name/topic stay `None`; display fallback is a presentation concern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomInfo {
    /// Room ID.
    pub room_id: String,
    /// Best-effort display name.
    pub name: Option<String>,
    /// Room topic when set.
    pub topic: Option<String>,
}

/// One human-comparable short-authentication-string code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShortCode {
    /// Emoji symbol.
    pub symbol: String,
    /// Human-readable label for the symbol.
    pub label: String,
}

/// Account trust summary derived from cross-signing completeness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationStatus {
    /// Whether this device still needs to be verified.
    pub needs_verification: bool,
    /// Whether the account's cross-signing state is complete.
    pub is_verified: bool,
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginOutcome {
    /// Always `true`; kept for boundary-shape stability.
    pub success: bool,
    /// Authenticated user ID.
    pub user_id: String,
    /// Server-assigned device ID for this session.
    pub device_id: String,
    /// Human-readable status line.
    pub message: String,
}
