//! Single normalization point for raw timeline entries.
//!
//! The protocol layer reports a decryption outcome per entry; nothing here
//! attempts decryption. Classification changes content, never count: only
//! entries whose message sub-kind is unsupported are dropped.

use crate::types::{Message, MessagePage, PaginationCursor};

/// Sentinel sender for entries whose keys have not arrived yet.
pub const ENCRYPTED_SENDER: &str = "[Encrypted]";
/// Sentinel body for entries whose keys have not arrived yet.
pub const ENCRYPTED_BODY: &str = "Waiting for encryption keys...";

/// Flat message sub-kind extracted from a room-message event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Standard text message.
    Text(String),
    /// Notice message, usually system-like.
    Notice(String),
    /// Emote/action message; rendered with a `"* "` prefix.
    Emote(String),
    /// Any sub-kind the engine does not render (images, locations, ...).
    Unsupported,
}

/// Decryption outcome reported by the protocol layer for one raw entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedEvent {
    /// Entry decrypted successfully; sender comes from the encryption layer.
    Decrypted {
        sender: String,
        content: MessageContent,
        timestamp_ms: u64,
    },
    /// Entry was never encrypted; sender comes from the event itself.
    Plaintext {
        sender: String,
        content: MessageContent,
        timestamp_ms: u64,
    },
    /// Keys are not available yet. Always emitted, never skipped.
    Undecryptable { timestamp_ms: u64 },
}

/// Normalize one classified entry into a display message.
///
/// Returns `None` only for unsupported message sub-kinds.
pub fn normalize_event(event: ClassifiedEvent) -> Option<Message> {
    match event {
        ClassifiedEvent::Decrypted {
            sender,
            content,
            timestamp_ms,
        }
        | ClassifiedEvent::Plaintext {
            sender,
            content,
            timestamp_ms,
        } => {
            let body = match content {
                MessageContent::Text(body) | MessageContent::Notice(body) => body,
                MessageContent::Emote(body) => format!("* {body}"),
                MessageContent::Unsupported => return None,
            };
            Some(Message {
                sender,
                body,
                timestamp_ms,
            })
        }
        ClassifiedEvent::Undecryptable { timestamp_ms } => Some(Message {
            sender: ENCRYPTED_SENDER.to_owned(),
            body: ENCRYPTED_BODY.to_owned(),
            timestamp_ms,
        }),
    }
}

/// Assemble a page from a newest-first raw batch and the server's end token.
///
/// The batch is reversed into oldest-first chat order. `has_more` is true iff
/// the server returned a continuation token *and* the raw batch was non-empty:
/// an empty batch with a token present is treated as exhausted, so a quiet
/// room cannot produce an infinite pagination loop.
pub fn assemble_page(
    room_id: &str,
    newest_first: Vec<ClassifiedEvent>,
    end_token: Option<String>,
) -> MessagePage {
    let raw_count = newest_first.len();
    let mut messages: Vec<Message> = newest_first
        .into_iter()
        .filter_map(normalize_event)
        .collect();
    messages.reverse();

    let has_more = end_token.is_some() && raw_count > 0;
    let next_cursor = end_token.map(|token| PaginationCursor {
        room_id: room_id.to_owned(),
        token,
    });

    MessagePage {
        messages,
        has_more,
        next_cursor,
    }
}
