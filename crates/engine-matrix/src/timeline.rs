//! Room list, paginated history retrieval, and message sending.
//!
//! Retrieval branches only on the decryption outcome the SDK reports per
//! entry; it never attempts decryption itself. All entries funnel through the
//! classification sum type in `engine-core`, so the normalization rules live
//! in exactly one place.

use engine_core::{
    ClassifiedEvent, EngineError, ErrorCategory, MessageContent, MessagePage, PaginationCursor,
    RoomInfo, assemble_page,
};
use matrix_sdk::{
    deserialized_responses::{TimelineEvent, TimelineEventKind},
    room::MessagesOptions,
    ruma::{
        UInt,
        events::{AnySyncTimelineEvent, room::message::RoomMessageEventContent},
        serde::Raw,
    },
};
use tracing::debug;

use crate::{map, session::SessionStore};

/// Hard cap applied to backward pagination requests.
const PAGINATION_LIMIT_CAP: u16 = 100;

/// Clamp a requested page size into `1..=PAGINATION_LIMIT_CAP`.
pub fn bounded_limit(requested: u16) -> u16 {
    requested.clamp(1, PAGINATION_LIMIT_CAP)
}

/// Reject cursors minted for a different room before any network call.
pub fn ensure_cursor_scope(
    room_id: &str,
    cursor: Option<&PaginationCursor>,
) -> Result<(), EngineError> {
    match cursor {
        Some(cursor) if cursor.room_id != room_id => Err(EngineError::invalid_input(format!(
            "pagination cursor belongs to room '{}', not '{room_id}'",
            cursor.room_id
        ))),
        _ => Ok(()),
    }
}

/// Joined rooms for the current user, sorted by room ID.
pub async fn list_rooms(store: &SessionStore) -> Result<Vec<RoomInfo>, EngineError> {
    let session = store.get().ok_or_else(EngineError::not_authenticated)?;

    let mut rooms: Vec<RoomInfo> = session
        .client
        .rooms()
        .into_iter()
        .map(|room| RoomInfo {
            room_id: room.room_id().to_string(),
            name: room.name(),
            topic: room.topic(),
        })
        .collect();

    rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
    Ok(rooms)
}

/// Fetch one backward page of room history.
///
/// Requests `limit` entries going backward from `cursor`, or from now when
/// absent. The returned page is oldest-first; see `engine_core::assemble_page`
/// for the `has_more` contract. Pages fetched across a fresh sync may overlap
/// at the boundary; callers merging pages deduplicate by `(sender, timestamp)`.
pub async fn fetch_page(
    store: &SessionStore,
    room_id: &str,
    limit: u16,
    cursor: Option<PaginationCursor>,
) -> Result<MessagePage, EngineError> {
    let session = store.get().ok_or_else(EngineError::not_authenticated)?;
    let parsed_room_id = map::parse_room_id(room_id)?;
    ensure_cursor_scope(room_id, cursor.as_ref())?;

    let room = session.client.get_room(&parsed_room_id).ok_or_else(|| {
        EngineError::new(
            ErrorCategory::NotFound,
            "room_not_found",
            format!("room not found: {room_id}"),
        )
    })?;

    let mut options = MessagesOptions::backward();
    options.from = cursor.map(|cursor| cursor.token);
    options.limit = UInt::from(bounded_limit(limit));

    let messages = room
        .messages(options)
        .await
        .map_err(|err| map::transport("while fetching messages", err))?;

    debug!(
        room_id,
        raw_entries = messages.chunk.len(),
        "received history batch"
    );

    let classified: Vec<ClassifiedEvent> = messages.chunk.iter().map(classify_event).collect();
    Ok(assemble_page(room_id, classified, messages.end))
}

/// Send a plain-text message and return the server-assigned event ID.
pub async fn send_message(
    store: &SessionStore,
    room_id: &str,
    body: &str,
) -> Result<String, EngineError> {
    if body.trim().is_empty() {
        return Err(EngineError::invalid_input("message body is required"));
    }

    let session = store.get().ok_or_else(EngineError::not_authenticated)?;
    let parsed_room_id = map::parse_room_id(room_id)?;
    let room = session.client.get_room(&parsed_room_id).ok_or_else(|| {
        EngineError::new(
            ErrorCategory::NotFound,
            "room_not_found",
            format!("room not found: {room_id}"),
        )
    })?;

    let content = RoomMessageEventContent::text_plain(body.trim());
    let response = room
        .send(content)
        .await
        .map_err(|err| map::transport("while sending message", err))?;
    Ok(response.event_id.to_string())
}

/// Classify one raw entry by its reported decryption outcome.
fn classify_event(event: &TimelineEvent) -> ClassifiedEvent {
    let timestamp_ms = raw_timestamp_ms(event.raw());
    match &event.kind {
        TimelineEventKind::Decrypted(decrypted) => ClassifiedEvent::Decrypted {
            // The encryption layer's sender attribution, not the event's.
            sender: decrypted.encryption_info.sender.to_string(),
            content: raw_message_content(event.raw()),
            timestamp_ms,
        },
        TimelineEventKind::PlainText { .. } => ClassifiedEvent::Plaintext {
            sender: raw_sender(event.raw()),
            content: raw_message_content(event.raw()),
            timestamp_ms,
        },
        TimelineEventKind::UnableToDecrypt { .. } => {
            ClassifiedEvent::Undecryptable { timestamp_ms }
        }
    }
}

fn raw_sender(raw: &Raw<AnySyncTimelineEvent>) -> String {
    raw.get_field::<String>("sender")
        .ok()
        .flatten()
        .unwrap_or_default()
}

fn raw_timestamp_ms(raw: &Raw<AnySyncTimelineEvent>) -> u64 {
    raw.get_field::<UInt>("origin_server_ts")
        .ok()
        .flatten()
        .map(u64::from)
        .unwrap_or(0)
}

/// Extract the flat message sub-kind from a raw room event.
///
/// Anything that is not an `m.room.message` with a renderable msgtype is
/// `Unsupported` and gets skipped by normalization.
fn raw_message_content(raw: &Raw<AnySyncTimelineEvent>) -> MessageContent {
    if raw.get_field::<String>("type").ok().flatten().as_deref() != Some("m.room.message") {
        return MessageContent::Unsupported;
    }

    let Some(content) = raw.get_field::<serde_json::Value>("content").ok().flatten() else {
        return MessageContent::Unsupported;
    };
    let body = content
        .get("body")
        .and_then(|body| body.as_str())
        .unwrap_or_default()
        .to_owned();

    match content.get("msgtype").and_then(|msgtype| msgtype.as_str()) {
        Some("m.text") => MessageContent::Text(body),
        Some("m.notice") => MessageContent::Notice(body),
        Some("m.emote") => MessageContent::Emote(body),
        _ => MessageContent::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_event(json: &str) -> Raw<AnySyncTimelineEvent> {
        serde_json::from_str(json).expect("valid raw event")
    }

    #[test]
    fn bounds_pagination_limit() {
        assert_eq!(bounded_limit(0), 1);
        assert_eq!(bounded_limit(50), 50);
        assert_eq!(bounded_limit(500), 100);
    }

    #[test]
    fn rejects_cursor_from_another_room() {
        let cursor = PaginationCursor {
            room_id: "!other:example.org".into(),
            token: "t1".into(),
        };
        let err = ensure_cursor_scope("!room:example.org", Some(&cursor))
            .expect_err("foreign cursor must be rejected");
        assert_eq!(err.category, ErrorCategory::InputValidation);

        assert!(ensure_cursor_scope("!room:example.org", None).is_ok());
        let own = PaginationCursor {
            room_id: "!room:example.org".into(),
            token: "t1".into(),
        };
        assert!(ensure_cursor_scope("!room:example.org", Some(&own)).is_ok());
    }

    #[test]
    fn extracts_text_notice_and_emote_bodies() {
        let text = raw_event(
            r#"{"type":"m.room.message","sender":"@a:example.org","origin_server_ts":1000,
                "event_id":"$1","content":{"msgtype":"m.text","body":"hi"}}"#,
        );
        assert_eq!(raw_message_content(&text), MessageContent::Text("hi".into()));

        let notice = raw_event(
            r#"{"type":"m.room.message","sender":"@a:example.org","origin_server_ts":1000,
                "event_id":"$2","content":{"msgtype":"m.notice","body":"fyi"}}"#,
        );
        assert_eq!(
            raw_message_content(&notice),
            MessageContent::Notice("fyi".into())
        );

        let emote = raw_event(
            r#"{"type":"m.room.message","sender":"@a:example.org","origin_server_ts":1000,
                "event_id":"$3","content":{"msgtype":"m.emote","body":"waves"}}"#,
        );
        assert_eq!(
            raw_message_content(&emote),
            MessageContent::Emote("waves".into())
        );
    }

    #[test]
    fn treats_non_message_events_as_unsupported() {
        let member = raw_event(
            r#"{"type":"m.room.member","sender":"@a:example.org","origin_server_ts":1000,
                "event_id":"$4","state_key":"@a:example.org","content":{"membership":"join"}}"#,
        );
        assert_eq!(raw_message_content(&member), MessageContent::Unsupported);

        let image = raw_event(
            r#"{"type":"m.room.message","sender":"@a:example.org","origin_server_ts":1000,
                "event_id":"$5","content":{"msgtype":"m.image","body":"cat.png"}}"#,
        );
        assert_eq!(raw_message_content(&image), MessageContent::Unsupported);
    }

    #[test]
    fn reads_sender_and_timestamp_from_raw_fields() {
        let event = raw_event(
            r#"{"type":"m.room.message","sender":"@a:example.org","origin_server_ts":1234,
                "event_id":"$6","content":{"msgtype":"m.text","body":"hi"}}"#,
        );
        assert_eq!(raw_sender(&event), "@a:example.org");
        assert_eq!(raw_timestamp_ms(&event), 1234);
    }

    #[tokio::test]
    async fn fetch_page_without_session_reports_not_authenticated() {
        let store = SessionStore::new();
        let err = fetch_page(&store, "!room:example.org", 50, None)
            .await
            .expect_err("must fail");
        assert_eq!(err.code, "not_authenticated");
    }

    #[tokio::test]
    async fn send_message_validates_body_before_session_lookup() {
        let store = SessionStore::new();
        let err = send_message(&store, "!room:example.org", "   ")
            .await
            .expect_err("empty body must fail");
        assert_eq!(err.category, ErrorCategory::InputValidation);
    }
}
