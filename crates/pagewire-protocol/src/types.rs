//! Core protocol types for Pagewire's wire format.
//!
//! Every frame is an "adjacently tagged" JSON object:
//!
//! ```text
//! { "event": "new-user-add", "data": "P1" }
//! { "event": "send-message", "data": { "newPageId": "P1", "message": "…", "sessionId": "…" } }
//! ```
//!
//! The event names (including the historical `invelid-session` spelling)
//! are what deployed clients listen for, so they are pinned with
//! `#[serde(rename)]` rather than derived from the variant names.

use std::fmt;

use pagewire_transport::ConnectionId;
use serde::{Deserialize, Serialize};

/// Text sent with `session-expire` when a page's timer fires.
pub const SESSION_EXPIRED_TEXT: &str = "your session is expired.";

/// Text sent with `invelid-session` when a join targets an unknown page.
pub const INVALID_SESSION_TEXT: &str =
    "your session is expired or path is not valid";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Client-chosen key of a page (a collaboration room).
///
/// Opaque to the relay: any string is a valid page id. Serialized as the
/// bare string.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    /// Wraps a page key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ---------------------------------------------------------------------------
// Recipient: who should receive a server event?
// ---------------------------------------------------------------------------

/// Addresses a [`ServerEvent`].
///
/// The lifecycle handler returns `(Recipient, ServerEvent)` pairs and the
/// relay resolves each recipient against the current page membership at
/// delivery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// One specific connection, member of a page or not.
    Connection(ConnectionId),

    /// Every member of the page. No-op if the page is unknown.
    Page(PageId),

    /// Every member of the page except the given connection.
    PageExcept(PageId, ConnectionId),

    /// Every open connection.
    Everyone,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Events a client can send.
///
/// Disconnects are not on this list: the transport reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Create the page if it does not exist yet.
    #[serde(rename = "new-page-add")]
    NewPageAdd(PageId),

    /// Join an existing page and receive its shared state.
    #[serde(rename = "new-user-add")]
    NewUserAdd(PageId),

    /// Replace the page's shared state and relay it to the other members.
    ///
    /// `session_id` names the connection to leave out of the relay,
    /// normally the sender's own id.
    #[serde(rename = "send-message", rename_all = "camelCase")]
    SendMessage {
        new_page_id: PageId,
        message: String,
        session_id: ConnectionId,
    },
}

impl ClientEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewPageAdd(_) => "new-page-add",
            Self::NewUserAdd(_) => "new-user-add",
            Self::SendMessage { .. } => "send-message",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Events the relay sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// First event on every connection: the id the transport assigned.
    #[serde(rename = "connected")]
    Connected { id: ConnectionId },

    /// All known page ids, in creation order.
    #[serde(rename = "get-pages")]
    GetPages(Vec<PageId>),

    /// The page's shared state, sent to a connection that just joined.
    #[serde(rename = "other-users-data")]
    OtherUsersData(String),

    /// A peer replaced the page's shared state.
    #[serde(rename = "receive-message", rename_all = "camelCase")]
    ReceiveMessage { new_page_id: PageId, message: String },

    /// The page this connection was in has expired.
    #[serde(rename = "session-expire")]
    SessionExpire(String),

    /// A join targeted a page that does not exist (or no longer exists).
    #[serde(rename = "invelid-session")]
    InvalidSession(String),
}

impl ServerEvent {
    /// `session-expire` with the standard text.
    pub fn session_expired() -> Self {
        Self::SessionExpire(SESSION_EXPIRED_TEXT.to_string())
    }

    /// `invelid-session` with the standard text.
    pub fn invalid_session() -> Self {
        Self::InvalidSession(INVALID_SESSION_TEXT.to_string())
    }

    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::GetPages(_) => "get-pages",
            Self::OtherUsersData(_) => "other-users-data",
            Self::ReceiveMessage { .. } => "receive-message",
            Self::SessionExpire(_) => "session-expire",
            Self::InvalidSession(_) => "invelid-session",
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The JSON shapes below are what existing browser clients parse, so
    //! each event's exact encoding is pinned here.

    use serde_json::json;

    use super::*;

    fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
        serde_json::to_value(value).unwrap()
    }

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_page_id_serializes_as_plain_string() {
        assert_eq!(to_json(&PageId::new("P1")), json!("P1"));
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(PageId::from("doc-42").to_string(), "doc-42");
    }

    // =====================================================================
    // ClientEvent
    // =====================================================================

    #[test]
    fn test_client_event_new_page_add_json_format() {
        let event = ClientEvent::NewPageAdd(PageId::new("P1"));
        assert_eq!(
            to_json(&event),
            json!({ "event": "new-page-add", "data": "P1" })
        );
    }

    #[test]
    fn test_client_event_new_user_add_parses() {
        let event: ClientEvent = serde_json::from_str(
            r#"{ "event": "new-user-add", "data": "P1" }"#,
        )
        .unwrap();
        assert_eq!(event, ClientEvent::NewUserAdd(PageId::new("P1")));
    }

    #[test]
    fn test_client_event_send_message_uses_camel_case_fields() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "send-message",
            "data": { "newPageId": "P1", "message": "hello", "sessionId": "c1" }
        }))
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::SendMessage {
                new_page_id: PageId::new("P1"),
                message: "hello".into(),
                session_id: ConnectionId::new("c1"),
            }
        );
    }

    #[test]
    fn test_client_event_send_message_missing_field_is_error() {
        let result: Result<ClientEvent, _> = serde_json::from_value(json!({
            "event": "send-message",
            "data": { "newPageId": "P1", "message": "hello" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_client_event_unknown_name_is_error() {
        let result: Result<ClientEvent, _> = serde_json::from_value(json!({
            "event": "delete-everything",
            "data": "P1"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_client_event_name_matches_wire_tag() {
        let events = [
            ClientEvent::NewPageAdd(PageId::new("a")),
            ClientEvent::NewUserAdd(PageId::new("a")),
            ClientEvent::SendMessage {
                new_page_id: PageId::new("a"),
                message: String::new(),
                session_id: ConnectionId::new("c"),
            },
        ];
        for event in events {
            assert_eq!(to_json(&event)["event"], event.name());
        }
    }

    // =====================================================================
    // ServerEvent
    // =====================================================================

    #[test]
    fn test_server_event_get_pages_json_format() {
        let event =
            ServerEvent::GetPages(vec![PageId::new("P1"), PageId::new("P2")]);
        assert_eq!(
            to_json(&event),
            json!({ "event": "get-pages", "data": ["P1", "P2"] })
        );
    }

    #[test]
    fn test_server_event_receive_message_json_format() {
        let event = ServerEvent::ReceiveMessage {
            new_page_id: PageId::new("P1"),
            message: "hello".into(),
        };
        assert_eq!(
            to_json(&event),
            json!({
                "event": "receive-message",
                "data": { "newPageId": "P1", "message": "hello" }
            })
        );
    }

    #[test]
    fn test_server_event_connected_json_format() {
        let event = ServerEvent::Connected {
            id: ConnectionId::new("abc"),
        };
        assert_eq!(
            to_json(&event),
            json!({ "event": "connected", "data": { "id": "abc" } })
        );
    }

    #[test]
    fn test_server_event_invalid_session_keeps_wire_spelling() {
        let json = to_json(&ServerEvent::invalid_session());
        assert_eq!(json["event"], "invelid-session");
        assert_eq!(json["data"], INVALID_SESSION_TEXT);
    }

    #[test]
    fn test_server_event_session_expired_text() {
        assert_eq!(
            to_json(&ServerEvent::session_expired()),
            json!({ "event": "session-expire", "data": "your session is expired." })
        );
    }

    #[test]
    fn test_server_event_other_users_data_empty_state() {
        assert_eq!(
            to_json(&ServerEvent::OtherUsersData(String::new())),
            json!({ "event": "other-users-data", "data": "" })
        );
    }

    #[test]
    fn test_server_event_name_matches_wire_tag() {
        let events = [
            ServerEvent::Connected {
                id: ConnectionId::new("c"),
            },
            ServerEvent::GetPages(vec![]),
            ServerEvent::OtherUsersData(String::new()),
            ServerEvent::ReceiveMessage {
                new_page_id: PageId::new("a"),
                message: String::new(),
            },
            ServerEvent::session_expired(),
            ServerEvent::invalid_session(),
        ];
        for event in events {
            assert_eq!(to_json(&event)["event"], event.name());
        }
    }
}
