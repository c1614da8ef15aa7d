//! Chat event model.
//!
//! Every live event carries a numeric `event_type` that selects its shape.
//! The codes below are the wire contract of the chat service.
//!
//! | Code | Kind | Payload of interest |
//! |------|------|---------------------|
//! | 1 | [`EventKind::MessageCreate`] | `message_id`, `content` |
//! | 2 | [`EventKind::MessageUpdate`] | `message_id`, `content` |
//! | 3 | [`EventKind::UserJoin`] | `user_id` |
//! | 4 | [`EventKind::UserLeave`] | `user_id` |
//! | 5 | [`EventKind::RoomRename`] | `room_name` |
//! | 6 | [`EventKind::MessageStar`] | `message_stars` |
//! | 8 | [`EventKind::Ping`] | `target_user_id` |
//! | 10 | [`EventKind::MessageDelete`] | `message_id` |
//! | 15 | [`EventKind::AccessChange`] | `target_user_id` (optional) |
//! | 17 | [`EventKind::Invite`] | `room_id`, `room_name` |
//! | 18 | [`EventKind::ReplyCreate`] | `parent_id` |
//! | 19 | [`EventKind::MoveOut`] | `message_id` |
//! | 20 | [`EventKind::MoveIn`] | `message_id` |
//! | 22 | [`EventKind::FeedTicker`] | `content` |
//! | 29 | [`EventKind::Suspension`] | `content` = `"<code> <json>"` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::identifiers::{MessageId, RoomId, UserId};
use crate::room::{Room, RoomRef};

// ============================================================================
// EventKind
// ============================================================================

/// Closed set of event kinds, keyed by wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A message was posted.
    MessageCreate,
    /// A message was edited.
    MessageUpdate,
    /// A user entered the room.
    UserJoin,
    /// A user left the room.
    UserLeave,
    /// The room was renamed.
    RoomRename,
    /// A message's stars changed.
    MessageStar,
    /// The current user was mentioned.
    Ping,
    /// A message was deleted.
    MessageDelete,
    /// A user's or the room's access level changed.
    AccessChange,
    /// The current user was invited to a room.
    Invite,
    /// A reply to the current user was posted.
    ReplyCreate,
    /// A message was moved out of the room.
    MoveOut,
    /// A message was moved into the room.
    MoveIn,
    /// A feed posted to the room's ticker.
    FeedTicker,
    /// A user's suspension changed.
    Suspension,
    /// A code this crate does not know.
    Unrecognized(u32),
}

impl EventKind {
    /// Maps a wire code to its kind.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            1 => Self::MessageCreate,
            2 => Self::MessageUpdate,
            3 => Self::UserJoin,
            4 => Self::UserLeave,
            5 => Self::RoomRename,
            6 => Self::MessageStar,
            8 => Self::Ping,
            10 => Self::MessageDelete,
            15 => Self::AccessChange,
            17 => Self::Invite,
            18 => Self::ReplyCreate,
            19 => Self::MoveOut,
            20 => Self::MoveIn,
            22 => Self::FeedTicker,
            29 => Self::Suspension,
            other => Self::Unrecognized(other),
        }
    }

    /// Returns the wire code.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::MessageCreate => 1,
            Self::MessageUpdate => 2,
            Self::UserJoin => 3,
            Self::UserLeave => 4,
            Self::RoomRename => 5,
            Self::MessageStar => 6,
            Self::Ping => 8,
            Self::MessageDelete => 10,
            Self::AccessChange => 15,
            Self::Invite => 17,
            Self::ReplyCreate => 18,
            Self::MoveOut => 19,
            Self::MoveIn => 20,
            Self::FeedTicker => 22,
            Self::Suspension => 29,
            Self::Unrecognized(code) => *code,
        }
    }

    /// Returns `true` for kinds that can be replied to.
    #[must_use]
    pub const fn is_message_bearing(&self) -> bool {
        matches!(
            self,
            Self::MessageCreate
                | Self::MessageUpdate
                | Self::MessageStar
                | Self::Ping
                | Self::ReplyCreate
                | Self::MoveIn
        )
    }
}

// ============================================================================
// EventData
// ============================================================================

/// Raw fields of an event as sent by the server.
///
/// Fields not listed here are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Wire code.
    pub event_type: u32,
    /// Event sequence id.
    #[serde(default)]
    pub id: Option<u64>,
    /// Unix timestamp (seconds).
    #[serde(default)]
    pub time_stamp: Option<i64>,
    /// Message HTML or kind-specific text.
    #[serde(default)]
    pub content: Option<String>,
    /// Room the event happened in.
    #[serde(default)]
    pub room_id: Option<RoomId>,
    /// Room name at the time of the event.
    #[serde(default)]
    pub room_name: Option<String>,
    /// Acting user.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Acting user's display name.
    #[serde(default)]
    pub user_name: Option<String>,
    /// Message the event refers to.
    #[serde(default)]
    pub message_id: Option<MessageId>,
    /// Message this one replies to.
    #[serde(default)]
    pub parent_id: Option<MessageId>,
    /// Whether the parent should be shown.
    #[serde(default)]
    pub show_parent: Option<bool>,
    /// User the event targets (pings, access changes).
    #[serde(default)]
    pub target_user_id: Option<UserId>,
    /// Star count.
    #[serde(default)]
    pub message_stars: Option<u32>,
    /// Room-owner star count.
    #[serde(default)]
    pub message_owner_stars: Option<u32>,
    /// Number of edits.
    #[serde(default)]
    pub message_edits: Option<u32>,
    /// Whether the message was moved.
    #[serde(default)]
    pub moved: Option<bool>,
    /// Everything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// ChatEvent
// ============================================================================

/// A decoded event, decorated with conveniences.
///
/// Events delivered by a room keep a weak handle to it, so a listener can
/// answer through [`ChatEvent::reply`] without holding the room alive.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
    /// Decoded kind.
    pub kind: EventKind,
    /// Room whose socket delivered the event.
    pub room_id: RoomId,
    /// Raw fields.
    pub data: EventData,
    /// Transcript permalink when the event names a message.
    pub transcript_link: Option<String>,
    /// `@name` of the acting user with whitespace stripped.
    pub mention: Option<String>,
    /// Room that delivered the event; detached for hand-built events.
    room: RoomRef,
}

impl ChatEvent {
    /// Decodes one entry of a frame's event list.
    ///
    /// `chat_base` is the chat origin (`https://host`) used for permalinks.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the entry has no numeric `event_type`.
    pub fn decode(value: Value, room_id: RoomId, chat_base: &str) -> Result<Self> {
        let data: EventData = serde_json::from_value(value)?;
        Ok(Self::from_data(data, room_id, chat_base))
    }

    /// Wraps already parsed fields.
    #[must_use]
    pub fn from_data(data: EventData, room_id: RoomId, chat_base: &str) -> Self {
        let transcript_link = data
            .message_id
            .filter(|id| id.get() != 0)
            .map(|id| format!("{chat_base}/transcript/message/{id}"));

        let mention = data
            .user_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|name| {
                let compact: String = name.chars().filter(|c| !c.is_whitespace()).collect();
                format!("@{compact}")
            });

        Self {
            kind: EventKind::from_code(data.event_type),
            room_id,
            data,
            transcript_link,
            mention,
            room: RoomRef::default(),
        }
    }

    /// Binds the event to the room that delivered it.
    #[must_use]
    pub(crate) fn with_room(mut self, room: RoomRef) -> Self {
        self.room = room;
        self
    }

    /// Returns the room that delivered the event while it is still joined.
    #[inline]
    #[must_use]
    pub fn room(&self) -> Option<Room> {
        self.room.room()
    }

    /// Returns the client of the delivering room while it is alive.
    #[inline]
    #[must_use]
    pub fn client(&self) -> Option<Client> {
        self.room.client()
    }

    /// Replies to the message this event carries, in the delivering room.
    ///
    /// # Errors
    ///
    /// - [`Error::Client`] if the event carries no message or the room is gone
    /// - Any error of [`Client::send`]
    pub async fn reply(&self, content: &str) -> Result<MessageId> {
        let target = self
            .reply_target()
            .ok_or_else(|| Error::client(format!("{:?} events cannot be replied to.", self.kind)))?;
        let room = self
            .room()
            .ok_or_else(|| Error::client(format!("Room {} is no longer joined.", self.room_id)))?;
        room.reply(target, content).await
    }

    /// Returns the referenced message id.
    #[inline]
    #[must_use]
    pub fn message_id(&self) -> Option<MessageId> {
        self.data.message_id
    }

    /// Returns the acting user id.
    #[inline]
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.data.user_id
    }

    /// Returns the acting user's name.
    #[inline]
    #[must_use]
    pub fn user_name(&self) -> Option<&str> {
        self.data.user_name.as_deref()
    }

    /// Returns the event content.
    #[inline]
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.data.content.as_deref()
    }

    /// Returns the message a reply to this event should address.
    ///
    /// `None` for kinds that do not carry a message.
    #[must_use]
    pub fn reply_target(&self) -> Option<MessageId> {
        if self.kind.is_message_bearing() {
            self.data.message_id
        } else {
            None
        }
    }

    /// Parses the payload of a suspension event.
    #[must_use]
    pub fn suspension(&self) -> Option<SuspensionChange> {
        if self.kind != EventKind::Suspension {
            return None;
        }
        SuspensionChange::parse(self.content()?)
    }
}

// ============================================================================
// SuspensionChange
// ============================================================================

/// Payload of a suspension event (`"<code> <json>"`).
#[derive(Debug, Clone, PartialEq)]
pub enum SuspensionChange {
    /// Code `4`: a suspension was added; carries the new suspension.
    Added(Value),
    /// Code `5`: a suspension was lifted; carries the old suspension.
    Removed(Value),
    /// Any other code.
    Other(String),
}

impl SuspensionChange {
    /// Parses the content of a suspension event.
    ///
    /// Returns `None` when the JSON part is malformed.
    #[must_use]
    pub fn parse(content: &str) -> Option<Self> {
        let (code, json) = content.split_once(' ').unwrap_or((content, ""));

        match code {
            "4" | "5" => {
                let mut payload: Map<String, Value> = match serde_json::from_str(json) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, code, "Malformed suspension payload");
                        return None;
                    }
                };

                if code == "4" {
                    Some(Self::Added(payload.remove("new").unwrap_or(Value::Null)))
                } else {
                    Some(Self::Removed(payload.remove("old").unwrap_or(Value::Null)))
                }
            }
            other => Some(Self::Other(other.to_string())),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    const BASE: &str = "https://chat.stackexchange.com";

    #[test]
    fn test_codes_roundtrip() {
        for code in [1, 2, 3, 4, 5, 6, 8, 10, 15, 17, 18, 19, 20, 22, 29] {
            let kind = EventKind::from_code(code);
            assert!(!matches!(kind, EventKind::Unrecognized(_)), "code {code}");
            assert_eq!(kind.code(), code);
        }
        assert_eq!(EventKind::from_code(7), EventKind::Unrecognized(7));
    }

    #[test]
    fn test_decode_message_event() {
        let event = ChatEvent::decode(
            json!({
                "event_type": 1,
                "time_stamp": 1700000000,
                "content": "hello",
                "id": 100,
                "user_id": 42,
                "user_name": "Jane Q Doe",
                "room_id": 5,
                "room_name": "Sandbox",
                "message_id": 9,
                "custom": true
            }),
            RoomId::new(5),
            BASE,
        )
        .expect("decode");

        assert_eq!(event.kind, EventKind::MessageCreate);
        assert_eq!(event.message_id(), Some(MessageId::new(9)));
        assert_eq!(event.user_id(), Some(UserId::new(42)));
        assert_eq!(event.content(), Some("hello"));
        assert_eq!(
            event.transcript_link.as_deref(),
            Some("https://chat.stackexchange.com/transcript/message/9")
        );
        assert_eq!(event.mention.as_deref(), Some("@JaneQDoe"));
        assert_eq!(event.reply_target(), Some(MessageId::new(9)));
        assert_eq!(event.data.extra.get("custom"), Some(&json!(true)));
    }

    #[test]
    fn test_decode_without_message_or_user() {
        let event = ChatEvent::decode(json!({"event_type": 4, "user_name": ""}), RoomId::new(1), BASE)
            .expect("decode");

        assert_eq!(event.kind, EventKind::UserLeave);
        assert!(event.transcript_link.is_none());
        assert!(event.mention.is_none());
        assert!(event.reply_target().is_none());
    }

    #[test]
    fn test_delete_is_not_reply_target() {
        let event = ChatEvent::decode(
            json!({"event_type": 10, "message_id": 3}),
            RoomId::new(1),
            BASE,
        )
        .expect("decode");

        assert!(event.transcript_link.is_some());
        assert!(event.reply_target().is_none());
    }

    #[test]
    fn test_decode_system_user() {
        let event = ChatEvent::decode(
            json!({"event_type": 22, "user_id": -2, "target_user_id": -1, "user_name": "Feeds"}),
            RoomId::new(1),
            BASE,
        )
        .expect("decode");

        assert_eq!(event.kind, EventKind::FeedTicker);
        assert_eq!(event.user_id(), Some(UserId::new(-2)));
        assert_eq!(event.data.target_user_id, Some(UserId::new(-1)));
    }

    #[tokio::test]
    async fn test_detached_event_cannot_reply() {
        let event = ChatEvent::decode(json!({"event_type": 1, "message_id": 3}), RoomId::new(1), BASE)
            .expect("decode");

        assert!(event.room().is_none());
        assert!(event.client().is_none());
        assert!(matches!(event.reply("hi").await, Err(Error::Client { .. })));
    }

    #[test]
    fn test_decode_requires_event_type() {
        assert!(ChatEvent::decode(json!({"message_id": 3}), RoomId::new(1), BASE).is_err());
    }

    #[test]
    fn test_suspension_parsing() {
        assert_eq!(
            SuspensionChange::parse(r#"4 {"new": {"days": 3}, "old": null}"#),
            Some(SuspensionChange::Added(json!({"days": 3})))
        );
        assert_eq!(
            SuspensionChange::parse(r#"5 {"old": {"days": 3}}"#),
            Some(SuspensionChange::Removed(json!({"days": 3})))
        );
        assert_eq!(
            SuspensionChange::parse("7 {}"),
            Some(SuspensionChange::Other("7".into()))
        );
        assert_eq!(SuspensionChange::parse("4 not-json"), None);
    }
}
