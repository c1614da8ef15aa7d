//! Live frame decoding.
//!
//! Every socket message is a JSON object keyed by room:
//!
//! ```json
//! { "r5": { "e": [ { "event_type": 1, ... } ], "t": 123, "d": 1 } }
//! ```
//!
//! A socket subscribed to one room may still carry entries for other rooms
//! (invites, pings). Only the entry for the socket's own room is decoded;
//! an entry without an `e` list is a heartbeat.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::Result;
use crate::identifiers::RoomId;

// ============================================================================
// Frame Decoding
// ============================================================================

/// Extracts the raw event list addressed to `room_id`.
///
/// Returns `Ok(None)` for frames with nothing for this room.
///
/// # Errors
///
/// Returns [`crate::Error::Json`] if the frame is not valid JSON.
pub fn room_events(text: &str, room_id: RoomId) -> Result<Option<Vec<Value>>> {
    let mut frame: Value = serde_json::from_str(text)?;

    let events = frame
        .get_mut(room_id.frame_key())
        .and_then(|entry| entry.get_mut("e"))
        .map(Value::take);

    match events {
        Some(Value::Array(events)) => Ok(Some(events)),
        _ => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_own_room() {
        let text = r#"{"r5":{"e":[{"event_type":1,"message_id":9,"room_id":5}]},"r6":{"e":[{"event_type":1}]}}"#;
        let events = room_events(text, RoomId::new(5)).expect("parse").expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["message_id"], 9);
    }

    #[test]
    fn test_heartbeat_frame() {
        assert!(room_events(r#"{"r5":{"t":1,"d":2}}"#, RoomId::new(5)).expect("parse").is_none());
        assert!(room_events(r#"{"r6":{"e":[]}}"#, RoomId::new(5)).expect("parse").is_none());
        assert!(room_events("{}", RoomId::new(5)).expect("parse").is_none());
    }

    #[test]
    fn test_invalid_json() {
        assert!(room_events("not json", RoomId::new(5)).is_err());
    }
}
