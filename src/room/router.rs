//! Per-room event router.
//!
//! Decodes frames received on a room's socket, keeps the room's message
//! cache current and fans each event out as a [`Notification`].
//!
//! | Kind | Side effect before fan-out |
//! |------|----------------------------|
//! | create | cache the message |
//! | update | read previous, cache new; carry both |
//! | rename | carry the previously known name |
//! | delete | carry cached message, then evict it |
//! | access | user-level if a target user is named, else room-level |
//! | move out / in | single notification now, batch after the quiet window |
//! | suspension | add (code 4) / remove (code 5), others dropped |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::identifiers::{MessageId, RoomId};
use crate::protocol::{ChatEvent, EventKind, SuspensionChange, room_events};
use crate::util::{BoundedCache, DebounceTrigger};

use super::core::RoomRef;
use super::listeners::{FanOut, Notification};

// ============================================================================
// EventRouter
// ============================================================================

/// Frame decoder and dispatcher for one room.
pub(crate) struct EventRouter {
    /// Room whose entries are processed.
    room_id: RoomId,
    /// Chat origin used for transcript links.
    chat_base: String,
    /// Room name shared with the room handle.
    name: Arc<RwLock<Option<String>>>,
    /// Recent messages.
    cache: Mutex<BoundedCache<MessageId, ChatEvent>>,
    /// Pending move-out batch.
    move_out: DebounceTrigger<ChatEvent>,
    /// Pending move-in batch.
    move_in: DebounceTrigger<ChatEvent>,
    /// Listener delivery.
    fan_out: FanOut,
    /// Back-reference attached to every decoded event.
    room: RoomRef,
}

impl EventRouter {
    /// Creates a router for `room_id`.
    pub(crate) fn new(
        room_id: RoomId,
        chat_base: impl Into<String>,
        name: Arc<RwLock<Option<String>>>,
        cache_limit: usize,
        fan_out: FanOut,
        room: RoomRef,
    ) -> Self {
        Self {
            room_id,
            chat_base: chat_base.into(),
            name,
            cache: Mutex::new(BoundedCache::new(cache_limit)),
            move_out: DebounceTrigger::default(),
            move_in: DebounceTrigger::default(),
            fan_out,
            room,
        }
    }

    /// Returns a cached message.
    pub(crate) fn cached(&self, message_id: MessageId) -> Option<ChatEvent> {
        self.cache.lock().get(&message_id).cloned()
    }

    /// Returns the number of cached messages.
    pub(crate) fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Returns the cache capacity.
    pub(crate) fn cache_limit(&self) -> usize {
        self.cache.lock().max()
    }

    /// Changes the cache capacity.
    pub(crate) fn set_cache_limit(&self, limit: usize) {
        self.cache.lock().set_max(limit);
    }

    /// Handles one socket frame.
    pub(crate) fn handle_frame(&self, text: &str) {
        let events = match room_events(text, self.room_id) {
            Ok(Some(events)) => events,
            Ok(None) => {
                trace!(room_id = %self.room_id, "Heartbeat frame");
                return;
            }
            Err(e) => {
                warn!(room_id = %self.room_id, error = %e, "Undecodable frame");
                return;
            }
        };

        for raw in events {
            match ChatEvent::decode(raw, self.room_id, &self.chat_base) {
                Ok(event) => self.dispatch(event.with_room(self.room.clone())),
                Err(e) => warn!(room_id = %self.room_id, error = %e, "Skipping malformed event"),
            }
        }
    }

    /// Applies side effects for one event and fans it out.
    pub(crate) fn dispatch(&self, event: ChatEvent) {
        trace!(
            room_id = %self.room_id,
            event_type = event.kind.code(),
            message_id = ?event.message_id(),
            "Dispatching event"
        );

        let notification = match event.kind {
            EventKind::MessageCreate => {
                if let Some(id) = event.message_id() {
                    self.cache.lock().set(id, event.clone());
                }
                Notification::MessageCreate(event)
            }

            EventKind::MessageUpdate => {
                let before = event.message_id().and_then(|id| {
                    let mut cache = self.cache.lock();
                    let before = cache.get(&id).cloned();
                    cache.set(id, event.clone());
                    before
                });
                Notification::MessageUpdate {
                    before,
                    after: event,
                }
            }

            EventKind::UserJoin => Notification::UserJoin(event),
            EventKind::UserLeave => Notification::UserLeave(event),

            EventKind::RoomRename => {
                let old_name = self.name.read().clone();
                let new_name = event.data.room_name.clone();
                self.fan_out.emit(&Notification::RoomNameUpdate { old_name, event });
                if new_name.is_some() {
                    *self.name.write() = new_name;
                }
                return;
            }

            EventKind::MessageStar => Notification::MessageStarUpdate(event),
            EventKind::Ping => Notification::Ping(event),

            EventKind::MessageDelete => {
                let id = event.message_id();
                let cached = id.and_then(|id| self.cached(id));
                self.fan_out
                    .emit(&Notification::MessageDelete { cached, event });
                if let Some(id) = id {
                    self.cache.lock().delete(&id);
                }
                return;
            }

            EventKind::AccessChange => {
                if event.data.target_user_id.is_some() {
                    Notification::UserAccessUpdate(event)
                } else {
                    Notification::GlobalAccessUpdate(event)
                }
            }

            EventKind::Invite => Notification::Invite(event),
            EventKind::ReplyCreate => Notification::MessageReplyCreate(event),

            EventKind::MoveOut => {
                self.fan_out
                    .emit(&Notification::MessageMoveOut(event.clone()));
                let fan_out = self.fan_out.clone();
                self.move_out.insert(event, move |batch| {
                    fan_out.emit(&Notification::MessageBlockMoveOut(batch));
                });
                return;
            }

            EventKind::MoveIn => {
                self.fan_out
                    .emit(&Notification::MessageMoveIn(event.clone()));
                let fan_out = self.fan_out.clone();
                self.move_in.insert(event, move |batch| {
                    fan_out.emit(&Notification::MessageBlockMoveIn(batch));
                });
                return;
            }

            EventKind::FeedTicker => Notification::FeedTicker(event),

            EventKind::Suspension => match event.suspension() {
                Some(SuspensionChange::Added(suspension)) => {
                    Notification::UserSuspensionAdd { event, suspension }
                }
                Some(SuspensionChange::Removed(suspension)) => {
                    Notification::UserSuspensionRemove { event, suspension }
                }
                Some(SuspensionChange::Other(code)) => {
                    debug!(room_id = %self.room_id, code, "Ignoring suspension change");
                    return;
                }
                None => return,
            },

            EventKind::Unrecognized(code) => {
                debug!(
                    room_id = %self.room_id,
                    event_type = code,
                    raw = %serde_json::to_string(&event.data).unwrap_or_default(),
                    "Unrecognized event"
                );
                Notification::Unrecognized(event)
            }
        };

        self.fan_out.emit(&notification);
    }
}

// ============================================================================
// Tests
// ============================================================================
