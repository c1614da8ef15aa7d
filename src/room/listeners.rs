//! Typed listener registry.
//!
//! Rooms and the client each own a [`Listeners`] registry. A decoded event
//! becomes a [`Notification`] and is delivered to the client's listeners
//! first, then to the room's, each in subscription order.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::identifiers::SubscriptionId;
use crate::protocol::ChatEvent;

// ============================================================================
// EventName
// ============================================================================

/// Names listeners subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// A message was posted.
    MessageCreate,
    /// A message was edited.
    MessageUpdate,
    /// A user entered the room.
    UserJoin,
    /// A user left the room.
    UserLeave,
    /// The room was renamed.
    RoomNameUpdate,
    /// A message's stars changed.
    MessageStarUpdate,
    /// The current user was mentioned.
    Ping,
    /// A message was deleted.
    MessageDelete,
    /// A specific user's access changed.
    UserAccessUpdate,
    /// The room's access changed.
    GlobalAccessUpdate,
    /// The current user was invited somewhere.
    Invite,
    /// A reply to the current user was posted.
    MessageReplyCreate,
    /// One message moved out.
    MessageMoveOut,
    /// A burst of messages moved out.
    MessageBlockMoveOut,
    /// One message moved in.
    MessageMoveIn,
    /// A burst of messages moved in.
    MessageBlockMoveIn,
    /// A feed ticker item.
    FeedTicker,
    /// A user was suspended.
    UserSuspensionAdd,
    /// A user's suspension was lifted.
    UserSuspensionRemove,
    /// An event with an unknown code.
    Unrecognized,
}

// ============================================================================
// Notification
// ============================================================================

/// Payload delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A message was posted.
    MessageCreate(ChatEvent),
    /// A message was edited.
    MessageUpdate {
        /// Cached version before the edit, if still cached.
        before: Option<ChatEvent>,
        /// The edit event.
        after: ChatEvent,
    },
    /// A user entered the room.
    UserJoin(ChatEvent),
    /// A user left the room.
    UserLeave(ChatEvent),
    /// The room was renamed.
    RoomNameUpdate {
        /// Name known before the rename.
        old_name: Option<String>,
        /// The rename event.
        event: ChatEvent,
    },
    /// A message's stars changed.
    MessageStarUpdate(ChatEvent),
    /// The current user was mentioned.
    Ping(ChatEvent),
    /// A message was deleted.
    MessageDelete {
        /// Cached message, if still cached.
        cached: Option<ChatEvent>,
        /// The delete event.
        event: ChatEvent,
    },
    /// A specific user's access changed.
    UserAccessUpdate(ChatEvent),
    /// The room's access changed.
    GlobalAccessUpdate(ChatEvent),
    /// The current user was invited somewhere.
    Invite(ChatEvent),
    /// A reply to the current user was posted.
    MessageReplyCreate(ChatEvent),
    /// One message moved out.
    MessageMoveOut(ChatEvent),
    /// A burst of messages moved out.
    MessageBlockMoveOut(Vec<ChatEvent>),
    /// One message moved in.
    MessageMoveIn(ChatEvent),
    /// A burst of messages moved in.
    MessageBlockMoveIn(Vec<ChatEvent>),
    /// A feed ticker item.
    FeedTicker(ChatEvent),
    /// A user was suspended.
    UserSuspensionAdd {
        /// The suspension event.
        event: ChatEvent,
        /// The new suspension.
        suspension: Value,
    },
    /// A user's suspension was lifted.
    UserSuspensionRemove {
        /// The suspension event.
        event: ChatEvent,
        /// The lifted suspension.
        suspension: Value,
    },
    /// An event with an unknown code.
    Unrecognized(ChatEvent),
}

impl Notification {
    /// Returns the name listeners subscribe to for this notification.
    #[must_use]
    pub fn name(&self) -> EventName {
        match self {
            Self::MessageCreate(_) => EventName::MessageCreate,
            Self::MessageUpdate { .. } => EventName::MessageUpdate,
            Self::UserJoin(_) => EventName::UserJoin,
            Self::UserLeave(_) => EventName::UserLeave,
            Self::RoomNameUpdate { .. } => EventName::RoomNameUpdate,
            Self::MessageStarUpdate(_) => EventName::MessageStarUpdate,
            Self::Ping(_) => EventName::Ping,
            Self::MessageDelete { .. } => EventName::MessageDelete,
            Self::UserAccessUpdate(_) => EventName::UserAccessUpdate,
            Self::GlobalAccessUpdate(_) => EventName::GlobalAccessUpdate,
            Self::Invite(_) => EventName::Invite,
            Self::MessageReplyCreate(_) => EventName::MessageReplyCreate,
            Self::MessageMoveOut(_) => EventName::MessageMoveOut,
            Self::MessageBlockMoveOut(_) => EventName::MessageBlockMoveOut,
            Self::MessageMoveIn(_) => EventName::MessageMoveIn,
            Self::MessageBlockMoveIn(_) => EventName::MessageBlockMoveIn,
            Self::FeedTicker(_) => EventName::FeedTicker,
            Self::UserSuspensionAdd { .. } => EventName::UserSuspensionAdd,
            Self::UserSuspensionRemove { .. } => EventName::UserSuspensionRemove,
            Self::Unrecognized(_) => EventName::Unrecognized,
        }
    }

    /// Returns the triggering event; `None` for batches.
    #[must_use]
    pub fn event(&self) -> Option<&ChatEvent> {
        match self {
            Self::MessageCreate(event)
            | Self::UserJoin(event)
            | Self::UserLeave(event)
            | Self::MessageStarUpdate(event)
            | Self::Ping(event)
            | Self::UserAccessUpdate(event)
            | Self::GlobalAccessUpdate(event)
            | Self::Invite(event)
            | Self::MessageReplyCreate(event)
            | Self::MessageMoveOut(event)
            | Self::MessageMoveIn(event)
            | Self::FeedTicker(event)
            | Self::Unrecognized(event) => Some(event),
            Self::MessageUpdate { after: event, .. }
            | Self::RoomNameUpdate { event, .. }
            | Self::MessageDelete { event, .. }
            | Self::UserSuspensionAdd { event, .. }
            | Self::UserSuspensionRemove { event, .. } => Some(event),
            Self::MessageBlockMoveOut(_) | Self::MessageBlockMoveIn(_) => None,
        }
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Listener callback type.
pub type Listener = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Multi-subscriber registry keyed by [`EventName`].
#[derive(Default)]
pub struct Listeners {
    entries: Mutex<FxHashMap<EventName, Vec<(SubscriptionId, Listener)>>>,
}

impl Listeners {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to `name`.
    pub fn on<F>(&self, name: EventName, listener: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = SubscriptionId::generate();
        self.entries
            .lock()
            .entry(name)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a subscription. Returns `false` if it was not registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        for listeners in entries.values_mut() {
            if let Some(index) = listeners.iter().position(|(existing, _)| *existing == id) {
                listeners.remove(index);
                return true;
            }
        }
        false
    }

    /// Returns the number of listeners for `name`.
    #[must_use]
    pub fn count(&self, name: EventName) -> usize {
        self.entries.lock().get(&name).map_or(0, Vec::len)
    }

    /// Invokes every listener for the notification's name, in order.
    ///
    /// Listeners run outside the lock and may subscribe or unsubscribe.
    pub fn emit(&self, notification: &Notification) {
        let listeners: Vec<Listener> = self
            .entries
            .lock()
            .get(&notification.name())
            .map(|listeners| listeners.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in listeners {
            listener(notification);
        }
    }
}

// ============================================================================
// FanOut
// ============================================================================

/// Delivers a room's notifications to the client, then to the room.
#[derive(Clone)]
pub(crate) struct FanOut {
    client: Arc<Listeners>,
    room: Arc<Listeners>,
}

impl FanOut {
    /// Creates a fan-out over both registries.
    pub(crate) fn new(client: Arc<Listeners>, room: Arc<Listeners>) -> Self {
        Self { client, room }
    }

    /// Delivers `notification` to both registries.
    pub(crate) fn emit(&self, notification: &Notification) {
        self.client.emit(notification);
        self.room.emit(notification);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::RoomId;

    fn event(code: u32) -> ChatEvent {
        ChatEvent::decode(json!({"event_type": code}), RoomId::new(1), "https://h").expect("decode")
    }

    #[test]
    fn test_emit_in_subscription_order() {
        let listeners = Listeners::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let log = Arc::clone(&log);
            listeners.on(EventName::UserJoin, move |_| log.lock().push(tag));
        }
        let other = Arc::clone(&log);
        listeners.on(EventName::UserLeave, move |_| other.lock().push("leave"));

        listeners.emit(&Notification::UserJoin(event(3)));
        assert_eq!(*log.lock(), ["first", "second"]);
    }

    #[test]
    fn test_off_removes_listener() {
        let listeners = Listeners::new();
        let id = listeners.on(EventName::Ping, |_| {});
        assert_eq!(listeners.count(EventName::Ping), 1);

        assert!(listeners.off(id));
        assert!(!listeners.off(id));
        assert_eq!(listeners.count(EventName::Ping), 0);
    }

    #[test]
    fn test_fan_out_client_then_room() {
        let client = Arc::new(Listeners::new());
        let room = Arc::new(Listeners::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let room_log = Arc::clone(&log);
        room.on(EventName::Ping, move |_| room_log.lock().push("room"));
        let client_log = Arc::clone(&log);
        client.on(EventName::Ping, move |_| client_log.lock().push("client"));

        FanOut::new(client, room).emit(&Notification::Ping(event(8)));
        assert_eq!(*log.lock(), ["client", "room"]);
    }

    #[test]
    fn test_listener_may_subscribe_during_emit() {
        let listeners = Arc::new(Listeners::new());
        let inner = Arc::clone(&listeners);
        listeners.on(EventName::Invite, move |_| {
            inner.on(EventName::Invite, |_| {});
        });

        listeners.emit(&Notification::Invite(event(17)));
        assert_eq!(listeners.count(EventName::Invite), 2);
    }

    #[test]
    fn test_notification_event_accessor() {
        assert!(Notification::MessageBlockMoveIn(vec![event(20)]).event().is_none());
        let update = Notification::MessageUpdate {
            before: None,
            after: event(2),
        };
        assert_eq!(update.name(), EventName::MessageUpdate);
        assert_eq!(update.event().map(|e| e.kind.code()), Some(2));
    }
}
