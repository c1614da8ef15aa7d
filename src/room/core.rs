//! Room handle.
//!
//! A [`Room`] is created by [`Client::join_room`](crate::Client::join_room)
//! and shares its state between clones. It owns the live connection and the
//! event router; actions are forwarded to the owning client's queue.
//!
//! # Connection States
//!
//! ```text
//! Disconnected ──connect_ws──► Handshaking ──socket open──► Connected
//!       ▲                           │                          │
//!       └──────── failure ──────────┘              close / remote close
//!                                                              ▼
//!                                                           Closed
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::client::scrape;
use crate::client::{Client, ClientInner};
use crate::error::{Error, Result};
use crate::identifiers::{MessageId, RoomId, SubscriptionId};
use crate::protocol::ChatEvent;
use crate::transport::{Connection, FrameHandler, RequestOptions};

use super::listeners::{EventName, FanOut, Listeners, Notification};
use super::router::EventRouter;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle of a room's live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket; initial state and the state after a failed connect.
    Disconnected,
    /// Negotiating the socket URL.
    Handshaking,
    /// Socket open and delivering frames.
    Connected,
    /// Socket closed locally or by the server.
    Closed,
}

/// Body of the socket negotiation response.
#[derive(Deserialize)]
struct SocketAuth {
    url: String,
}

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a room.
pub(crate) struct RoomInner {
    /// Room id.
    id: RoomId,
    /// Owning client; weak so that dropping the client drops its rooms.
    client: Weak<ClientInner>,
    /// Chat origin.
    chat_base: String,
    /// Last known name, shared with the router.
    name: Arc<RwLock<Option<String>>>,
    /// Frame decoding, cache and fan-out.
    router: EventRouter,
    /// Room-level listeners.
    listeners: Arc<Listeners>,
    /// Lifecycle state.
    state: RwLock<ConnectionState>,
    /// Live socket, once connected.
    connection: Mutex<Option<Connection>>,
}

// ============================================================================
// Room
// ============================================================================

/// A joined chat room.
#[derive(Clone)]
pub struct Room {
    /// Shared inner state.
    pub(crate) inner: Arc<RoomInner>,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Room {}>", self.inner.id)
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.inner.id)
            .field("name", &*self.inner.name.read())
            .field("state", &self.state())
            .field("cached", &self.inner.router.cache_len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// RoomRef
// ============================================================================

/// Weak back-reference from an event to the room that delivered it.
///
/// Holding one does not keep the room joined or its socket open.
#[derive(Clone, Default)]
pub struct RoomRef {
    inner: Weak<RoomInner>,
}

impl RoomRef {
    /// Wraps a weak room pointer.
    #[inline]
    pub(crate) fn new(inner: Weak<RoomInner>) -> Self {
        Self { inner }
    }

    /// Returns the room if it is still alive.
    #[must_use]
    pub fn room(&self) -> Option<Room> {
        self.inner.upgrade().map(|inner| Room { inner })
    }

    /// Returns the room's client if both are still alive.
    #[must_use]
    pub fn client(&self) -> Option<Client> {
        let room = self.inner.upgrade()?;
        room.client.upgrade().map(|inner| Client { inner })
    }
}

impl PartialEq for RoomRef {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for RoomRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.upgrade() {
            Some(room) => write!(f, "RoomRef({})", room.id),
            None => f.write_str("RoomRef(detached)"),
        }
    }
}

// ============================================================================
// Room - Constructor
// ============================================================================

impl Room {
    /// Creates a disconnected room bound to `client`.
    pub(crate) fn new(client: &Arc<ClientInner>, id: RoomId, cache_limit: usize) -> Self {
        let chat_base = client.config.chat_base();
        let listeners = Arc::new(Listeners::new());
        let name = Arc::new(RwLock::new(None));
        let fan_out = FanOut::new(Arc::clone(&client.listeners), Arc::clone(&listeners));

        debug!(room_id = %id, cache_limit, "Room created");

        let inner = Arc::new_cyclic(|this| {
            let router = EventRouter::new(
                id,
                chat_base.clone(),
                Arc::clone(&name),
                cache_limit,
                fan_out,
                RoomRef::new(this.clone()),
            );
            RoomInner {
                id,
                client: Arc::downgrade(client),
                chat_base,
                name,
                router,
                listeners,
                state: RwLock::new(ConnectionState::Disconnected),
                connection: Mutex::new(None),
            }
        });

        Self { inner }
    }

    /// Returns the owning client.
    fn client(&self) -> Result<Arc<ClientInner>> {
        self.inner
            .client
            .upgrade()
            .ok_or_else(|| Error::client(format!("Client of room {} has been dropped.", self.inner.id)))
    }
}

// ============================================================================
// Room - Accessors
// ============================================================================

impl Room {
    /// Returns the room id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> RoomId {
        self.inner.id
    }

    /// Returns the last known name; `None` until it has been fetched.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.inner.name.read().clone()
    }

    /// Returns the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        let state = *self.inner.state.read();
        if state == ConnectionState::Connected
            && self
                .inner
                .connection
                .lock()
                .as_ref()
                .is_none_or(Connection::is_closed)
        {
            return ConnectionState::Closed;
        }
        state
    }

    /// Returns a cached message.
    #[must_use]
    pub fn cached_message(&self, message_id: MessageId) -> Option<ChatEvent> {
        self.inner.router.cached(message_id)
    }

    /// Returns the message cache capacity.
    #[must_use]
    pub fn cache_limit(&self) -> usize {
        self.inner.router.cache_limit()
    }

    /// Changes the message cache capacity, evicting the oldest entries.
    pub fn set_cache_limit(&self, limit: usize) {
        self.inner.router.set_cache_limit(limit);
    }
}

// ============================================================================
// Room - Connection
// ============================================================================

impl Room {
    /// Negotiates a socket URL and opens the live connection.
    ///
    /// Returns once the socket is open. A previous connection is replaced.
    ///
    /// # Errors
    ///
    /// - [`Error::Client`] if the client is not logged in
    /// - [`Error::Websocket`] if negotiation or the socket handshake fails
    pub async fn connect_ws(&self) -> Result<()> {
        let client = self.client()?;
        let fkey = client.fkey()?;

        *self.inner.state.write() = ConnectionState::Handshaking;

        match self.open_socket(&client, fkey).await {
            Ok(connection) => {
                if let Some(previous) = self.inner.connection.lock().replace(connection) {
                    previous.shutdown();
                }
                *self.inner.state.write() = ConnectionState::Connected;
                info!(room_id = %self.inner.id, "Room connected");
                Ok(())
            }
            Err(e) => {
                *self.inner.state.write() = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Runs the negotiation and the socket handshake.
    async fn open_socket(&self, client: &ClientInner, fkey: String) -> Result<Connection> {
        let id = self.inner.id;
        let failed = |e: Error| Error::websocket_with(id, format!("failed to connect to room {id}"), e);

        let options = RequestOptions::new().payload([("fkey", fkey), ("roomid", id.to_string())]);
        let response = client
            .request(&format!("{}/ws-auth", self.inner.chat_base), options)
            .await
            .map_err(failed)?;

        let auth: SocketAuth = serde_json::from_str(&response.body).map_err(|e| failed(e.into()))?;
        let mut url = Url::parse(&auth.url).map_err(|e| failed(e.into()))?;
        url.query_pairs_mut()
            .append_pair("l", &unix_millis().to_string());
        debug!(room_id = %id, %url, "Socket URL negotiated");

        let room = Arc::downgrade(&self.inner);
        let handler: FrameHandler = Box::new(move |text| {
            if let Some(room) = room.upgrade() {
                room.router.handle_frame(text);
            }
        });

        Connection::connect(url.as_str(), &self.inner.chat_base, handler)
            .await
            .map_err(failed)
    }

    /// Closes the live connection.
    pub fn close(&self) {
        *self.inner.state.write() = ConnectionState::Closed;
        if let Some(connection) = self.inner.connection.lock().take() {
            connection.shutdown();
            debug!(room_id = %self.inner.id, "Room connection closed");
        }
    }

    /// Fetches the room's name and stores it.
    ///
    /// # Errors
    ///
    /// - [`Error::Client`] if the info page has no name
    /// - Any transport error
    pub async fn fetch_name(&self) -> Result<String> {
        let client = self.client()?;
        let url = format!("{}/rooms/info/{}", self.inner.chat_base, self.inner.id);
        let response = client.request(&url, RequestOptions::new()).await?;

        let name = scrape::room_name(&response.body)
            .ok_or_else(|| Error::client(format!("Could not read the name of room {}.", self.inner.id)))?;
        *self.inner.name.write() = Some(name.clone());
        Ok(name)
    }

    /// Fetches the name in the background.
    pub(crate) fn spawn_name_fetch(&self) {
        let room = self.clone();
        tokio::spawn(async move {
            match room.fetch_name().await {
                Ok(name) => debug!(room_id = %room.inner.id, name, "Room name fetched"),
                Err(e) => debug!(room_id = %room.inner.id, error = %e, "Room name unavailable"),
            }
        });
    }
}

// ============================================================================
// Room - Actions
// ============================================================================

impl Room {
    /// Posts a message and returns its id.
    ///
    /// # Errors
    ///
    /// See [`Client::send`](crate::Client::send).
    pub async fn send(&self, content: &str) -> Result<MessageId> {
        self.client()?.send(self.inner.id, content).await
    }

    /// Posts `content` as a reply to `message_id`.
    ///
    /// # Errors
    ///
    /// See [`Client::send`](crate::Client::send).
    pub async fn reply(&self, message_id: MessageId, content: &str) -> Result<MessageId> {
        self.send(&format!(":{message_id} {content}")).await
    }

    /// Replaces the text of a message.
    ///
    /// # Errors
    ///
    /// See [`Client::edit_message`](crate::Client::edit_message).
    pub async fn edit_message(&self, message_id: MessageId, content: &str) -> Result<()> {
        self.client()?
            .edit_message(self.inner.id, message_id, content)
            .await
    }

    /// Deletes a message.
    ///
    /// # Errors
    ///
    /// See [`Client::delete_message`](crate::Client::delete_message).
    pub async fn delete_message(&self, message_id: MessageId) -> Result<()> {
        self.client()?.delete_message(self.inner.id, message_id).await
    }

    /// Toggles the room-owner pin of a message.
    ///
    /// # Errors
    ///
    /// See [`Client::pin_message`](crate::Client::pin_message).
    pub async fn pin_message(&self, message_id: MessageId) -> Result<()> {
        self.client()?.pin_message(self.inner.id, message_id).await
    }
}

// ============================================================================
// Room - Listeners
// ============================================================================

impl Room {
    /// Subscribes to an event of this room.
    ///
    /// Room listeners run after the client's listeners.
    pub fn on<F>(&self, name: EventName, listener: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.inner.listeners.on(name, listener)
    }

    /// Removes a room-level subscription.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.listeners.off(id)
    }
}

/// Milliseconds since the Unix epoch, used to bust socket URL caches.
fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::Client;
    use crate::test_support::{ScriptedFetch, WsServer, eventually};
    use crate::transport::HttpResponse;

    const HOME_PAGE: &str =
        r#"<div class="topbar-menu-links"><a href="/users/77/bot">bot</a></div>"#;

    /// A client logged in from stored credentials.
    async fn client(fetch: ScriptedFetch) -> (Client, Arc<ScriptedFetch>) {
        let fetch = Arc::new(fetch.route("https://chat.stackexchange.com", [HttpResponse::new(200, HOME_PAGE)]));
        let dir = tempfile::tempdir().expect("tempdir");
        let store = crate::client::FileCredentialStore::new(dir.path());
        crate::client::CredentialStore::save(
            &store,
            "meta",
            "a@b.c",
            "pw",
            &crate::client::Credentials {
                jar: Vec::new(),
                fkey: "f00".into(),
            },
        )
        .expect("save");

        let client = Client::builder()
            .fetcher(fetch.clone())
            .credential_store(store)
            .build()
            .expect("client");
        client.login("meta", "a@b.c", "pw").await.expect("login");
        (client, fetch)
    }

    #[tokio::test]
    async fn test_connect_negotiates_and_receives_frames() {
        let server = WsServer::start().await;
        let (client, fetch) = client(ScriptedFetch::new().route("/ws-auth", [server.auth_response()])).await;

        let room = Room::new(&client.inner, RoomId::new(5), 10);
        assert_eq!(room.state(), ConnectionState::Disconnected);
        room.connect_ws().await.expect("connect");
        assert_eq!(room.state(), ConnectionState::Connected);

        let auth = fetch.calls_to("/ws-auth").pop().expect("ws-auth call");
        assert_eq!(auth.field("fkey"), Some("f00"));
        assert_eq!(auth.field("roomid"), Some("5"));

        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        room.on(EventName::UserJoin, move |notification| {
            sink.lock().push(notification.event().and_then(ChatEvent::user_name).map(str::to_string));
        });

        server.push(r#"{"r6": {"e": [{"event_type": 3, "user_name": "elsewhere"}]}}"#);
        server.push(r#"{"r5": {"e": [{"event_type": 3, "user_name": "Ann"}]}}"#);
        server.push(r#"{"r5": {"e": [{"event_type": 3, "user_name": "Bob"}]}}"#);

        eventually(|| log.lock().len() == 2).await;
        assert_eq!(*log.lock(), [Some("Ann".to_string()), Some("Bob".to_string())]);

        room.close();
        assert_eq!(room.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_bad_negotiation_is_websocket_error() {
        let (client, _) = client(
            ScriptedFetch::new().route("/ws-auth", [HttpResponse::new(200, "<html>not json</html>")]),
        )
        .await;
        let room = Room::new(&client.inner, RoomId::new(5), 10);

        let error = room.connect_ws().await.expect_err("negotiation fails");
        match &error {
            Error::Websocket { room_id, source, .. } => {
                assert_eq!(*room_id, RoomId::new(5));
                assert!(matches!(**source, Error::Json(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(error.is_connection_error());
        assert_eq!(room.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_refused_socket_is_websocket_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let auth = serde_json::json!({ "url": format!("ws://127.0.0.1:{port}/events") }).to_string();
        let (client, _) = client(ScriptedFetch::new().route("/ws-auth", [HttpResponse::new(200, auth)])).await;
        let room = Room::new(&client.inner, RoomId::new(8), 10);

        let error = room.connect_ws().await.expect_err("socket refused");
        assert!(matches!(error, Error::Websocket { .. }));
    }

    #[tokio::test]
    async fn test_fetch_name_and_display() {
        let (client, _) = client(ScriptedFetch::new().route(
            "/rooms/info/5",
            [HttpResponse::new(200, r#"<div class="subheader"><h1>The &quot;Lounge&quot;</h1></div>"#)],
        ))
        .await;
        let room = Room::new(&client.inner, RoomId::new(5), 10);

        assert!(room.name().is_none());
        assert_eq!(room.fetch_name().await.expect("name"), "The \"Lounge\"");
        assert_eq!(room.name().as_deref(), Some("The \"Lounge\""));
        assert_eq!(room.to_string(), "<Room 5>");
    }

    #[tokio::test]
    async fn test_actions_forward_to_client() {
        let (client, fetch) = client(
            ScriptedFetch::new()
                .route("/messages/new", [HttpResponse::new(200, r#"{"id": 12}"#)])
                .route("/messages/12", [HttpResponse::new(200, "ok")]),
        )
        .await;
        let room = Room::new(&client.inner, RoomId::new(5), 10);

        assert_eq!(room.reply(MessageId::new(3), "hi").await.expect("reply"), MessageId::new(12));
        room.edit_message(MessageId::new(12), "edited").await.expect("edit");

        let sent = fetch.calls_to("/chats/5/messages/new").pop().expect("send");
        assert_eq!(sent.field("text"), Some(":3 hi"));
        let edit = fetch.calls_to("/messages/12").pop().expect("edit");
        assert_eq!(edit.field("text"), Some("edited"));
    }

    #[tokio::test]
    async fn test_dropped_client_is_client_error() {
        let (client, _) = client(ScriptedFetch::new()).await;
        let room = Room::new(&client.inner, RoomId::new(5), 10);
        drop(client);

        assert!(matches!(room.send("x").await, Err(Error::Client { .. })));
    }

    #[tokio::test]
    async fn test_listener_replies_through_event() {
        let (client, fetch) = client(
            ScriptedFetch::new().route("/messages/new", [HttpResponse::new(200, r#"{"id": 40}"#)]),
        )
        .await;
        let room = Room::new(&client.inner, RoomId::new(5), 10);

        let replies = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&replies);
        room.on(EventName::MessageCreate, move |notification| {
            let Some(event) = notification.event().cloned() else {
                return;
            };
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                let result = event.reply("pong").await;
                sink.lock().push(result.map_err(|e| e.to_string()));
            });
        });

        room.inner
            .router
            .handle_frame(r#"{"r5": {"e": [{"event_type": 1, "message_id": 9, "content": "ping"}]}}"#);

        eventually(|| !replies.lock().is_empty()).await;
        assert_eq!(*replies.lock(), vec![Ok::<_, String>(MessageId::new(40))]);
        let sent = fetch.calls_to("/chats/5/messages/new").pop().expect("reply sent");
        assert_eq!(sent.field("text"), Some(":9 pong"));

        let event = room.cached_message(MessageId::new(9)).expect("cached");
        assert_eq!(event.room().map(|r| r.id()), Some(RoomId::new(5)));
        assert!(event.client().is_some());
    }

    #[tokio::test]
    async fn test_event_handle_does_not_keep_room_alive() {
        let (client, _) = client(ScriptedFetch::new()).await;
        let room = Room::new(&client.inner, RoomId::new(5), 10);

        let kept = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&kept);
        room.on(EventName::Ping, move |notification| {
            *sink.lock() = notification.event().cloned();
        });
        room.inner
            .router
            .handle_frame(r#"{"r5": {"e": [{"event_type": 8, "message_id": 1}]}}"#);

        let event = kept.lock().clone().expect("ping delivered");
        let weak = Arc::downgrade(&room.inner);
        drop(room);

        assert!(weak.upgrade().is_none());
        assert!(event.room().is_none());
        assert!(matches!(event.reply("late").await, Err(Error::Client { .. })));
    }

    #[tokio::test]
    async fn test_off_stops_delivery() {
        let (client, _) = client(ScriptedFetch::new()).await;
        let room = Room::new(&client.inner, RoomId::new(5), 10);

        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        let id = room.on(EventName::Ping, move |_| *counter.lock() += 1);

        let frame = r#"{"r5": {"e": [{"event_type": 8, "message_id": 1}]}}"#;
        room.inner.router.handle_frame(frame);
        assert!(room.off(id));
        room.inner.router.handle_frame(frame);

        assert_eq!(*hits.lock(), 1);
    }
}
