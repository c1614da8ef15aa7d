//! Logged-in chat session.
//!
//! A [`Client`] owns the cookie jar, the HTTP seam, the action queue and
//! every joined [`Room`]. Cloning a client is cheap; clones share one
//! session.
//!
//! # Login Sequence
//!
//! ```text
//! stored credentials? ── yes ──► import jar + fkey ─────────────────────┐
//!        │ no                                                           │
//!        ▼                                                              │
//! OpenID page (fkey) ► validation/track (Login-OK) ► site login         │
//!        (logout link) ► chat favorites (chat fkey) ► save credentials ─┤
//!                                                                       ▼
//!                                                  chat root (user id)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{MessageId, RoomId, SubscriptionId, UserId};
use crate::protocol::ChatEvent;
use crate::room::{EventName, Listeners, Notification, Room};
use crate::transport::{Fetch, HttpResponse, Jar, RequestOptions};

use super::builder::{ClientBuilder, ClientConfig, JoinOptions};
use super::credentials::{CredentialStore, Credentials};
use super::queue::ActionQueue;
use super::scrape::{self, UserProfile};

// ============================================================================
// Response Classification
// ============================================================================

/// Body fragments that turn a send into [`Error::Message`].
const SEND_FAILURES: &[(&str, &str)] = &[("The message is too long", "message is too long")];

/// Body fragments that turn an edit into [`Error::MessageEdit`].
const EDIT_FAILURES: &[(&str, &str)] = &[
    ("The message is too long", "message is too long"),
    ("It is too late to edit this message", "too late to edit message"),
    (
        "The message has been deleted and cannot be edited",
        "cannot edit deleted message",
    ),
    ("You can only edit your own messages", "cannot edit others' messages"),
];

/// Body fragments that turn a delete into [`Error::MessageDelete`].
const DELETE_FAILURES: &[(&str, &str)] = &[
    ("This message has already been deleted", "cannot delete deleted message"),
    ("It is too late to delete this message", "too late to delete message"),
    ("You can only delete your own messages", "cannot delete others' messages"),
];

/// Maps a 404 or a known failure text to an error built by `make`.
fn classify(response: &HttpResponse, failures: &[(&str, &str)], make: fn(&str) -> Error) -> Result<()> {
    if response.status_code == 404 {
        return Err(make("404"));
    }

    match failures
        .iter()
        .find(|(needle, _)| response.body.contains(needle))
    {
        Some((_, reason)) => Err(make(reason)),
        None => Ok(()),
    }
}

/// Body of a successful send.
#[derive(Deserialize)]
struct SentMessage {
    id: MessageId,
}

// ============================================================================
// Types
// ============================================================================

/// Per-login state.
#[derive(Debug, Default)]
struct Session {
    /// Chat form token; `Some` while logged in.
    fkey: Option<String>,
    /// Logged-in user.
    user_id: Option<UserId>,
}

/// Internal shared state for a client.
pub(crate) struct ClientInner {
    /// Resolved settings.
    pub(crate) config: ClientConfig,
    /// Session cookies.
    jar: Arc<Jar>,
    /// HTTP seam.
    fetcher: Arc<dyn Fetch>,
    /// Serializes mutating requests.
    queue: ActionQueue,
    /// Optional session persistence.
    credentials: Option<Arc<dyn CredentialStore>>,
    /// Login state.
    session: RwLock<Session>,
    /// Joined rooms.
    rooms: Mutex<FxHashMap<RoomId, Room>>,
    /// Client-level listeners; every room delivers here first.
    pub(crate) listeners: Arc<Listeners>,
}

// ============================================================================
// ClientInner - Requests
// ============================================================================

impl ClientInner {
    /// Issues a plain, unqueued request.
    pub(crate) async fn request(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.fetcher.fetch(url, options).await
    }

    /// Returns the chat form token.
    pub(crate) fn fkey(&self) -> Result<String> {
        self.session
            .read()
            .fkey
            .clone()
            .ok_or_else(|| Error::client("Client is not logged in."))
    }

    /// Referer header value for actions in `room_id`.
    fn room_referer(&self, room_id: RoomId) -> String {
        format!("{}/rooms/{room_id}", self.config.chat_base())
    }

    /// Posts a message and returns its id.
    pub(crate) async fn send(&self, room_id: RoomId, content: &str) -> Result<MessageId> {
        let chat_base = self.config.chat_base();
        let options = RequestOptions::new()
            .payload([("fkey", self.fkey()?), ("text", content.to_string())])
            .header("Referer", self.room_referer(room_id))
            .header("Origin", chat_base.as_str());

        let response = self
            .queue
            .enqueue(format!("{chat_base}/chats/{room_id}/messages/new"), options)
            .await?;
        classify(&response, SEND_FAILURES, |reason| Error::message(reason))?;

        let sent: SentMessage = serde_json::from_str(&response.body)?;
        debug!(%room_id, message_id = %sent.id, "Message sent");
        Ok(sent.id)
    }

    /// Replaces a message's text.
    pub(crate) async fn edit_message(&self, room_id: RoomId, message_id: MessageId, content: &str) -> Result<()> {
        let options = RequestOptions::new()
            .payload([("fkey", self.fkey()?), ("text", content.to_string())])
            .header("Referer", self.room_referer(room_id));

        let response = self
            .queue
            .enqueue(format!("{}/messages/{message_id}", self.config.chat_base()), options)
            .await?;
        classify(&response, EDIT_FAILURES, |reason| Error::message_edit(reason))?;

        debug!(%room_id, %message_id, "Message edited");
        Ok(())
    }

    /// Deletes a message.
    pub(crate) async fn delete_message(&self, room_id: RoomId, message_id: MessageId) -> Result<()> {
        let options = RequestOptions::new()
            .payload([("fkey", self.fkey()?)])
            .header("Referer", self.room_referer(room_id));

        let response = self
            .queue
            .enqueue(
                format!("{}/messages/{message_id}/delete", self.config.chat_base()),
                options,
            )
            .await?;
        classify(&response, DELETE_FAILURES, |reason| Error::message_delete(reason))?;

        debug!(%room_id, %message_id, "Message deleted");
        Ok(())
    }

    /// Toggles the room-owner pin of a message.
    pub(crate) async fn pin_message(&self, room_id: RoomId, message_id: MessageId) -> Result<()> {
        let options = RequestOptions::new()
            .payload([("fkey", self.fkey()?)])
            .header("Referer", self.room_referer(room_id));

        let response = self
            .queue
            .enqueue(
                format!("{}/messages/{message_id}/owner-star", self.config.chat_base()),
                options,
            )
            .await?;
        classify(&response, &[], |reason| Error::message(reason))?;

        debug!(%room_id, %message_id, "Message pinned");
        Ok(())
    }
}

// ============================================================================
// Client
// ============================================================================

/// A chat session.
///
/// # Example
///
/// ```no_run
/// use sechat::{Client, EventName, JoinOptions, Notification, RoomId};
///
/// # async fn example() -> sechat::Result<()> {
/// let client = Client::builder().build()?;
/// client.login("meta", "bot@example.com", "hunter2").await?;
///
/// let room = client.join_room(RoomId::new(1), JoinOptions::new()).await?;
/// room.on(EventName::MessageCreate, |notification| {
///     if let Notification::MessageCreate(event) = notification {
///         println!("{:?}: {:?}", event.user_name(), event.content());
///     }
/// });
/// room.send("hello").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    /// Shared inner state.
    pub(crate) inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.inner.session.read();
        f.debug_struct("Client")
            .field("host", &self.inner.config.host)
            .field("logged_in", &session.fkey.is_some())
            .field("user_id", &session.user_id)
            .field("rooms", &self.inner.rooms.lock().len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Constructor
// ============================================================================

impl Client {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client from resolved parts.
    pub(crate) fn new(
        config: ClientConfig,
        jar: Arc<Jar>,
        fetcher: Arc<dyn Fetch>,
        credentials: Option<Arc<dyn CredentialStore>>,
    ) -> Self {
        let queue = ActionQueue::new(Arc::clone(&fetcher), config.rate_limit_margin);
        debug!(host = %config.host, "Client created");

        Self {
            inner: Arc::new(ClientInner {
                config,
                jar,
                fetcher,
                queue,
                credentials,
                session: RwLock::new(Session::default()),
                rooms: Mutex::new(FxHashMap::default()),
                listeners: Arc::new(Listeners::new()),
            }),
        }
    }
}

// ============================================================================
// Client - Accessors
// ============================================================================

impl Client {
    /// Returns the resolved settings.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the session cookie jar.
    #[inline]
    #[must_use]
    pub fn jar(&self) -> &Arc<Jar> {
        &self.inner.jar
    }

    /// Returns `true` while logged in.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.inner.session.read().fkey.is_some()
    }

    /// Returns the chat form token while logged in.
    #[must_use]
    pub fn fkey(&self) -> Option<String> {
        self.inner.session.read().fkey.clone()
    }

    /// Returns the logged-in user.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.inner.session.read().user_id
    }

    /// Returns the action queue shared by all rooms.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &ActionQueue {
        &self.inner.queue
    }

    /// Issues a plain request with the session's cookies.
    ///
    /// The request does not go through the action queue.
    ///
    /// # Errors
    ///
    /// Returns any transport error.
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.inner.request(url, options).await
    }
}

// ============================================================================
// Client - Session
// ============================================================================

impl Client {
    /// Logs in with an account of `site` (e.g. `"meta"`).
    ///
    /// Fresh stored credentials skip the form login.
    ///
    /// # Errors
    ///
    /// - [`Error::Client`] if already logged in
    /// - [`Error::Login`] if any login stage fails
    pub async fn login(&self, site: &str, email: &str, password: &str) -> Result<()> {
        if self.is_logged_in() {
            return Err(Error::client("Client is already logged in."));
        }

        let stored = self
            .inner
            .credentials
            .as_ref()
            .and_then(|store| store.load(site, email, password));

        let fkey = match stored {
            Some(credentials) => {
                debug!(site, cookies = credentials.jar.len(), "Using stored credentials");
                self.inner.jar.import_jar(credentials.jar);
                credentials.fkey
            }
            None => {
                let fkey = self.form_login(site, email, password).await?;
                self.save_credentials(site, email, password, &fkey);
                fkey
            }
        };

        let chat_base = self.inner.config.chat_base();
        let home = self
            .inner
            .request(&chat_base, RequestOptions::new())
            .await
            .map_err(|e| Error::login_with("could not load chat home page", e))?;
        let user_id =
            scrape::user_id(&home.body).ok_or_else(|| Error::login("could not determine user id"))?;

        {
            let mut session = self.inner.session.write();
            session.fkey = Some(fkey);
            session.user_id = Some(user_id);
        }

        info!(site, %user_id, "Logged in");
        Ok(())
    }

    /// Runs the form login and returns the chat form token.
    async fn form_login(&self, site: &str, email: &str, password: &str) -> Result<String> {
        let config = &self.inner.config;

        let page = self
            .inner
            .request(&config.openid_login_url, RequestOptions::new())
            .await
            .map_err(|e| Error::login_with("could not load OpenID login page", e))?;
        let fkey = scrape::openid_fkey(&page.body)
            .ok_or_else(|| Error::login("Unexpected error obtaining fkey from OpenID login."))?;
        debug!(site, "OpenID fkey obtained");

        let site_base = config.site_base(site);
        let validation = self
            .inner
            .request(
                &format!("{site_base}/users/login-or-signup/validation/track"),
                RequestOptions::new().payload([
                    ("email", email),
                    ("password", password),
                    ("fkey", fkey.as_str()),
                    ("isSignup", "false"),
                    ("isLogin", "true"),
                    ("isPassword", "false"),
                    ("isAddLogin", "false"),
                    ("hasCaptcha", "false"),
                    ("ssrc", "head"),
                    ("submitButton", "Log in"),
                ]),
            )
            .await
            .map_err(|e| Error::login_with("validation request failed", e))?;
        if !validation.body.contains("Login-OK") {
            return Err(Error::login("validation error"));
        }

        let return_url = urlencoding::encode(&format!("{site_base}/")).into_owned();
        let login = self
            .inner
            .request(
                &format!("{site_base}/users/login?ssrc=head&returnurl={return_url}"),
                RequestOptions::new().payload([
                    ("email", email),
                    ("password", password),
                    ("fkey", fkey.as_str()),
                    ("ssrc", "head"),
                ]),
            )
            .await
            .map_err(|e| Error::login_with("site login request failed", e))?;
        if login.body.contains("Human verification") {
            return Err(Error::login("stopped by CAPTCHA"));
        }
        if !login.body.contains("logout") {
            return Err(Error::login("per-site failure (possibly invalid credentials)"));
        }
        debug!(site, "Site login accepted");

        let favorites = self
            .inner
            .request(
                &format!("{}/chats/join/favorite", config.chat_base()),
                RequestOptions::new(),
            )
            .await
            .map_err(|e| Error::login_with("could not fetch chat fkey", e))?;

        scrape::chat_fkey(&favorites.body).ok_or_else(|| Error::login("could not fetch chat fkey"))
    }

    /// Stores the session; failures only cost the next warm start.
    fn save_credentials(&self, site: &str, email: &str, password: &str, fkey: &str) {
        let Some(store) = &self.inner.credentials else {
            return;
        };

        let credentials = Credentials {
            jar: self.inner.jar.export_jar(),
            fkey: fkey.to_string(),
        };
        if let Err(e) = store.save(site, email, password, &credentials) {
            warn!(site, error = %e, "Could not save credentials");
        }
    }

    /// Ends the session and forgets its cookies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Client`] if not logged in.
    pub async fn logout(&self) -> Result<()> {
        {
            let mut session = self.inner.session.write();
            if session.fkey.is_none() {
                return Err(Error::client("Client is not logged in."));
            }
            *session = Session::default();
        }

        self.inner.jar.clear();
        info!("Logged out");
        Ok(())
    }

    /// Loads a user's public profile.
    ///
    /// # Errors
    ///
    /// - [`Error::Client`] if the user page cannot be read
    /// - Any transport error
    pub async fn fetch_user(&self, user_id: UserId) -> Result<UserProfile> {
        let url = format!("{}/users/{user_id}", self.inner.config.chat_base());
        let response = self.inner.request(&url, RequestOptions::new()).await?;

        if response.status_code == 404 {
            return Err(Error::client(format!("User {user_id} does not exist.")));
        }
        scrape::user_profile(&response.body)
            .ok_or_else(|| Error::client(format!("Could not read profile of user {user_id}.")))
    }
}

// ============================================================================
// Client - Rooms
// ============================================================================

impl Client {
    /// Joins a room and opens its live connection.
    ///
    /// Joining a room twice returns the existing handle and only applies the
    /// new cache capacity.
    ///
    /// # Errors
    ///
    /// - [`Error::Client`] if not logged in
    /// - [`Error::Websocket`] if the live connection cannot be opened
    pub async fn join_room(&self, room_id: RoomId, options: JoinOptions) -> Result<Room> {
        let limit = options
            .message_cache_limit
            .unwrap_or(self.inner.config.message_cache_limit);

        if let Some(room) = self.room(room_id) {
            room.set_cache_limit(limit);
            return Ok(room);
        }
        self.inner.fkey()?;

        let room = Room::new(&self.inner, room_id, limit);
        room.spawn_name_fetch();
        room.connect_ws().await?;

        let mut rooms = self.inner.rooms.lock();
        if let Some(existing) = rooms.get(&room_id) {
            // A concurrent join finished first.
            room.close();
            existing.set_cache_limit(limit);
            return Ok(existing.clone());
        }
        rooms.insert(room_id, room.clone());
        drop(rooms);

        info!(%room_id, "Joined room");
        Ok(room)
    }

    /// Closes a room's connection and forgets it.
    ///
    /// Returns `false` if the room was not joined.
    pub fn leave_room(&self, room_id: RoomId) -> bool {
        let Some(room) = self.inner.rooms.lock().remove(&room_id) else {
            return false;
        };
        room.close();
        info!(%room_id, "Left room");
        true
    }

    /// Returns a joined room.
    #[must_use]
    pub fn room(&self, room_id: RoomId) -> Option<Room> {
        self.inner.rooms.lock().get(&room_id).cloned()
    }

    /// Returns every joined room.
    #[must_use]
    pub fn rooms(&self) -> Vec<Room> {
        self.inner.rooms.lock().values().cloned().collect()
    }
}

// ============================================================================
// Client - Actions
// ============================================================================

impl Client {
    /// Posts a message to a room and returns its id.
    ///
    /// # Errors
    ///
    /// - [`Error::Client`] if not logged in
    /// - [`Error::Message`] if the server rejects the message
    pub async fn send(&self, room_id: RoomId, content: &str) -> Result<MessageId> {
        self.inner.send(room_id, content).await
    }

    /// Replaces the text of a message.
    ///
    /// # Errors
    ///
    /// - [`Error::Client`] if not logged in
    /// - [`Error::MessageEdit`] if the server rejects the edit
    pub async fn edit_message(&self, room_id: RoomId, message_id: MessageId, content: &str) -> Result<()> {
        self.inner.edit_message(room_id, message_id, content).await
    }

    /// Deletes a message.
    ///
    /// # Errors
    ///
    /// - [`Error::Client`] if not logged in
    /// - [`Error::MessageDelete`] if the server rejects the deletion
    pub async fn delete_message(&self, room_id: RoomId, message_id: MessageId) -> Result<()> {
        self.inner.delete_message(room_id, message_id).await
    }

    /// Toggles the room-owner pin of a message.
    ///
    /// # Errors
    ///
    /// - [`Error::Client`] if not logged in
    /// - [`Error::Message`] if the message does not exist
    pub async fn pin_message(&self, room_id: RoomId, message_id: MessageId) -> Result<()> {
        self.inner.pin_message(room_id, message_id).await
    }

    /// Replies to the message an event carries.
    ///
    /// # Errors
    ///
    /// - [`Error::Client`] if the event carries no message
    /// - Any error of [`Client::send`]
    pub async fn reply(&self, event: &ChatEvent, content: &str) -> Result<MessageId> {
        let target = event
            .reply_target()
            .ok_or_else(|| Error::client(format!("{:?} events cannot be replied to.", event.kind)))?;
        self.inner
            .send(event.room_id, &format!(":{target} {content}"))
            .await
    }
}

// ============================================================================
// Client - Listeners
// ============================================================================

impl Client {
    /// Subscribes to an event of every joined room.
    ///
    /// Client listeners run before the room's own listeners.
    pub fn on<F>(&self, name: EventName, listener: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.inner.listeners.on(name, listener)
    }

    /// Removes a client-level subscription.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.listeners.off(id)
    }
}

// ============================================================================
// Tests
// ============================================================================
