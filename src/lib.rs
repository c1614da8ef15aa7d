//! Stack Exchange chat client.
//!
//! This library logs into Stack Exchange chat, keeps the session's cookies,
//! posts through a rate-limit aware queue and turns each room's live
//! WebSocket stream into typed notifications.
//!
//! # Architecture
//!
//! The client follows a session/room model:
//!
//! - **Client**: cookie jar + HTTP seam + action queue + login state
//! - **Room**: live socket + event router + message cache + listeners
//!
//! Key design principles:
//!
//! - Every mutating request goes through one FIFO per client; rate-limit
//!   answers are retried, never surfaced
//! - Event codes decode into a closed enum; unknown codes are kept, not dropped
//! - Room notifications reach client listeners first, then room listeners
//! - Rooms hold their client weakly; dropping the client closes its rooms
//!
//! # Quick Start
//!
//! ```no_run
//! use sechat::{Client, EventName, JoinOptions, Notification, Result, RoomId};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder().build()?;
//!     client.login("meta", "bot@example.com", "hunter2").await?;
//!
//!     let room = client.join_room(RoomId::new(1), JoinOptions::new()).await?;
//!     room.on(EventName::MessageCreate, |notification| {
//!         if let Notification::MessageCreate(event) = notification {
//!             println!("{:?} said {:?}", event.user_name(), event.content());
//!         }
//!     });
//!
//!     room.send("Hello from Rust").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], configuration, action queue, credentials |
//! | [`room`] | [`Room`], listeners and notifications |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Live event model and frame decoding |
//! | [`transport`] | Cookie jar, HTTP transport, room socket |
//! | [`util`] | Bounded cache and debounce trigger |

// ============================================================================
// Modules
// ============================================================================

/// Chat session: login, rooms and actions.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for chat entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Live event protocol.
///
/// Event kinds, decoded events and per-room frame extraction.
pub mod protocol;

/// Joined rooms.
///
/// Room handles, the listener registry and notifications.
pub mod room;

/// Network transport layer.
///
/// Cookie jar, cookie-aware HTTP requests and the room WebSocket.
pub mod transport;

/// Small data structures used by rooms.
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    ActionQueue, Client, ClientBuilder, ClientConfig, CredentialStore, Credentials,
    FileCredentialStore, JoinOptions, UserProfile,
};

// Room types
pub use room::{ConnectionState, EventName, Notification, Room, RoomRef};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{MessageId, RoomId, SubscriptionId, UserId};

// Protocol types
pub use protocol::{ChatEvent, EventData, EventKind, SuspensionChange};

// Transport types
pub use transport::{CookieRecord, Fetch, HttpResponse, HttpTransport, Jar, RequestOptions};

// Utility types
pub use util::{BoundedCache, DebounceTrigger};
