//! Error types for the chat client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use sechat::{Result, Room};
//!
//! async fn greet(room: &Room) -> Result<()> {
//!     room.send("hello").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Session | [`Error::Client`], [`Error::Login`] |
//! | Actions | [`Error::Message`], [`Error::MessageEdit`], [`Error::MessageDelete`] |
//! | Live events | [`Error::Websocket`], [`Error::WebSocket`] |
//! | HTTP | [`Error::Http`], [`Error::InvalidUrl`], [`Error::TooManyRedirects`] |
//! | Queue | [`Error::QueueCleared`] |
//! | External | [`Error::Io`], [`Error::Json`] |
//!
//! The upstream service has no numeric error codes. Action failures are
//! detected by matching the response text, so wording changes on the server
//! side surface as unclassified successes rather than errors.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RoomId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Domain variants optionally carry the error that caused them so the full
/// chain is available through [`std::error::Error::source`].
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Misuse of session state.
    ///
    /// Returned when acting while logged out, logging in twice, or
    /// addressing a room that was never joined.
    #[error("Client error: {message}")]
    Client {
        /// Description of the misuse.
        message: String,
    },

    /// Any failure during the login sequence.
    ///
    /// Missing form token, rejected validation, CAPTCHA, wrong credentials.
    #[error("Login error: {message}")]
    Login {
        /// Description of the failed stage.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Box<Error>>,
    },

    // ========================================================================
    // Action Errors
    // ========================================================================
    /// Sending a message failed.
    #[error("Message error: {message}")]
    Message {
        /// Server-reported reason.
        message: String,
    },

    /// Editing a message failed.
    #[error("Message edit error: {message}")]
    MessageEdit {
        /// Server-reported reason.
        message: String,
    },

    /// Deleting a message failed.
    #[error("Message delete error: {message}")]
    MessageDelete {
        /// Server-reported reason.
        message: String,
    },

    // ========================================================================
    // Live Event Errors
    // ========================================================================
    /// Failed to negotiate or open a room's live connection.
    #[error("Websocket error for room {room_id}: {message}")]
    Websocket {
        /// Room the connection was for.
        room_id: RoomId,
        /// Description of the failure.
        message: String,
        /// Underlying cause.
        #[source]
        source: Box<Error>,
    },

    // ========================================================================
    // HTTP Errors
    // ========================================================================
    /// Redirect chain exceeded the configured limit.
    #[error("Too many redirects ({limit}) starting at {url}")]
    TooManyRedirects {
        /// URL of the original request.
        url: String,
        /// Configured redirect limit.
        limit: usize,
    },

    /// URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // ========================================================================
    // Queue Errors
    // ========================================================================
    /// The action queue was cleared before this action completed.
    #[error("Action queue cleared")]
    QueueCleared,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a client misuse error.
    #[inline]
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }

    /// Creates a login error without a cause.
    #[inline]
    pub fn login(message: impl Into<String>) -> Self {
        Self::Login {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a login error wrapping its cause.
    #[inline]
    pub fn login_with(message: impl Into<String>, source: Error) -> Self {
        Self::Login {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a message send error.
    #[inline]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// Creates a message edit error.
    #[inline]
    pub fn message_edit(message: impl Into<String>) -> Self {
        Self::MessageEdit {
            message: message.into(),
        }
    }

    /// Creates a message delete error.
    #[inline]
    pub fn message_delete(message: impl Into<String>) -> Self {
        Self::MessageDelete {
            message: message.into(),
        }
    }

    /// Creates a websocket setup error wrapping its cause.
    #[inline]
    pub fn websocket_with(room_id: RoomId, message: impl Into<String>, source: Error) -> Self {
        Self::Websocket {
            room_id,
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Creates a too-many-redirects error.
    #[inline]
    pub fn too_many_redirects(url: impl Into<String>, limit: usize) -> Self {
        Self::TooManyRedirects {
            url: url.into(),
            limit,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a login error.
    #[inline]
    #[must_use]
    pub fn is_login_error(&self) -> bool {
        matches!(self, Self::Login { .. })
    }

    /// Returns `true` if the server rejected a message action.
    #[inline]
    #[must_use]
    pub fn is_message_error(&self) -> bool {
        matches!(
            self,
            Self::Message { .. } | Self::MessageEdit { .. } | Self::MessageDelete { .. }
        )
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Websocket { .. } | Self::WebSocket(_) | Self::Http(_) | Self::TooManyRedirects { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
