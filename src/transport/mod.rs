//! Network transport layer.
//!
//! This module handles everything that touches the network: HTTP requests
//! with cookie handling and the live WebSocket of a room.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐        HTTP (GET / form POST)       ┌──────────────┐
//! │  HttpTransport  │◄───────────────────────────────────►│              │
//! │   └─ Jar        │   Cookie / Set-Cookie, 30x hops     │  Chat host   │
//! │                 │                                     │              │
//! │  Connection     │◄────────────────────────────────────│  WebSocket   │
//! │   └─ handler    │      {"r<room>": {"e": [...]}}      │  endpoint    │
//! └─────────────────┘                                     └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `jar` | Cookie storage and matching |
//! | `http` | Cookie-aware requests with redirect following |
//! | `connection` | Room socket and its read loop |

// ============================================================================
// Submodules
// ============================================================================

/// Room WebSocket connection and event loop.
pub mod connection;

/// Cookie-aware HTTP transport.
pub mod http;

/// Cookie jar.
pub mod jar;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, FrameHandler};
pub use http::{DEFAULT_MAX_REDIRECTS, Fetch, HttpResponse, HttpTransport, RequestOptions};
pub use jar::{CookieRecord, Jar};
