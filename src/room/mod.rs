//! Joined rooms and their live events.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Room`] handle: connection lifecycle and actions; [`RoomRef`] back-reference |
//! | `listeners` | [`EventName`], [`Notification`] and the listener registry |
//! | `router` | Frame decoding, message cache and dispatch |

// ============================================================================
// Submodules
// ============================================================================

/// Room handle.
pub mod core;

/// Typed listener registry.
pub mod listeners;

/// Per-room event dispatch.
mod router;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{ConnectionState, Room, RoomRef};
pub use listeners::{EventName, Listener, Listeners, Notification};
