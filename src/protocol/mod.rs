//! Live event protocol.
//!
//! This module defines the shape of the data arriving on a room's socket.
//!
//! # Protocol Overview
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Frame | `{"r<room>": {"e": [...]}}` | Per-room event lists |
//! | Event | [`EventData`] | Raw fields of one event |
//! | Decoded | [`ChatEvent`] | Kind + fields + permalink + mention |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Event kinds and decoded events |
//! | `frame` | Frame-to-event-list extraction |

// ============================================================================
// Submodules
// ============================================================================

/// Event kinds and decoded events.
pub mod event;

/// Socket frame decoding.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{ChatEvent, EventData, EventKind, SuspensionChange};
pub use frame::room_events;
