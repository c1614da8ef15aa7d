//! Small building blocks shared by rooms.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `cache` | Fixed-capacity map with insertion-order eviction |
//! | `debounce` | Collapses bursts of events into one batch |

// ============================================================================
// Submodules
// ============================================================================

/// Bounded insertion-order cache.
pub mod cache;

/// Quiet-window event batching.
pub mod debounce;

// ============================================================================
// Re-exports
// ============================================================================

pub use cache::BoundedCache;
pub use debounce::{DEFAULT_QUIET_WINDOW, DebounceTrigger};
