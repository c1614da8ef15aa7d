//! Quiet-window event batching.
//!
//! Messages moved between rooms arrive as one event per message. The
//! [`DebounceTrigger`] collects such a burst and hands the whole batch to a
//! callback once no new event has arrived for the quiet window.
//!
//! ```text
//! insert(a) ─┐ insert(b) ─┐ insert(c) ─┐
//!            └─ timer ✗   └─ timer ✗   └─ timer ── 250ms ──► flush([a, b, c])
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

// ============================================================================
// Constants
// ============================================================================

/// Quiet window after the last insert before a batch is flushed.
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(250);

// ============================================================================
// Types
// ============================================================================

/// Pending batch and its single flush timer.
struct Batch<T> {
    /// Events collected since the last flush.
    events: Vec<T>,
    /// Bumped on every insert; only the newest timer may flush.
    generation: u64,
    /// The pending flush timer.
    timer: Option<JoinHandle<()>>,
}

// ============================================================================
// DebounceTrigger
// ============================================================================

/// Accumulates events and flushes them as one batch after inactivity.
///
/// Every insert cancels the pending timer and starts a new one, so a batch
/// is never flushed in the middle of a burst. Must be used inside a tokio
/// runtime.
pub struct DebounceTrigger<T> {
    window: Duration,
    batch: Arc<Mutex<Batch<T>>>,
}

impl<T> Default for DebounceTrigger<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_WINDOW)
    }
}

impl<T> DebounceTrigger<T>
where
    T: Send + 'static,
{
    /// Creates a trigger with the given quiet window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            batch: Arc::new(Mutex::new(Batch {
                events: Vec::new(),
                generation: 0,
                timer: None,
            })),
        }
    }

    /// Returns the number of events waiting to be flushed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.batch.lock().events.len()
    }

    /// Appends `event` and restarts the quiet-window timer.
    ///
    /// When the timer fires uninterrupted, `on_flush` receives every event
    /// collected since the previous flush.
    pub fn insert<F>(&self, event: T, on_flush: F)
    where
        F: FnOnce(Vec<T>) + Send + 'static,
    {
        let mut batch = self.batch.lock();
        batch.events.push(event);
        batch.generation = batch.generation.wrapping_add(1);

        if let Some(timer) = batch.timer.take() {
            timer.abort();
        }

        let generation = batch.generation;
        let window = self.window;
        let shared = Arc::clone(&self.batch);

        batch.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let events = {
                let mut batch = shared.lock();
                if batch.generation != generation {
                    return;
                }
                batch.timer = None;
                std::mem::take(&mut batch.events)
            };

            trace!(count = events.len(), "Flushing debounced batch");
            on_flush(events);
        }));
    }
}

impl<T> Drop for DebounceTrigger<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.batch.lock().timer.take() {
            timer.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
