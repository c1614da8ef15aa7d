//! Rate-limit aware action queue.
//!
//! Every mutating request of a client (send, edit, delete, pin) goes through
//! one FIFO with a single in-flight slot. When the server answers with
//! "You can perform this action again in N seconds", the head action is
//! retried after `N` seconds plus a safety margin instead of being reported
//! to its caller.
//!
//! # Drain Loop
//!
//! ```text
//! enqueue ──► [a, b, c] ──► drain: fetch(a) ─┬─ rate-limited: sleep, fetch(a) again
//!                                            └─ otherwise: resolve a, fetch(b) ...
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::transport::{Fetch, HttpResponse, RequestOptions};

// ============================================================================
// Constants
// ============================================================================

/// Extra delay added to every rate-limit backoff.
pub const DEFAULT_RATE_LIMIT_MARGIN: Duration = Duration::from_millis(250);

/// Matches the server's rate-limit notice.
static RATE_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"You can perform this action again in (\d+) seconds?\.")
        .expect("rate limit pattern is valid")
});

// ============================================================================
// Types
// ============================================================================

/// One queued request and the caller waiting for it.
struct QueuedAction {
    /// Sequence number, used to detect a cleared head.
    seq: u64,
    url: String,
    options: RequestOptions,
    result_tx: oneshot::Sender<Result<HttpResponse>>,
}

/// Queue contents.
#[derive(Default)]
struct QueueState {
    items: VecDeque<QueuedAction>,
    busy: bool,
    next_seq: u64,
}

/// Shared queue internals.
struct QueueInner {
    fetcher: Arc<dyn Fetch>,
    margin: Duration,
    state: Mutex<QueueState>,
}

// ============================================================================
// ActionQueue
// ============================================================================

/// Serializes mutating requests and absorbs rate limiting.
#[derive(Clone)]
pub struct ActionQueue {
    inner: Arc<QueueInner>,
}

impl ActionQueue {
    /// Creates a queue issuing requests through `fetcher`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetch>, margin: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                fetcher,
                margin,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Queues a request and waits for its final, non-rate-limited response.
    ///
    /// # Errors
    ///
    /// - Any transport error of the request itself
    /// - [`Error::QueueCleared`] if [`ActionQueue::clear`] dropped the action
    pub async fn enqueue(&self, url: impl Into<String>, options: RequestOptions) -> Result<HttpResponse> {
        let (result_tx, result_rx) = oneshot::channel();

        let start = {
            let mut state = self.inner.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.items.push_back(QueuedAction {
                seq,
                url: url.into(),
                options,
                result_tx,
            });
            trace!(seq, queued = state.items.len(), "Action queued");
            !std::mem::replace(&mut state.busy, true)
        };

        if start {
            tokio::spawn(Self::drain(Arc::clone(&self.inner)));
        }

        result_rx.await.map_err(|_| Error::QueueCleared)?
    }

    /// Returns the number of actions waiting or in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().items.is_empty()
    }

    /// Returns `true` while the drain loop is running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().busy
    }

    /// Drops every queued action; their callers get [`Error::QueueCleared`].
    ///
    /// A request already on the wire still completes, but its result is
    /// discarded.
    pub fn clear(&self) {
        let dropped = {
            let mut state = self.inner.state.lock();
            std::mem::take(&mut state.items)
        };
        debug!(count = dropped.len(), "Action queue cleared");
    }

    /// Processes the queue head-first until it is empty.
    async fn drain(inner: Arc<QueueInner>) {
        loop {
            let (seq, url, options) = {
                let mut state = inner.state.lock();
                match state.items.front() {
                    Some(head) => (head.seq, head.url.clone(), head.options.clone()),
                    None => {
                        state.busy = false;
                        return;
                    }
                }
            };

            let result = inner.fetcher.fetch(&url, options).await;

            if let Ok(response) = &result
                && let Some(seconds) = rate_limit_seconds(&response.body)
            {
                let delay = Duration::from_secs(seconds) + inner.margin;
                debug!(seq, %url, retry_ms = delay.as_millis() as u64, "Rate limited, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }

            let head = {
                let mut state = inner.state.lock();
                match state.items.front() {
                    Some(head) if head.seq == seq => state.items.pop_front(),
                    _ => None,
                }
            };

            if let Some(head) = head {
                trace!(seq, "Action resolved");
                let _ = head.result_tx.send(result);
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns the backoff in seconds if `body` is a rate-limit notice.
#[must_use]
pub fn rate_limit_seconds(body: &str) -> Option<u64> {
    RATE_LIMIT
        .captures(body)
        .and_then(|captures| captures[1].parse().ok())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::Instant;

    use crate::test_support::ScriptedFetch;

    const RATE_LIMITED: &str = "You can perform this action again in 1 second.";

    #[test]
    fn test_rate_limit_detection() {
        assert_eq!(rate_limit_seconds(RATE_LIMITED), Some(1));
        assert_eq!(
            rate_limit_seconds("You can perform this action again in 12 seconds."),
            Some(12)
        );
        assert_eq!(rate_limit_seconds("{\"id\": 5}"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_action_is_retried_before_next() {
        let fetch = Arc::new(
            ScriptedFetch::new()
                .route("/a", [HttpResponse::new(409, RATE_LIMITED), HttpResponse::new(200, "a-done")])
                .route("/b", [HttpResponse::new(200, "b-done")]),
        );
        let queue = ActionQueue::new(fetch.clone(), DEFAULT_RATE_LIMIT_MARGIN);
        let started = Instant::now();

        let first = tokio::spawn({
            let queue = queue.clone();
            async move { queue.enqueue("http://h/a", RequestOptions::new()).await }
        });
        tokio::task::yield_now().await;
        let second = tokio::spawn({
            let queue = queue.clone();
            async move { queue.enqueue("http://h/b", RequestOptions::new()).await }
        });

        let first = first.await.expect("join").expect("first");
        assert_eq!(first.body, "a-done");
        let second = second.await.expect("join").expect("second");
        assert_eq!(second.body, "b-done");

        let calls = fetch.calls();
        let urls: Vec<_> = calls.iter().map(|call| call.url.as_str()).collect();
        assert_eq!(urls, ["http://h/a", "http://h/a", "http://h/b"]);
        assert!(calls[1].at - started >= Duration::from_millis(1250));
        assert!(calls[2].at >= calls[1].at);
        assert!(!queue.is_busy());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_fifo_order_under_concurrent_callers() {
        let fetch = Arc::new(ScriptedFetch::new().fallback(HttpResponse::new(200, "ok")));
        let queue = ActionQueue::new(fetch.clone(), DEFAULT_RATE_LIMIT_MARGIN);

        let mut handles = Vec::new();
        for n in 0..5 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue.enqueue(format!("http://h/{n}"), RequestOptions::new()).await
            }));
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.expect("join").expect("response");
        }

        let urls: Vec<_> = fetch.calls().into_iter().map(|call| call.url).collect();
        let expected: Vec<_> = (0..5).map(|n| format!("http://h/{n}")).collect();
        assert_eq!(urls, expected);
    }

    #[tokio::test]
    async fn test_transport_error_resolves_caller() {
        let fetch = Arc::new(ScriptedFetch::new());
        let queue = ActionQueue::new(fetch, DEFAULT_RATE_LIMIT_MARGIN);

        let result = queue.enqueue("http://h/missing", RequestOptions::new()).await;
        assert!(result.is_err());
        assert!(!queue.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_rejects_waiting_callers() {
        let fetch = Arc::new(
            ScriptedFetch::new()
                .route("/slow", [HttpResponse::new(200, "You can perform this action again in 30 seconds.")])
                .fallback(HttpResponse::new(200, "ok")),
        );
        let queue = ActionQueue::new(fetch, DEFAULT_RATE_LIMIT_MARGIN);

        let waiting = tokio::spawn({
            let queue = queue.clone();
            async move { queue.enqueue("http://h/slow", RequestOptions::new()).await }
        });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(queue.len(), 1);

        queue.clear();
        let result = waiting.await.expect("join");
        assert!(matches!(result, Err(Error::QueueCleared)));
    }
}
