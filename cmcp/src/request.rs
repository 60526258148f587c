//! In-flight request tracking and cooperative cancellation.
//!
//! Each `tools/call` registers a [`RequestEntry`] keyed by its JSON-RPC id.
//! `notifications/cancel` flips the entry's cancel flag; the streaming
//! driver and the handler observe it at frame boundaries. Completed
//! entries are retained briefly so a cancellation racing the terminal
//! frame still resolves against a known id, then evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How long a finished request stays addressable for late cancellations.
pub const COMPLETED_RETENTION: Duration = Duration::from_secs(5);

/// Lifecycle state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Accepted, not yet gated.
    Received,
    /// Payment verification in progress.
    Verifying,
    /// Handler running.
    Executing,
    /// Settlement in progress.
    Settling,
    /// Finished with a structured result.
    Completed,
    /// Finished with an error frame.
    Failed,
    /// Finished by cancellation.
    Cancelled,
}

/// Lifecycle metadata for one in-flight request.
#[derive(Debug)]
pub struct RequestEntry {
    id: String,
    method: String,
    cancelled: Arc<AtomicBool>,
    cancel_reason: Mutex<Option<String>>,
    state: Mutex<RequestState>,
    started_at: Instant,
}

impl RequestEntry {
    fn new(id: String, method: String) -> Self {
        Self {
            id,
            method,
            cancelled: Arc::new(AtomicBool::new(false)),
            cancel_reason: Mutex::new(None),
            state: Mutex::new(RequestState::Received),
            started_at: Instant::now(),
        }
    }

    /// The JSON-RPC id this entry is addressed by.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The JSON-RPC method that opened this request.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns `true` once cancellation was signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// The cancel flag shared with the handler's context.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// The reason the client attached to the cancellation, if any.
    #[must_use]
    pub fn cancellation_reason(&self) -> Option<String> {
        self.cancel_reason.lock().ok().and_then(|guard| guard.clone())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.state.lock().map(|guard| *guard).unwrap_or(RequestState::Failed)
    }

    /// Moves the request to a new lifecycle state.
    pub fn set_state(&self, state: RequestState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    /// Time since the request was registered.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn cancel(&self, reason: Option<String>) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Ok(mut guard) = self.cancel_reason.lock() {
            *guard = reason;
        }
    }
}

/// Tracks all in-flight requests.
///
/// The manager owns the cancellation channel and lifecycle metadata only;
/// tool execution itself is owned by the streaming driver. The map is
/// shared with the deferred eviction tasks spawned by [`Self::complete`].
#[derive(Debug)]
pub struct RequestManager {
    requests: Arc<Mutex<HashMap<String, Arc<RequestEntry>>>>,
    retention: Duration,
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestManager {
    /// Creates a manager with the default retention window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention(COMPLETED_RETENTION)
    }

    /// Creates a manager with a custom retention window.
    #[must_use]
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            requests: Arc::new(Mutex::new(HashMap::new())),
            retention,
        }
    }

    /// Registers a new request and returns its entry.
    ///
    /// Re-registering an id replaces the previous entry; ids are only
    /// unique within one client connection, and the previous occupant has
    /// either finished or belongs to a stale stream.
    pub fn register(&self, id: &str, method: &str) -> Arc<RequestEntry> {
        let entry = Arc::new(RequestEntry::new(id.to_owned(), method.to_owned()));
        if let Ok(mut guard) = self.requests.lock() {
            guard.insert(id.to_owned(), Arc::clone(&entry));
        }
        entry
    }

    /// Signals cancellation for a request.
    ///
    /// Fire-and-forget per MCP convention: unknown or already-finished ids
    /// are dropped silently.
    pub fn mark_cancelled(&self, id: &str, reason: Option<String>) {
        let entry = self
            .requests
            .lock()
            .ok()
            .and_then(|guard| guard.get(id).cloned());

        match entry {
            Some(entry) => {
                tracing::info!(request_id = %id, reason = ?reason, "cancellation requested");
                entry.cancel(reason);
            }
            None => {
                tracing::debug!(request_id = %id, "cancellation for unknown request ignored");
            }
        }
    }

    /// Moves a request to a terminal state and schedules its eviction.
    pub fn complete(&self, id: &str, outcome: RequestState) {
        let entry = self
            .requests
            .lock()
            .ok()
            .and_then(|guard| guard.get(id).cloned());

        let Some(entry) = entry else { return };
        entry.set_state(outcome);

        let map = Arc::clone(&self.requests);
        let retention = self.retention;
        let id = id.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if let Ok(mut guard) = map.lock() {
                guard.remove(&id);
            }
        });
    }

    /// Number of tracked requests (including retained finished ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Returns `true` if no requests are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_flips_shared_flag() {
        let manager = Arc::new(RequestManager::new());
        let entry = manager.register("7", "tools/call");
        let flag = entry.cancel_flag();

        assert!(!flag.load(Ordering::Relaxed));
        manager.mark_cancelled("7", Some("user abort".to_owned()));
        assert!(flag.load(Ordering::Relaxed));
        assert_eq!(entry.cancellation_reason().as_deref(), Some("user abort"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_silent() {
        let manager = Arc::new(RequestManager::new());
        manager.mark_cancelled("missing", None);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let manager = Arc::new(RequestManager::new());
        let entry = manager.register("1", "tools/call");
        manager.mark_cancelled("1", Some("first".to_owned()));
        manager.mark_cancelled("1", Some("second".to_owned()));
        assert!(entry.is_cancelled());
    }

    #[tokio::test]
    async fn test_completed_entry_evicted_after_retention() {
        let manager = Arc::new(RequestManager::with_retention(Duration::from_millis(20)));
        manager.register("9", "tools/call");
        manager.complete("9", RequestState::Completed);

        // Still addressable inside the retention window.
        assert_eq!(manager.len(), 1);
        manager.mark_cancelled("9", None);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let manager = Arc::new(RequestManager::new());
        let entry = manager.register("3", "tools/call");
        assert_eq!(entry.state(), RequestState::Received);
        entry.set_state(RequestState::Executing);
        assert_eq!(entry.state(), RequestState::Executing);
        manager.complete("3", RequestState::Failed);
        assert_eq!(entry.state(), RequestState::Failed);
    }
}
