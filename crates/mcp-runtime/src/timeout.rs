//! `TimeoutManager`.
//!
//! Shaped after `rmcp`'s `RequestHandle::await_response` (the
//! `tokio::time::timeout` + cancellation-notification-on-expiry pattern),
//! generalized into a standalone per-request timer table so `reset()` can
//! be driven independently from progress notifications.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::model::RequestId;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct TimeoutOptions {
    pub timeout: Duration,
    pub max_total_timeout: Option<Duration>,
    pub reset_on_progress: bool,
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_total_timeout: None,
            reset_on_progress: false,
        }
    }
}

struct Entry {
    options: TimeoutOptions,
    started_at: Instant,
    deadline: Instant,
    /// Wakes the waiter parked in `await_expiry` when `reset` moves the deadline.
    notify: std::sync::Arc<Notify>,
}

/// The result of a `reset()` call.
#[derive(Debug, Clone, Copy)]
pub enum ResetOutcome {
    Success,
    MaxTotalTimeoutExceeded {
        elapsed: Duration,
        max_total_timeout: Duration,
    },
}

/// One timer per outgoing request. Timer lifetime is strictly bounded by the entry's lifetime;
/// `cleanup` must run on every response path and `clear_all` on close.
#[derive(Default)]
pub struct TimeoutManager {
    entries: HashMap<RequestId, Entry>,
}

impl TimeoutManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn setup(&mut self, id: RequestId, options: TimeoutOptions) {
        let started_at = Instant::now();
        self.entries.insert(
            id,
            Entry {
                options,
                started_at,
                deadline: started_at + options.timeout,
                notify: std::sync::Arc::new(Notify::new()),
            },
        );
    }

    /// Resets the per-request timer, bounded by `max_total_timeout` (spec
    /// property 9). Returns the elapsed/bound pair on failure so the caller
    /// can translate it into `ProtocolError::MaxTotalTimeoutExceeded`.
    pub fn reset(&mut self, id: &RequestId) -> Option<ResetOutcome> {
        let entry = self.entries.get_mut(id)?;
        let elapsed = entry.started_at.elapsed();
        if let Some(max_total) = entry.options.max_total_timeout {
            if elapsed >= max_total {
                return Some(ResetOutcome::MaxTotalTimeoutExceeded {
                    elapsed,
                    max_total_timeout: max_total,
                });
            }
        }
        entry.deadline = Instant::now() + entry.options.timeout;
        entry.notify.notify_waiters();
        Some(ResetOutcome::Success)
    }

    pub fn cleanup(&mut self, id: &RequestId) {
        self.entries.remove(id);
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub fn get_elapsed(&self, id: &RequestId) -> Option<Duration> {
        self.entries.get(id).map(|e| e.started_at.elapsed())
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Suspends until either the deadline passes (returns `true`, meaning
    /// "fire the timeout") or a `reset()` moves the deadline further out
    /// (returns `false`, meaning "recheck").
    pub async fn await_expiry(&self, id: &RequestId) -> bool {
        let Some(entry) = self.entries.get(id) else {
            return true;
        };
        let notify = entry.notify.clone();
        let deadline = entry.deadline;
        tokio::select! {
            _ = tokio::time::sleep_until(deadline.into()) => true,
            _ = notify.notified() => false,
        }
    }

    /// The current deadline and reset-notifier for `id`, taken without
    /// holding the manager's lock across a suspend. Callers await the
    /// returned pair themselves (`sleep_until(deadline)` raced against
    /// `notify.notified()`), looping on a fresh snapshot after every reset so
    /// concurrent `reset()` calls are never blocked by an in-flight wait.
    pub fn snapshot(&self, id: &RequestId) -> Option<(Instant, std::sync::Arc<Notify>)> {
        self.entries.get(id).map(|e| (e.deadline, e.notify.clone()))
    }
}
