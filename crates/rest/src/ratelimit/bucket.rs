use std::collections::VecDeque;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// Point-in-time view of a bucket, for introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub limit: u32,
    pub remaining: u32,
    /// Epoch millis at which the current window ends
    pub reset_at: i64,
    /// Callers waiting for a slot
    pub queued: usize,
}

/// Token bucket for one rate-limit key
///
/// Mutated only while the owning limiter holds this bucket's lock. A fresh
/// bucket is optimistic (`limit = remaining = 1`, already reset) so the first
/// call goes straight through and the server's headers take over from there.
pub struct RouteBucket {
    key: String,
    limit: u32,
    remaining: u32,
    reset_at: i64,
    pending: VecDeque<oneshot::Sender<()>>,
    /// Retry timer, at most one per bucket
    pub(crate) timer: Option<AbortHandle>,
}

impl RouteBucket {
    /// Create a new bucket at `now_ms`
    pub fn new(key: impl Into<String>, now_ms: i64) -> Self {
        RouteBucket {
            key: key.into(),
            limit: 1,
            remaining: 1,
            reset_at: now_ms - 1,
            pending: VecDeque::new(),
            timer: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn reset_at(&self) -> i64 {
        self.reset_at
    }

    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    pub fn has_waiters(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(crate) fn set_limit(&mut self, limit: u32) {
        self.limit = limit;
    }

    pub(crate) fn set_remaining(&mut self, remaining: u32) {
        self.remaining = remaining;
    }

    pub(crate) fn set_reset_at(&mut self, reset_at: i64) {
        self.reset_at = reset_at;
    }

    /// Take a slot if one is free
    pub fn try_acquire(&mut self) -> bool {
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Park a caller until a slot frees up
    pub fn enqueue(&mut self, waiter: oneshot::Sender<()>) {
        self.pending.push_back(waiter);
    }

    /// Start a new window
    pub fn refill(&mut self) {
        self.remaining = self.limit;
    }

    /// Hand free slots to waiters in FIFO order
    ///
    /// A waiter whose caller has gone away is discarded without consuming a
    /// slot. Returns how many callers were released.
    pub fn release_waiters(&mut self) -> usize {
        let mut released = 0;
        while self.remaining > 0 {
            let Some(waiter) = self.pending.pop_front() else {
                break;
            };
            if waiter.send(()).is_ok() {
                self.remaining -= 1;
                released += 1;
            }
        }
        released
    }

    pub fn snapshot(&self) -> BucketSnapshot {
        BucketSnapshot {
            limit: self.limit,
            remaining: self.remaining,
            reset_at: self.reset_at,
            queued: self.pending.len(),
        }
    }
}
