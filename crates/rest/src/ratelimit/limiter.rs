use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use shardline_ports::Clock;
use tokio::sync::oneshot;

use super::bucket::{BucketSnapshot, RouteBucket};

type SharedBucket = Arc<Mutex<RouteBucket>>;

/// REST admission control
///
/// Owns one [`RouteBucket`] per rate-limit key plus the API-wide global
/// window. Admission never fails: [`RateLimiter::request_execution`] either
/// returns at once or parks the caller until its bucket has room and the
/// global window has passed.
///
/// Each bucket sits behind its own mutex inside a `DashMap`, so different
/// keys proceed in parallel. The lock is never held across an `.await`.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

struct LimiterInner {
    buckets: DashMap<String, SharedBucket>,
    /// Epoch millis until which every route is blocked
    global_reset: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        RateLimiter {
            inner: Arc::new(LimiterInner {
                buckets: DashMap::new(),
                global_reset: AtomicI64::new(0),
                clock,
            }),
        }
    }

    /// Current time on the limiter's clock, epoch millis
    pub fn now_millis(&self) -> i64 {
        self.inner.clock.now_millis()
    }

    /// Wait until a call on `key` may proceed
    pub async fn request_execution(&self, key: &str) {
        let waiter = {
            let bucket = self.inner.bucket(key);
            let mut guard = bucket.lock();
            // Spare quota on the route does not override a global cooldown
            if !self.inner.globally_blocked() && guard.try_acquire() {
                trace!("{}: admitted ({} left)", key, guard.remaining());
                return;
            }
            let (tx, rx) = oneshot::channel();
            guard.enqueue(tx);
            trace!("{}: queued ({} waiting)", key, guard.queued());
            LimiterInner::queue_execution(&self.inner, &bucket, &mut guard);
            rx
        };
        // Only errors if the limiter itself is torn down
        let _ = waiter.await;
    }

    /// Record the bucket size the server declared
    pub fn update_limit(&self, key: &str, limit: i64) {
        let limit = if limit < 1 {
            warn!("{}: limit {} from server, clamping to 1", key, limit);
            1
        } else {
            u32::try_from(limit).unwrap_or(u32::MAX)
        };
        self.inner.bucket(key).lock().set_limit(limit);
    }

    /// Record how many calls the server says are left in the window
    pub fn update_remaining(&self, key: &str, remaining: i64) {
        let remaining = if remaining < 0 {
            warn!("{}: remaining {} from server, clamping to 0", key, remaining);
            0
        } else {
            u32::try_from(remaining).unwrap_or(u32::MAX)
        };
        self.inner.bucket(key).lock().set_remaining(remaining);
    }

    /// Record when the current window ends, epoch millis
    pub fn update_reset(&self, key: &str, reset_at: i64) {
        self.inner.bucket(key).lock().set_reset_at(reset_at);
    }

    /// All header updates for one response on `key` have been applied
    pub fn update_done(&self, key: &str) {
        let bucket = self.inner.bucket(key);
        let mut guard = bucket.lock();
        if !self.inner.globally_blocked() {
            let released = guard.release_waiters();
            if released > 0 {
                trace!("{}: released {} waiter(s) on completion", key, released);
            }
        }
        if guard.has_waiters() {
            LimiterInner::queue_execution(&self.inner, &bucket, &mut guard);
        }
    }

    /// Block every route until `reset_at`, epoch millis
    pub fn update_global_rate_limit(&self, reset_at: i64) {
        debug!("Global rate limit until {}", reset_at);
        self.inner.global_reset.store(reset_at, Ordering::SeqCst);
    }

    pub fn global_reset(&self) -> i64 {
        self.inner.global_reset.load(Ordering::SeqCst)
    }

    pub fn bucket_snapshot(&self, key: &str) -> Option<BucketSnapshot> {
        self.inner
            .buckets
            .get(key)
            .map(|entry| entry.value().lock().snapshot())
    }
}

impl LimiterInner {
    /// Fetch or lazily create the bucket for `key`
    ///
    /// The `Arc` is cloned out so the map shard is not locked while the
    /// bucket is.
    fn bucket(&self, key: &str) -> SharedBucket {
        if let Some(existing) = self.buckets.get(key) {
            return Arc::clone(existing.value());
        }
        let now = self.clock.now_millis();
        Arc::clone(
            self.buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(RouteBucket::new(key, now))))
                .value(),
        )
    }

    /// When queued callers on `guard` may next run, epoch millis
    ///
    /// An exhausted bucket waits for its own reset as well as the global
    /// window; one with quota left only waits out the global window.
    fn release_at(&self, guard: &RouteBucket) -> i64 {
        let global = self.global_reset.load(Ordering::SeqCst);
        if guard.remaining() > 0 {
            global
        } else {
            guard.reset_at().max(global)
        }
    }

    fn globally_blocked(&self) -> bool {
        self.clock.now_millis() < self.global_reset.load(Ordering::SeqCst)
    }

    /// Arm the bucket's retry timer unless one is already pending
    fn queue_execution(this: &Arc<Self>, bucket: &SharedBucket, guard: &mut RouteBucket) {
        if guard.timer.is_some() {
            return;
        }
        let now = this.clock.now_millis();
        let delay = (this.release_at(guard) - now).max(1) as u64;

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("{}: no runtime to schedule retry, waiting for next completion", guard.key());
                return;
            }
        };

        debug!("{}: retry in {}ms ({} waiting)", guard.key(), delay, guard.queued());
        let inner = Arc::clone(this);
        let shared = Arc::clone(bucket);
        let task = runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            LimiterInner::on_timer(&inner, &shared);
        });
        guard.timer = Some(task.abort_handle());
    }

    fn on_timer(this: &Arc<Self>, bucket: &SharedBucket) {
        let mut guard = bucket.lock();
        guard.timer = None;
        if !guard.has_waiters() {
            return;
        }

        let now = this.clock.now_millis();
        let target = this.release_at(&guard);
        if now < target {
            debug!("{}: timer fired {}ms early, rescheduling", guard.key(), target - now);
            Self::queue_execution(this, bucket, &mut guard);
            return;
        }

        if guard.remaining() == 0 {
            guard.refill();
        }
        let released = guard.release_waiters();
        trace!(
            "{}: window reset, released {} ({} still waiting)",
            guard.key(),
            released,
            guard.queued()
        );
    }
}
