use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, trace, warn};
use parking_lot::Mutex;
use tokio::task::AbortHandle;

use super::window::WindowRegistry;

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// FIFO of outbound commands drained through a fixed window
///
/// `enqueue` drains as far as the window allows. Once the window is
/// exhausted a single re-check timer is armed; it retries every `recheck`
/// until the window opens again. The handler is never called while the
/// queue lock is held, and only one caller drains at a time so items leave
/// in the order they arrived.
pub struct CommandThrottle<T> {
    inner: Arc<ThrottleInner<T>>,
}

impl<T> Clone for CommandThrottle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ThrottleInner<T> {
    identity: String,
    limit: u32,
    period: Duration,
    recheck: Duration,
    windows: Arc<WindowRegistry>,
    handler: Handler<T>,
    state: Mutex<ThrottleState<T>>,
}

struct ThrottleState<T> {
    queue: VecDeque<T>,
    draining: bool,
    timer: Option<AbortHandle>,
    shut_down: bool,
}

impl<T: Send + 'static> CommandThrottle<T> {
    pub fn new(
        identity: impl Into<String>,
        limit: u32,
        period: Duration,
        recheck: Duration,
        windows: Arc<WindowRegistry>,
        handler: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        CommandThrottle {
            inner: Arc::new(ThrottleInner {
                identity: identity.into(),
                limit,
                period,
                recheck,
                windows,
                handler: Arc::new(handler),
                state: Mutex::new(ThrottleState {
                    queue: VecDeque::new(),
                    draining: false,
                    timer: None,
                    shut_down: false,
                }),
            }),
        }
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    /// Queue `item` and dispatch as much as the window allows
    pub fn enqueue(&self, item: T) {
        {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                debug!("{}: throttle shut down, dropping command", self.inner.identity);
                return;
            }
            state.queue.push_back(item);
        }
        ThrottleInner::drain(&self.inner);
    }

    /// Commands still waiting for a permit
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().shut_down
    }

    /// Drop everything queued and refuse further commands
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shut_down = true;
        let dropped = state.queue.len();
        state.queue.clear();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if dropped > 0 {
            debug!("{}: discarded {} queued command(s)", self.inner.identity, dropped);
        }
    }
}

impl<T: Send + 'static> ThrottleInner<T> {
    fn drain(this: &Arc<Self>) {
        {
            let mut state = this.state.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }

        loop {
            let item = {
                let mut state = this.state.lock();
                if state.shut_down || state.queue.is_empty() {
                    state.draining = false;
                    return;
                }
                match this.windows.try_acquire(&this.identity, this.period, this.limit) {
                    Ok(()) => state.queue.pop_front(),
                    Err(wait) => {
                        trace!(
                            "{}: window exhausted for {:?}, {} queued",
                            this.identity,
                            wait,
                            state.queue.len()
                        );
                        Self::arm_timer(this, &mut state);
                        state.draining = false;
                        return;
                    }
                }
            };
            if let Some(item) = item {
                (this.handler)(item);
            }
        }
    }

    fn arm_timer(this: &Arc<Self>, state: &mut ThrottleState<T>) {
        if state.timer.is_some() {
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("{}: no runtime to re-check throttle", this.identity);
                return;
            }
        };
        let weak: Weak<Self> = Arc::downgrade(this);
        let recheck = this.recheck;
        let task = runtime.spawn(async move {
            tokio::time::sleep(recheck).await;
            if let Some(inner) = weak.upgrade() {
                inner.state.lock().timer = None;
                Self::drain(&inner);
            }
        });
        state.timer = Some(task.abort_handle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardline_clock::TokioClock;

    fn throttle(limit: u32) -> (CommandThrottle<u32>, Arc<Mutex<Vec<u32>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let windows = Arc::new(WindowRegistry::new(Arc::new(TokioClock::new())));
        let sink = Arc::clone(&sent);
        let throttle = CommandThrottle::new(
            "shard:0:send",
            limit,
            Duration::from_secs(10),
            Duration::from_secs(1),
            windows,
            move |n| sink.lock().push(n),
        );
        (throttle, sent)
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatches_until_window_exhausted() {
        let (throttle, sent) = throttle(2);
        for n in 0..5 {
            throttle.enqueue(n);
        }
        assert_eq!(*sent.lock(), vec![0, 1]);
        assert_eq!(throttle.queued(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recheck_drains_after_window_resets() {
        let (throttle, sent) = throttle(2);
        for n in 0..5 {
            throttle.enqueue(n);
        }

        tokio::time::sleep(Duration::from_millis(9_500)).await;
        assert_eq!(sent.lock().len(), 2);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(*sent.lock(), vec![0, 1, 2, 3]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*sent.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(throttle.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_clears_and_suppresses() {
        let (throttle, sent) = throttle(1);
        throttle.enqueue(0);
        throttle.enqueue(1);
        throttle.shutdown();
        throttle.enqueue(2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(*sent.lock(), vec![0]);
        assert_eq!(throttle.queued(), 0);
        assert!(throttle.is_shut_down());
    }
}
