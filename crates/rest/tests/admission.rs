//! Admission behaviour of the REST limiter under paused time

use std::sync::Arc;
use std::time::Duration;

use shardline_clock::{Clock, TokioClock};
use shardline_rest::{RateLimitHeaders, RateLimiter};

const KEY: &str = "POST /channels/1/messages";

fn setup() -> (RateLimiter, Arc<TokioClock>) {
    let _ = env_logger::try_init();
    let clock = Arc::new(TokioClock::new());
    (RateLimiter::new(clock.clone()), clock)
}

#[tokio::test(start_paused = true)]
async fn five_calls_pass_and_sixth_waits_for_reset() {
    let (limiter, clock) = setup();
    let reset_at = clock.now_millis() + 2_000;
    limiter.update_limit(KEY, 5);
    limiter.update_remaining(KEY, 5);
    limiter.update_reset(KEY, reset_at);

    let start = clock.now_millis();
    let fast: Vec<_> = (0..5)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.request_execution(KEY).await })
        })
        .collect();
    for handle in fast {
        handle.await.unwrap();
    }
    assert_eq!(clock.now_millis(), start, "fast path must not wait");
    assert_eq!(limiter.bucket_snapshot(KEY).unwrap().remaining, 0);

    limiter.request_execution(KEY).await;
    assert!(clock.now_millis() >= reset_at);
}

#[tokio::test(start_paused = true)]
async fn global_window_dominates_bucket_reset() {
    let (limiter, clock) = setup();
    let now = clock.now_millis();
    limiter.update_limit(KEY, 5);
    limiter.update_remaining(KEY, 0);
    limiter.update_reset(KEY, now + 500);
    limiter.update_global_rate_limit(now + 4_000);

    let waiter = tokio::spawn({
        let limiter = limiter.clone();
        async move { limiter.request_execution(KEY).await }
    });

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(!waiter.is_finished(), "released before the global window");
    assert_eq!(limiter.bucket_snapshot(KEY).unwrap().queued, 1);

    waiter.await.unwrap();
    assert!(clock.now_millis() >= now + 4_000);
}

#[tokio::test(start_paused = true)]
async fn global_window_holds_routes_with_spare_quota() {
    let (limiter, clock) = setup();
    let now = clock.now_millis();
    limiter.update_limit(KEY, 5);
    limiter.update_remaining(KEY, 4);
    limiter.update_reset(KEY, now + 60_000);
    limiter.update_global_rate_limit(now + 3_000);

    limiter.request_execution(KEY).await;
    assert!(clock.now_millis() >= now + 3_000);

    // Once the cooldown has passed the fast path is back
    let after = clock.now_millis();
    limiter.request_execution(KEY).await;
    assert_eq!(clock.now_millis(), after);
}

#[tokio::test(start_paused = true)]
async fn waiters_are_released_in_arrival_order() {
    let (limiter, clock) = setup();
    limiter.update_limit(KEY, 1);
    limiter.update_remaining(KEY, 0);
    limiter.update_reset(KEY, clock.now_millis() + 1_000);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    for n in 0..3 {
        let limiter = limiter.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            limiter.request_execution(KEY).await;
            tx.send(n).unwrap();
        });
        tokio::task::yield_now().await;
    }
    drop(tx);

    // Play the server: each completed call opens a fresh one-call window
    let mut order = Vec::new();
    while let Some(n) = rx.recv().await {
        order.push(n);
        limiter.update_reset(KEY, clock.now_millis() + 1_000);
        RateLimitHeaders::parse([("X-RateLimit-Remaining", "0")]).apply(
            &limiter,
            KEY,
            false,
            clock.now_millis(),
        );
    }
    assert_eq!(order, vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_all_eventually_run() {
    let (limiter, clock) = setup();
    limiter.update_limit(KEY, 3);
    limiter.update_remaining(KEY, 3);
    limiter.update_reset(KEY, clock.now_millis() + 1_000);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let limiter = limiter.clone();
            let clock = clock.clone();
            tokio::spawn(async move {
                limiter.request_execution(KEY).await;
                // Simulated response opening a new three-call window a second out
                tokio::time::sleep(Duration::from_millis(50)).await;
                let reset = (clock.now_millis() / 1_000 + 1) as f64;
                let reset = reset.to_string();
                RateLimitHeaders::parse([
                    ("X-RateLimit-Limit", "3"),
                    ("X-RateLimit-Remaining", "0"),
                    ("X-RateLimit-Reset", reset.as_str()),
                ])
                .apply(&limiter, KEY, false, clock.now_millis());
            })
        })
        .collect();

    let all = join_callers(handles);
    tokio::time::timeout(Duration::from_secs(120), all)
        .await
        .expect("a caller starved");
    assert_eq!(limiter.bucket_snapshot(KEY).unwrap().queued, 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_caller_does_not_consume_a_slot() {
    let (limiter, clock) = setup();
    limiter.update_limit(KEY, 1);
    limiter.update_remaining(KEY, 0);
    limiter.update_reset(KEY, clock.now_millis() + 1_000);

    let abandoned = tokio::spawn({
        let limiter = limiter.clone();
        async move { limiter.request_execution(KEY).await }
    });
    tokio::task::yield_now().await;
    abandoned.abort();
    let _ = abandoned.await;

    let patient = tokio::spawn({
        let limiter = limiter.clone();
        async move { limiter.request_execution(KEY).await }
    });
    patient.await.unwrap();
    assert_eq!(limiter.bucket_snapshot(KEY).unwrap().remaining, 0);
}

async fn join_callers(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        handle.await.unwrap();
    }
}
