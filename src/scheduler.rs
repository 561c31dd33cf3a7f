//! C10 — View Refresh Scheduler (spec.md §4.8). Each view gets an immediate
//! refresh at startup, then a ticker on its own interval, a single-flight
//! mutex so overlapping ticks wait rather than race, and a one-shot
//! readiness latch. Mirrors the teacher's `tokio::spawn` +
//! `tokio::time::interval` background-loop shape used by
//! `alert_engine`/`retention_enforcer`, generalized to N independently
//! timed views instead of one fixed loop.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

/// Per-view success/error counters. Duration is reported via
/// `tracing::info!(view, elapsed_ms)` structured events rather than a
/// histogram type, since the teacher's stack carries no metrics crate
/// (spec.md's ambient-stack note).
#[derive(Debug, Default)]
pub struct ViewStats {
    pub successes: AtomicU64,
    pub failures: AtomicU64,
}

impl ViewStats {
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.successes.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }
}

struct ViewSlot {
    name: String,
    interval: Duration,
    single_flight: Mutex<()>,
    ready: Notify,
    is_ready: std::sync::atomic::AtomicBool,
    stats: ViewStats,
}

/// Drives one named view on its own ticker. Construct one per view and hand
/// it a refresh closure; `run` owns the loop until `token` is cancelled.
pub struct ScheduledView {
    slot: Arc<ViewSlot>,
}

impl ScheduledView {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            slot: Arc::new(ViewSlot {
                name: name.into(),
                interval,
                single_flight: Mutex::new(()),
                ready: Notify::new(),
                is_ready: std::sync::atomic::AtomicBool::new(false),
                stats: ViewStats::default(),
            }),
        }
    }

    pub fn stats(&self) -> &ViewStats {
        &self.slot.stats
    }

    pub fn ready(&self) -> bool {
        self.slot.is_ready.load(Ordering::Acquire)
    }

    /// Blocks until the first successful refresh, or until `token` is
    /// cancelled (spec.md §4.8 `wait_ready`).
    pub async fn wait_ready(&self, token: &CancellationToken) {
        if self.ready() {
            return;
        }
        tokio::select! {
            _ = self.slot.ready.notified() => {}
            _ = token.cancelled() => {}
        }
    }

    /// Runs `refresh` immediately, then on every tick of `interval`, until
    /// `token` is cancelled. Single-flight: a refresh that's still running
    /// when the next tick fires is awaited rather than run concurrently.
    pub async fn run<F, Fut, E>(&self, token: CancellationToken, mut refresh: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let mut ticker = tokio::time::interval(self.slot.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!(view = %self.slot.name, "scheduler loop cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    self.run_once(&token, &mut refresh).await;
                }
            }
        }
    }

    async fn run_once<F, Fut, E>(&self, token: &CancellationToken, refresh: &mut F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let _permit = self.slot.single_flight.lock().await;
        if token.is_cancelled() {
            return;
        }
        let started = std::time::Instant::now();
        let result = refresh().await;
        let elapsed_ms = started.elapsed().as_millis();
        match result {
            Ok(()) => {
                self.slot.stats.successes.fetch_add(1, Ordering::Relaxed);
                if !self.slot.is_ready.swap(true, Ordering::AcqRel) {
                    self.slot.ready.notify_waiters();
                }
                tracing::info!(view = %self.slot.name, ok = true, elapsed_ms, "view refresh complete");
            }
            Err(e) => {
                self.slot.stats.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(view = %self.slot.name, ok = false, elapsed_ms, error = %e, "view refresh failed");
            }
        }
    }
}

/// Owns a fixed set of scheduled views and the single cancellation token
/// that stops all of them together.
pub struct Scheduler {
    token: CancellationToken,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn readiness_latches_after_first_success() {
        let view = ScheduledView::new("test", Duration::from_millis(20));
        assert!(!view.ready());

        let token = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let token2 = token.clone();

        let handle = tokio::spawn(async move {
            view_run_n_ticks(&view, token2, calls2, 2).await;
            view
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        token.cancel();
        let view = handle.await.unwrap();
        assert!(view.ready());
        let (ok, err) = view.stats().snapshot();
        assert!(ok >= 1);
        assert_eq!(err, 0);
    }

    async fn view_run_n_ticks(
        view: &ScheduledView,
        token: CancellationToken,
        calls: Arc<AtomicUsize>,
        _n: usize,
    ) {
        view.run(token, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::Relaxed);
                Ok::<(), String>(())
            }
        })
        .await;
    }
}
