//! Recurring tick driver for background work.
//!
//! Timers live behind this one abstraction so the refresh and sweep loops can
//! be paused around bursts of activity, cancelled on shutdown, and driven by
//! tokio's virtual clock in tests instead of wall time.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct Scheduler {
    period: Duration,
    paused: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            period,
            paused: Arc::new(AtomicBool::new(false)),
            shutdown,
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Spawn the tick loop. The first tick fires one full period after start.
    /// Starting again replaces the previous loop.
    pub fn start<F, Fut>(&self, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = self.period;
        let paused = Arc::clone(&self.paused);
        let mut shutdown = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !paused.load(Ordering::Relaxed) {
                            tick().await;
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("scheduler loop stopping");
                            break;
                        }
                    }
                }
            }
        });

        if let Some(previous) = self.handle.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Skip ticks until resumed. The loop keeps running.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Stop the loop for good and wait for it to wind down.
    pub async fn cancel(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
