//! Background removal of expired messages

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use burnbox_core::{Clock, StoreError, StoreResult, SystemClock};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// How and when a store sweeps expired records
#[derive(Clone)]
pub struct SweepOptions {
    /// Time between sweeps
    pub interval: Duration,
    /// Time source the sweep compares expiry against
    pub clock: Arc<dyn Clock>,
}

impl SweepOptions {
    /// Sweep on the wall clock every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

struct SweeperTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Handle to a periodic purge task.
///
/// Dropping the handle also ends the task, but only [`Sweeper::stop`] waits
/// for it.
pub struct Sweeper {
    task: Mutex<Option<SweeperTask>>,
}

impl Sweeper {
    /// A sweeper that never runs
    pub fn disabled() -> Self {
        Self {
            task: Mutex::new(None),
        }
    }

    /// Spawn the purge loop on the current tokio runtime
    pub fn spawn<F, Fut>(engine: &'static str, options: &SweepOptions, purge: F) -> StoreResult<Self>
    where
        F: Fn(DateTime<Utc>) -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<usize>> + Send + 'static,
    {
        if options.interval.is_zero() {
            debug!("Sweeper for {} disabled, zero interval", engine);
            return Ok(Self::disabled());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StoreError::Backend(format!("sweeper needs a tokio runtime: {e}")))?;

        let (stop, mut stop_rx) = oneshot::channel();
        let period = options.interval;
        let clock = Arc::clone(&options.clock);

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => match purge(clock.now()).await {
                        Ok(count) if count > 0 => {
                            info!("Cleaned up {} expired messages from {}", count, engine);
                        }
                        Err(e) => {
                            error!("Cleanup failed for {}: {}", engine, e);
                        }
                        _ => {}
                    },
                }
            }

            debug!("Sweeper for {} stopped", engine);
        });

        info!("Sweeper for {} activated, every {:?}", engine, period);
        Ok(Self {
            task: Mutex::new(Some(SweeperTask { stop, handle })),
        })
    }

    /// Whether the purge loop is still owned by this handle
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Signal the loop to stop and wait for it. Later calls return at once.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        let Some(SweeperTask { stop, handle }) = task else {
            return;
        };

        // The receiver is gone only if the task already exited.
        let _ = stop.send(());
        if let Err(e) = handle.await {
            error!("Sweeper task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_ticks_and_stops() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let sweeper = Sweeper::spawn("test", &SweepOptions::new(Duration::from_secs(1)), move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            }
        })
        .unwrap();
        assert!(sweeper.is_running());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        sweeper.stop().await;
        assert!(!sweeper.is_running());

        let seen = ticks.load(Ordering::SeqCst);
        assert_eq!(seen, 3);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);

        // second stop is a no-op
        sweeper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_survives_purge_errors() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let sweeper = Sweeper::spawn("test", &SweepOptions::new(Duration::from_secs(1)), move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Backend("disk gone".to_string()))
            }
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        sweeper.stop().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_interval_disabled() {
        let sweeper = Sweeper::spawn("test", &SweepOptions::new(Duration::ZERO), |_| async { Ok(0) })
            .unwrap();
        assert!(!sweeper.is_running());
        sweeper.stop().await;
    }

    #[test]
    fn test_spawn_without_runtime() {
        let result = Sweeper::spawn("test", &SweepOptions::new(Duration::from_secs(1)), |_| async {
            Ok(0)
        });
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }
}
