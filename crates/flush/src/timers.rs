//! Cancellable timers
//!
//! Every delayed or periodic task is spawned through one [`Timers`] value so
//! a reload or shutdown can stop them all at once.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Delayed and repeating tasks sharing one cancellation token
#[derive(Debug, Clone, Default)]
pub struct Timers {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once after `after`, unless cancelled first
    pub fn delay<F>(&self, after: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(after) => task.await,
            }
        });
    }

    /// Run `task` every `period`, first run one period from now
    ///
    /// A run that is in progress when the timers are cancelled completes;
    /// no further runs start.
    pub fn repeat<F, Fut>(&self, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => task().await,
                }
            }
        });
    }

    /// Stop every pending and future run
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.tracker.close();
    }

    /// Wait for timer tasks to finish after [`Timers::cancel`]
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }
}
