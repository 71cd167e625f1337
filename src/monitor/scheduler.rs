use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Handle to a recurring task running on the tokio runtime
///
/// The task runs its body once per period. Cancelling only prevents future
/// runs; a body already in progress completes normally. Cancelling twice is a
/// no-op, and dropping the handle cancels the task.
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `body` to run every `period`, first run one period from now
    pub fn spawn<F, Fut>(name: impl Into<String>, period: Duration, mut body: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (stop, mut stopped) = watch::channel(false);
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            // Skip missed ticks instead of bursting after a slow cycle
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stopped.changed() => break,
                }

                if *stopped.borrow() {
                    break;
                }

                body().await;
            }

            debug!("Periodic task '{}' finished", task_name);
        });

        Self { name, stop, handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop scheduling further runs
    pub fn cancel(&self) {
        self.stop.send_replace(true);
    }

    /// Whether the task has not been cancelled and is still scheduled
    pub fn is_active(&self) -> bool {
        !*self.stop.borrow() && !self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
