use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

/// Work run on every tick. Each run is awaited before the next one is armed.
pub type TickCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A periodic task runner.
pub trait Scheduler: Send + Sync {
    /// Run `callback` every `interval`. Restarts the loop if already running.
    fn start(&self, interval: Duration, callback: TickCallback);

    /// Stop ticking. A callback that is mid-run is cancelled.
    fn stop(&self);

    /// Run the callback as soon as possible instead of waiting for the timer.
    /// Requests made while a run is in progress collapse into one extra run.
    fn trigger_now(&self);

    /// Change the period. The timer is re-armed with the new period at once.
    fn set_interval(&self, interval: Duration);

    fn is_running(&self) -> bool;
}

struct Running {
    handle: JoinHandle<()>,
    interval: watch::Sender<Duration>,
    trigger: Arc<Notify>,
}

/// [`Scheduler`] on top of a tokio task. `start` must be called from within a
/// tokio runtime.
///
/// Ticks never overlap: the loop awaits the callback before sleeping again,
/// so a slow run delays the next tick instead of stacking a second one.
pub struct IntervalScheduler {
    running: Mutex<Option<Running>>,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(None),
        }
    }
}

impl Default for IntervalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Scheduler for IntervalScheduler {
    fn start(&self, interval: Duration, callback: TickCallback) {
        let (interval_tx, interval_rx) = watch::channel(interval);
        let trigger = Arc::new(Notify::new());
        let handle = tokio::spawn(run_loop(interval_rx, trigger.clone(), callback));

        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = running.replace(Running {
            handle,
            interval: interval_tx,
            trigger,
        }) {
            previous.handle.abort();
        }
        debug!(?interval, "Scheduler started");
    }

    fn stop(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = running.take() {
            previous.handle.abort();
            debug!("Scheduler stopped");
        }
    }

    fn trigger_now(&self) {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        match running.as_ref() {
            Some(r) => r.trigger.notify_one(),
            None => debug!("Scheduler not running, ignoring trigger"),
        }
    }

    fn set_interval(&self, interval: Duration) {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(r) = running.as_ref() {
            r.interval.send_if_modified(|current| {
                let changed = *current != interval;
                *current = interval;
                changed
            });
        }
    }

    fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

async fn run_loop(
    mut interval: watch::Receiver<Duration>,
    trigger: Arc<Notify>,
    callback: TickCallback,
) {
    loop {
        let period = *interval.borrow_and_update();
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = trigger.notified() => {
                debug!("Scheduler triggered manually");
            }
            changed = interval.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!(interval = ?*interval.borrow(), "Scheduler interval changed, re-arming");
                continue;
            }
        }
        callback().await;
    }
}
