use crate::error::{InvariantViolation, SchedulerError};
use log::{error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// A fixed-rate task on the tokio runtime that can be stopped.
///
/// Each tick is isolated: an error or a panic is logged and the next tick
/// still runs. Ticks that fall behind are skipped, never replayed. The only
/// panic that ends the task is an `InvariantViolation`.
pub struct PeriodicTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F>(runtime: &Handle, name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Result<(), SchedulerError> + Send + 'static,
    {
        let (shutdown, mut stop_rx) = watch::channel(false);
        let handle = runtime.spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => run_tick(name, &mut tick),
                }
            }
            info!("{} task stopped", name);
        });
        info!("{} task started, period {:?}", name, period);
        Self { name, shutdown, handle }
    }

    /// Signals the task to stop and waits up to `grace` for it, then aborts it.
    /// Returns once the task has terminated.
    pub async fn shutdown(mut self, grace: Duration) {
        let _ = self.shutdown.send(true);
        match time::timeout(grace, &mut self.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_panic() => error!("{} task terminated by a panic", self.name),
            Ok(Err(e)) => warn!("{} task ended abnormally: {}", self.name, e),
            Err(_) => {
                warn!("{} task did not stop within {:?}, aborting", self.name, grace);
                self.handle.abort();
                let _ = (&mut self.handle).await;
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn run_tick<F>(name: &str, tick: &mut F)
where
    F: FnMut() -> Result<(), SchedulerError>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| tick())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("{} tick failed: {}", name, e),
        Err(payload) if payload.is::<InvariantViolation>() => panic::resume_unwind(payload),
        Err(payload) => error!("{} tick panicked: {}", name, panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
