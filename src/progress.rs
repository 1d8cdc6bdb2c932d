use crate::config::MIN_PROGRESS_INTERVAL_MS;
use crate::error::DumpError;
use crate::notify::{Notification, Notifier};
use crate::stats::RunCounters;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Periodic progress reporter running on its own thread.
///
/// Ticks once immediately, then every `interval`. Only reads the shared counters, so it never
/// waits on the dump worker. Cancellation drops the stop channel and joins the thread; no tick
/// fires after [`ProgressTicker::cancel`] returns.
pub struct ProgressTicker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    pub fn start(
        counters: Arc<RunCounters>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Result<Self, DumpError> {
        let interval = interval.max(Duration::from_millis(MIN_PROGRESS_INTERVAL_MS));
        let (stop, stopped) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("recipedump-progress".to_string())
            .spawn(move || loop {
                notifier.notify(Notification::Progress(counters.snapshot()));
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|source| DumpError::Spawn {
                name: "progress",
                source,
            })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("Progress ticker thread panicked");
            }
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
