//! Periodic job runner — a named background thread woken by a channel timeout.
//!
//! The thread blocks on `recv_timeout(interval)`: a timeout runs the job, a
//! stop message (or a dropped handle) ends the loop. Jobs receive the
//! scheduler's `CancelToken` so a long backtest can stop between bars when the
//! scheduler is stopped mid-run.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use backlab_core::CancelToken;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("scheduled job panicked")]
    JobPanicked,
}

/// Handle to a running periodic job. Dropping it stops the job.
pub struct Scheduler {
    stop_tx: Sender<()>,
    cancel: CancelToken,
    handle: Option<JoinHandle<usize>>,
}

impl Scheduler {
    /// Run `job` every `interval` on a thread called `name`.
    ///
    /// The first run happens one interval after start.
    pub fn start<F>(name: &str, interval: Duration, mut job: F) -> Result<Self, SchedulerError>
    where
        F: FnMut(&CancelToken) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let cancel = CancelToken::new();
        let token = cancel.clone();

        let handle = thread::Builder::new().name(name.into()).spawn(move || {
            let mut runs = 0usize;
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if token.is_cancelled() {
                            break;
                        }
                        job(&token);
                        runs += 1;
                        debug!(runs, "scheduled job finished");
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            runs
        })?;

        Ok(Self {
            stop_tx,
            cancel,
            handle: Some(handle),
        })
    }

    /// Token handed to every job run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stop the loop, cancel any in-flight job, and wait for the thread.
    ///
    /// Returns how many times the job ran.
    pub fn stop(mut self) -> Result<usize, SchedulerError> {
        self.shutdown().unwrap_or(Ok(0))
    }

    fn shutdown(&mut self) -> Option<Result<usize, SchedulerError>> {
        self.cancel.cancel();
        // The receiver may already be gone if the thread exited.
        let _ = self.stop_tx.send(());
        self.handle
            .take()
            .map(|h| h.join().map_err(|_| SchedulerError::JobPanicked))
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
