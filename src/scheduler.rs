//! Cancellable fixed-rate background task
//!
//! Runs on a dedicated named thread. The thread sleeps on a cancellation
//! channel until the next deadline, so `cancel` wakes it immediately instead
//! of waiting out the interval.

use crate::error::{PercolatorError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Handle to a running periodic task
pub struct PeriodicTask {
    name: String,
    cancel_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Run `task` every `interval`, first after one interval has elapsed
    ///
    /// Errors and panics raised by `task` go to `on_failure`; the schedule
    /// keeps running.
    pub fn schedule<T, E>(name: &str, interval: Duration, mut task: T, mut on_failure: E) -> Result<Self>
    where
        T: FnMut() -> Result<()> + Send + 'static,
        E: FnMut(PercolatorError) + Send + 'static,
    {
        if interval.is_zero() {
            return Err(PercolatorError::Config(format!(
                "Periodic task {} needs a non-zero interval",
                name
            )));
        }

        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let task_name = name.to_string();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            Self::run_loop(&task_name, interval, cancel_rx, &mut task, &mut on_failure);
        })?;

        log::debug!("Scheduled {} every {:?}", name, interval);
        Ok(Self {
            name: name.to_string(),
            cancel_tx: Mutex::new(Some(cancel_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    fn run_loop(
        name: &str,
        interval: Duration,
        cancel_rx: Receiver<()>,
        task: &mut dyn FnMut() -> Result<()>,
        on_failure: &mut dyn FnMut(PercolatorError),
    ) {
        let mut next_run = Instant::now() + interval;
        loop {
            match cancel_rx.recv_deadline(next_run) {
                Err(RecvTimeoutError::Timeout) => {}
                // Cancelled or handle dropped
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            match catch_unwind(AssertUnwindSafe(&mut *task)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => on_failure(e),
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    on_failure(PercolatorError::Generic(format!(
                        "{} panicked: {}",
                        name, message
                    )));
                }
            }

            // Fixed rate: skip deadlines already missed by a slow run
            next_run += interval;
            let now = Instant::now();
            while next_run <= now {
                next_run += interval;
            }
        }
        log::debug!("Periodic task {} stopped", name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_tx.lock().is_none()
    }

    /// Stop the task and wait for an in-flight run to finish
    pub fn cancel(&self) -> Result<()> {
        if let Some(tx) = self.cancel_tx.lock().take() {
            let _ = tx.try_send(());
        }
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) if handle.thread().id() != thread::current().id() => {
                handle.join().map_err(|_| {
                    PercolatorError::Generic(format!("Periodic task {} thread panicked", self.name))
                })
            }
            _ => Ok(()),
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Err(e) = self.cancel() {
            log::error!("{}", e);
        }
    }
}
