//! Background loops that run a closure on a fixed period
//!
//! The aggregator sweep and the alert evaluator both run as a
//! [`PeriodicTask`]: a dedicated thread that waits on a shutdown channel with
//! a timeout equal to the period, and runs one tick each time the wait times
//! out.

use log::{debug, error, info};
use std::io;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to a running background loop
///
/// Stopping is idempotent: `stop` may be called any number of times, and is
/// also called on drop.
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    period: Duration,
    stopped: AtomicBool,
    shutdown_sender: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Spawn a thread that calls `tick` every `period`
    ///
    /// The loop ends when the task is stopped or when `tick` returns
    /// `ControlFlow::Break`.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn spawn<F>(name: impl Into<String>, period: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let name = name.into();
        let (shutdown_sender, shutdown_receiver) = mpsc::channel::<()>();
        let thread_name = name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                info!("{} started (period {:?})", thread_name, period);

                loop {
                    match shutdown_receiver.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            if tick().is_break() {
                                debug!("{} finished on its own", thread_name);
                                break;
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            debug!("{} received shutdown signal", thread_name);
                            break;
                        }
                    }
                }

                info!("{} stopped", thread_name);
            })?;

        Ok(Self {
            name,
            period,
            stopped: AtomicBool::new(false),
            shutdown_sender: Mutex::new(Some(shutdown_sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether `stop` has not been called yet
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Signal the loop to exit and wait for the thread to finish
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return; // Already stopped.
        }

        // Dropping the sender wakes the loop immediately
        drop(
            self.shutdown_sender
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take(),
        );

        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("{} panicked before shutdown", self.name);
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
