//! Pipeline workers.
//!
//! Each worker runs its loop on a dedicated, named OS thread and shares nothing
//! mutable with other workers: input arrives through [`BoundedChannel`]s, results
//! leave through them, and the only other shared state is a stop flag and an
//! atomic statistics block.
//!
//! Cancellation is cooperative. [`WorkerHandle::stop`] raises the flag; the worker
//! finishes its current iteration, runs its shutdown path and exits.
//!
//! [`BoundedChannel`]: crate::data::channel::BoundedChannel

pub mod acquisition;
pub mod processing;

pub use acquisition::{AcquisitionWorker, PollOutcome};
pub use processing::{ProcessingWorker, StepOutcome};

use crate::error::{PipelineError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::error;

/// Owner side of a spawned worker thread.
#[derive(Debug)]
pub struct WorkerHandle<S> {
    name: String,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    stats: Arc<S>,
}

impl<S> WorkerHandle<S> {
    /// Spawn `body` on a thread called `name`.
    ///
    /// `body` receives the stop flag it must poll once per iteration.
    pub(crate) fn spawn<F>(name: &str, stats: Arc<S>, body: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))
            .map_err(|e| PipelineError::Worker {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            name: name.to_string(),
            stop,
            thread: Some(thread),
            stats,
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared statistics of the worker.
    pub fn stats(&self) -> &Arc<S> {
        &self.stats
    }

    /// Ask the worker to exit after its current iteration.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether the worker loop has returned (stopped, failed or already joined).
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the thread to exit. Joining twice is a no-op.
    pub fn join(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| PipelineError::Worker {
                name: self.name.clone(),
                reason: "thread panicked".to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Stop and join.
    pub fn shutdown(&mut self) -> Result<()> {
        self.stop();
        self.join()
    }
}

impl<S> Drop for WorkerHandle<S> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.shutdown() {
                error!(worker = %self.name, "Error stopping worker on drop: {}", e);
            }
        }
    }
}
