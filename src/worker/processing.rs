//! Processing worker: ring buffer + reducer behind an input channel.
//!
//! One iteration ([`ProcessingWorker::step`]):
//!
//! 1. apply every pending reconfiguration message, each all-or-nothing
//! 2. take at most one sample from the input channel
//! 3. push it into the ring buffer, then bootstrap or fast-update the reducer
//! 4. on a slow tick, `try_send` the reduced output (a full output channel drops it)
//!
//! When the input channel is empty the loop sleeps for the idle interval instead
//! of spinning. On stop, every channel the worker reads or writes is drained so a
//! late consumer never sees post-shutdown data.

use super::WorkerHandle;
use crate::core::{ReducedOutput, Sample};
use crate::data::channel::BoundedChannel;
use crate::data::reconfig::ReconfigReceiver;
use crate::data::reducer::{advance, Reducer};
use crate::data::ring_buffer::RingBuffer;
use crate::error::{PipelineError, Result};
use crate::stats::ProcessingStats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Thread name of the spawned processing loop.
pub const PROCESSING_THREAD: &str = "processing";

/// Default sleep when the input channel is empty.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(1);

/// What a single [`ProcessingWorker::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No sample was pending.
    Idle,
    /// The sample was stored; no output this time.
    Buffered,
    /// An output was produced and accepted by the output channel.
    Emitted,
    /// An output was produced but the output channel was full.
    OutputDropped,
    /// The sample had the wrong shape and was discarded.
    Rejected,
}

/// Owns one [`RingBuffer`] and one [`Reducer`].
pub struct ProcessingWorker {
    buffer: RingBuffer,
    reducer: Box<dyn Reducer>,
    input: BoundedChannel<Sample>,
    output: BoundedChannel<ReducedOutput>,
    reconfig: ReconfigReceiver,
    idle_interval: Duration,
    stats: Arc<ProcessingStats>,
}

impl ProcessingWorker {
    /// Worker with a `buffer_capacity`-slot window feeding `reducer`.
    pub fn new(
        buffer_capacity: usize,
        reducer: Box<dyn Reducer>,
        input: BoundedChannel<Sample>,
        output: BoundedChannel<ReducedOutput>,
        reconfig: ReconfigReceiver,
    ) -> Result<Self> {
        Ok(Self {
            buffer: RingBuffer::new(buffer_capacity)?,
            reducer,
            input,
            output,
            reconfig,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            stats: Arc::new(ProcessingStats::default()),
        })
    }

    /// Sleep used when no sample is pending.
    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval;
        self
    }

    /// Shared statistics.
    pub fn stats(&self) -> Arc<ProcessingStats> {
        Arc::clone(&self.stats)
    }

    /// The worker's ring buffer.
    pub fn buffer(&self) -> &RingBuffer {
        &self.buffer
    }

    /// The worker's reducer.
    pub fn reducer(&self) -> &dyn Reducer {
        self.reducer.as_ref()
    }

    fn apply_reconfig(&mut self) {
        while let Some(message) = self.reconfig.try_receive() {
            match self.reducer.apply(&message) {
                Ok(()) => {
                    self.stats.reconfig_applied.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.reconfig_rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(reducer = self.reducer.kind().name(), "Reconfiguration rejected: {}", e);
                }
            }
        }
    }

    /// Run one loop iteration.
    ///
    /// Returns an error only for failures that make further processing pointless
    /// (a reducer that cannot run on this buffer). Drops and shape mismatches are
    /// counted and reported through the outcome.
    pub fn step(&mut self) -> Result<StepOutcome> {
        self.apply_reconfig();

        let Some(sample) = self.input.try_receive() else {
            return Ok(StepOutcome::Idle);
        };

        let converted = match self.buffer.push(&sample) {
            Ok(converted) => converted,
            Err(PipelineError::ShapeMismatch { expected, actual }) => {
                let rejected = self.stats.shape_rejections.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    ?expected,
                    ?actual,
                    timestamp = sample.timestamp,
                    rejected,
                    "Discarding frame with mismatched shape"
                );
                return Ok(StepOutcome::Rejected);
            }
            Err(e) => return Err(e),
        };
        self.stats.samples_processed.fetch_add(1, Ordering::Relaxed);
        if converted {
            info!(
                capacity = self.buffer.capacity(),
                shape = ?self.buffer.frame_shape(),
                "Ring buffer filled; reducer bootstrapping"
            );
        }

        let emitted = advance(self.reducer.as_mut(), &self.buffer, converted)?;
        self.stats
            .weight_violations
            .store(self.reducer.weight_violations(), Ordering::Relaxed);

        let Some(output) = emitted else {
            return Ok(StepOutcome::Buffered);
        };
        match self.output.try_send(output) {
            Ok(()) => {
                self.stats.outputs_emitted.fetch_add(1, Ordering::Relaxed);
                Ok(StepOutcome::Emitted)
            }
            Err(dropped) => {
                let total = self.stats.outputs_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(
                    timestamp = dropped.timestamp,
                    dropped = total,
                    "Output channel full, reduced frame dropped"
                );
                Ok(StepOutcome::OutputDropped)
            }
        }
    }

    /// Run until `stop` is raised or the reducer fails, then drain every channel.
    pub fn run(mut self, stop: Arc<AtomicBool>) {
        info!(
            reducer = self.reducer.kind().name(),
            capacity = self.buffer.capacity(),
            "Processing started"
        );

        while !stop.load(Ordering::SeqCst) {
            match self.step() {
                Ok(StepOutcome::Idle) => thread::sleep(self.idle_interval),
                Ok(_) => {}
                Err(e) => {
                    error!(reducer = self.reducer.kind().name(), "Processing failed: {}", e);
                    break;
                }
            }
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        let input = self.input.drain();
        let output = self.output.drain();
        let reconfig = self.reconfig.drain();
        debug!(input, output, reconfig, "Drained channels");

        let stats = self.stats.snapshot();
        info!(
            processed = stats.samples_processed,
            emitted = stats.outputs_emitted,
            dropped = stats.outputs_dropped,
            "Processing stopped"
        );
    }

    /// Run the loop on a named thread.
    pub fn spawn(self) -> Result<WorkerHandle<ProcessingStats>> {
        let stats = self.stats();
        WorkerHandle::spawn(PROCESSING_THREAD, stats, move |stop| self.run(stop))
    }
}
