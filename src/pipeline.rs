//! Pipeline assembly.
//!
//! Wires a frame source into the acquisition and processing workers:
//!
//! ```text
//! FrameSource ─▶ AcquisitionWorker ─┬─▶ display channel ──────────────────────▶ caller
//!                                   └─▶ processing channel ─▶ ProcessingWorker
//!                                                                   │
//!                          caller ──▶ ReconfigSender ───────────────┤
//!                                                                   ▼
//!                                                        output channel ─▶ caller
//! ```
//!
//! The caller only ever sees non-blocking channel ends, the reconfiguration
//! sender and read-only statistics.

use crate::config::PipelineConfig;
use crate::core::{ReducedOutput, Sample};
use crate::data::channel::BoundedChannel;
use crate::data::reconfig::{reconfig_channel, ReconfigSender};
use crate::error::Result;
use crate::hardware::FrameSource;
use crate::stats::{
    AcquisitionSnapshot, AcquisitionStats, AcquisitionStatus, ProcessingSnapshot, ProcessingStats,
};
use crate::worker::{AcquisitionWorker, ProcessingWorker, WorkerHandle};
use tracing::{error, info};

/// Consumer name of the display hand-off.
pub const DISPLAY_CONSUMER: &str = "display";
/// Consumer name of the processing hand-off.
pub const PROCESSING_CONSUMER: &str = "processing";

/// A running acquisition → processing pipeline.
pub struct Pipeline {
    acquisition: WorkerHandle<AcquisitionStats>,
    processing: WorkerHandle<ProcessingStats>,
    display: BoundedChannel<Sample>,
    processing_input: BoundedChannel<Sample>,
    output: BoundedChannel<ReducedOutput>,
    reconfig: ReconfigSender,
    stopped: bool,
}

impl Pipeline {
    /// Validate `config`, build the reducer and start both workers.
    pub fn start(config: &PipelineConfig, source: Box<dyn FrameSource>) -> Result<Self> {
        config.validate()?;

        let display = BoundedChannel::new(config.acquisition.display_capacity);
        let processing_input = BoundedChannel::new(config.acquisition.processing_capacity);
        let output = BoundedChannel::new(config.processing.output_capacity);

        let reducer = config.processing.reducer.build()?;
        let kind = reducer.kind();
        let (reconfig, reconfig_rx) = reconfig_channel(kind);

        // Consumer side first so no early frame finds nobody listening
        let processing = ProcessingWorker::new(
            config.processing.buffer_capacity,
            reducer,
            processing_input.clone(),
            output.clone(),
            reconfig_rx,
        )?
        .with_idle_interval(config.processing.idle_interval())
        .spawn()?;

        let acquisition = AcquisitionWorker::new(source, config.acquisition.poll_interval())
            .with_consumer(DISPLAY_CONSUMER, display.clone())
            .with_consumer(PROCESSING_CONSUMER, processing_input.clone())
            .spawn()?;

        info!(
            reducer = kind.name(),
            buffer_capacity = config.processing.buffer_capacity,
            "Pipeline started"
        );

        Ok(Self {
            acquisition,
            processing,
            display,
            processing_input,
            output,
            reconfig,
            stopped: false,
        })
    }

    /// Raw frames for display; poll with `try_receive`.
    pub fn display(&self) -> &BoundedChannel<Sample> {
        &self.display
    }

    /// Reduced outputs; poll with `try_receive`.
    pub fn output(&self) -> &BoundedChannel<ReducedOutput> {
        &self.output
    }

    /// Live reconfiguration of the running reducer.
    pub fn reconfig(&self) -> &ReconfigSender {
        &self.reconfig
    }

    /// Acquisition worker status.
    pub fn acquisition_status(&self) -> AcquisitionStatus {
        self.acquisition.stats().status()
    }

    /// Acquisition counters.
    pub fn acquisition_stats(&self) -> AcquisitionSnapshot {
        self.acquisition.stats().snapshot()
    }

    /// Processing counters.
    pub fn processing_stats(&self) -> ProcessingSnapshot {
        self.processing.stats().snapshot()
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop both workers, join them and drain every channel.
    ///
    /// The producer is stopped first so processing sees no new input while it
    /// winds down. Calling this again is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        let acquisition = self.acquisition.shutdown();
        let processing = self.processing.shutdown();
        let drained = self.display.drain() + self.processing_input.drain() + self.output.drain();

        let acquisition_stats = self.acquisition_stats();
        let processing_stats = self.processing_stats();
        info!(
            frames = acquisition_stats.frames_acquired,
            frames_dropped = acquisition_stats.total_dropped(),
            processed = processing_stats.samples_processed,
            emitted = processing_stats.outputs_emitted,
            drained,
            "Pipeline stopped"
        );
        acquisition.and(processing)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Error stopping pipeline on drop: {}", e);
        }
    }
}
