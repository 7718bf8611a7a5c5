//! Acquisition worker: drains a frame source and fans frames out.
//!
//! ```text
//!                        ┌──try_send──▶ display channel     (drops counted per consumer)
//! FrameSource ──poll──▶ fan-out
//!                        └──try_send──▶ processing channel
//! ```
//!
//! Every consumer gets its own bounded channel and its own drop counter. A full
//! channel only costs its consumer the newest frame; it never delays the poll loop
//! or any other consumer. Frames are shared, not copied: each consumer receives a
//! clone of the same `Arc`'d image.
//!
//! A source error is fatal. The worker records `Failed`, logs, and exits without
//! retrying; restarting is the supervisor's decision.

use super::WorkerHandle;
use crate::core::Sample;
use crate::data::channel::BoundedChannel;
use crate::error::{PipelineError, Result};
use crate::hardware::FrameSource;
use crate::stats::{AcquisitionStats, AcquisitionStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Thread name of the spawned acquisition loop.
pub const ACQUISITION_THREAD: &str = "acquisition";

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The source had nothing new.
    Empty,
    /// A frame was fanned out.
    Frame {
        /// Consumers whose channel accepted it.
        delivered: usize,
        /// Consumers whose channel was full.
        dropped: usize,
    },
}

struct Consumer {
    name: String,
    channel: BoundedChannel<Sample>,
    index: usize,
}

/// Polls a [`FrameSource`] and fans each frame out to every registered consumer.
pub struct AcquisitionWorker {
    source: Box<dyn FrameSource>,
    consumers: Vec<Consumer>,
    poll_interval: Duration,
    stats: Arc<AcquisitionStats>,
}

impl AcquisitionWorker {
    /// Worker draining `source`, sleeping `poll_interval` after an empty poll.
    pub fn new(source: Box<dyn FrameSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            consumers: Vec::new(),
            poll_interval,
            stats: Arc::new(AcquisitionStats::default()),
        }
    }

    /// Register a consumer channel under `name`.
    pub fn with_consumer(mut self, name: &str, channel: BoundedChannel<Sample>) -> Self {
        let index = self.stats.register_consumer(name);
        debug!(consumer = name, capacity = channel.capacity(), "Added consumer");
        self.consumers.push(Consumer {
            name: name.to_string(),
            channel,
            index,
        });
        self
    }

    /// Shared statistics.
    pub fn stats(&self) -> Arc<AcquisitionStats> {
        Arc::clone(&self.stats)
    }

    /// Names of the registered consumers, in registration order.
    pub fn consumer_names(&self) -> Vec<&str> {
        self.consumers.iter().map(|c| c.name.as_str()).collect()
    }

    /// Poll once and fan the frame out.
    ///
    /// A source error marks the worker `Failed` and is returned; callers must not
    /// poll again.
    pub fn step(&mut self) -> Result<PollOutcome> {
        let sample = match self.source.poll() {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                self.stats.record_empty_poll();
                return Ok(PollOutcome::Empty);
            }
            Err(e) => {
                self.stats
                    .set_status(AcquisitionStatus::Failed(e.to_string()));
                return Err(PipelineError::Source(e));
            }
        };
        self.stats.record_frame();

        let mut delivered = 0;
        let mut dropped = 0;
        for consumer in &self.consumers {
            let accepted = consumer.channel.try_send(sample.clone()).is_ok();
            let drops = self.stats.record_delivery(consumer.index, accepted);
            if accepted {
                delivered += 1;
            } else {
                dropped += 1;
                trace!(
                    consumer = %consumer.name,
                    timestamp = sample.timestamp,
                    dropped = drops,
                    "Consumer channel full, frame dropped"
                );
            }
        }
        Ok(PollOutcome::Frame { delivered, dropped })
    }

    /// Run the poll loop until `stop` is raised or the source fails.
    pub fn run(mut self, stop: Arc<AtomicBool>) {
        self.stats.set_status(AcquisitionStatus::Running);
        info!(
            source = self.source.name(),
            consumers = ?self.consumer_names(),
            "Acquisition started"
        );

        while !stop.load(Ordering::SeqCst) {
            match self.step() {
                Ok(PollOutcome::Frame { .. }) => {}
                Ok(PollOutcome::Empty) => thread::sleep(self.poll_interval),
                Err(e) => {
                    error!(source = self.source.name(), "Acquisition failed: {}", e);
                    return;
                }
            }
        }

        self.stats.set_status(AcquisitionStatus::Stopped);
        let snapshot = self.stats.snapshot();
        info!(
            frames = snapshot.frames_acquired,
            dropped = snapshot.total_dropped(),
            "Acquisition stopped"
        );
    }

    /// Run the loop on a named thread.
    pub fn spawn(self) -> Result<WorkerHandle<AcquisitionStats>> {
        let stats = self.stats();
        WorkerHandle::spawn(ACQUISITION_THREAD, stats, move |stop| self.run(stop))
    }
}
