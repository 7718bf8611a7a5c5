//! Worker statistics.
//!
//! Each worker owns an `Arc` of its stats block and bumps plain atomic counters on
//! the hot path. Supervisors read a consistent-enough [`snapshot`] at their own
//! pace without ever touching worker state.
//!
//! [`snapshot`]: AcquisitionStats::snapshot

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle of an acquisition worker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AcquisitionStatus {
    /// Created, loop not started yet.
    #[default]
    Idle,
    /// Polling the source.
    Running,
    /// Exited after a stop request.
    Stopped,
    /// Exited after a fatal source error; not restarted automatically.
    Failed(String),
}

impl AcquisitionStatus {
    /// Whether the worker loop has exited.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }
}

impl fmt::Display for AcquisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug)]
struct ConsumerCounters {
    name: String,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Counters shared between an acquisition worker and its supervisor.
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    status: RwLock<AcquisitionStatus>,
    frames_acquired: AtomicU64,
    empty_polls: AtomicU64,
    consumers: RwLock<Vec<ConsumerCounters>>,
}

impl AcquisitionStats {
    pub(crate) fn register_consumer(&self, name: &str) -> usize {
        let mut consumers = self.consumers.write();
        consumers.push(ConsumerCounters {
            name: name.to_string(),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        consumers.len() - 1
    }

    pub(crate) fn set_status(&self, status: AcquisitionStatus) {
        *self.status.write() = status;
    }

    pub(crate) fn record_frame(&self) {
        self.frames_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty_poll(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a hand-off to consumer `index`; returns that consumer's drop total.
    pub(crate) fn record_delivery(&self, index: usize, accepted: bool) -> u64 {
        let consumers = self.consumers.read();
        let Some(consumer) = consumers.get(index) else {
            return 0;
        };
        if accepted {
            consumer.delivered.fetch_add(1, Ordering::Relaxed);
            consumer.dropped.load(Ordering::Relaxed)
        } else {
            consumer.dropped.fetch_add(1, Ordering::Relaxed) + 1
        }
    }

    /// Current worker status.
    pub fn status(&self) -> AcquisitionStatus {
        self.status.read().clone()
    }

    /// Frames dropped so far for the consumer registered as `name`.
    pub fn dropped(&self, name: &str) -> Option<u64> {
        self.consumers
            .read()
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.dropped.load(Ordering::Relaxed))
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> AcquisitionSnapshot {
        let consumers: Vec<ConsumerSnapshot> = self
            .consumers
            .read()
            .iter()
            .map(|c| ConsumerSnapshot {
                name: c.name.clone(),
                delivered: c.delivered.load(Ordering::Relaxed),
                dropped: c.dropped.load(Ordering::Relaxed),
            })
            .collect();
        AcquisitionSnapshot {
            status: self.status(),
            frames_acquired: self.frames_acquired.load(Ordering::Relaxed),
            frames_fanned_out: consumers.iter().map(|c| c.delivered).sum(),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            consumers,
        }
    }
}

/// Per-consumer delivery counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSnapshot {
    /// Name given at registration.
    pub name: String,
    /// Frames accepted by the consumer's channel.
    pub delivered: u64,
    /// Frames rejected because the channel was full.
    pub dropped: u64,
}

/// Copy of [`AcquisitionStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionSnapshot {
    /// Worker status.
    pub status: AcquisitionStatus,
    /// Frames returned by the source.
    pub frames_acquired: u64,
    /// Successful hand-offs summed over all consumers.
    pub frames_fanned_out: u64,
    /// Polls that returned no frame.
    pub empty_polls: u64,
    /// Per-consumer counts in registration order.
    pub consumers: Vec<ConsumerSnapshot>,
}

impl AcquisitionSnapshot {
    /// Drops summed over all consumers.
    pub fn total_dropped(&self) -> u64 {
        self.consumers.iter().map(|c| c.dropped).sum()
    }
}

/// Counters shared between a processing worker and its supervisor.
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub(crate) samples_processed: AtomicU64,
    pub(crate) outputs_emitted: AtomicU64,
    pub(crate) outputs_dropped: AtomicU64,
    pub(crate) shape_rejections: AtomicU64,
    pub(crate) reconfig_applied: AtomicU64,
    pub(crate) reconfig_rejected: AtomicU64,
    pub(crate) weight_violations: AtomicU64,
}

/// Copy of [`ProcessingStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingSnapshot {
    /// Samples pushed into the ring buffer.
    pub samples_processed: u64,
    /// Reduced outputs accepted by the output channel.
    pub outputs_emitted: u64,
    /// Reduced outputs rejected because the output channel was full.
    pub outputs_dropped: u64,
    /// Samples discarded for having the wrong shape.
    pub shape_rejections: u64,
    /// Reconfiguration messages applied.
    pub reconfig_applied: u64,
    /// Reconfiguration messages the reducer refused.
    pub reconfig_rejected: u64,
    /// Filter weights clamped into `[0, 1]`.
    pub weight_violations: u64,
}

impl ProcessingStats {
    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> ProcessingSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ProcessingSnapshot {
            samples_processed: load(&self.samples_processed),
            outputs_emitted: load(&self.outputs_emitted),
            outputs_dropped: load(&self.outputs_dropped),
            shape_rejections: load(&self.shape_rejections),
            reconfig_applied: load(&self.reconfig_applied),
            reconfig_rejected: load(&self.reconfig_rejected),
            weight_violations: load(&self.weight_violations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_counters_are_independent() {
        let stats = AcquisitionStats::default();
        let display = stats.register_consumer("display");
        let processing = stats.register_consumer("processing");

        assert_eq!(stats.record_delivery(display, false), 1);
        assert_eq!(stats.record_delivery(display, false), 2);
        assert_eq!(stats.record_delivery(processing, true), 0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_fanned_out, 1);
        assert_eq!(snapshot.total_dropped(), 2);
        assert_eq!(stats.dropped("display"), Some(2));
        assert_eq!(stats.dropped("processing"), Some(0));
        assert_eq!(stats.dropped("recorder"), None);
    }

    #[test]
    fn test_status_transitions() {
        let stats = AcquisitionStats::default();
        assert_eq!(stats.status(), AcquisitionStatus::Idle);
        stats.set_status(AcquisitionStatus::Failed("usb".into()));
        assert!(stats.status().is_terminal());
        assert_eq!(stats.status().to_string(), "failed: usb");
    }
}
