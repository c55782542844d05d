//! Aggregated pipeline statistics exposed to the GUI/CLI.

use crate::processing::ProcessingStats;
use crate::receiver::ReceiverStats;
use crate::ring::RingStats;
use crate::supervisor::{LinkState, RecordingState};
use crate::writer::WriterStats;

/// One snapshot of every counter in the pipeline, taken by
/// [`crate::Supervisor::snapshot_stats`].
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub link_state: LinkState,
    pub recording: RecordingState,
    pub receiver: ReceiverStats,
    /// Wire rate estimated from packet-count deltas between snapshots.
    pub samples_per_second: f64,
    pub ring: Option<RingStats>,
    pub processing: ProcessingStats,
    pub writer: Option<WriterStats>,
}

impl PipelineStats {
    /// Fraction of wire packets lost (0.0 to 1.0).
    pub fn loss_ratio(&self) -> f64 {
        let total = self.receiver.packets_received + self.receiver.packets_lost;
        if total == 0 {
            0.0
        } else {
            self.receiver.packets_lost as f64 / total as f64
        }
    }

    /// Raw ring fill fraction, 0.0 when disconnected.
    pub fn buffer_fill_ratio(&self) -> f64 {
        self.ring.map_or(0.0, |r| r.fill_ratio())
    }
}
