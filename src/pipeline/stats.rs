use super::RunState;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct FlushCounters {
    pub(crate) batches: AtomicU64,
    pub(crate) records: AtomicU64,
    pub(crate) send_failures: AtomicU64,
    pub(crate) refused: AtomicU64,
}

impl FlushCounters {
    pub(crate) fn record_flush(&self, records: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records as u64, Ordering::Relaxed);
    }
}

/// Point-in-time view of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub state: RunState,
    pub enqueued: u64,
    pub dropped: u64,
    pub queued: usize,
    pub buffered: usize,
    pub flushed_batches: u64,
    pub flushed_records: u64,
    /// Flushes lost to a transport error other than a refusal.
    pub send_failures: u64,
    /// Flushes handed back to the buffer because the transport refused them.
    pub refused_sends: u64,
}

impl PipelineStats {
    /// Records accepted but not yet handed to the transport.
    pub fn pending(&self) -> usize {
        self.queued + self.buffered
    }
}
