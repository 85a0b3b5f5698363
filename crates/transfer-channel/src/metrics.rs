//! Per-endpoint operation counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters recorded by an endpoint as it runs.
#[derive(Default)]
pub struct ChannelMetrics {
    produced: AtomicU64,
    full_channel: AtomicU64,
    consumed: AtomicU64,
    timeouts: AtomicU64,
}

impl ChannelMetrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_full_channel(&self) {
        self.full_channel.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ChannelMetricsSnapshot {
        ChannelMetricsSnapshot {
            produced: self.produced.load(Ordering::Relaxed),
            full_channel: self.full_channel.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of an endpoint's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelMetricsSnapshot {
    /// Bundles accepted by the queue.
    pub produced: u64,
    /// Produce attempts rejected for lack of space.
    pub full_channel: u64,
    /// Bundles handed to the consumer.
    pub consumed: u64,
    /// Consume calls that returned the empty bundle.
    pub timeouts: u64,
}
