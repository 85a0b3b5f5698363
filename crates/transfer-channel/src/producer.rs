//! Producer endpoint: pushes bundles into a channel with
//! backpressure-driven eviction.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use transfer::{BundleMeta, ChannelStatus, UNKNOWN_WATERMARK};

use crate::info::ProducerChannelInfo;
use crate::metrics::{ChannelMetrics, ChannelMetricsSnapshot};
use crate::mock::MockTransport;
use crate::queue::{PushError, UpstreamQueue};
use crate::registry::UpstreamRegistry;

/// Producer-side capability set of a transfer channel.
///
/// Implementations are selected at construction time via
/// [`crate::new_producer`]; an endpoint instance is pinned to one
/// thread by the enclosing runtime and is not required to be shareable.
pub trait ProducerChannel: Send {
    /// Idempotently creates the upstream queue and binds the peer.
    fn create_transfer_channel(&mut self) -> ChannelStatus;

    /// Releases the endpoint's queue handle. Tear-down of the physical
    /// queue belongs to the registry.
    fn destroy_transfer_channel(&mut self) -> ChannelStatus;

    /// Pushes one bundle; the leading bytes must decode as a bundle
    /// header. Returns `FullChannel` when the queue cannot accept the
    /// bundle even after one eviction pass.
    fn produce_item_to_channel(&mut self, bundle: &[u8]) -> ChannelStatus;

    /// Raises the queue's eviction limit to `message_id`. No synchronous
    /// reclamation happens here.
    fn notify_channel_consumed(&mut self, message_id: u64) -> ChannelStatus;

    /// Re-reads the queue's consumption watermarks into
    /// `channel_info().queue_info`, monotonically.
    fn refresh_channel_info(&mut self) -> ChannelStatus;

    /// Hook for persistent backends; the in-memory transports keep it a
    /// no-op.
    fn clear_transfer_checkpoint(
        &mut self,
        checkpoint_id: u64,
        checkpoint_offset: u64,
    ) -> ChannelStatus;

    /// Current bookkeeping for the channel.
    fn channel_info(&self) -> &ProducerChannelInfo;

    /// Operation counters recorded so far.
    fn metrics(&self) -> ChannelMetricsSnapshot;
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Producer endpoint over the registry-backed queue transport.
pub struct QueueProducer {
    info: ProducerChannelInfo,
    queue: Option<Arc<UpstreamQueue>>,
    metrics: ChannelMetrics,
}

impl QueueProducer {
    /// Creates the endpoint; no queue exists until
    /// [`ProducerChannel::create_transfer_channel`] runs.
    pub fn new(info: ProducerChannelInfo) -> Self {
        Self {
            info,
            queue: None,
            metrics: ChannelMetrics::new(),
        }
    }

    fn queue(&self) -> &Arc<UpstreamQueue> {
        self.queue
            .as_ref()
            .expect("transfer channel used before create_transfer_channel")
    }

    /// Pushes with one eviction retry, then hands the queue to the
    /// transport.
    fn push_queue_item(
        &self,
        bundle: &[u8],
        timestamp_ms: u64,
        msg_id_start: u64,
        msg_id_end: u64,
    ) -> Result<(), PushError> {
        let queue = self.queue();
        let mut result = queue.push(bundle, timestamp_ms, msg_id_start, msg_id_end);
        if result == Err(PushError::OutOfMemory) {
            if queue.try_evict_items() == 0 {
                debug!(
                    "eviction freed nothing on channel {}",
                    self.info.channel_id
                );
            }
            result = queue.push(bundle, timestamp_ms, msg_id_start, msg_id_end);
        }
        queue.send();
        result
    }
}

impl ProducerChannel for QueueProducer {
    fn create_transfer_channel(&mut self) -> ChannelStatus {
        let registry = UpstreamRegistry::instance();
        let channel_id = self.info.channel_id;
        if registry.exists(&channel_id) {
            info!("upstream queue for channel {channel_id} already exists");
        } else {
            registry.set_peer(
                channel_id,
                self.info.parameter.actor_id,
                self.info.parameter.async_function.clone(),
                self.info.parameter.sync_function.clone(),
            );
        }
        match registry.create_upstream_queue(
            channel_id,
            self.info.parameter.actor_id,
            self.info.queue_size,
        ) {
            Ok(queue) => {
                info!(
                    "created upstream queue for channel {channel_id}, byte budget {}",
                    self.info.queue_size
                );
                self.queue = Some(queue);
                self.info.message_last_commit_id = 0;
                ChannelStatus::Ok
            }
            Err(err) => {
                error!("upstream queue allocation failed for channel {channel_id}: {err}");
                ChannelStatus::Invalid
            }
        }
    }

    fn destroy_transfer_channel(&mut self) -> ChannelStatus {
        self.queue = None;
        ChannelStatus::Ok
    }

    fn produce_item_to_channel(&mut self, bundle: &[u8]) -> ChannelStatus {
        let meta = match BundleMeta::decode(bundle) {
            Ok(meta) => meta,
            Err(err) => {
                error!(
                    "undecodable bundle header on channel {}: {err}",
                    self.info.channel_id
                );
                return ChannelStatus::Invalid;
            }
        };
        let (msg_id_start, msg_id_end) = meta.message_id_span();
        debug!(
            "produce on channel {}: messages [{msg_id_start}, {msg_id_end}], {} bytes",
            self.info.channel_id,
            bundle.len()
        );

        match self.push_queue_item(bundle, now_ms(), msg_id_start, msg_id_end) {
            Ok(()) => {
                // Record the bundle only once the queue has accepted it.
                self.info.current_bundle_id = self.queue().current_seq_id();
                self.info.current_message_id = self.info.current_message_id.max(msg_id_end);
                self.metrics.record_produced();
                ChannelStatus::Ok
            }
            Err(PushError::OutOfMemory) => {
                warn!(
                    "channel {} is full; bundle [{msg_id_start}, {msg_id_end}] rejected",
                    self.info.channel_id
                );
                self.metrics.record_full_channel();
                ChannelStatus::FullChannel
            }
            Err(PushError::BundleTooLarge { size, capacity }) => {
                panic!(
                    "bundle of {size} bytes can never fit channel {} (byte budget {capacity})",
                    self.info.channel_id
                );
            }
        }
    }

    fn notify_channel_consumed(&mut self, message_id: u64) -> ChannelStatus {
        self.queue().set_eviction_limit(message_id);
        ChannelStatus::Ok
    }

    fn refresh_channel_info(&mut self) -> ChannelStatus {
        let queue = self.queue();
        let consumed_message_id = queue.min_consumed_message_id();
        let consumed_bundle_id = queue.min_consumed_bundle_id();
        let queue_info = &mut self.info.queue_info;
        if consumed_message_id != UNKNOWN_WATERMARK {
            queue_info.consumed_message_id =
                queue_info.consumed_message_id.max(consumed_message_id);
        }
        if consumed_bundle_id != UNKNOWN_WATERMARK {
            if queue_info.consumed_bundle_id != UNKNOWN_WATERMARK {
                queue_info.consumed_bundle_id =
                    queue_info.consumed_bundle_id.max(consumed_bundle_id);
            } else {
                queue_info.consumed_bundle_id = consumed_bundle_id;
            }
        }
        ChannelStatus::Ok
    }

    fn clear_transfer_checkpoint(
        &mut self,
        checkpoint_id: u64,
        checkpoint_offset: u64,
    ) -> ChannelStatus {
        debug!(
            "clear checkpoint {checkpoint_id} (offset {checkpoint_offset}) on channel {}",
            self.info.channel_id
        );
        ChannelStatus::Ok
    }

    fn channel_info(&self) -> &ProducerChannelInfo {
        &self.info
    }

    fn metrics(&self) -> ChannelMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Producer endpoint over the mock transport.
pub struct MockProducer {
    info: ProducerChannelInfo,
    ring_capacity: usize,
    metrics: ChannelMetrics,
}

impl MockProducer {
    /// Creates the endpoint; ring capacity applies when the channel is
    /// first created.
    pub fn new(info: ProducerChannelInfo, ring_capacity: usize) -> Self {
        Self {
            info,
            ring_capacity,
            metrics: ChannelMetrics::new(),
        }
    }
}

impl ProducerChannel for MockProducer {
    fn create_transfer_channel(&mut self) -> ChannelStatus {
        MockTransport::instance().create_channel(self.info.channel_id, self.ring_capacity);
        self.info.message_last_commit_id = 0;
        ChannelStatus::Ok
    }

    fn destroy_transfer_channel(&mut self) -> ChannelStatus {
        MockTransport::instance().destroy_channel(&self.info.channel_id);
        ChannelStatus::Ok
    }

    fn produce_item_to_channel(&mut self, bundle: &[u8]) -> ChannelStatus {
        let meta = match BundleMeta::decode(bundle) {
            Ok(meta) => meta,
            Err(err) => {
                error!(
                    "undecodable bundle header on channel {}: {err}",
                    self.info.channel_id
                );
                return ChannelStatus::Invalid;
            }
        };
        let (msg_id_start, msg_id_end) = meta.message_id_span();
        debug!(
            "mock produce on channel {}: messages [{msg_id_start}, {msg_id_end}]",
            self.info.channel_id
        );
        match MockTransport::instance().produce(&self.info.channel_id, bundle, msg_id_end) {
            Ok(bundle_id) => {
                self.info.current_bundle_id = bundle_id;
                self.info.current_message_id = self.info.current_message_id.max(msg_id_end);
                self.metrics.record_produced();
                ChannelStatus::Ok
            }
            Err(ChannelStatus::OutOfMemory) => {
                warn!(
                    "channel {} is full; bundle [{msg_id_start}, {msg_id_end}] rejected",
                    self.info.channel_id
                );
                self.metrics.record_full_channel();
                ChannelStatus::FullChannel
            }
            Err(status) => status,
        }
    }

    fn notify_channel_consumed(&mut self, _message_id: u64) -> ChannelStatus {
        // The mock never evicts, so there is no limit to raise.
        ChannelStatus::Ok
    }

    fn refresh_channel_info(&mut self) -> ChannelStatus {
        let observed = MockTransport::instance().queue_info(&self.info.channel_id);
        let queue_info = &mut self.info.queue_info;
        queue_info.consumed_message_id = queue_info
            .consumed_message_id
            .max(observed.consumed_message_id);
        queue_info.consumed_bundle_id = observed.consumed_bundle_id;
        ChannelStatus::Ok
    }

    fn clear_transfer_checkpoint(
        &mut self,
        _checkpoint_id: u64,
        _checkpoint_offset: u64,
    ) -> ChannelStatus {
        ChannelStatus::Ok
    }

    fn channel_info(&self) -> &ProducerChannelInfo {
        &self.info
    }

    fn metrics(&self) -> ChannelMetricsSnapshot {
        self.metrics.snapshot()
    }
}
