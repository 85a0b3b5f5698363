//! Consumer endpoint: negotiates the resume position with the producer and
//! pops bundles with timeouts.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, info, warn};

use transfer::{ChannelStatus, CreationStatus, QueueStatus};

use crate::info::{ChannelParameter, ConsumerChannelInfo, DataBundle};
use crate::metrics::{ChannelMetrics, ChannelMetricsSnapshot};
use crate::mock::MockTransport;
use crate::queue::DownstreamQueue;
use crate::registry::DownstreamRegistry;

/// Bootstrap lifecycle of a consumer endpoint.
///
/// ```text
/// Uninitialized ──create──▶ Pulling
/// Pulling ──Ok──▶ Ready          Pulling ──NoValidData──▶ ReadyEmpty
/// Pulling ──Timeout──▶ Failed    Pulling ──DataLost──▶ Failed
/// Ready ──destroy──▶ Closed      Failed ──destroy──▶ Closed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapState {
    /// No create call has run yet.
    Uninitialized,
    /// Create is negotiating with the producer.
    Pulling,
    /// Pull succeeded; consumption may begin.
    Ready,
    /// Producer had no data; consumption may begin on an empty stream.
    ReadyEmpty,
    /// Bootstrap failed; the channel never becomes consumable.
    Failed,
    /// Endpoint destroyed.
    Closed,
}

impl BootstrapState {
    /// Whether consume calls are accepted in this state.
    pub fn is_consumable(self) -> bool {
        matches!(self, BootstrapState::Ready | BootstrapState::ReadyEmpty)
    }
}

/// Consumer-side capability set of a transfer channel.
///
/// Implementations are selected at construction time via
/// [`crate::new_consumer`]; an endpoint instance is pinned to one
/// thread by the enclosing runtime and is not required to be shareable.
pub trait ConsumerChannel: Send {
    /// Creates the downstream queue and issues the bootstrap pull asking
    /// the producer to resume at `current_message_id + 1`.
    fn create_transfer_channel(&mut self) -> CreationStatus;

    /// Releases the endpoint's queue handle.
    fn destroy_transfer_channel(&mut self) -> ChannelStatus;

    /// Blocks up to `timeout_ms` milliseconds for the next bundle. A
    /// timeout yields the empty bundle together with `Ok`; it is not an
    /// error.
    fn consume_item_from_channel(&mut self, timeout_ms: u64) -> (DataBundle, ChannelStatus);

    /// Reports every message at or below `offset_message_id` as consumed.
    fn notify_channel_consumed(&mut self, offset_message_id: u64) -> ChannelStatus;

    /// Re-reads the queue's receive watermark into
    /// `channel_info().queue_info.last_message_id`.
    fn refresh_channel_info(&mut self) -> ChannelStatus;

    /// Hook for persistent backends; the in-memory transports keep it a
    /// no-op.
    fn clear_transfer_checkpoint(
        &mut self,
        checkpoint_id: u64,
        checkpoint_offset: u64,
    ) -> ChannelStatus;

    /// Current bookkeeping for the channel.
    fn channel_info(&self) -> &ConsumerChannelInfo;

    /// Bootstrap lifecycle state.
    fn state(&self) -> BootstrapState;

    /// Operation counters recorded so far.
    fn metrics(&self) -> ChannelMetricsSnapshot;

    /// Drains already-queued bundles without blocking, up to `max`.
    fn drain_bundles(&mut self, max: usize) -> SmallVec<[DataBundle; 8]> {
        let mut out = SmallVec::new();
        while out.len() < max {
            let (bundle, status) = self.consume_item_from_channel(0);
            if !status.is_ok() || bundle.is_empty() {
                break;
            }
            out.push(bundle);
        }
        out
    }
}

fn map_pull_status(status: QueueStatus) -> CreationStatus {
    match status {
        QueueStatus::Ok => CreationStatus::PullOk,
        QueueStatus::NoValidData => CreationStatus::FreshStarted,
        QueueStatus::Timeout => CreationStatus::Timeout,
        QueueStatus::DataLost => CreationStatus::DataLost,
        QueueStatus::Resubscribe => {
            panic!("transport returned {status:?} during bootstrap; no handler exists for it")
        }
    }
}

/// Consumer endpoint over the registry-backed queue transport.
pub struct QueueConsumer {
    info: ConsumerChannelInfo,
    queue: Option<Arc<DownstreamQueue>>,
    state: BootstrapState,
    metrics: ChannelMetrics,
}

impl QueueConsumer {
    /// Creates the endpoint; the bootstrap pull runs inside
    /// [`ConsumerChannel::create_transfer_channel`].
    pub fn new(info: ConsumerChannelInfo) -> Self {
        Self {
            info,
            queue: None,
            state: BootstrapState::Uninitialized,
            metrics: ChannelMetrics::new(),
        }
    }

    fn queue(&self) -> &Arc<DownstreamQueue> {
        self.queue
            .as_ref()
            .expect("transfer channel used before create_transfer_channel")
    }

    /// Binds the peer, creates the downstream queue, and pulls.
    fn get_queue(&mut self, start_msg_id: u64, parameter: &ChannelParameter) -> QueueStatus {
        let registry = DownstreamRegistry::instance();
        let channel_id = self.info.channel_id;
        if registry.exists(&channel_id) {
            info!("downstream queue for channel {channel_id} already exists");
            self.queue = registry.queue(&channel_id);
            return QueueStatus::Ok;
        }
        registry.set_peer(
            channel_id,
            parameter.actor_id,
            parameter.async_function.clone(),
            parameter.sync_function.clone(),
        );
        info!("create downstream queue for channel {channel_id}, pull from {start_msg_id}");
        let queue = registry
            .create_downstream_queue(channel_id, parameter.actor_id)
            .unwrap_or_else(|err| {
                panic!("downstream queue allocation failed for channel {channel_id}: {err}")
            });
        self.queue = Some(queue);
        let (status, is_first_pull) = registry.pull_queue(&channel_id, start_msg_id);
        debug!("pull on channel {channel_id}: {status:?}, first pull: {is_first_pull}");
        status
    }
}

impl ConsumerChannel for QueueConsumer {
    fn create_transfer_channel(&mut self) -> CreationStatus {
        self.state = BootstrapState::Pulling;
        let start_msg_id = self.info.current_message_id + 1;
        let parameter = self.info.parameter.clone();
        let status = self.get_queue(start_msg_id, &parameter);
        let creation = map_pull_status(status);
        self.state = match creation {
            CreationStatus::PullOk => BootstrapState::Ready,
            CreationStatus::FreshStarted => BootstrapState::ReadyEmpty,
            _ => BootstrapState::Failed,
        };
        creation
    }

    fn destroy_transfer_channel(&mut self) -> ChannelStatus {
        self.state = BootstrapState::Closed;
        self.queue = None;
        ChannelStatus::Ok
    }

    fn consume_item_from_channel(&mut self, timeout_ms: u64) -> (DataBundle, ChannelStatus) {
        if !self.state.is_consumable() {
            warn!(
                "consume on channel {} in state {:?}",
                self.info.channel_id, self.state
            );
            return (DataBundle::empty(), ChannelStatus::Invalid);
        }
        let bundle = self.queue().pop_pending_block_timeout(timeout_ms * 1000);
        if bundle.is_empty() {
            self.metrics.record_timeout();
            return (bundle, ChannelStatus::Ok);
        }
        self.info.current_bundle_id = bundle.bundle_id;
        self.info.queue_info.consumed_bundle_id = bundle.bundle_id;
        self.metrics.record_consumed();
        (bundle, ChannelStatus::Ok)
    }

    fn notify_channel_consumed(&mut self, offset_message_id: u64) -> ChannelStatus {
        self.queue()
            .on_consumed(offset_message_id, self.info.queue_info.consumed_bundle_id);
        self.info.current_message_id = self.info.current_message_id.max(offset_message_id);
        self.info.queue_info.consumed_message_id = self
            .info
            .queue_info
            .consumed_message_id
            .max(offset_message_id);
        ChannelStatus::Ok
    }

    fn refresh_channel_info(&mut self) -> ChannelStatus {
        self.info.queue_info.last_message_id = self.queue().last_received_message_id();
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

    fn channel_info(&self) -> &ConsumerChannelInfo {
        &self.info
    }

    fn state(&self) -> BootstrapState {
        self.state
    }

    fn metrics(&self) -> ChannelMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Consumer endpoint over the mock transport.
pub struct MockConsumer {
    info: ConsumerChannelInfo,
    state: BootstrapState,
    metrics: ChannelMetrics,
}

impl MockConsumer {
    /// Creates the endpoint against the process-wide mock state.
    pub fn new(info: ConsumerChannelInfo) -> Self {
        Self {
            info,
            state: BootstrapState::Uninitialized,
            metrics: ChannelMetrics::new(),
        }
    }
}

impl ConsumerChannel for MockConsumer {
    fn create_transfer_channel(&mut self) -> CreationStatus {
        self.state = BootstrapState::Pulling;
        let mock = MockTransport::instance();
        let channel_id = self.info.channel_id;
        // Re-opening makes consumed-but-unacknowledged bundles deliverable
        // again, the acknowledgement-boundary item included.
        mock.requeue_consumed(&channel_id);
        let creation = if mock.has_pending(&channel_id) {
            CreationStatus::PullOk
        } else {
            CreationStatus::FreshStarted
        };
        self.state = match creation {
            CreationStatus::PullOk => BootstrapState::Ready,
            _ => BootstrapState::ReadyEmpty,
        };
        creation
    }

    fn destroy_transfer_channel(&mut self) -> ChannelStatus {
        // The ring pair belongs to the producer side; only the endpoint
        // state is released here.
        self.state = BootstrapState::Closed;
        ChannelStatus::Ok
    }

    fn consume_item_from_channel(&mut self, timeout_ms: u64) -> (DataBundle, ChannelStatus) {
        if !self.state.is_consumable() {
            warn!(
                "consume on channel {} in state {:?}",
                self.info.channel_id, self.state
            );
            return (DataBundle::empty(), ChannelStatus::Invalid);
        }
        let (bundle, status) =
            MockTransport::instance().consume_blocking(&self.info.channel_id, timeout_ms * 1000);
        if !status.is_ok() {
            return (bundle, status);
        }
        if bundle.is_empty() {
            self.metrics.record_timeout();
            return (bundle, status);
        }
        self.info.current_bundle_id = bundle.bundle_id;
        self.info.queue_info.consumed_bundle_id = bundle.bundle_id;
        self.metrics.record_consumed();
        (bundle, status)
    }

    fn notify_channel_consumed(&mut self, offset_message_id: u64) -> ChannelStatus {
        MockTransport::instance().notify_consumed(
            &self.info.channel_id,
            offset_message_id,
            self.info.queue_info.consumed_bundle_id,
        );
        self.info.current_message_id = self.info.current_message_id.max(offset_message_id);
        self.info.queue_info.consumed_message_id = self
            .info
            .queue_info
            .consumed_message_id
            .max(offset_message_id);
        ChannelStatus::Ok
    }

    fn refresh_channel_info(&mut self) -> ChannelStatus {
        let observed = MockTransport::instance().queue_info(&self.info.channel_id);
        self.info.queue_info.last_message_id = observed.last_message_id;
        ChannelStatus::Ok
    }

    fn clear_transfer_checkpoint(
        &mut self,
        _checkpoint_id: u64,
        _checkpoint_offset: u64,
    ) -> ChannelStatus {
        ChannelStatus::Ok
    }

    fn channel_info(&self) -> &ConsumerChannelInfo {
        &self.info
    }

    fn state(&self) -> BootstrapState {
        self.state
    }

    fn metrics(&self) -> ChannelMetricsSnapshot {
        self.metrics.snapshot()
    }
}
