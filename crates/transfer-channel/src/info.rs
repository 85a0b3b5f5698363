//! Bookkeeping types threaded through the endpoint API.

use std::fmt;
use std::sync::Arc;

use transfer::{ActorId, ChannelId, INVALID_SEQ_ID, UNKNOWN_WATERMARK};

/// Fire-and-forget delivery into the peer actor.
///
/// The transport behind the handle is opaque; the channel layer only hands
/// it a channel id and an encoded frame.
pub trait AsyncFunction: Send + Sync {
    /// Delivers `payload` to the peer without waiting for a response.
    fn invoke(&self, channel_id: &ChannelId, payload: &[u8]);
}

/// Synchronous query against the peer actor.
pub trait SyncFunction: Send + Sync {
    /// Sends `payload` and waits for the response; `None` is a transport
    /// timeout.
    fn invoke(&self, channel_id: &ChannelId, payload: &[u8]) -> Option<Vec<u8>>;
}

/// Shared handle for asynchronous peer delivery.
pub type AsyncFnHandle = Arc<dyn AsyncFunction>;
/// Shared handle for synchronous peer queries.
pub type SyncFnHandle = Arc<dyn SyncFunction>;

/// Peer binding handed to an endpoint at construction.
#[derive(Clone)]
pub struct ChannelParameter {
    /// Identity of the peer actor on the other end of the channel.
    pub actor_id: ActorId,
    /// Handle used for asynchronous pushes toward the peer.
    pub async_function: AsyncFnHandle,
    /// Handle used for synchronous queries against the peer.
    pub sync_function: SyncFnHandle,
}

impl fmt::Debug for ChannelParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelParameter")
            .field("actor_id", &self.actor_id)
            .finish_non_exhaustive()
    }
}

/// Watermarks observed from the transport queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueInfo {
    /// Highest message id the peer acknowledged as consumed.
    pub consumed_message_id: u64,
    /// Highest bundle id the peer acknowledged as consumed;
    /// [`UNKNOWN_WATERMARK`] until the first observation.
    pub consumed_bundle_id: u64,
    /// Largest message id the queue has seen.
    pub last_message_id: u64,
}

impl Default for QueueInfo {
    fn default() -> Self {
        Self {
            consumed_message_id: 0,
            consumed_bundle_id: UNKNOWN_WATERMARK,
            last_message_id: 0,
        }
    }
}

/// Producer-side channel bookkeeping.
#[derive(Clone, Debug)]
pub struct ProducerChannelInfo {
    /// Identity of the channel.
    pub channel_id: ChannelId,
    /// Byte budget of the upstream queue.
    pub queue_size: usize,
    /// Peer binding used when the queue is created.
    pub parameter: ChannelParameter,
    /// Highest message id handed to the channel.
    pub current_message_id: u64,
    /// Highest bundle id actually enqueued.
    pub current_bundle_id: u64,
    /// Commit watermark managed by the enclosing runtime.
    pub message_last_commit_id: u64,
    /// Watermarks observed from the queue.
    pub queue_info: QueueInfo,
}

impl ProducerChannelInfo {
    /// Fresh bookkeeping for a channel with the given byte budget.
    pub fn new(channel_id: ChannelId, queue_size: usize, parameter: ChannelParameter) -> Self {
        Self {
            channel_id,
            queue_size,
            parameter,
            current_message_id: 0,
            current_bundle_id: 0,
            message_last_commit_id: 0,
            queue_info: QueueInfo::default(),
        }
    }
}

/// Consumer-side channel bookkeeping.
///
/// `current_message_id` is the last message id successfully consumed; the
/// bootstrap pull asks the producer to resume delivery at the next id, so a
/// runtime that snapshots this field can reopen the channel where it left
/// off.
#[derive(Clone, Debug)]
pub struct ConsumerChannelInfo {
    /// Identity of the channel.
    pub channel_id: ChannelId,
    /// Byte budget mirror of the producer side (informational).
    pub queue_size: usize,
    /// Peer binding used for pull negotiation and acknowledgements.
    pub parameter: ChannelParameter,
    /// Last message id successfully consumed.
    pub current_message_id: u64,
    /// Last bundle id observed by a consume call.
    pub current_bundle_id: u64,
    /// Commit watermark managed by the enclosing runtime.
    pub message_last_commit_id: u64,
    /// Watermarks observed from the queue.
    pub queue_info: QueueInfo,
}

impl ConsumerChannelInfo {
    /// Fresh bookkeeping starting from message id zero.
    pub fn new(channel_id: ChannelId, queue_size: usize, parameter: ChannelParameter) -> Self {
        Self {
            channel_id,
            queue_size,
            parameter,
            current_message_id: 0,
            current_bundle_id: 0,
            message_last_commit_id: 0,
            queue_info: QueueInfo::default(),
        }
    }

    /// Sets the resume position: the bootstrap pull will request delivery
    /// from `message_id + 1`.
    pub fn with_resume_position(mut self, message_id: u64) -> Self {
        self.current_message_id = message_id;
        self
    }
}

/// A consumed bundle.
///
/// `data` is the queue-owned buffer shared by reference count; consuming the
/// next bundle does not invalidate it, but callers should treat it as
/// transient and not hold it past the next consume on the same channel. No
/// byte copy happens on the consume path.
#[derive(Clone, Debug)]
pub struct DataBundle {
    /// Bundle bytes, header included.
    pub data: Arc<[u8]>,
    /// Length of `data` in bytes.
    pub data_size: u32,
    /// Producer-assigned sequence id; [`INVALID_SEQ_ID`] for the
    /// empty bundle returned on consume timeout.
    pub bundle_id: u64,
}

impl DataBundle {
    /// The zero-data bundle returned when a consume times out.
    pub fn empty() -> Self {
        Self {
            data: Arc::from(&[][..]),
            data_size: 0,
            bundle_id: INVALID_SEQ_ID,
        }
    }

    /// Whether this is the empty/timeout bundle.
    pub fn is_empty(&self) -> bool {
        self.bundle_id == INVALID_SEQ_ID
    }
}
