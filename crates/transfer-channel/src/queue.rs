//! In-process transport queues handed out by the registries.
//!
//! The upstream queue buffers pushed bundles against a byte budget and
//! reclaims acknowledged space through eviction; the downstream queue
//! buffers received bundles and supports blocking timed pops. Both are
//! thread-safe: a single mutex per queue covers the ring together with its
//! watermarks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace};

use transfer::{ActorId, ChannelId, UNKNOWN_WATERMARK};

use crate::info::{AsyncFnHandle, DataBundle};
use crate::proto::Frame;

/// Error reported by the upstream push path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushError {
    /// Byte budget is exhausted; eviction may free space.
    OutOfMemory,
    /// The bundle alone exceeds the whole byte budget and can never be
    /// accepted.
    BundleTooLarge {
        /// Size of the rejected bundle.
        size: usize,
        /// Total byte budget of the queue.
        capacity: usize,
    },
}

struct UpstreamItem {
    bundle_id: u64,
    msg_id_start: u64,
    msg_id_end: u64,
    timestamp_ms: u64,
    data: Arc<[u8]>,
    sent: bool,
}

struct UpstreamState {
    items: VecDeque<UpstreamItem>,
    used_bytes: usize,
    next_bundle_id: u64,
    eviction_limit: u64,
    min_consumed_message_id: u64,
    min_consumed_bundle_id: u64,
    last_message_id: u64,
    ever_pulled: bool,
}

/// Producer-side buffer for one channel.
pub struct UpstreamQueue {
    channel_id: ChannelId,
    peer_actor: ActorId,
    capacity_bytes: usize,
    peer_async: AsyncFnHandle,
    state: Mutex<UpstreamState>,
}

impl UpstreamQueue {
    pub(crate) fn new(
        channel_id: ChannelId,
        peer_actor: ActorId,
        capacity_bytes: usize,
        peer_async: AsyncFnHandle,
    ) -> Arc<Self> {
        Arc::new(Self {
            channel_id,
            peer_actor,
            capacity_bytes,
            peer_async,
            state: Mutex::new(UpstreamState {
                items: VecDeque::new(),
                used_bytes: 0,
                next_bundle_id: 0,
                eviction_limit: 0,
                min_consumed_message_id: UNKNOWN_WATERMARK,
                min_consumed_bundle_id: UNKNOWN_WATERMARK,
                last_message_id: 0,
                ever_pulled: false,
            }),
        })
    }

    /// Identity of the channel this queue serves.
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Peer actor bound at creation.
    pub fn peer_actor(&self) -> ActorId {
        self.peer_actor
    }

    /// Buffers a bundle covering `[msg_id_start, msg_id_end]`.
    pub fn push(
        &self,
        data: &[u8],
        timestamp_ms: u64,
        msg_id_start: u64,
        msg_id_end: u64,
    ) -> Result<(), PushError> {
        if data.len() > self.capacity_bytes {
            return Err(PushError::BundleTooLarge {
                size: data.len(),
                capacity: self.capacity_bytes,
            });
        }
        let mut state = self.state.lock();
        if state.used_bytes + data.len() > self.capacity_bytes {
            return Err(PushError::OutOfMemory);
        }
        state.next_bundle_id += 1;
        let bundle_id = state.next_bundle_id;
        state.used_bytes += data.len();
        state.last_message_id = state.last_message_id.max(msg_id_end);
        state.items.push_back(UpstreamItem {
            bundle_id,
            msg_id_start,
            msg_id_end,
            timestamp_ms,
            data: Arc::from(data),
            sent: false,
        });
        Ok(())
    }

    /// Forwards not-yet-sent bundles through the peer's async handle.
    ///
    /// Non-blocking and idempotent: items already handed to the transport
    /// are skipped, so repeated calls coalesce.
    pub fn send(&self) {
        let frames: Vec<Vec<u8>> = {
            let mut state = self.state.lock();
            state
                .items
                .iter_mut()
                .filter(|item| !item.sent)
                .map(|item| {
                    item.sent = true;
                    Frame::Bundle {
                        bundle_id: item.bundle_id,
                        msg_id_start: item.msg_id_start,
                        msg_id_end: item.msg_id_end,
                        payload: item.data.to_vec(),
                    }
                    .encode()
                })
                .collect()
        };
        for frame in frames {
            self.peer_async.invoke(&self.channel_id, &frame);
        }
    }

    /// Releases bundles whose entire message range lies at or below the
    /// eviction limit. Returns the number of bundles evicted.
    pub fn try_evict_items(&self) -> usize {
        let mut state = self.state.lock();
        let limit = state.eviction_limit;
        let mut evicted = 0;
        while let Some(front) = state.items.front() {
            if front.msg_id_end > limit {
                break;
            }
            let item = state.items.pop_front().expect("front observed above");
            state.used_bytes -= item.data.len();
            trace!(
                "evict bundle {} buffered at {} ms",
                item.bundle_id,
                item.timestamp_ms
            );
            evicted += 1;
        }
        if evicted > 0 {
            debug!(
                "evicted {evicted} bundles below message id {limit} on channel {}",
                self.channel_id
            );
        }
        evicted
    }

    /// Raises the eviction limit; bundles entirely at or below it become
    /// reclaimable.
    pub fn set_eviction_limit(&self, message_id: u64) {
        self.state.lock().eviction_limit = message_id;
    }

    /// Highest message id the peer acknowledged, or [`UNKNOWN_WATERMARK`].
    pub fn min_consumed_message_id(&self) -> u64 {
        self.state.lock().min_consumed_message_id
    }

    /// Highest bundle id the peer acknowledged, or [`UNKNOWN_WATERMARK`].
    pub fn min_consumed_bundle_id(&self) -> u64 {
        self.state.lock().min_consumed_bundle_id
    }

    /// Last bundle id assigned by a push.
    pub fn current_seq_id(&self) -> u64 {
        self.state.lock().next_bundle_id
    }

    /// Largest message id ever pushed.
    pub fn last_message_id(&self) -> u64 {
        self.state.lock().last_message_id
    }

    /// Bytes currently buffered.
    pub fn used_bytes(&self) -> usize {
        self.state.lock().used_bytes
    }

    /// Records a consumption acknowledgement from the peer.
    ///
    /// Watermarks are monotonic; a stale or duplicate acknowledgement never
    /// lowers them.
    pub(crate) fn on_consumed(&self, offset_message_id: u64, consumed_bundle_id: u64) {
        let mut state = self.state.lock();
        state.min_consumed_message_id = if state.min_consumed_message_id == UNKNOWN_WATERMARK {
            offset_message_id
        } else {
            state.min_consumed_message_id.max(offset_message_id)
        };
        if consumed_bundle_id != UNKNOWN_WATERMARK {
            state.min_consumed_bundle_id = if state.min_consumed_bundle_id == UNKNOWN_WATERMARK {
                consumed_bundle_id
            } else {
                state.min_consumed_bundle_id.max(consumed_bundle_id)
            };
        }
    }

    /// Answers a consumer pull asking to resume delivery at `start_msg_id`.
    pub(crate) fn handle_pull(&self, start_msg_id: u64) -> (transfer::QueueStatus, bool) {
        use transfer::QueueStatus;

        let status = {
            let mut state = self.state.lock();
            let is_first_pull = !state.ever_pulled;
            state.ever_pulled = true;

            if start_msg_id > state.last_message_id {
                return (QueueStatus::NoValidData, is_first_pull);
            }
            let covered = state
                .items
                .front()
                .map(|front| front.msg_id_start <= start_msg_id)
                .unwrap_or(false);
            if !covered {
                info!(
                    "pull at message id {start_msg_id} on channel {} hits evicted range",
                    self.channel_id
                );
                return (QueueStatus::DataLost, is_first_pull);
            }
            for item in state.items.iter_mut() {
                if item.msg_id_end >= start_msg_id {
                    item.sent = false;
                }
            }
            (QueueStatus::Ok, is_first_pull)
        };
        self.send();
        status
    }
}

struct DownstreamItem {
    bundle_id: u64,
    msg_id_end: u64,
    data: Arc<[u8]>,
}

struct DownstreamState {
    items: VecDeque<DownstreamItem>,
    last_recv_msg_id: u64,
    last_recv_bundle_id: u64,
}

/// Consumer-side receive buffer for one channel.
pub struct DownstreamQueue {
    channel_id: ChannelId,
    peer_actor: ActorId,
    peer_async: AsyncFnHandle,
    state: Mutex<DownstreamState>,
    ready: Condvar,
}

impl DownstreamQueue {
    pub(crate) fn new(
        channel_id: ChannelId,
        peer_actor: ActorId,
        peer_async: AsyncFnHandle,
    ) -> Arc<Self> {
        Arc::new(Self {
            channel_id,
            peer_actor,
            peer_async,
            state: Mutex::new(DownstreamState {
                items: VecDeque::new(),
                last_recv_msg_id: 0,
                last_recv_bundle_id: 0,
            }),
            ready: Condvar::new(),
        })
    }

    /// Identity of the channel this queue serves.
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Peer actor bound at creation.
    pub fn peer_actor(&self) -> ActorId {
        self.peer_actor
    }

    /// Accepts a bundle delivered by the transport.
    ///
    /// Bundles at or below the last received sequence id are duplicates of
    /// data the queue already handed out and are dropped, so the consumer
    /// observes strictly increasing bundle ids.
    pub(crate) fn push_received(
        &self,
        bundle_id: u64,
        msg_id_end: u64,
        data: Arc<[u8]>,
    ) {
        let mut state = self.state.lock();
        if bundle_id <= state.last_recv_bundle_id {
            debug!(
                "dropping duplicate bundle {bundle_id} on channel {}",
                self.channel_id
            );
            return;
        }
        state.last_recv_bundle_id = bundle_id;
        state.last_recv_msg_id = state.last_recv_msg_id.max(msg_id_end);
        state.items.push_back(DownstreamItem {
            bundle_id,
            msg_id_end,
            data,
        });
        drop(state);
        self.ready.notify_all();
    }

    /// Blocks up to `timeout_us` microseconds for the next bundle.
    ///
    /// Returns the empty bundle when the timeout elapses with nothing
    /// queued; the timeout is soft and the empty return is not an error.
    pub fn pop_pending_block_timeout(&self, timeout_us: u64) -> DataBundle {
        let deadline = Instant::now() + Duration::from_micros(timeout_us);
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return DataBundle {
                    data_size: item.data.len() as u32,
                    data: item.data,
                    bundle_id: item.bundle_id,
                };
            }
            let now = Instant::now();
            if now >= deadline {
                return DataBundle::empty();
            }
            self.ready.wait_for(&mut state, deadline - now);
        }
    }

    /// Largest message id the queue has received.
    pub fn last_received_message_id(&self) -> u64 {
        self.state.lock().last_recv_msg_id
    }

    /// Relays a consumption acknowledgement to the producer.
    pub fn on_consumed(&self, offset_message_id: u64, consumed_bundle_id: u64) {
        let frame = Frame::Consumed {
            offset_message_id,
            consumed_bundle_id,
        }
        .encode();
        self.peer_async.invoke(&self.channel_id, &frame);
    }

    /// Number of bundles waiting to be popped.
    pub fn pending(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Largest message id of the front item, if any. Used by tests probing
    /// delivery order.
    pub fn front_message_id(&self) -> Option<u64> {
        self.state.lock().items.front().map(|item| item.msg_id_end)
    }
}
