//! In-process mock transport.
//!
//! One process-wide map of `ChannelId → (message ring, consumed ring,
//! queue info)` behind a single mutex. Good enough for tests: every channel
//! shares the lock, produce never evicts, and delivery is a straight move
//! from the message ring to the consumed ring. The consumed ring is what
//! makes at-least-once visible: unacknowledged bundles moved there come
//! back when a consumer re-creates the channel.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use transfer::{ChannelId, ChannelStatus, ItemRing};

use crate::info::{DataBundle, QueueInfo};

/// Ring capacity used when a channel does not override it.
pub const DEFAULT_RING_CAPACITY: usize = 10_000;

#[derive(Clone)]
struct MockItem {
    bundle_id: u64,
    message_id: u64,
    data: Arc<[u8]>,
}

struct MockChannel {
    messages: ItemRing<MockItem>,
    consumed: ItemRing<MockItem>,
    info: QueueInfo,
    next_bundle_id: u64,
}

impl MockChannel {
    fn new(ring_capacity: usize) -> Self {
        Self {
            messages: ItemRing::new(ring_capacity).expect("ring capacity is nonzero"),
            consumed: ItemRing::new(ring_capacity).expect("ring capacity is nonzero"),
            info: QueueInfo::default(),
            next_bundle_id: 0,
        }
    }
}

struct MockState {
    channels: HashMap<ChannelId, MockChannel>,
}

/// Process-local transport backing both endpoint kinds in tests.
pub struct MockTransport {
    state: Mutex<MockState>,
    ready: Condvar,
}

static MOCK: OnceLock<MockTransport> = OnceLock::new();

impl MockTransport {
    /// Returns the process-wide instance.
    pub fn instance() -> &'static MockTransport {
        MOCK.get_or_init(|| MockTransport {
            state: Mutex::new(MockState {
                channels: HashMap::new(),
            }),
            ready: Condvar::new(),
        })
    }

    /// Whether the channel has been created.
    pub fn exists(&self, channel_id: &ChannelId) -> bool {
        self.state.lock().channels.contains_key(channel_id)
    }

    /// Drops every channel. Intended for test teardown.
    pub fn reset(&self) {
        self.state.lock().channels.clear();
        self.ready.notify_all();
    }

    /// Creates the ring pair for a channel; an existing channel keeps its
    /// buffered data.
    pub(crate) fn create_channel(&self, channel_id: ChannelId, ring_capacity: usize) {
        self.state
            .lock()
            .channels
            .entry(channel_id)
            .or_insert_with(|| MockChannel::new(ring_capacity));
    }

    /// Drops the ring pair for a channel.
    pub(crate) fn destroy_channel(&self, channel_id: &ChannelId) {
        self.state.lock().channels.remove(channel_id);
        self.ready.notify_all();
    }

    /// Copies a bundle into the message ring.
    ///
    /// Rejects with `OutOfMemory` when the ring is full; the mock performs
    /// no eviction. On success the assigned bundle id is returned.
    pub(crate) fn produce(
        &self,
        channel_id: &ChannelId,
        data: &[u8],
        last_message_id: u64,
    ) -> Result<u64, ChannelStatus> {
        let mut state = self.state.lock();
        let channel = state
            .channels
            .get_mut(channel_id)
            .ok_or(ChannelStatus::NoSuchItem)?;
        if channel.messages.is_full() {
            return Err(ChannelStatus::OutOfMemory);
        }
        channel.next_bundle_id += 1;
        let bundle_id = channel.next_bundle_id;
        let item = MockItem {
            bundle_id,
            message_id: last_message_id,
            data: Arc::from(data),
        };
        let pushed = channel.messages.try_push(item);
        assert!(pushed.is_ok(), "ring checked non-full under the lock");
        channel.info.last_message_id = last_message_id;
        drop(state);
        self.ready.notify_all();
        Ok(bundle_id)
    }

    /// Blocks up to `timeout_us` microseconds for the next bundle.
    ///
    /// Moves the front item into the consumed ring and returns it. A
    /// missing channel reports `NoSuchItem` immediately; an empty ring
    /// waits out the timeout and returns the empty bundle with `Ok`.
    pub(crate) fn consume_blocking(
        &self,
        channel_id: &ChannelId,
        timeout_us: u64,
    ) -> (DataBundle, ChannelStatus) {
        let deadline = Instant::now() + Duration::from_micros(timeout_us);
        let mut state = self.state.lock();
        loop {
            let Some(channel) = state.channels.get_mut(channel_id) else {
                return (DataBundle::empty(), ChannelStatus::NoSuchItem);
            };
            if let Some(item) = channel.messages.pop() {
                // The consumed ring is bounded too; shed the oldest entry
                // rather than refuse delivery.
                if channel.consumed.try_push(item.clone()).is_err() {
                    channel.consumed.pop();
                    let _ = channel.consumed.try_push(item.clone());
                }
                return (
                    DataBundle {
                        data_size: item.data.len() as u32,
                        data: item.data,
                        bundle_id: item.bundle_id,
                    },
                    ChannelStatus::Ok,
                );
            }
            let now = Instant::now();
            if now >= deadline {
                return (DataBundle::empty(), ChannelStatus::Ok);
            }
            self.ready.wait_for(&mut state, deadline - now);
        }
    }

    /// Records a consumption acknowledgement.
    ///
    /// Trims the consumed ring while the front item's message id is
    /// strictly below `offset_message_id`; the item at the boundary is
    /// retained so a duplicated acknowledgement stays harmless.
    pub(crate) fn notify_consumed(
        &self,
        channel_id: &ChannelId,
        offset_message_id: u64,
        consumed_bundle_id: u64,
    ) {
        let mut state = self.state.lock();
        let Some(channel) = state.channels.get_mut(channel_id) else {
            return;
        };
        while channel
            .consumed
            .front()
            .is_some_and(|front| front.message_id < offset_message_id)
        {
            channel.consumed.pop();
        }
        debug!(
            "channel {channel_id} consumed through message id {offset_message_id}, \
             {} boundary items retained",
            channel.consumed.len()
        );
        channel.info.consumed_message_id = offset_message_id;
        channel.info.consumed_bundle_id = consumed_bundle_id;
    }

    /// Snapshot of the channel's watermarks.
    pub(crate) fn queue_info(&self, channel_id: &ChannelId) -> QueueInfo {
        self.state
            .lock()
            .channels
            .get(channel_id)
            .map(|channel| channel.info)
            .unwrap_or_default()
    }

    /// Moves consumed-but-unacknowledged items back into the message ring.
    ///
    /// Called when a consumer re-creates the channel: everything still in
    /// the consumed ring (the acknowledgement boundary included) becomes
    /// deliverable again, which is how the at-least-once redelivery window
    /// surfaces at the endpoint API.
    pub(crate) fn requeue_consumed(&self, channel_id: &ChannelId) {
        let mut state = self.state.lock();
        let Some(channel) = state.channels.get_mut(channel_id) else {
            return;
        };
        let mut drained: Vec<MockItem> = Vec::new();
        while let Some(item) = channel.consumed.pop() {
            drained.push(item);
        }
        if drained.is_empty() {
            return;
        }
        // Oldest consumed item must come out first again, ahead of anything
        // still waiting in the message ring.
        for item in drained.into_iter().rev() {
            channel.messages.push_front(item);
        }
        drop(state);
        self.ready.notify_all();
    }

    /// Whether the message ring currently holds deliverable bundles.
    pub(crate) fn has_pending(&self, channel_id: &ChannelId) -> bool {
        self.state
            .lock()
            .channels
            .get(channel_id)
            .map(|channel| !channel.messages.is_empty())
            .unwrap_or(false)
    }
}
