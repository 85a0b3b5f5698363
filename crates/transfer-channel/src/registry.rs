//! Process-wide queue registries.
//!
//! Each side of the channel owns one lazily-initialized registry mapping
//! channel ids to queue handles and peer bindings. Registration is
//! idempotent: re-creating an existing channel returns the stored handle
//! and leaves the peer binding untouched. Registries are thread-safe and
//! may be touched from any thread; `shutdown()` clears every channel so
//! test processes can start from a clean slate.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{error, warn};

use transfer::{ActorId, ChannelId, QueueStatus};

use crate::error::{ChannelError, ChannelResult};
use crate::info::{AsyncFnHandle, SyncFnHandle};
use crate::proto::Frame;
use crate::queue::{DownstreamQueue, UpstreamQueue};

#[derive(Clone)]
struct PeerBinding {
    actor_id: ActorId,
    async_function: AsyncFnHandle,
    sync_function: SyncFnHandle,
}

struct UpstreamRegState {
    peers: HashMap<ChannelId, PeerBinding>,
    queues: HashMap<ChannelId, Arc<UpstreamQueue>>,
}

/// Producer-side registry of upstream queues.
pub struct UpstreamRegistry {
    state: Mutex<UpstreamRegState>,
}

static UPSTREAM: OnceLock<UpstreamRegistry> = OnceLock::new();

impl UpstreamRegistry {
    /// Returns the process-wide instance.
    pub fn instance() -> &'static UpstreamRegistry {
        UPSTREAM.get_or_init(|| UpstreamRegistry {
            state: Mutex::new(UpstreamRegState {
                peers: HashMap::new(),
                queues: HashMap::new(),
            }),
        })
    }

    /// Whether an upstream queue exists for the channel.
    pub fn exists(&self, channel_id: &ChannelId) -> bool {
        self.state.lock().queues.contains_key(channel_id)
    }

    /// Binds the peer actor and its function handles for a channel.
    ///
    /// An existing binding is left untouched.
    pub fn set_peer(
        &self,
        channel_id: ChannelId,
        actor_id: ActorId,
        async_function: AsyncFnHandle,
        sync_function: SyncFnHandle,
    ) {
        self.state
            .lock()
            .peers
            .entry(channel_id)
            .or_insert_with(|| PeerBinding {
                actor_id,
                async_function,
                sync_function,
            });
    }

    /// Creates the upstream queue for a channel, or returns the existing
    /// one.
    pub fn create_upstream_queue(
        &self,
        channel_id: ChannelId,
        actor_id: ActorId,
        queue_size: usize,
    ) -> ChannelResult<Arc<UpstreamQueue>> {
        let mut state = self.state.lock();
        if let Some(queue) = state.queues.get(&channel_id) {
            return Ok(queue.clone());
        }
        let binding = state
            .peers
            .get(&channel_id)
            .cloned()
            .ok_or(ChannelError::NoPeerBound(channel_id))?;
        let queue = UpstreamQueue::new(channel_id, actor_id, queue_size, binding.async_function);
        state.queues.insert(channel_id, queue.clone());
        Ok(queue)
    }

    /// Looks up the queue for a channel.
    pub fn queue(&self, channel_id: &ChannelId) -> Option<Arc<UpstreamQueue>> {
        self.state.lock().queues.get(channel_id).cloned()
    }

    /// Disposes the queue and peer binding for a channel.
    pub fn remove(&self, channel_id: &ChannelId) {
        let mut state = self.state.lock();
        state.queues.remove(channel_id);
        state.peers.remove(channel_id);
    }

    /// Transport entry point for frames addressed to the producer side.
    ///
    /// # Panics
    /// Panics on an undecodable frame; a malformed frame on an in-process
    /// transport is a programming bug in the peer wiring.
    pub fn deliver(&self, channel_id: &ChannelId, payload: &[u8]) {
        let frame = Frame::decode(payload)
            .unwrap_or_else(|err| panic!("corrupt frame for channel {channel_id}: {err}"));
        match frame {
            Frame::Consumed {
                offset_message_id,
                consumed_bundle_id,
            } => match self.queue(channel_id) {
                Some(queue) => queue.on_consumed(offset_message_id, consumed_bundle_id),
                None => warn!("consumed frame for unknown channel {channel_id}"),
            },
            other => {
                error!("unexpected frame on the producer side: {other:?}");
            }
        }
    }

    /// Transport entry point answering a consumer pull request.
    ///
    /// Returns `None` when no queue exists yet, which the caller observes
    /// as a transport timeout.
    pub fn answer_pull(&self, channel_id: &ChannelId, payload: &[u8]) -> Option<Vec<u8>> {
        let frame = Frame::decode(payload)
            .unwrap_or_else(|err| panic!("corrupt pull request for channel {channel_id}: {err}"));
        let Frame::PullRequest { start_message_id } = frame else {
            error!("non-pull frame on the sync path: {frame:?}");
            return None;
        };
        let queue = self.queue(channel_id)?;
        let (status, is_first_pull) = queue.handle_pull(start_message_id);
        Some(
            Frame::PullResponse {
                status,
                is_first_pull,
            }
            .encode(),
        )
    }

    /// Clears every channel. Intended for test teardown.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.queues.clear();
        state.peers.clear();
    }
}

struct DownstreamRegState {
    peers: HashMap<ChannelId, PeerBinding>,
    queues: HashMap<ChannelId, Arc<DownstreamQueue>>,
}

/// Consumer-side registry of downstream queues.
pub struct DownstreamRegistry {
    state: Mutex<DownstreamRegState>,
}

static DOWNSTREAM: OnceLock<DownstreamRegistry> = OnceLock::new();

impl DownstreamRegistry {
    /// Returns the process-wide instance.
    pub fn instance() -> &'static DownstreamRegistry {
        DOWNSTREAM.get_or_init(|| DownstreamRegistry {
            state: Mutex::new(DownstreamRegState {
                peers: HashMap::new(),
                queues: HashMap::new(),
            }),
        })
    }

    /// Whether a downstream queue exists for the channel.
    pub fn exists(&self, channel_id: &ChannelId) -> bool {
        self.state.lock().queues.contains_key(channel_id)
    }

    /// Binds the peer actor and its function handles for a channel.
    ///
    /// An existing binding is left untouched.
    pub fn set_peer(
        &self,
        channel_id: ChannelId,
        actor_id: ActorId,
        async_function: AsyncFnHandle,
        sync_function: SyncFnHandle,
    ) {
        self.state
            .lock()
            .peers
            .entry(channel_id)
            .or_insert_with(|| PeerBinding {
                actor_id,
                async_function,
                sync_function,
            });
    }

    /// Creates the downstream queue for a channel, or returns the existing
    /// one.
    pub fn create_downstream_queue(
        &self,
        channel_id: ChannelId,
        actor_id: ActorId,
    ) -> ChannelResult<Arc<DownstreamQueue>> {
        let mut state = self.state.lock();
        if let Some(queue) = state.queues.get(&channel_id) {
            return Ok(queue.clone());
        }
        let binding = state
            .peers
            .get(&channel_id)
            .cloned()
            .ok_or(ChannelError::NoPeerBound(channel_id))?;
        let queue = DownstreamQueue::new(channel_id, actor_id, binding.async_function);
        state.queues.insert(channel_id, queue.clone());
        Ok(queue)
    }

    /// Looks up the queue for a channel.
    pub fn queue(&self, channel_id: &ChannelId) -> Option<Arc<DownstreamQueue>> {
        self.state.lock().queues.get(channel_id).cloned()
    }

    /// Issues the synchronous pull negotiating delivery resume at
    /// `start_msg_id`. Returns the transport status and whether the
    /// producer saw this channel's first pull.
    pub fn pull_queue(&self, channel_id: &ChannelId, start_msg_id: u64) -> (QueueStatus, bool) {
        let binding = {
            let state = self.state.lock();
            state.peers.get(channel_id).cloned()
        };
        let Some(binding) = binding else {
            error!("pull without a peer binding on channel {channel_id}");
            return (QueueStatus::Timeout, false);
        };
        let request = Frame::PullRequest {
            start_message_id: start_msg_id,
        }
        .encode();
        let Some(response) = binding.sync_function.invoke(channel_id, &request) else {
            return (QueueStatus::Timeout, false);
        };
        let frame = Frame::decode(&response)
            .unwrap_or_else(|err| panic!("corrupt pull response for channel {channel_id}: {err}"));
        match frame {
            Frame::PullResponse {
                status,
                is_first_pull,
            } => (status, is_first_pull),
            other => panic!("pull response expected for channel {channel_id}, got {other:?}"),
        }
    }

    /// Disposes the queue and peer binding for a channel.
    pub fn remove(&self, channel_id: &ChannelId) {
        let mut state = self.state.lock();
        state.queues.remove(channel_id);
        state.peers.remove(channel_id);
    }

    /// Transport entry point for frames addressed to the consumer side.
    ///
    /// # Panics
    /// Panics on an undecodable frame; a malformed frame on an in-process
    /// transport is a programming bug in the peer wiring.
    pub fn deliver(&self, channel_id: &ChannelId, payload: &[u8]) {
        let frame = Frame::decode(payload)
            .unwrap_or_else(|err| panic!("corrupt frame for channel {channel_id}: {err}"));
        match frame {
            Frame::Bundle {
                bundle_id,
                msg_id_start: _,
                msg_id_end,
                payload,
            } => match self.queue(channel_id) {
                Some(queue) => queue.push_received(bundle_id, msg_id_end, Arc::from(payload)),
                None => warn!("bundle for unknown channel {channel_id} dropped"),
            },
            other => {
                error!("unexpected frame on the consumer side: {other:?}");
            }
        }
    }

    /// Clears every channel. Intended for test teardown.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.queues.clear();
        state.peers.clear();
    }
}
