//! In-process peer handles.
//!
//! These route frames straight into the opposite registry, wiring a
//! producer/consumer pair end-to-end inside one process. Tests and local
//! tools use them; a distributed runtime substitutes its own actor-RPC
//! handles behind the same traits.

use std::sync::Arc;

use transfer::{ActorId, ChannelId};

use crate::info::{AsyncFunction, ChannelParameter, SyncFunction};
use crate::registry::{DownstreamRegistry, UpstreamRegistry};

/// Handle pair addressing the consumer side of this process.
struct ConsumerPeer;

impl AsyncFunction for ConsumerPeer {
    fn invoke(&self, channel_id: &ChannelId, payload: &[u8]) {
        DownstreamRegistry::instance().deliver(channel_id, payload);
    }
}

impl SyncFunction for ConsumerPeer {
    fn invoke(&self, _channel_id: &ChannelId, _payload: &[u8]) -> Option<Vec<u8>> {
        // Consumers answer no synchronous queries.
        None
    }
}

/// Handle pair addressing the producer side of this process.
struct ProducerPeer;

impl AsyncFunction for ProducerPeer {
    fn invoke(&self, channel_id: &ChannelId, payload: &[u8]) {
        UpstreamRegistry::instance().deliver(channel_id, payload);
    }
}

impl SyncFunction for ProducerPeer {
    fn invoke(&self, channel_id: &ChannelId, payload: &[u8]) -> Option<Vec<u8>> {
        UpstreamRegistry::instance().answer_pull(channel_id, payload)
    }
}

/// Parameter a producer uses to reach an in-process consumer.
pub fn consumer_peer_parameter(actor_id: ActorId) -> ChannelParameter {
    let peer = Arc::new(ConsumerPeer);
    ChannelParameter {
        actor_id,
        async_function: peer.clone(),
        sync_function: peer,
    }
}

/// Parameter a consumer uses to reach an in-process producer.
pub fn producer_peer_parameter(actor_id: ActorId) -> ChannelParameter {
    let peer = Arc::new(ProducerPeer);
    ChannelParameter {
        actor_id,
        async_function: peer.clone(),
        sync_function: peer,
    }
}
