//! Registry and mock teardown.
//!
//! Shutdown clears process-wide state, so this suite runs as a single test
//! in its own binary rather than alongside channels owned by other tests.

use transfer::{ActorId, ChannelId, ChannelStatus};
use transfer_channel::loopback::{consumer_peer_parameter, producer_peer_parameter};
use transfer_channel::{
    new_consumer, new_producer, ChannelConfig, ConsumerChannelInfo, DownstreamRegistry,
    MockTransport, ProducerChannelInfo, UpstreamRegistry,
};

/// Shutdown drops every queue and peer binding; a fresh create after it
/// starts from a clean slate.
#[test]
fn shutdown_clears_every_channel() {
    let channel_id = ChannelId::from_seed(0x5D);
    let config = ChannelConfig::queue();
    let mut producer = new_producer(
        &config,
        ProducerChannelInfo::new(channel_id, 1 << 16, consumer_peer_parameter(ActorId(1))),
    );
    let mut consumer = new_consumer(
        &config,
        ConsumerChannelInfo::new(channel_id, 1 << 16, producer_peer_parameter(ActorId(2))),
    );
    assert_eq!(producer.create_transfer_channel(), ChannelStatus::Ok);
    consumer.create_transfer_channel();
    assert!(UpstreamRegistry::instance().exists(&channel_id));
    assert!(DownstreamRegistry::instance().exists(&channel_id));

    UpstreamRegistry::instance().shutdown();
    DownstreamRegistry::instance().shutdown();
    MockTransport::instance().reset();

    assert!(!UpstreamRegistry::instance().exists(&channel_id));
    assert!(!DownstreamRegistry::instance().exists(&channel_id));
    assert!(!MockTransport::instance().exists(&channel_id));

    // Endpoints can be re-created from scratch.
    let mut producer = new_producer(
        &config,
        ProducerChannelInfo::new(channel_id, 1 << 16, consumer_peer_parameter(ActorId(1))),
    );
    assert_eq!(producer.create_transfer_channel(), ChannelStatus::Ok);
}
