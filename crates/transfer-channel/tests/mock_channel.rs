//! Channel semantics over the mock transport.
//!
//! Each test owns a distinct channel id so the process-wide mock state can
//! be shared by concurrently running tests without interference.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use transfer::{
    encode_bundle, ActorId, BundleMeta, ChannelId, ChannelStatus, CreationStatus,
    BUNDLE_HEADER_LEN, INVALID_SEQ_ID,
};
use transfer_channel::{
    new_consumer, new_producer, AsyncFunction, ChannelConfig, ChannelParameter, ConsumerChannel,
    ConsumerChannelInfo, DataBundle, ProducerChannel, ProducerChannelInfo, SyncFunction,
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Peer handles for tests that never cross the transport.
struct NullPeer;

impl AsyncFunction for NullPeer {
    fn invoke(&self, _channel_id: &ChannelId, _payload: &[u8]) {}
}

impl SyncFunction for NullPeer {
    fn invoke(&self, _channel_id: &ChannelId, _payload: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

fn null_parameter() -> ChannelParameter {
    let peer = Arc::new(NullPeer);
    ChannelParameter {
        actor_id: ActorId(7),
        async_function: peer.clone(),
        sync_function: peer,
    }
}

fn bundle_bytes(last_message_id: u64, message_list_size: u32, payload: &[u8]) -> Vec<u8> {
    encode_bundle(
        &BundleMeta {
            last_message_id,
            message_list_size,
            timestamp_ms: 0,
        },
        payload,
    )
}

fn payload_of(bundle: &DataBundle) -> &[u8] {
    &bundle.data[BUNDLE_HEADER_LEN..]
}

struct MockPair {
    producer: Box<dyn ProducerChannel>,
    consumer: Box<dyn ConsumerChannel>,
}

fn mock_pair_with_config(seed: u64, config: ChannelConfig) -> MockPair {
    init_tracing();
    let channel_id = ChannelId::from_seed(seed);
    let producer = new_producer(
        &config,
        ProducerChannelInfo::new(channel_id, 1 << 20, null_parameter()),
    );
    let consumer = new_consumer(
        &config,
        ConsumerChannelInfo::new(channel_id, 1 << 20, null_parameter()),
    );
    MockPair { producer, consumer }
}

fn mock_pair(seed: u64) -> MockPair {
    mock_pair_with_config(seed, ChannelConfig::mock())
}

/// A consumer bootstrapping against a channel with no data observes a cold
/// start, not an error.
#[test]
fn fresh_start_reports_fresh_started() {
    let mut pair = mock_pair(0x01);
    assert_eq!(pair.producer.create_transfer_channel(), ChannelStatus::Ok);
    assert_eq!(
        pair.consumer.create_transfer_channel(),
        CreationStatus::FreshStarted
    );
}

/// A pushed bundle comes back byte-identical with the producer's sequence
/// id, and the acknowledgement becomes visible to the producer on refresh.
#[test]
fn single_bundle_round_trip() {
    let mut pair = mock_pair(0x02);
    pair.producer.create_transfer_channel();

    let bytes = bundle_bytes(7, 3, b"abc");
    assert_eq!(
        pair.producer.produce_item_to_channel(&bytes),
        ChannelStatus::Ok
    );
    assert_eq!(pair.producer.channel_info().current_bundle_id, 1);

    assert_eq!(
        pair.consumer.create_transfer_channel(),
        CreationStatus::PullOk
    );
    let (bundle, status) = pair.consumer.consume_item_from_channel(100);
    assert_eq!(status, ChannelStatus::Ok);
    assert_eq!(bundle.bundle_id, 1);
    assert_eq!(payload_of(&bundle), b"abc");
    assert_eq!(bundle.data.as_ref(), bytes.as_slice());

    assert_eq!(pair.consumer.notify_channel_consumed(7), ChannelStatus::Ok);
    assert_eq!(pair.producer.refresh_channel_info(), ChannelStatus::Ok);
    assert_eq!(pair.producer.channel_info().queue_info.consumed_message_id, 7);
}

/// With a two-entry ring the third push without an intervening consume is
/// rejected as a full channel.
#[test]
fn backpressure_with_tiny_ring() {
    let mut pair = mock_pair_with_config(0x03, ChannelConfig::mock_with_ring_capacity(2));
    pair.producer.create_transfer_channel();

    assert_eq!(
        pair.producer
            .produce_item_to_channel(&bundle_bytes(1, 1, b"a")),
        ChannelStatus::Ok
    );
    assert_eq!(
        pair.producer
            .produce_item_to_channel(&bundle_bytes(2, 1, b"b")),
        ChannelStatus::Ok
    );
    assert_eq!(
        pair.producer
            .produce_item_to_channel(&bundle_bytes(3, 1, b"c")),
        ChannelStatus::FullChannel
    );
    assert_eq!(pair.producer.metrics().full_channel, 1);
}

/// After acknowledging the first of two consumed bundles, reopening the
/// consumer redelivers everything above the acknowledgement; the boundary
/// bundle may reappear and must not be an error.
#[test]
fn duplicate_at_boundary_redelivers_unacked() {
    let mut pair = mock_pair(0x04);
    pair.producer.create_transfer_channel();
    pair.producer
        .produce_item_to_channel(&bundle_bytes(5, 5, b"first"));
    pair.producer
        .produce_item_to_channel(&bundle_bytes(10, 5, b"second"));

    assert_eq!(
        pair.consumer.create_transfer_channel(),
        CreationStatus::PullOk
    );
    let (first, _) = pair.consumer.consume_item_from_channel(100);
    let (second, _) = pair.consumer.consume_item_from_channel(100);
    assert_eq!(payload_of(&first), b"first");
    assert_eq!(payload_of(&second), b"second");
    assert!(second.bundle_id > first.bundle_id);

    pair.consumer.notify_channel_consumed(5);

    assert_eq!(
        pair.consumer.create_transfer_channel(),
        CreationStatus::PullOk
    );
    let mut redelivered_message_ids = Vec::new();
    loop {
        let (bundle, status) = pair.consumer.consume_item_from_channel(10);
        assert_eq!(status, ChannelStatus::Ok);
        if bundle.is_empty() {
            break;
        }
        let meta = BundleMeta::decode(&bundle.data).expect("redelivered bundle has a header");
        // Nothing below the boundary may come back.
        assert!(meta.last_message_id >= 5);
        redelivered_message_ids.push(meta.last_message_id);
    }
    assert!(
        redelivered_message_ids.contains(&10),
        "unacknowledged bundle must be retrievable after reopen, got {redelivered_message_ids:?}"
    );
}

/// Creating the producer twice keeps a single channel: data buffered before
/// the second create is still deliverable after it.
#[test]
fn idempotent_create_keeps_single_queue() {
    let mut pair = mock_pair(0x05);
    assert_eq!(pair.producer.create_transfer_channel(), ChannelStatus::Ok);
    pair.producer
        .produce_item_to_channel(&bundle_bytes(1, 1, b"kept"));
    assert_eq!(pair.producer.create_transfer_channel(), ChannelStatus::Ok);

    assert_eq!(
        pair.consumer.create_transfer_channel(),
        CreationStatus::PullOk
    );
    let (bundle, _) = pair.consumer.consume_item_from_channel(100);
    assert_eq!(payload_of(&bundle), b"kept");
}

/// An empty queue holds the consumer for the full timeout and then yields
/// the empty bundle as a non-error.
#[test]
fn consumer_timeout_returns_empty_bundle() {
    let mut pair = mock_pair(0x06);
    pair.producer.create_transfer_channel();
    assert_eq!(
        pair.consumer.create_transfer_channel(),
        CreationStatus::FreshStarted
    );

    let start = Instant::now();
    let (bundle, status) = pair.consumer.consume_item_from_channel(50);
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(status, ChannelStatus::Ok);
    assert_eq!(bundle.bundle_id, INVALID_SEQ_ID);
    assert_eq!(bundle.data_size, 0);
    assert!(bundle.data.is_empty());
    assert_eq!(pair.consumer.metrics().timeouts, 1);
}

/// A control bundle with no messages occupies a single id and is
/// deliverable like any other.
#[test]
fn empty_bundle_is_deliverable() {
    let mut pair = mock_pair(0x07);
    pair.producer.create_transfer_channel();
    assert_eq!(
        pair.producer
            .produce_item_to_channel(&bundle_bytes(3, 0, b"")),
        ChannelStatus::Ok
    );
    pair.consumer.create_transfer_channel();
    let (bundle, status) = pair.consumer.consume_item_from_channel(100);
    assert_eq!(status, ChannelStatus::Ok);
    let meta = BundleMeta::decode(&bundle.data).unwrap();
    assert!(meta.is_empty());
    assert_eq!(meta.message_id_span(), (3, 3));
}

/// Consume outside the Ready states is refused.
#[test]
fn consume_before_create_is_invalid() {
    let mut pair = mock_pair(0x08);
    pair.producer.create_transfer_channel();
    let (bundle, status) = pair.consumer.consume_item_from_channel(10);
    assert_eq!(status, ChannelStatus::Invalid);
    assert!(bundle.is_empty());
}

/// A producer thread and a consumer thread sharing a channel deliver every
/// bundle exactly once and in order under blocking consumes.
#[test]
fn threaded_producer_consumer_preserves_order() {
    const BUNDLES: u64 = 200;
    let config = ChannelConfig::mock();
    let channel_id = ChannelId::from_seed(0x09);

    let producer_thread = thread::spawn(move || {
        let mut producer = new_producer(
            &config,
            ProducerChannelInfo::new(channel_id, 1 << 20, null_parameter()),
        );
        producer.create_transfer_channel();
        for msg_id in 1..=BUNDLES {
            let bytes = bundle_bytes(msg_id, 1, format!("m{msg_id}").as_bytes());
            loop {
                match producer.produce_item_to_channel(&bytes) {
                    ChannelStatus::Ok => break,
                    ChannelStatus::OutOfMemory | ChannelStatus::FullChannel => {
                        thread::yield_now()
                    }
                    other => panic!("unexpected produce status {other:?}"),
                }
            }
        }
    });

    // Give the producer a head start so creation order does not matter.
    let mut consumer = {
        let mut consumer = new_consumer(
            &config,
            ConsumerChannelInfo::new(channel_id, 1 << 20, null_parameter()),
        );
        while !consumer.create_transfer_channel().is_ready() {
            thread::yield_now();
        }
        consumer
    };

    let mut seen = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while seen.len() < BUNDLES as usize {
        assert!(Instant::now() < deadline, "consumer starved");
        let (bundle, status) = consumer.consume_item_from_channel(100);
        match status {
            ChannelStatus::Ok => {}
            // The producer thread may not have created the channel yet.
            ChannelStatus::NoSuchItem => {
                thread::yield_now();
                continue;
            }
            other => panic!("unexpected consume status {other:?}"),
        }
        if bundle.is_empty() {
            continue;
        }
        seen.push(bundle.bundle_id);
        let meta = BundleMeta::decode(&bundle.data).unwrap();
        consumer.notify_channel_consumed(meta.last_message_id);
    }
    producer_thread.join().unwrap();

    for window in seen.windows(2) {
        assert!(window[1] > window[0], "bundle ids must strictly increase");
    }
    assert_eq!(seen.len(), BUNDLES as usize);
    assert_eq!(consumer.metrics().consumed, BUNDLES);
}

/// Randomised payload sizes round-trip byte-identically through the mock.
#[test]
fn random_payload_sizes_round_trip() {
    use rand::prelude::*;

    let mut pair = mock_pair(0x0A);
    pair.producer.create_transfer_channel();
    pair.consumer.create_transfer_channel();

    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    for msg_id in 1..=64u64 {
        let len = rng.gen_range(0..=2048);
        let mut payload = vec![0u8; len];
        rng.fill_bytes(&mut payload);

        let bytes = bundle_bytes(msg_id, 1, &payload);
        assert_eq!(
            pair.producer.produce_item_to_channel(&bytes),
            ChannelStatus::Ok
        );
        let (bundle, status) = pair.consumer.consume_item_from_channel(100);
        assert_eq!(status, ChannelStatus::Ok);
        assert_eq!(bundle.bundle_id, msg_id);
        assert_eq!(payload_of(&bundle), payload.as_slice());
        pair.consumer.notify_channel_consumed(msg_id);
    }
}
