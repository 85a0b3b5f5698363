//! Scenario runs over both transport backends.

use std::time::Duration;

use transfer::{ActorId, ChannelId};
use transfer_channel::loopback::{consumer_peer_parameter, producer_peer_parameter};
use transfer_channel::{
    new_consumer, new_producer, ChannelConfig, ConsumerChannel, ConsumerChannelInfo,
    ProducerChannel, ProducerChannelInfo,
};
use transfer_scenarios::{
    run_until_idle, verify_backpressure, verify_flood, verify_resume, ArcStatsSink,
    ChannelScenarioEngine, ScenarioConfig, ScenarioEngine,
};

const IDLE_THRESHOLD: Duration = Duration::from_secs(5);

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn mock_endpoints(
    seed: u64,
    config: ChannelConfig,
) -> (Box<dyn ProducerChannel>, Box<dyn ConsumerChannel>) {
    init_tracing();
    let channel_id = ChannelId::from_seed(seed);
    // Mock endpoints never cross the transport; reuse the loopback handles
    // as inert placeholders for the peer binding.
    let producer = new_producer(
        &config,
        ProducerChannelInfo::new(channel_id, 1 << 20, consumer_peer_parameter(ActorId(1))),
    );
    let consumer = new_consumer(
        &config,
        ConsumerChannelInfo::new(channel_id, 1 << 20, producer_peer_parameter(ActorId(2))),
    );
    (producer, consumer)
}

fn queue_endpoints(
    seed: u64,
    queue_size: usize,
) -> (Box<dyn ProducerChannel>, Box<dyn ConsumerChannel>) {
    init_tracing();
    let channel_id = ChannelId::from_seed(seed);
    let config = ChannelConfig::queue();
    let producer = new_producer(
        &config,
        ProducerChannelInfo::new(channel_id, queue_size, consumer_peer_parameter(ActorId(1))),
    );
    let consumer = new_consumer(
        &config,
        ConsumerChannelInfo::new(channel_id, queue_size, producer_peer_parameter(ActorId(2))),
    );
    (producer, consumer)
}

/// Steady production over the mock backend delivers every bundle in order.
#[test]
fn flood_over_mock_backend() {
    let (producer, consumer) = mock_endpoints(0x21, ChannelConfig::mock());
    let sink = ArcStatsSink::default();
    let mut engine = ChannelScenarioEngine::new(
        producer,
        consumer,
        sink.clone(),
        ScenarioConfig::flood(200),
    );
    run_until_idle(&mut engine, IDLE_THRESHOLD);
    assert!(engine.done(), "flood did not complete");

    let stats = sink.snapshot();
    verify_flood(&engine.drain_report(), &stats, 200).unwrap();
    assert_eq!(stats.full_channel, 0);
}

/// Steady production over the queue backend with loopback wiring behaves
/// identically to the mock.
#[test]
fn flood_over_queue_backend() {
    let (producer, consumer) = queue_endpoints(0x22, 1 << 20);
    let sink = ArcStatsSink::default();
    let mut engine = ChannelScenarioEngine::new(
        producer,
        consumer,
        sink.clone(),
        ScenarioConfig::flood(200),
    );
    run_until_idle(&mut engine, IDLE_THRESHOLD);
    assert!(engine.done(), "flood did not complete");

    let stats = sink.snapshot();
    verify_flood(&engine.drain_report(), &stats, 200).unwrap();
}

/// A four-entry mock ring forces rejected pushes; the workload still
/// completes once the consumer keeps draining.
#[test]
fn backpressure_over_tiny_mock_ring() {
    let (producer, consumer) = mock_endpoints(0x23, ChannelConfig::mock_with_ring_capacity(4));
    let sink = ArcStatsSink::default();
    let mut engine = ChannelScenarioEngine::new(
        producer,
        consumer,
        sink.clone(),
        ScenarioConfig::backpressure(32),
    );
    run_until_idle(&mut engine, IDLE_THRESHOLD);
    assert!(engine.done(), "backpressure did not complete");

    let stats = sink.snapshot();
    verify_backpressure(&engine.drain_report(), &stats, 32).unwrap();
}

/// A small byte budget on the queue backend forces FullChannel rejections
/// that resolve through acknowledgement-driven eviction.
#[test]
fn backpressure_over_small_queue_budget() {
    // Each one-message bundle is header + 8 payload bytes; budget four of
    // them.
    let bundle_len = transfer::BUNDLE_HEADER_LEN + 8;
    let (producer, consumer) = queue_endpoints(0x24, bundle_len * 4);
    let sink = ArcStatsSink::default();
    let mut engine = ChannelScenarioEngine::new(
        producer,
        consumer,
        sink.clone(),
        ScenarioConfig::backpressure(32),
    );
    run_until_idle(&mut engine, IDLE_THRESHOLD);
    assert!(engine.done(), "backpressure did not complete");

    let stats = sink.snapshot();
    verify_backpressure(&engine.drain_report(), &stats, 32).unwrap();
}

/// Acknowledge mid-stream, reopen the consumer, and verify the
/// at-least-once redelivery boundary.
#[test]
fn resume_over_mock_backend() {
    let (producer, consumer) = mock_endpoints(0x25, ChannelConfig::mock());
    let sink = ArcStatsSink::default();
    let mut engine = ChannelScenarioEngine::new(
        producer,
        consumer,
        sink.clone(),
        ScenarioConfig::resume(10, 5),
    );
    run_until_idle(&mut engine, IDLE_THRESHOLD);
    assert!(engine.done(), "resume did not complete");

    let stats = sink.snapshot();
    verify_resume(&engine.drain_report(), &stats, 10, 5).unwrap();
}
