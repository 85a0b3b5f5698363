//! Endpoint construction: backend selection happens here, not through an
//! inheritance tree.

use crate::consumer::{ConsumerChannel, MockConsumer, QueueConsumer};
use crate::info::{ConsumerChannelInfo, ProducerChannelInfo};
use crate::mock::DEFAULT_RING_CAPACITY;
use crate::producer::{MockProducer, ProducerChannel, QueueProducer};

/// Transport backend an endpoint runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ChannelBackend {
    /// Registry-backed queue transport.
    #[default]
    Queue,
    /// Process-local mock transport.
    Mock,
}

/// Construction-time configuration for an endpoint pair.
#[derive(Clone, Copy, Debug)]
pub struct ChannelConfig {
    /// Which transport backs the endpoint.
    pub backend: ChannelBackend,
    /// Ring capacity used by mock channels; ignored by the queue backend.
    pub mock_ring_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            backend: ChannelBackend::Queue,
            mock_ring_capacity: DEFAULT_RING_CAPACITY,
        }
    }
}

impl ChannelConfig {
    /// Queue-transport configuration.
    pub fn queue() -> Self {
        Self::default()
    }

    /// Mock-transport configuration with the default ring capacity.
    pub fn mock() -> Self {
        Self {
            backend: ChannelBackend::Mock,
            ..Self::default()
        }
    }

    /// Mock-transport configuration with a custom ring capacity, for
    /// backpressure tests that need tiny rings.
    pub fn mock_with_ring_capacity(ring_capacity: usize) -> Self {
        Self {
            backend: ChannelBackend::Mock,
            mock_ring_capacity: ring_capacity,
        }
    }
}

/// Builds the producer endpoint selected by `config`.
pub fn new_producer(config: &ChannelConfig, info: ProducerChannelInfo) -> Box<dyn ProducerChannel> {
    match config.backend {
        ChannelBackend::Queue => Box::new(QueueProducer::new(info)),
        ChannelBackend::Mock => Box::new(MockProducer::new(info, config.mock_ring_capacity)),
    }
}

/// Builds the consumer endpoint selected by `config`.
pub fn new_consumer(config: &ChannelConfig, info: ConsumerChannelInfo) -> Box<dyn ConsumerChannel> {
    match config.backend {
        ChannelBackend::Queue => Box::new(QueueConsumer::new(info)),
        ChannelBackend::Mock => Box::new(MockConsumer::new(info)),
    }
}
