//! Flow-controlled, ordered, at-least-once bundle channels.
//!
//! A transfer channel moves opaque message bundles from an upstream
//! producer actor to a downstream consumer actor over a best-effort
//! transport. The producer buffers bundles against a byte budget and
//! reclaims acknowledged space through eviction; the consumer negotiates
//! its resume position with a synchronous pull and pops bundles with soft
//! timeouts. Acknowledgements flow back as monotonic watermarks.
//!
//! Endpoints are built through [`new_producer`] / [`new_consumer`], which
//! select the transport backend (registry-backed queues or the in-process
//! mock) from a [`ChannelConfig`] at construction time.
//!
//! ```ignore
//! let config = ChannelConfig::mock();
//! let mut producer = new_producer(&config, producer_info);
//! let mut consumer = new_consumer(&config, consumer_info);
//!
//! producer.create_transfer_channel();
//! producer.produce_item_to_channel(&bundle_bytes);
//! consumer.create_transfer_channel();
//! let (bundle, _) = consumer.consume_item_from_channel(50);
//! consumer.notify_channel_consumed(last_message_id);
//! ```

mod config;
mod consumer;
mod error;
mod info;
mod metrics;
mod mock;
mod producer;
pub mod proto;
mod queue;
mod registry;

pub mod loopback;

pub use config::{new_consumer, new_producer, ChannelBackend, ChannelConfig};
pub use consumer::{BootstrapState, ConsumerChannel, MockConsumer, QueueConsumer};
pub use error::{ChannelError, ChannelResult};
pub use info::{
    AsyncFnHandle, AsyncFunction, ChannelParameter, ConsumerChannelInfo, DataBundle,
    ProducerChannelInfo, QueueInfo, SyncFnHandle, SyncFunction,
};
pub use metrics::ChannelMetricsSnapshot;
pub use mock::{MockTransport, DEFAULT_RING_CAPACITY};
pub use producer::{MockProducer, ProducerChannel, QueueProducer};
pub use queue::{DownstreamQueue, PushError, UpstreamQueue};
pub use registry::{DownstreamRegistry, UpstreamRegistry};
