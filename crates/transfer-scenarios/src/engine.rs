use std::time::{Duration, Instant};

use tracing::debug;

use transfer::{encode_bundle, BundleMeta, ChannelStatus};
use transfer_channel::{ConsumerChannel, ProducerChannel};

use crate::checks::DrainReport;
use crate::config::{ScenarioConfig, ScenarioKind};
use crate::stats::StatsSink;
use crate::wrapping_add;

/// Workload driver polled by [`run_until_idle`].
pub trait ScenarioEngine: Send {
    /// Advances the scenario; returns the number of operations performed.
    fn poll(&mut self) -> usize;
    /// Whether the scenario has run to completion.
    fn done(&self) -> bool;
    fn name(&self) -> &'static str;
}

/// Polls the engine until it completes, or until it stalls past
/// `idle_threshold` without performing work.
pub fn run_until_idle(engine: &mut dyn ScenarioEngine, idle_threshold: Duration) {
    let deadline = Instant::now() + idle_threshold;
    loop {
        let work = engine.poll();
        if engine.done() {
            break;
        }
        if work == 0 && Instant::now() >= deadline {
            debug!("scenario {} stalled past the idle threshold", engine.name());
            break;
        }
    }
}

#[derive(Clone, Copy)]
enum ScenarioState {
    Flood {
        bundle_count: u32,
        produced: u32,
        consumed: u32,
    },
    Backpressure {
        bundle_count: u32,
        produced: u32,
        consumed: u32,
    },
    Resume {
        bundle_count: u32,
        ack_at: u64,
        produced: u32,
        reopened: bool,
        finished: bool,
    },
}

/// Drives one producer/consumer pair through a configured workload,
/// one message per bundle.
pub struct ChannelScenarioEngine<S> {
    producer: Box<dyn ProducerChannel>,
    consumer: Box<dyn ConsumerChannel>,
    stats: S,
    consume_timeout_ms: u64,
    state: ScenarioState,
    delivered_bundle_ids: Vec<u64>,
    delivered_message_ids: Vec<u64>,
}

impl<S> ChannelScenarioEngine<S>
where
    S: StatsSink,
{
    /// Creates both transfer channels and readies the workload.
    pub fn new(
        mut producer: Box<dyn ProducerChannel>,
        mut consumer: Box<dyn ConsumerChannel>,
        stats: S,
        config: ScenarioConfig,
    ) -> Self {
        let created = producer.create_transfer_channel();
        assert!(created.is_ok(), "producer channel creation failed: {created:?}");
        let creation = consumer.create_transfer_channel();
        assert!(
            creation.is_ready(),
            "consumer channel creation failed: {creation:?}"
        );
        let state = match config.kind {
            ScenarioKind::Flood { bundle_count } => ScenarioState::Flood {
                bundle_count,
                produced: 0,
                consumed: 0,
            },
            ScenarioKind::Backpressure { bundle_count } => ScenarioState::Backpressure {
                bundle_count,
                produced: 0,
                consumed: 0,
            },
            ScenarioKind::Resume {
                bundle_count,
                ack_at,
            } => ScenarioState::Resume {
                bundle_count,
                ack_at,
                produced: 0,
                reopened: false,
                finished: false,
            },
        };
        Self {
            producer,
            consumer,
            stats,
            consume_timeout_ms: config.consume_timeout_ms,
            state,
            delivered_bundle_ids: Vec::new(),
            delivered_message_ids: Vec::new(),
        }
    }

    /// Deliveries observed since the start, or since the most recent
    /// reopen for the resume workload.
    pub fn drain_report(&self) -> DrainReport<'_> {
        DrainReport {
            bundle_ids: &self.delivered_bundle_ids,
            message_ids: &self.delivered_message_ids,
        }
    }

    /// The producer endpoint, for post-run watermark inspection.
    pub fn producer(&self) -> &dyn ProducerChannel {
        self.producer.as_ref()
    }

    /// The consumer endpoint, for post-run watermark inspection.
    pub fn consumer(&self) -> &dyn ConsumerChannel {
        self.consumer.as_ref()
    }

    fn produce_one(
        producer: &mut Box<dyn ProducerChannel>,
        stats: &S,
        message_id: u64,
    ) -> bool {
        let bytes = encode_bundle(
            &BundleMeta {
                last_message_id: message_id,
                message_list_size: 1,
                timestamp_ms: 0,
            },
            &message_id.to_le_bytes(),
        );
        match producer.produce_item_to_channel(&bytes) {
            ChannelStatus::Ok => {
                stats.with_stats(|stats| stats.produced = wrapping_add(stats.produced, 1));
                true
            }
            ChannelStatus::FullChannel | ChannelStatus::OutOfMemory => {
                stats.with_stats(|stats| {
                    stats.full_channel = wrapping_add(stats.full_channel, 1)
                });
                false
            }
            other => panic!("unexpected produce status {other:?}"),
        }
    }

    fn consume_one(&mut self) -> Option<(u64, u64)> {
        let (bundle, status) = self
            .consumer
            .consume_item_from_channel(self.consume_timeout_ms);
        assert!(status.is_ok(), "unexpected consume status {status:?}");
        if bundle.is_empty() {
            self.stats
                .with_stats(|stats| stats.timeouts = wrapping_add(stats.timeouts, 1));
            return None;
        }
        let meta = BundleMeta::decode(&bundle.data).expect("delivered bundle has a header");
        self.stats
            .with_stats(|stats| stats.consumed = wrapping_add(stats.consumed, 1));
        self.delivered_bundle_ids.push(bundle.bundle_id);
        self.delivered_message_ids.push(meta.last_message_id);
        Some((bundle.bundle_id, meta.last_message_id))
    }

    fn ack(&mut self, message_id: u64) {
        self.consumer.notify_channel_consumed(message_id);
        self.stats
            .with_stats(|stats| stats.acked = wrapping_add(stats.acked, 1));
        // Let the producer observe the watermark and raise its eviction
        // limit so the backpressure path can reclaim space.
        self.producer.refresh_channel_info();
        let consumed = self.producer.channel_info().queue_info.consumed_message_id;
        if consumed > 0 {
            self.producer.notify_channel_consumed(consumed);
        }
    }

    fn poll_flood(&mut self) -> usize {
        let ScenarioState::Flood {
            bundle_count,
            mut produced,
            mut consumed,
        } = self.state
        else {
            unreachable!("poll_flood outside the flood state");
        };
        let mut work = 0usize;
        while produced < bundle_count && work < 64 {
            if Self::produce_one(&mut self.producer, &self.stats, u64::from(produced) + 1) {
                produced += 1;
                work += 1;
            } else {
                break;
            }
        }
        while consumed < produced && work < 128 {
            match self.consume_one() {
                Some((_, message_id)) => {
                    consumed += 1;
                    work += 1;
                    self.ack(message_id);
                }
                None => break,
            }
        }
        self.state = ScenarioState::Flood {
            bundle_count,
            produced,
            consumed,
        };
        work
    }

    fn poll_backpressure(&mut self) -> usize {
        let ScenarioState::Backpressure {
            bundle_count,
            mut produced,
            mut consumed,
        } = self.state
        else {
            unreachable!("poll_backpressure outside the backpressure state");
        };
        let mut work = 0usize;
        // Outrun the consumer on purpose: produce until the channel pushes
        // back, only then drain a batch.
        while produced < bundle_count {
            if Self::produce_one(&mut self.producer, &self.stats, u64::from(produced) + 1) {
                produced += 1;
                work += 1;
            } else {
                break;
            }
        }
        while consumed < produced && work < 128 {
            match self.consume_one() {
                Some((_, message_id)) => {
                    consumed += 1;
                    work += 1;
                    self.ack(message_id);
                }
                None => break,
            }
        }
        self.state = ScenarioState::Backpressure {
            bundle_count,
            produced,
            consumed,
        };
        work
    }

    fn poll_resume(&mut self) -> usize {
        let ScenarioState::Resume {
            bundle_count,
            ack_at,
            mut produced,
            mut reopened,
            mut finished,
        } = self.state
        else {
            unreachable!("poll_resume outside the resume state");
        };
        let mut work = 0usize;
        while produced < bundle_count {
            if Self::produce_one(&mut self.producer, &self.stats, u64::from(produced) + 1) {
                produced += 1;
                work += 1;
            } else {
                break;
            }
        }
        if produced == bundle_count && !finished {
            while let Some((_, message_id)) = self.consume_one() {
                work += 1;
                if !reopened && message_id == ack_at {
                    self.ack(ack_at);
                    let creation = self.consumer.create_transfer_channel();
                    assert!(
                        creation.is_ready(),
                        "consumer reopen failed: {creation:?}"
                    );
                    // The report covers post-reopen deliveries only.
                    self.delivered_bundle_ids.clear();
                    self.delivered_message_ids.clear();
                    reopened = true;
                }
                if reopened && message_id == u64::from(bundle_count) {
                    self.ack(message_id);
                    finished = true;
                    break;
                }
            }
        }
        self.state = ScenarioState::Resume {
            bundle_count,
            ack_at,
            produced,
            reopened,
            finished,
        };
        work
    }
}

impl<S> ScenarioEngine for ChannelScenarioEngine<S>
where
    S: StatsSink,
{
    fn poll(&mut self) -> usize {
        match self.state {
            ScenarioState::Flood { .. } => self.poll_flood(),
            ScenarioState::Backpressure { .. } => self.poll_backpressure(),
            ScenarioState::Resume { .. } => self.poll_resume(),
        }
    }

    fn done(&self) -> bool {
        match self.state {
            ScenarioState::Flood {
                bundle_count,
                produced,
                consumed,
            }
            | ScenarioState::Backpressure {
                bundle_count,
                produced,
                consumed,
            } => produced == bundle_count && consumed == bundle_count,
            ScenarioState::Resume { finished, .. } => finished,
        }
    }

    fn name(&self) -> &'static str {
        match self.state {
            ScenarioState::Flood { .. } => "flood",
            ScenarioState::Backpressure { .. } => "backpressure",
            ScenarioState::Resume { .. } => "resume",
        }
    }
}
