//! Primitives shared by both ends of a transfer channel.
//!
//! A transfer channel moves opaque message *bundles* from an upstream
//! producer to a downstream consumer over a best-effort transport. This
//! crate holds the pieces that are meaningful on both sides of the wire:
//! * [`ChannelId`] / [`ActorId`] – stable identities for channels and peers.
//! * [`BundleMeta`] – the fixed header parseable from a bundle's leading bytes.
//! * [`ItemRing`] – the bounded FIFO backing in-process queues.
//! * [`ChannelStatus`] / [`QueueStatus`] / [`CreationStatus`] – operation outcomes.
//!
//! Endpoints, registries, and transports live in `transfer-channel`; this
//! crate stays dependency-free so any runtime component can name a channel
//! or read a bundle header without pulling the full channel stack.

mod error;
mod id;
mod meta;
mod ring;
mod status;

pub use error::{TransferError, TransferResult};
pub use id::{ActorId, ChannelId, INVALID_SEQ_ID, UNKNOWN_WATERMARK};
pub use meta::{encode_bundle, BundleMeta, BUNDLE_HEADER_LEN, BUNDLE_MAGIC};
pub use ring::ItemRing;
pub use status::{ChannelStatus, CreationStatus, QueueStatus};
