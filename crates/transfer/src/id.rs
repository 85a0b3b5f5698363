//! Channel and sequence identifiers.

use std::fmt;

/// Sequence id reported when no item was available (consume timeout).
pub const INVALID_SEQ_ID: u64 = 0;

/// Sentinel for a consumption watermark that has not been observed yet.
///
/// The sentinel travels across the transport as-is; it must never be
/// coerced to zero on either side.
pub const UNKNOWN_WATERMARK: u64 = u64::MAX;

const CHANNEL_ID_LEN: usize = 16;

/// Opaque, stable identifier of a one-way channel between two actors.
///
/// Equality defines channel identity across endpoints: the producer and
/// consumer of the same stream hold byte-identical ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId([u8; CHANNEL_ID_LEN]);

impl ChannelId {
    /// Wraps raw identifier bytes handed down by the enclosing runtime.
    pub const fn from_bytes(bytes: [u8; CHANNEL_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Derives a distinct id from a small seed.
    ///
    /// Intended for tests and tools that need unique channels without a
    /// runtime-assigned identity.
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; CHANNEL_ID_LEN];
        bytes[..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..].copy_from_slice(&(!seed).to_le_bytes());
        Self(bytes)
    }

    /// Returns the raw identifier bytes.
    pub const fn as_bytes(&self) -> &[u8; CHANNEL_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({self})")
    }
}

/// Opaque identifier of a peer actor in the enclosing runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct ActorId(
    /// Raw runtime-assigned identity.
    pub u64,
);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_ids_are_distinct_and_stable() {
        let a = ChannelId::from_seed(1);
        let b = ChannelId::from_seed(2);
        assert_ne!(a, b);
        assert_eq!(a, ChannelId::from_seed(1));
    }

    #[test]
    fn display_is_hex_of_all_bytes() {
        let id = ChannelId::from_bytes([0xAB; 16]);
        assert_eq!(id.to_string(), "ab".repeat(16));
    }
}
