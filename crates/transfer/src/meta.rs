//! Bundle header codec.
//!
//! Every buffer pushed into a channel starts with a fixed little-endian
//! header:
//!
//! ```text
//! [u32 magic][u64 last_message_id][u32 message_list_size][u64 timestamp_ms]
//! [opaque payload ...]
//! ```
//!
//! The channel layer reads only this header; the payload after it is opaque
//! and is never validated or copied apart from transport buffering.

use crate::error::{TransferError, TransferResult};

/// Magic word opening every bundle header.
pub const BUNDLE_MAGIC: u32 = 0x424E_444C;

/// Total length of the encoded header in bytes.
pub const BUNDLE_HEADER_LEN: usize = 4 + 8 + 4 + 8;

/// Header parsed from the leading bytes of a bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BundleMeta {
    /// Largest message id contained in the bundle.
    pub last_message_id: u64,
    /// Number of messages in the bundle; zero marks an empty/control bundle.
    pub message_list_size: u32,
    /// Producer-side wall clock at bundle creation, in milliseconds.
    pub timestamp_ms: u64,
}

impl BundleMeta {
    /// Decodes a header from the leading bytes of `buf`.
    pub fn decode(buf: &[u8]) -> TransferResult<Self> {
        if buf.len() < BUNDLE_HEADER_LEN {
            return Err(TransferError::TruncatedHeader {
                len: buf.len(),
                need: BUNDLE_HEADER_LEN,
            });
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().expect("sliced 4 bytes"));
        if magic != BUNDLE_MAGIC {
            return Err(TransferError::BadMagic { found: magic });
        }
        let last_message_id = u64::from_le_bytes(buf[4..12].try_into().expect("sliced 8 bytes"));
        let message_list_size =
            u32::from_le_bytes(buf[12..16].try_into().expect("sliced 4 bytes"));
        let timestamp_ms = u64::from_le_bytes(buf[16..24].try_into().expect("sliced 8 bytes"));
        Ok(Self {
            last_message_id,
            message_list_size,
            timestamp_ms,
        })
    }

    /// Writes the header into the first [`BUNDLE_HEADER_LEN`] bytes of `buf`.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than the header.
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&BUNDLE_MAGIC.to_le_bytes());
        buf[4..12].copy_from_slice(&self.last_message_id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.message_list_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.timestamp_ms.to_le_bytes());
    }

    /// Inclusive `(msg_id_start, msg_id_end)` range covered by the bundle.
    ///
    /// An empty bundle occupies the single id `last_message_id`.
    pub fn message_id_span(&self) -> (u64, u64) {
        let end = self.last_message_id;
        let start = if self.message_list_size == 0 {
            end
        } else {
            end - u64::from(self.message_list_size) + 1
        };
        (start, end)
    }

    /// Whether this is an empty/control bundle carrying no messages.
    pub fn is_empty(&self) -> bool {
        self.message_list_size == 0
    }
}

/// Builds a complete bundle buffer: encoded header followed by `payload`.
pub fn encode_bundle(meta: &BundleMeta, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; BUNDLE_HEADER_LEN + payload.len()];
    meta.encode_into(&mut buf);
    buf[BUNDLE_HEADER_LEN..].copy_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_survives_encode_decode() {
        let meta = BundleMeta {
            last_message_id: 42,
            message_list_size: 5,
            timestamp_ms: 1_700_000_000_000,
        };
        let buf = encode_bundle(&meta, b"payload");
        assert_eq!(BundleMeta::decode(&buf).unwrap(), meta);
        assert_eq!(&buf[BUNDLE_HEADER_LEN..], b"payload");
    }

    #[test]
    fn span_covers_all_message_ids() {
        let meta = BundleMeta {
            last_message_id: 10,
            message_list_size: 3,
            timestamp_ms: 0,
        };
        assert_eq!(meta.message_id_span(), (8, 10));
    }

    #[test]
    fn empty_bundle_spans_its_single_id() {
        let meta = BundleMeta {
            last_message_id: 7,
            message_list_size: 0,
            timestamp_ms: 0,
        };
        assert!(meta.is_empty());
        assert_eq!(meta.message_id_span(), (7, 7));
    }

    #[test]
    fn short_buffer_is_rejected() {
        let err = BundleMeta::decode(&[0u8; 8]).unwrap_err();
        assert_eq!(err, TransferError::TruncatedHeader { len: 8, need: BUNDLE_HEADER_LEN });
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut buf = vec![0u8; BUNDLE_HEADER_LEN];
        buf[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        assert!(matches!(
            BundleMeta::decode(&buf),
            Err(TransferError::BadMagic { .. })
        ));
    }
}
