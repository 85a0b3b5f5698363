//! Error handling helpers for the primitives crate.
//!
//! The primitive layer keeps its error surface small: header decoding and
//! capacity validation. The channel crate wraps these into its own error
//! type rather than exposing them directly to the runtime.

use std::fmt;

/// Convenience result alias for fallible primitive operations.
pub type TransferResult<T, E = TransferError> = Result<T, E>;

#[derive(Debug, PartialEq, Eq)]
/// Errors surfaced by the primitive helpers.
pub enum TransferError {
    /// Buffer is too short to contain a bundle header.
    TruncatedHeader { len: usize, need: usize },
    /// Bundle header does not start with the expected magic word.
    BadMagic { found: u32 },
    /// Requested ring capacity is zero.
    InvalidCapacity,
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::TruncatedHeader { len, need } => {
                write!(f, "buffer of {len} bytes cannot hold a {need}-byte bundle header")
            }
            TransferError::BadMagic { found } => {
                write!(f, "bundle header magic mismatch: found {found:#010x}")
            }
            TransferError::InvalidCapacity => {
                write!(f, "ring capacity must be at least one item")
            }
        }
    }
}

impl std::error::Error for TransferError {}
