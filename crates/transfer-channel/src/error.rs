use thiserror::Error;

use transfer::{ChannelId, TransferError};

pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("no queue registered for channel {0}")]
    NoSuchChannel(ChannelId),

    #[error("no peer bound for channel {0}")]
    NoPeerBound(ChannelId),

    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl ChannelError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        ChannelError::Protocol(msg.into())
    }
}
