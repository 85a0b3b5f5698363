//! Status codes reported by channel operations.

/// Outcome of a producer or consumer endpoint operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Operation completed.
    Ok,
    /// Producer queue could not accept the bundle even after eviction;
    /// the caller should retry later.
    FullChannel,
    /// Backend buffer is at capacity. Transport-level condition; produce
    /// paths translate it into `FullChannel` before returning.
    OutOfMemory,
    /// No queued item or no such channel.
    NoSuchItem,
    /// Operation invoked outside its valid lifecycle state.
    Invalid,
}

impl ChannelStatus {
    /// Whether the operation completed.
    pub fn is_ok(self) -> bool {
        matches!(self, ChannelStatus::Ok)
    }
}

/// Status reported by the transport queue layer during pull negotiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueStatus {
    /// Pull succeeded; buffered data covers the requested position.
    Ok,
    /// Producer has nothing at or after the requested position.
    NoValidData,
    /// The pull request timed out in the transport.
    Timeout,
    /// Producer has already evicted past the requested position.
    DataLost,
    /// Peer asks the caller to re-subscribe before pulling again.
    Resubscribe,
}

impl QueueStatus {
    /// Wire encoding of the status.
    pub fn as_u8(self) -> u8 {
        match self {
            QueueStatus::Ok => 0,
            QueueStatus::NoValidData => 1,
            QueueStatus::Timeout => 2,
            QueueStatus::DataLost => 3,
            QueueStatus::Resubscribe => 4,
        }
    }

    /// Decodes a wire status byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(QueueStatus::Ok),
            1 => Some(QueueStatus::NoValidData),
            2 => Some(QueueStatus::Timeout),
            3 => Some(QueueStatus::DataLost),
            4 => Some(QueueStatus::Resubscribe),
            _ => None,
        }
    }
}

/// Outcome of consumer-side channel creation (bootstrap pull).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreationStatus {
    /// Pull succeeded and delivery resumes at the requested position.
    PullOk,
    /// Producer had no data at or after the position; cold start.
    FreshStarted,
    /// Pull timed out; the channel is unusable.
    Timeout,
    /// Requested position was evicted; the channel is unusable.
    DataLost,
    /// Transport returned a status the bootstrap cannot interpret.
    Invalid,
}

impl CreationStatus {
    /// Whether the channel reached a consumable state.
    pub fn is_ready(self) -> bool {
        matches!(self, CreationStatus::PullOk | CreationStatus::FreshStarted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_status_wire_round_trip() {
        for status in [
            QueueStatus::Ok,
            QueueStatus::NoValidData,
            QueueStatus::Timeout,
            QueueStatus::DataLost,
            QueueStatus::Resubscribe,
        ] {
            assert_eq!(QueueStatus::from_u8(status.as_u8()), Some(status));
        }
        assert_eq!(QueueStatus::from_u8(0xFF), None);
    }
}
