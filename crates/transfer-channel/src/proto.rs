//! Wire frames exchanged through the peer function handles.
//!
//! Each frame is a tag byte followed by fixed little-endian fields; the
//! bundle frame appends the opaque bundle bytes. The channel id is not part
//! of the frame; it travels as the first argument of the handle invocation.

use transfer::QueueStatus;

use crate::error::{ChannelError, ChannelResult};

/// Tag opening a pull request frame.
pub const TAG_PULL_REQUEST: u8 = 0x21;
/// Tag opening a pull response frame.
pub const TAG_PULL_RESPONSE: u8 = 0x22;
/// Tag opening a data bundle frame.
pub const TAG_BUNDLE: u8 = 0x23;
/// Tag opening a consumption acknowledgement frame.
pub const TAG_CONSUMED: u8 = 0x24;

/// A decoded transport frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Consumer asks the producer to resume delivery at a message id.
    PullRequest {
        /// First message id the consumer wants delivered.
        start_message_id: u64,
    },
    /// Producer's answer to a pull request.
    PullResponse {
        /// Outcome of the pull.
        status: QueueStatus,
        /// Whether this was the first pull the producer ever saw for the
        /// channel.
        is_first_pull: bool,
    },
    /// One buffered bundle pushed downstream.
    Bundle {
        /// Producer-assigned sequence id.
        bundle_id: u64,
        /// Smallest message id in the bundle.
        msg_id_start: u64,
        /// Largest message id in the bundle.
        msg_id_end: u64,
        /// Opaque bundle bytes, header included.
        payload: Vec<u8>,
    },
    /// Consumer reports everything at or below a message id as consumed.
    Consumed {
        /// Acknowledged message id.
        offset_message_id: u64,
        /// Bundle id the consumer last processed.
        consumed_bundle_id: u64,
    },
}

impl Frame {
    /// Encodes the frame for handle invocation.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::PullRequest { start_message_id } => {
                let mut buf = Vec::with_capacity(1 + 8);
                buf.push(TAG_PULL_REQUEST);
                buf.extend_from_slice(&start_message_id.to_le_bytes());
                buf
            }
            Frame::PullResponse {
                status,
                is_first_pull,
            } => {
                let mut buf = Vec::with_capacity(1 + 2);
                buf.push(TAG_PULL_RESPONSE);
                buf.push(status.as_u8());
                buf.push(u8::from(*is_first_pull));
                buf
            }
            Frame::Bundle {
                bundle_id,
                msg_id_start,
                msg_id_end,
                payload,
            } => {
                let mut buf = Vec::with_capacity(1 + 24 + payload.len());
                buf.push(TAG_BUNDLE);
                buf.extend_from_slice(&bundle_id.to_le_bytes());
                buf.extend_from_slice(&msg_id_start.to_le_bytes());
                buf.extend_from_slice(&msg_id_end.to_le_bytes());
                buf.extend_from_slice(payload);
                buf
            }
            Frame::Consumed {
                offset_message_id,
                consumed_bundle_id,
            } => {
                let mut buf = Vec::with_capacity(1 + 16);
                buf.push(TAG_CONSUMED);
                buf.extend_from_slice(&offset_message_id.to_le_bytes());
                buf.extend_from_slice(&consumed_bundle_id.to_le_bytes());
                buf
            }
        }
    }

    /// Decodes a frame received through a handle.
    pub fn decode(buf: &[u8]) -> ChannelResult<Frame> {
        let (&tag, body) = buf
            .split_first()
            .ok_or_else(|| ChannelError::protocol("empty frame"))?;
        match tag {
            TAG_PULL_REQUEST => {
                let start_message_id = read_u64(body, 0)?;
                Ok(Frame::PullRequest { start_message_id })
            }
            TAG_PULL_RESPONSE => {
                if body.len() < 2 {
                    return Err(ChannelError::protocol("pull response too short"));
                }
                let status = QueueStatus::from_u8(body[0]).ok_or_else(|| {
                    ChannelError::protocol(format!("unknown queue status {:#04x}", body[0]))
                })?;
                Ok(Frame::PullResponse {
                    status,
                    is_first_pull: body[1] != 0,
                })
            }
            TAG_BUNDLE => {
                let bundle_id = read_u64(body, 0)?;
                let msg_id_start = read_u64(body, 8)?;
                let msg_id_end = read_u64(body, 16)?;
                Ok(Frame::Bundle {
                    bundle_id,
                    msg_id_start,
                    msg_id_end,
                    payload: body[24..].to_vec(),
                })
            }
            TAG_CONSUMED => {
                let offset_message_id = read_u64(body, 0)?;
                let consumed_bundle_id = read_u64(body, 8)?;
                Ok(Frame::Consumed {
                    offset_message_id,
                    consumed_bundle_id,
                })
            }
            other => Err(ChannelError::protocol(format!(
                "unknown frame tag {other:#04x}"
            ))),
        }
    }
}

fn read_u64(body: &[u8], offset: usize) -> ChannelResult<u64> {
    let end = offset + 8;
    if body.len() < end {
        return Err(ChannelError::protocol(format!(
            "frame body of {} bytes too short for field at {offset}",
            body.len()
        )));
    }
    Ok(u64::from_le_bytes(
        body[offset..end].try_into().expect("sliced 8 bytes"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_frame_keeps_payload_and_ids() {
        let frame = Frame::Bundle {
            bundle_id: 3,
            msg_id_start: 8,
            msg_id_end: 10,
            payload: b"opaque".to_vec(),
        };
        assert_eq!(Frame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn pull_response_rejects_unknown_status() {
        let buf = [TAG_PULL_RESPONSE, 0x7F, 0];
        assert!(matches!(
            Frame::decode(&buf),
            Err(ChannelError::Protocol(_))
        ));
    }

    #[test]
    fn unknown_tag_is_a_protocol_violation() {
        assert!(matches!(
            Frame::decode(&[0xEE, 0, 0]),
            Err(ChannelError::Protocol(_))
        ));
    }
}
