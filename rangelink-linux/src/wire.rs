//! LAN control messages and framing: length-prefix (4 bytes LE) + bincode
//! payload. Used on the discovery socket only; post-handshake TCP frames
//! carry encrypted opaque payloads instead.

use rangelink_core::PeerIdentity;
use serde::{Deserialize, Serialize};

use crate::secure::PublicKey;

/// Current LAN protocol version. Checked in announces and the handshake.
pub const LAN_PROTOCOL_VERSION: u8 = 1;

const LEN_SIZE: usize = 4;
const MAX_FRAME_LEN: u32 = 64 * 1024;

/// Discovery-plane messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LanMessage {
    /// Multicast presence announcement under a service namespace.
    Announce {
        protocol_version: u8,
        namespace: String,
        identity: PeerIdentity,
        public_key: PublicKey,
        listen_port: u16,
    },
    /// Unicast reply so the announcer learns us without waiting for our next
    /// announce interval.
    AnnounceReply {
        protocol_version: u8,
        namespace: String,
        identity: PeerIdentity,
        public_key: PublicKey,
        listen_port: u16,
    },
}

/// Encode a message into a single frame: 4 bytes LE length + bincode payload.
pub fn encode_frame(msg: &LanMessage) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(msg).map_err(FrameEncodeError::Encode)?;
    let len = payload.len() as u32;
    if len > MAX_FRAME_LEN {
        return Err(FrameEncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large")]
    TooLarge,
}

/// Decode one frame from the front of `bytes`. Returns the message and the
/// number of bytes consumed.
pub fn decode_frame(bytes: &[u8]) -> Result<(LanMessage, usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if len > MAX_FRAME_LEN as usize {
        return Err(FrameDecodeError::TooLarge);
    }
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let msg: LanMessage =
        bincode::deserialize(&bytes[LEN_SIZE..LEN_SIZE + len]).map_err(FrameDecodeError::Decode)?;
    Ok((msg, LEN_SIZE + len))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}
