//! Ranging token and its wire codec: a self-describing JSON envelope, so a
//! receiver can decode without out-of-band schema knowledge.

use serde::{Deserialize, Serialize};

/// Envelope tag identifying our payloads among foreign traffic.
const FORMAT_TAG: &str = "rangelink.token";
/// Current envelope version.
const FORMAT_VERSION: u8 = 1;

/// Opaque ranging-identity blob produced by the ranging capability. The core
/// never inspects the contents; it only moves them between peers.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RangingToken(Vec<u8>);

impl RangingToken {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        RangingToken(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Serialize, Deserialize)]
struct TokenEnvelope {
    format: String,
    version: u8,
    token: Vec<u8>,
}

/// Encode a token for transport: one message per send.
pub fn encode_token(token: &RangingToken) -> Result<Vec<u8>, TokenEncodeError> {
    let envelope = TokenEnvelope {
        format: FORMAT_TAG.to_string(),
        version: FORMAT_VERSION,
        token: token.0.clone(),
    };
    serde_json::to_vec(&envelope).map_err(TokenEncodeError::Encode)
}

/// Decode a received payload. Foreign or malformed bytes are an expected
/// condition on a shared namespace; callers drop them, never crash.
pub fn decode_token(bytes: &[u8]) -> Result<RangingToken, TokenDecodeError> {
    let envelope: TokenEnvelope =
        serde_json::from_slice(bytes).map_err(TokenDecodeError::Decode)?;
    if envelope.format != FORMAT_TAG {
        return Err(TokenDecodeError::UnknownFormat);
    }
    if envelope.version != FORMAT_VERSION {
        return Err(TokenDecodeError::UnsupportedVersion(envelope.version));
    }
    Ok(RangingToken(envelope.token))
}

#[derive(Debug, thiserror::Error)]
pub enum TokenEncodeError {
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TokenDecodeError {
    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("unknown payload format")]
    UnknownFormat,
    #[error("unsupported token version {0}")]
    UnsupportedVersion(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let token = RangingToken::from_bytes(vec![7, 0, 42, 255]);
        let wire = encode_token(&token).unwrap();
        let decoded = decode_token(&wire).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            decode_token(b"\x00\x01\x02not json"),
            Err(TokenDecodeError::Decode(_))
        ));
    }

    #[test]
    fn foreign_json_is_rejected() {
        let wire = br#"{"format":"someone-else","version":1,"token":[1,2]}"#;
        assert!(matches!(
            decode_token(wire),
            Err(TokenDecodeError::UnknownFormat)
        ));
    }

    #[test]
    fn future_version_is_rejected() {
        let wire = br#"{"format":"rangelink.token","version":9,"token":[]}"#;
        assert!(matches!(
            decode_token(wire),
            Err(TokenDecodeError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn empty_token_roundtrips() {
        let token = RangingToken::from_bytes(Vec::new());
        let wire = encode_token(&token).unwrap();
        assert_eq!(decode_token(&wire).unwrap(), token);
    }
}
