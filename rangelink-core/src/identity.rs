//! Peer identity: display name plus a process-lifetime transport handle.

use serde::{Deserialize, Serialize};

/// Fixed prefix of every generated display name.
pub const DISPLAY_NAME_PREFIX: &str = "UWB";

/// Process-lifetime-unique handle the transport uses to address a participant.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PeerHandle(uuid::Uuid);

impl PeerHandle {
    pub fn generate() -> Self {
        PeerHandle(uuid::Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Rebuild a handle from its raw bytes (e.g. out of a transport handshake).
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        PeerHandle(uuid::Uuid::from_bytes(bytes))
    }
}

impl std::fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Local participant identity. Created once per process start; immutable.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// Human-readable name shown to the other side.
    pub display_name: String,
    /// Transport address for this participant.
    pub handle: PeerHandle,
}

impl PeerIdentity {
    /// Generate a fresh identity: `UWB-<model>-<4 hex digits>`. The suffix is
    /// drawn from 0x0000..=0xFFFF, so name uniqueness is probabilistic; the
    /// handle is what the transport actually keys on.
    pub fn generate(model: &str) -> Self {
        use rand::Rng;
        let suffix: u16 = rand::thread_rng().gen();
        Self {
            display_name: format!("{}-{}-{:04X}", DISPLAY_NAME_PREFIX, model, suffix),
            handle: PeerHandle::generate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_format() {
        let id = PeerIdentity::generate("pixel");
        let parts: Vec<&str> = id.display_name.splitn(3, '-').collect();
        assert_eq!(parts[0], DISPLAY_NAME_PREFIX);
        assert_eq!(parts[1], "pixel");
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn handles_are_distinct() {
        let a = PeerIdentity::generate("a");
        let b = PeerIdentity::generate("a");
        assert_ne!(a.handle, b.handle);
    }

    #[test]
    fn handle_byte_roundtrip() {
        let h = PeerHandle::generate();
        assert_eq!(PeerHandle::from_bytes(*h.as_bytes()), h);
    }
}
