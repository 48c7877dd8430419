//! Peer transport seam: events in, invite/send out. Backends live in host
//! crates; the core only needs this trait and the event variants.

use std::time::Duration;

use crate::identity::{PeerHandle, PeerIdentity};

/// Fixed discovery group. Only peers advertising the same namespace are
/// surfaced to the core.
pub const SERVICE_NAMESPACE: &str = "rangelink-uwb";

/// Per-peer connection state as reported by the transport.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectionState {
    NotConnected,
    Connecting,
    Connected,
}

/// Asynchronous reports from the transport, marshaled onto the core's event
/// queue before any state is touched.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    PeerDiscovered(PeerIdentity),
    ConnectionChanged(PeerHandle, ConnectionState),
    DataReceived(PeerHandle, Vec<u8>),
}

/// Reliable advertise/browse/connect/send primitive. Implementations must not
/// block the caller; completion surfaces later as `TransportEvent`s.
pub trait PeerTransport {
    /// Begin advertising the local identity and browsing for others.
    fn start(&mut self) -> Result<(), TransportError>;

    /// Invite a discovered peer to connect, bounded by `timeout`.
    fn invite(&mut self, peer: &PeerHandle, timeout: Duration) -> Result<(), TransportError>;

    /// Send an opaque payload to a connected peer over the reliable channel.
    fn send(&mut self, peer: &PeerHandle, payload: &[u8]) -> Result<(), TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The backend's command queue is gone; no further calls can succeed.
    #[error("transport backend stopped")]
    Stopped,
    #[error("{0}")]
    Backend(String),
}
