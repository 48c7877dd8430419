//! Peer coordinator: transport lifecycle, invite policy, token exchange.

use std::time::Duration;

use tracing::{debug, warn};

use crate::identity::{PeerHandle, PeerIdentity};
use crate::token::{self, RangingToken};
use crate::transport::{ConnectionState, PeerTransport, TransportEvent};

/// Invitation timeout handed to the transport on every discovery.
pub const INVITE_TIMEOUT: Duration = Duration::from_secs(20);

/// Upward events: the only things the coordinator reports to the layer above.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    PeerTokenReceived(RangingToken),
    ConnectionEstablished(PeerHandle),
}

/// Owns the transport handle and the set of connected peers. Session state
/// lives elsewhere; the two halves talk only through `LinkEvent` and
/// `send_token`.
pub struct PeerCoordinator<T> {
    transport: T,
    local: PeerIdentity,
    connected: Vec<PeerHandle>,
}

impl<T: PeerTransport> PeerCoordinator<T> {
    pub fn new(local: PeerIdentity, transport: T) -> Self {
        Self {
            transport,
            local,
            connected: Vec::new(),
        }
    }

    /// Begin advertising and browsing. A start failure ends discovery for the
    /// life of the process but never crashes it.
    pub fn start(&mut self) {
        if let Err(err) = self.transport.start() {
            warn!(%err, "transport failed to start; discovery disabled");
        }
    }

    /// Apply one transport event; returns upward events in order.
    pub fn handle_event(&mut self, event: TransportEvent) -> Vec<LinkEvent> {
        match event {
            TransportEvent::PeerDiscovered(identity) => {
                if identity.handle == self.local.handle {
                    return Vec::new();
                }
                // Invite unconditionally: no ranking, no dedup, no cap.
                debug!(peer = %identity.display_name, "peer discovered, inviting");
                if let Err(err) = self.transport.invite(&identity.handle, INVITE_TIMEOUT) {
                    warn!(%err, peer = %identity.display_name, "invite failed");
                }
                Vec::new()
            }
            TransportEvent::ConnectionChanged(peer, state) => match state {
                ConnectionState::Connected => {
                    if !self.connected.contains(&peer) {
                        self.connected.push(peer);
                    }
                    debug!(%peer, "peer connected");
                    vec![LinkEvent::ConnectionEstablished(peer)]
                }
                ConnectionState::Connecting => {
                    debug!(%peer, "peer connecting");
                    Vec::new()
                }
                ConnectionState::NotConnected => {
                    self.connected.retain(|p| *p != peer);
                    debug!(%peer, "peer disconnected");
                    Vec::new()
                }
            },
            TransportEvent::DataReceived(peer, bytes) => match token::decode_token(&bytes) {
                Ok(received) => vec![LinkEvent::PeerTokenReceived(received)],
                Err(err) => {
                    // Foreign traffic on a shared namespace is background
                    // noise, not an error condition.
                    debug!(%peer, %err, "dropping non-token payload");
                    Vec::new()
                }
            },
        }
    }

    /// Send the local token to every currently connected peer. Best-effort:
    /// with zero peers this is a logged no-op, and per-peer send failures are
    /// absorbed.
    pub fn send_token(&mut self, ranging_token: &RangingToken) {
        if self.connected.is_empty() {
            debug!("no connected peers; token not sent");
            return;
        }
        let payload = match token::encode_token(ranging_token) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "failed to encode ranging token");
                return;
            }
        };
        for peer in &self.connected {
            if let Err(err) = self.transport.send(peer, &payload) {
                warn!(%peer, %err, "failed to send ranging token");
            }
        }
    }

    pub fn local_identity(&self) -> &PeerIdentity {
        &self.local
    }

    pub fn connected_peers(&self) -> &[PeerHandle] {
        &self.connected
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::encode_token;
    use crate::transport::TransportError;

    /// Records every call so tests can assert on the exact sequence.
    #[derive(Default)]
    struct FakeTransport {
        started: bool,
        fail_start: bool,
        fail_send: bool,
        invites: Vec<(PeerHandle, Duration)>,
        sent: Vec<(PeerHandle, Vec<u8>)>,
    }

    impl PeerTransport for FakeTransport {
        fn start(&mut self) -> Result<(), TransportError> {
            if self.fail_start {
                return Err(TransportError::Backend("advertise failed".into()));
            }
            self.started = true;
            Ok(())
        }

        fn invite(&mut self, peer: &PeerHandle, timeout: Duration) -> Result<(), TransportError> {
            self.invites.push((*peer, timeout));
            Ok(())
        }

        fn send(&mut self, peer: &PeerHandle, payload: &[u8]) -> Result<(), TransportError> {
            if self.fail_send {
                return Err(TransportError::Backend("channel error".into()));
            }
            self.sent.push((*peer, payload.to_vec()));
            Ok(())
        }
    }

    fn coordinator() -> PeerCoordinator<FakeTransport> {
        PeerCoordinator::new(PeerIdentity::generate("test"), FakeTransport::default())
    }

    #[test]
    fn discovering_self_does_not_invite() {
        let mut c = coordinator();
        let me = c.local_identity().clone();
        let up = c.handle_event(TransportEvent::PeerDiscovered(me));
        assert!(up.is_empty());
        assert!(c.transport_mut().invites.is_empty());
    }

    #[test]
    fn every_discovery_invites_with_fixed_timeout() {
        let mut c = coordinator();
        let other = PeerIdentity::generate("other");
        c.handle_event(TransportEvent::PeerDiscovered(other.clone()));
        c.handle_event(TransportEvent::PeerDiscovered(other.clone()));
        let invites = &c.transport_mut().invites;
        assert_eq!(invites.len(), 2);
        assert!(invites.iter().all(|(p, t)| *p == other.handle && *t == INVITE_TIMEOUT));
    }

    #[test]
    fn connected_emits_connection_established() {
        let mut c = coordinator();
        let peer = PeerHandle::generate();
        let up = c.handle_event(TransportEvent::ConnectionChanged(
            peer,
            ConnectionState::Connected,
        ));
        assert!(matches!(up[..], [LinkEvent::ConnectionEstablished(p)] if p == peer));
        assert_eq!(c.connected_peers(), &[peer]);
    }

    #[test]
    fn connecting_and_disconnect_emit_nothing() {
        let mut c = coordinator();
        let peer = PeerHandle::generate();
        assert!(c
            .handle_event(TransportEvent::ConnectionChanged(
                peer,
                ConnectionState::Connecting,
            ))
            .is_empty());
        c.handle_event(TransportEvent::ConnectionChanged(
            peer,
            ConnectionState::Connected,
        ));
        assert!(c
            .handle_event(TransportEvent::ConnectionChanged(
                peer,
                ConnectionState::NotConnected,
            ))
            .is_empty());
        assert!(c.connected_peers().is_empty());
    }

    #[test]
    fn send_token_without_peers_is_a_no_op() {
        let mut c = coordinator();
        c.send_token(&RangingToken::from_bytes(vec![1, 2, 3]));
        assert!(c.transport_mut().sent.is_empty());
    }

    #[test]
    fn send_token_reaches_exactly_the_connected_set() {
        let mut c = coordinator();
        let a = PeerHandle::generate();
        let b = PeerHandle::generate();
        let gone = PeerHandle::generate();
        for p in [a, b, gone] {
            c.handle_event(TransportEvent::ConnectionChanged(p, ConnectionState::Connected));
        }
        c.handle_event(TransportEvent::ConnectionChanged(
            gone,
            ConnectionState::NotConnected,
        ));
        c.send_token(&RangingToken::from_bytes(vec![9]));
        let recipients: Vec<PeerHandle> =
            c.transport_mut().sent.iter().map(|(p, _)| *p).collect();
        assert_eq!(recipients, vec![a, b]);
    }

    #[test]
    fn send_failure_is_absorbed() {
        let mut c = coordinator();
        let peer = PeerHandle::generate();
        c.handle_event(TransportEvent::ConnectionChanged(
            peer,
            ConnectionState::Connected,
        ));
        c.transport_mut().fail_send = true;
        // Must not panic or propagate.
        c.send_token(&RangingToken::from_bytes(vec![9]));
    }

    #[test]
    fn valid_token_payload_is_surfaced() {
        let mut c = coordinator();
        let peer = PeerHandle::generate();
        let token = RangingToken::from_bytes(vec![4, 5, 6]);
        let payload = encode_token(&token).unwrap();
        let up = c.handle_event(TransportEvent::DataReceived(peer, payload));
        assert!(matches!(&up[..], [LinkEvent::PeerTokenReceived(t)] if *t == token));
    }

    #[test]
    fn malformed_payload_is_silently_dropped() {
        let mut c = coordinator();
        let peer = PeerHandle::generate();
        let up = c.handle_event(TransportEvent::DataReceived(peer, b"mdns chatter".to_vec()));
        assert!(up.is_empty());
    }

    #[test]
    fn start_failure_does_not_panic() {
        let mut c = coordinator();
        c.transport_mut().fail_start = true;
        c.start();
        assert!(!c.transport_mut().started);
    }
}
