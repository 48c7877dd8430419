//! Single dispatch point: one owner for all core state. Hosts marshal every
//! callback into a queue of `Event`s; two events are never processed
//! concurrently, only interleaved in arrival order.

use crate::capability::{CapabilityEvent, RangingCapability};
use crate::coordinator::{LinkEvent, PeerCoordinator};
use crate::identity::PeerIdentity;
use crate::session::{Measurement, RangingPhase, RangingSession};
use crate::transport::{PeerTransport, TransportEvent};

/// Everything that can happen to the core, from any asynchronous source.
#[derive(Debug, Clone)]
pub enum Event {
    Transport(TransportEvent),
    Capability(CapabilityEvent),
}

/// The whole system: one peer coordinator and one ranging session, wired so
/// that the session's token sends go back out through the coordinator.
pub struct RangeLink<T, C> {
    coordinator: PeerCoordinator<T>,
    session: RangingSession<C>,
}

impl<T: PeerTransport, C: RangingCapability> RangeLink<T, C> {
    pub fn new(local: PeerIdentity, transport: T, capability: C) -> Self {
        Self {
            coordinator: PeerCoordinator::new(local, transport),
            session: RangingSession::new(capability),
        }
    }

    /// Begin advertising and browsing. Call once at process start.
    pub fn start(&mut self) {
        self.coordinator.start();
    }

    /// Apply one event. Never blocks; outbound work is fire-and-forget
    /// through the injected handles.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Transport(transport_event) => {
                for upward in self.coordinator.handle_event(transport_event) {
                    match upward {
                        LinkEvent::PeerTokenReceived(peer_token) => {
                            self.session.on_peer_token(peer_token);
                        }
                        LinkEvent::ConnectionEstablished(_peer) => {
                            if let Some(local_token) = self.session.on_connection_established() {
                                self.coordinator.send_token(&local_token);
                            }
                        }
                    }
                }
            }
            Event::Capability(capability_event) => {
                if let Some(local_token) = self.session.handle_capability_event(capability_event) {
                    self.coordinator.send_token(&local_token);
                }
            }
        }
    }

    pub fn phase(&self) -> RangingPhase {
        self.session.phase()
    }

    pub fn measurement(&self) -> Measurement {
        self.session.measurement()
    }

    pub fn local_identity(&self) -> &PeerIdentity {
        self.coordinator.local_identity()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.coordinator.transport_mut()
    }

    pub fn capability_mut(&mut self) -> &mut C {
        self.session.capability_mut()
    }
}
