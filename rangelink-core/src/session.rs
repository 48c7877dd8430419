//! Ranging session controller: turns capability lifecycle signals into a
//! coherent observable phase and keeps the token handshake self-healing.

use tracing::{debug, info, warn};

use crate::capability::{CapabilityEvent, EngagementConfig, RangingCapability};
use crate::token::RangingToken;

/// Externally observable lifecycle state of the ranging session.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RangingPhase {
    /// No engagement running.
    Searching,
    /// Engagement running with a valid configuration.
    Active,
    /// Engagement paused by the platform, not invalidated.
    Suspended,
}

/// Latest distance/bearing pair. Latest-only: every capability update
/// replaces the previous value; no history is kept.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurement {
    /// Meters to the peer, when the capability reported one.
    pub distance: Option<f64>,
    /// Radians off the forward axis, when directional data was present.
    pub bearing: Option<f64>,
}

/// Bearing from a raw direction vector: arcsine of the first component,
/// clamped into the arcsine domain. Only locally accurate near the forward
/// axis; quadrants are not disambiguated.
pub fn bearing_from_direction(direction: [f64; 3]) -> f64 {
    direction[0].clamp(-1.0, 1.0).asin()
}

/// Owns the capability handle, the phase, and the latest measurement.
pub struct RangingSession<C> {
    capability: C,
    phase: RangingPhase,
    measurement: Measurement,
}

impl<C: RangingCapability> RangingSession<C> {
    /// The local token may not be ready yet at construction; nothing can
    /// start before a peer token arrives anyway.
    pub fn new(capability: C) -> Self {
        Self {
            capability,
            phase: RangingPhase::Searching,
            measurement: Measurement::default(),
        }
    }

    pub fn phase(&self) -> RangingPhase {
        self.phase
    }

    pub fn measurement(&self) -> Measurement {
        self.measurement
    }

    pub fn local_token(&self) -> Option<RangingToken> {
        self.capability.local_token()
    }

    /// A peer token arrived: start the engagement, replacing any running one.
    pub fn on_peer_token(&mut self, peer_token: RangingToken) {
        match self.capability.start(EngagementConfig::for_peer(peer_token)) {
            Ok(()) => {
                info!("ranging engagement started");
                self.phase = RangingPhase::Active;
            }
            Err(err) => warn!(%err, "capability refused engagement"),
        }
    }

    /// A connection came up: hand back the local token for sending, if the
    /// capability has produced one. There is no later retry; a peer that
    /// connected before our token existed has to reconnect.
    pub fn on_connection_established(&mut self) -> Option<RangingToken> {
        let local = self.capability.local_token();
        if local.is_none() {
            debug!("local token not available yet; nothing to send");
        }
        local
    }

    /// Apply one capability event. A returned token must be resent to all
    /// connected peers (the invalidation recovery path).
    pub fn handle_capability_event(&mut self, event: CapabilityEvent) -> Option<RangingToken> {
        match event {
            CapabilityEvent::Updated { distance, direction } => {
                self.measurement = Measurement {
                    distance: distance.filter(|d| d.is_finite() && *d >= 0.0),
                    bearing: direction.map(bearing_from_direction),
                };
                None
            }
            CapabilityEvent::Suspended => {
                debug!("engagement suspended");
                self.phase = RangingPhase::Suspended;
                // Last measurement is stale but kept for display.
                None
            }
            CapabilityEvent::ResumptionEnded => {
                match self.capability.current_config() {
                    Some(config) => {
                        info!("suspension ended; restarting engagement");
                        // Active only when the engagement actually restarted.
                        match self.capability.start(config) {
                            Ok(()) => self.phase = RangingPhase::Active,
                            Err(err) => {
                                warn!(%err, "failed to restart engagement after suspension");
                                self.phase = RangingPhase::Searching;
                            }
                        }
                    }
                    None => {
                        debug!("suspension ended with no configuration to resume");
                        self.phase = RangingPhase::Searching;
                    }
                }
                None
            }
            CapabilityEvent::Invalidated(reason) => {
                warn!(?reason, "engagement invalidated");
                self.phase = RangingPhase::Searching;
                // Best-effort recovery: re-announce our token so the remote
                // side can re-initiate.
                self.capability.local_token()
            }
        }
    }

    pub fn capability_mut(&mut self) -> &mut C {
        &mut self.capability
    }
}
