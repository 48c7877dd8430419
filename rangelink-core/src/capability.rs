//! Ranging capability seam: the platform distance sensor behind a trait.

use crate::token::RangingToken;

/// Configuration for one ranging engagement: a single peer token, valid for
/// exactly one engagement attempt.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EngagementConfig {
    pub peer_token: RangingToken,
}

impl EngagementConfig {
    pub fn for_peer(peer_token: RangingToken) -> Self {
        Self { peer_token }
    }
}

/// Why the capability tore an engagement down.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InvalidationReason {
    PeerEnded,
    Timeout,
    PermissionDenied,
}

/// Asynchronous reports from the capability.
#[derive(Debug, Clone)]
pub enum CapabilityEvent {
    /// New measurement. A present field overwrites the previous value; an
    /// absent field clears it.
    Updated {
        distance: Option<f64>,
        direction: Option<[f64; 3]>,
    },
    /// Engagement temporarily paused by the platform.
    Suspended,
    /// Suspension over; the engagement restarts only if a configuration
    /// survived it.
    ResumptionEnded,
    /// Engagement torn down. Ranging needs a fresh token exchange.
    Invalidated(InvalidationReason),
}

/// The platform sensor. One instance per process, owned by the session
/// controller for the process lifetime.
pub trait RangingCapability {
    /// Start an engagement against `config`, replacing any running one.
    /// Re-configuration mid-engagement is the capability's concern.
    fn start(&mut self, config: EngagementConfig) -> Result<(), CapabilityError>;

    /// Configuration of the engagement the capability considers current.
    fn current_config(&self) -> Option<EngagementConfig>;

    /// This side's ranging token. None until the sensor has initialized.
    fn local_token(&self) -> Option<RangingToken>;
}

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("ranging capability unavailable")]
    Unavailable,
    #[error("{0}")]
    Backend(String),
}
