//! Software stand-in for a platform UWB driver.

use rand::RngCore;
use rangelink_core::{CapabilityError, EngagementConfig, RangingCapability, RangingToken};

/// Produces a session token and accepts engagements, but emits no
/// measurements of its own; distance and bearing need real ranging hardware.
/// Good enough to exercise the full token handshake between two daemons.
pub struct SoftwareCapability {
    local_token: RangingToken,
    config: Option<EngagementConfig>,
}

impl SoftwareCapability {
    pub fn new() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            local_token: RangingToken::from_bytes(bytes.to_vec()),
            config: None,
        }
    }
}

impl Default for SoftwareCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl RangingCapability for SoftwareCapability {
    fn start(&mut self, config: EngagementConfig) -> Result<(), CapabilityError> {
        self.config = Some(config);
        Ok(())
    }

    fn current_config(&self) -> Option<EngagementConfig> {
        self.config.clone()
    }

    fn local_token(&self) -> Option<RangingToken> {
        Some(self.local_token.clone())
    }
}
