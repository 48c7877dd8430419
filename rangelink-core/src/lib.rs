//! Nearby-device ranging core: peer discovery/connection lifecycle plus the
//! ranging-session state machine.
//! Host-driven: no I/O here; hosts inject a transport and a ranging
//! capability and marshal every callback into one serialized event queue.

pub mod capability;
pub mod coordinator;
pub mod identity;
pub mod link;
pub mod session;
pub mod token;
pub mod transport;

pub use capability::{
    CapabilityError, CapabilityEvent, EngagementConfig, InvalidationReason, RangingCapability,
};
pub use coordinator::{LinkEvent, PeerCoordinator, INVITE_TIMEOUT};
pub use identity::{PeerHandle, PeerIdentity};
pub use link::{Event, RangeLink};
pub use session::{bearing_from_direction, Measurement, RangingPhase, RangingSession};
pub use token::{decode_token, encode_token, RangingToken, TokenDecodeError, TokenEncodeError};
pub use transport::{
    ConnectionState, PeerTransport, TransportError, TransportEvent, SERVICE_NAMESPACE,
};
