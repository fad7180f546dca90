use thiserror::Error;

use crate::registry::ConnectionId;

/// Relay failure taxonomy. Authentication is fatal to the connection
/// attempt; everything else is contained per-event or per-recipient.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Token missing, invalid, expired, or subject unknown. A single opaque
    /// variant: rejections never reveal which sub-step failed.
    #[error("Authentication error")]
    Authentication,

    /// A message store call failed. The triggering event's effect is dropped;
    /// the connection stays up.
    #[error("persistence failure: {0}")]
    Persistence(#[source] anyhow::Error),

    /// A recipient's transport went away mid-delivery. The recipient is
    /// removed from the registry; the fan-out continues.
    #[error("delivery failed for connection {0}")]
    Delivery(ConnectionId),

    /// Payload did not match the expected shape. The event is rejected, the
    /// connection stays open.
    #[error("malformed event: {0}")]
    MalformedEvent(String),
}
