pub mod connection;
pub mod error;
pub mod handshake;
pub mod registry;
pub mod router;

pub use error::RelayError;
pub use handshake::CredentialVerifier;
pub use registry::{ConnectionId, Registry};
