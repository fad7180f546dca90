pub mod auth;
pub mod fallback;
pub mod messages;
pub mod middleware;
pub mod verifier;
