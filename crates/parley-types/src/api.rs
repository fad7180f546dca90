use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MessageSender;

// -- JWT Claims --

/// JWT claims shared across parley-api (REST middleware, token issuing) and
/// parley-gateway (handshake verification). Canonical definition lives here
/// in parley-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
}

/// Response for both login and register: `{jwt, user}`.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub jwt: String,
    pub user: PublicUser,
}

// -- Message history --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: i64,
    pub content: String,
    pub sender: MessageSender,
    pub timestamp: DateTime<Utc>,
    pub is_delivered: bool,
    pub is_read: bool,
}
