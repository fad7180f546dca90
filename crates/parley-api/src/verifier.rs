use std::sync::Arc;

use anyhow::Result;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use parley_db::Database;
use parley_gateway::{CredentialVerifier, RelayError};
use parley_types::api::Claims;
use parley_types::models::Identity;

/// Issues and verifies the relay's bearer tokens (HS256) and resolves a
/// verified token's numeric subject against the user table.
pub struct JwtCredentials {
    secret: String,
    db: Arc<Database>,
}

impl JwtCredentials {
    pub fn new(secret: String, db: Arc<Database>) -> Self {
        Self { secret, db }
    }

    pub fn create_token(&self, user_id: i64, username: &str) -> Result<String> {
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok(token)
    }

    pub fn decode_claims(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }
}

impl CredentialVerifier for JwtCredentials {
    fn verify(&self, token: &str) -> Result<Identity, RelayError> {
        let claims = self
            .decode_claims(token)
            .map_err(|_| RelayError::Authentication)?;

        let user = self
            .db
            .get_user_by_id(claims.sub)
            .map_err(|_| RelayError::Authentication)?
            .ok_or(RelayError::Authentication)?;

        Ok(Identity {
            id: user.id,
            username: user.username,
        })
    }
}
