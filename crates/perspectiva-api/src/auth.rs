use std::sync::Arc;

use axum::http::{HeaderMap, header};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use perspectiva_db::Database;
use perspectiva_types::api::Claims;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    /// Shared with the identity provider that issues session tokens.
    pub jwt_secret: String,
}

/// Extract and validate the JWT from the Authorization header.
pub fn extract_claims(headers: &HeaderMap, jwt_secret: &str) -> Result<Claims, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    Ok(token_data.claims)
}

/// Sign a session token for `email`. Tokens normally come from the identity
/// provider; this mirrors its format for local tooling and tests.
pub fn create_token(secret: &str, email: &str, valid_for: chrono::Duration) -> anyhow::Result<String> {
    let claims = Claims {
        sub: email.to_string(),
        exp: (chrono::Utc::now() + valid_for).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
