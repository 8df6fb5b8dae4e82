// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::AppError,
    models::identity::{Actor, Role},
};

/// JWT Claims issued by the identity provider.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - the opaque user id.
    pub sub: String,
    /// User's role (e.g., 'participant', 'examiner', 'admin', 'director').
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Unix seconds.
    pub exp: usize,
}

impl From<Claims> for Actor {
    fn from(claims: Claims) -> Self {
        Actor {
            role: Role::from_claim(&claims.role),
            id: claims.sub,
            name: claims.name,
            email: claims.email,
        }
    }
}

/// Signs a token. The engine only verifies tokens; this serves tooling and tests.
pub fn sign_jwt(
    user_id: &str,
    role: &str,
    name: Option<&str>,
    email: Option<&str>,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: user_id.to_owned(),
        role: role.to_owned(),
        name: name.map(str::to_owned),
        email: email.map(str::to_owned),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Checks the HS256 signature and expiry. Tokens without a subject are rejected.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    if token_data.claims.sub.trim().is_empty() {
        return Err(AppError::AuthError("Token has no subject".to_string()));
    }

    Ok(token_data.claims)
}

/// Resolves the bearer token into an `Actor` request extension for the room routes.
/// Missing or bad tokens end the request with 401.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token.trim(),
        None => return Err(AppError::AuthError("Missing bearer token".to_string())),
    };

    let claims = verify_jwt(token, &config.jwt_secret)?;
    req.extensions_mut().insert(Actor::from(claims));
    Ok(next.run(req).await)
}
