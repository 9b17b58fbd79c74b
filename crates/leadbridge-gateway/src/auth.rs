// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer JWT authentication for the gateway.
//!
//! Tokens are HS256-signed by the CRM with the shared `server.jwt_secret`.
//! The `sub` claim identifies the session owner and is handed to handlers as
//! an [`AuthUser`] extension. Browsers' `EventSource` cannot set headers, so a
//! `token` query parameter is accepted when the header is absent.
//!
//! When no secret is configured, all requests are rejected (fail-closed).

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use leadbridge_core::BridgeError;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret shared with the CRM. `None` rejects every request.
    pub jwt_secret: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// The authenticated CRM user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
}

/// Sign a token for `user_id`, valid for `ttl`.
pub fn issue_token(secret: &str, user_id: &str, ttl: Duration) -> Result<String, BridgeError> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + ttl.as_secs() as i64,
        iat: Some(now),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| BridgeError::Internal(format!("cannot sign token: {e}")))
}

/// Subject of a valid token.
fn verify_token(secret: &str, token: &str) -> Option<String> {
    let validation = Validation::new(Algorithm::HS256);
    match decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
        Ok(data) if !data.claims.sub.trim().is_empty() => Some(data.claims.sub),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "token rejected");
            None
        }
    }
}

fn request_token(request: &Request) -> Option<String> {
    let header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if let Some(token) = header {
        return Some(token.trim().to_string());
    }
    request
        .uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .map(str::to_string)
}

pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(secret) = auth.jwt_secret.as_deref() else {
        tracing::error!("gateway has no jwt_secret configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    };
    let user = request_token(&request)
        .and_then(|token| verify_token(secret, &token))
        .ok_or(StatusCode::UNAUTHORIZED)?;
    request.extensions_mut().insert(AuthUser(user));
    Ok(next.run(request).await)
}
