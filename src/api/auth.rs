//! Bearer-token auth for the reconciler API.
//!
//! - Tokens are HS256 JWTs issued by the upstream auth provider
//! - The `sub` claim is the owner id every store query is scoped to
//! - When `DEV_MODE=true`, every request acts as `DEV_USER_ID`
//!
//! The authenticated principal is attached to the request as an
//! [`AuthUser`] extension.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, Validation};

use super::routes::AppState;
use crate::config::Config;

/// The principal a request acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct Claims {
    /// Owner id
    pub sub: String,
    /// Issued-at unix seconds
    #[serde(default)]
    pub iat: i64,
    /// Expiration unix seconds
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

pub(crate) fn verify_jwt(
    token: &str,
    secret: &str,
    audience: Option<&str>,
) -> anyhow::Result<Claims> {
    let mut validation = Validation::default();
    match audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(token_data.claims)
}

/// Resolve a bearer token to a principal under the server config.
///
/// Returns `None` for invalid or expired tokens and for tokens whose
/// subject is blank.
pub fn authenticate_token(token: &str, config: &Config) -> Option<AuthUser> {
    let secret = config.auth.jwt_secret.as_deref()?;
    let claims = verify_jwt(token, secret, config.auth.jwt_audience.as_deref()).ok()?;
    let id = claims.sub.trim();
    if id.is_empty() {
        return None;
    }
    Some(AuthUser { id: id.to_string() })
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // Dev mode => act as the configured dev user.
    if state.config.dev_mode {
        req.extensions_mut().insert(AuthUser {
            id: state.config.auth.dev_user_id.clone(),
        });
        return next.run(req).await;
    }

    // If auth isn't configured, fail closed in non-dev mode.
    if state.config.auth.jwt_secret.is_none() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "JWT_SECRET not configured",
        )
            .into_response();
    }

    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .unwrap_or("")
        .trim();

    if token.is_empty() {
        return (StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response();
    }

    match authenticate_token(token, &state.config) {
        Some(user) => {
            tracing::debug!("Authenticated request for {}", user.id);
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None => (StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response(),
    }
}
