use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::config::AuthConfig;
use crate::state::AppState;

/// Extracts and validates the bearer JWT, returning the user ID.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing Authorization header".into()))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or((StatusCode::UNAUTHORIZED, "invalid auth scheme".into()))?;

        let claims = verify_token(&state.config.auth, token).map_err(|e| {
            debug!(error = %e, "rejected bearer token");
            (StatusCode::UNAUTHORIZED, "invalid or expired token".into())
        })?;

        Ok(AuthUser(claims.sub))
    }
}

pub fn verify_token(cfg: &AuthConfig, token: &str) -> jsonwebtoken::errors::Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(std::slice::from_ref(&cfg.audience));
    if let Some(issuer) = &cfg.issuer {
        validation.set_issuer(std::slice::from_ref(issuer));
    }
    let decoding = DecodingKey::from_secret(cfg.secret.as_bytes());
    decode::<Claims>(token, &decoding, &validation).map(|data| data.claims)
}
