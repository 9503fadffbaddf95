//! Bearer-token verification. Accounts and sign-in live with the external
//! auth provider; this service only checks the tokens it issues.

mod claims;
pub(crate) mod extractors;

pub use claims::Claims;
pub use extractors::{verify_token, AuthUser};

/// Signs a token the way the auth provider does, for route tests.
#[cfg(test)]
pub(crate) fn test_token(cfg: &crate::config::AuthConfig, user_id: uuid::Uuid, ttl_secs: i64) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let claims = Claims {
        sub: user_id,
        exp: (now + ttl_secs) as usize,
        iat: Some(now as usize),
        aud: Some(cfg.audience.clone()),
        iss: None,
        email: Some("eater@example.com".into()),
        role: Some("authenticated".into()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )
    .unwrap()
}
