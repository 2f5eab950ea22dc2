//! Password hashing and HS256 access/refresh tokens.
//!
//! Access and refresh tokens are signed with different secrets and also carry
//! a `kind` claim, so one can never stand in for the other.

use std::sync::Arc;
use std::time::Duration;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;
use crate::routes::error::ApiError;
use crate::state::AppState;
use crate::store::User;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no authentication token provided")]
    MissingToken,

    #[error("token has expired")]
    Expired,

    #[error("wrong token kind")]
    WrongKind,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("password hashing failed: {0}")]
    Hash(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid(e.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

pub struct TokenIssuer {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(access_secret: &str, refresh_secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            access_secret: access_secret.to_string(),
            refresh_secret: refresh_secret.to_string(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(&cfg.jwt_secret, &cfg.jwt_refresh_secret, cfg.access_token_ttl, cfg.refresh_token_ttl)
    }

    pub fn issue(&self, user: &User) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.sign(user, TokenKind::Access)?,
            refresh_token: self.sign(user, TokenKind::Refresh)?,
            expires_in: self.access_ttl.as_secs(),
        })
    }

    /// Check signature, expiry and kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let key = DecodingKey::from_secret(self.secret(kind).as_bytes());
        let data = decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))?;
        if data.claims.kind != kind {
            return Err(AuthError::WrongKind);
        }
        Ok(data.claims)
    }

    fn sign(&self, user: &User, kind: TokenKind) -> Result<String, AuthError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            kind,
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };
        let key = EncodingKey::from_secret(self.secret(kind).as_bytes());
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &key)?)
    }

    fn secret(&self, kind: TokenKind) -> &str {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        }
    }
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Hash(e.to_string()))
}

/// Malformed stored hashes count as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authenticated caller, extracted from a valid access token.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

impl From<Claims> for AuthUser {
    fn from(c: Claims) -> Self {
        Self { id: c.sub, email: c.email }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
        let claims = state.tokens.verify(token, TokenKind::Access).map_err(|e| {
            debug!(target: "socratic_tutor", error = %e, "Access token rejected");
            e
        })?;
        Ok(claims.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "u-1".into(),
            email: "ada@example.com".into(),
            name: "Ada".into(),
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("access-secret", "refresh-secret", Duration::from_secs(900), Duration::from_secs(3600))
    }

    #[test]
    fn issued_tokens_verify_with_their_kind() {
        let pair = issuer().issue(&user()).unwrap();
        let access = issuer().verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(access.sub, "u-1");
        assert_eq!(access.kind, TokenKind::Access);
        let refresh = issuer().verify(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(refresh.email, "ada@example.com");
        assert_eq!(pair.expires_in, 900);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let pair = issuer().issue(&user()).unwrap();
        assert!(issuer().verify(&pair.refresh_token, TokenKind::Access).is_err());
    }

    #[test]
    fn kind_claim_is_checked_even_with_shared_secret() {
        let shared = TokenIssuer::new("same", "same", Duration::from_secs(60), Duration::from_secs(60));
        let pair = shared.issue(&user()).unwrap();
        assert!(matches!(shared.verify(&pair.refresh_token, TokenKind::Access), Err(AuthError::WrongKind)));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let pair = issuer().issue(&user()).unwrap();
        let (head, sig) = pair.access_token.rsplit_once('.').unwrap();
        let mut sig: Vec<char> = sig.chars().collect();
        sig[5] = if sig[5] == 'A' { 'B' } else { 'A' };
        let forged = format!("{head}.{}", sig.into_iter().collect::<String>());
        assert!(matches!(issuer().verify(&forged, TokenKind::Access), Err(AuthError::Invalid(_))));
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let other = TokenIssuer::new("other", "other-refresh", Duration::from_secs(60), Duration::from_secs(60));
        let pair = other.issue(&user()).unwrap();
        assert!(issuer().verify(&pair.access_token, TokenKind::Access).is_err());
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let now = Utc::now().timestamp();
        let claims = Claims { sub: "u-1".into(), email: "a@b.c".into(), kind: TokenKind::Access, iat: now - 7200, exp: now - 3600 };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(b"access-secret")).unwrap();
        assert!(matches!(issuer().verify(&token, TokenKind::Access), Err(AuthError::Expired)));
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse", 4).unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
