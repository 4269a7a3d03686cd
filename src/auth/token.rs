use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::Result;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // Account ID
    pub exp: i64,     // Expiration time
    pub iat: i64,     // Issued at
    pub jti: String,  // Unique per token, so two pairs issued in the same second differ
}

/// Which signing secret a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature does not match")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token could not be parsed")]
    Malformed,
}

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SigningKey {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// Issues and verifies signed, expiring account tokens.
///
/// Access and refresh tokens are signed with different secrets, so a
/// token of one class never verifies as the other. The codec holds no
/// mutable state and is shared freely across workers.
pub struct TokenCodec {
    access: SigningKey,
    refresh: SigningKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(
        access_secret: &str,
        access_ttl: Duration,
        refresh_secret: &str,
        refresh_ttl: Duration,
    ) -> Result<Self> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(AppError::ConfigError("token secrets must not be empty".into()));
        }
        if access_secret == refresh_secret {
            return Err(AppError::ConfigError(
                "access and refresh token secrets must differ".into(),
            ));
        }
        for (name, ttl) in [("access", access_ttl), ("refresh", refresh_ttl)] {
            if ttl <= Duration::zero() {
                return Err(AppError::ConfigError(format!("{name} token ttl must be positive")));
            }
            if Utc::now().checked_add_signed(ttl).is_none() {
                return Err(AppError::ConfigError(format!("{name} token ttl is out of range")));
            }
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an explicit clock in `verify_at`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            access: SigningKey::new(access_secret, access_ttl),
            refresh: SigningKey::new(refresh_secret, refresh_ttl),
            validation,
        })
    }

    pub fn from_settings(auth: &AuthConfig) -> Result<Self> {
        let out_of_range = |name: &str| AppError::ConfigError(format!("{name} token ttl is out of range"));
        Self::new(
            &auth.access_token_secret,
            Duration::try_minutes(auth.access_token_ttl_minutes).ok_or_else(|| out_of_range("access"))?,
            &auth.refresh_token_secret,
            Duration::try_days(auth.refresh_token_ttl_days).ok_or_else(|| out_of_range("refresh"))?,
        )
    }

    fn key(&self, kind: TokenKind) -> &SigningKey {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn issue_access_token(&self, account_id: Uuid) -> Result<String> {
        self.issue_at(TokenKind::Access, account_id, Utc::now())
    }

    pub fn issue_refresh_token(&self, account_id: Uuid) -> Result<String> {
        self.issue_at(TokenKind::Refresh, account_id, Utc::now())
    }

    pub fn issue_at(&self, kind: TokenKind, account_id: Uuid, now: DateTime<Utc>) -> Result<String> {
        let key = self.key(kind);
        let expires = now
            .checked_add_signed(key.ttl)
            .ok_or_else(|| AppError::InternalError("token expiry is out of range".into()))?;
        let claims = Claims {
            sub: account_id.to_string(),
            exp: expires.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &key.encoding)
            .map_err(|e| AppError::InternalError(format!("token signing failed: {e}")))
    }

    pub fn verify(&self, token: &str, kind: TokenKind) -> std::result::Result<Uuid, TokenError> {
        self.verify_at(token, kind, Utc::now())
    }

    /// Checks signature, then expiry against `now`, then the subject.
    pub fn verify_at(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> std::result::Result<Uuid, TokenError> {
        let data = decode::<Claims>(token, &self.key(kind).decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?;

        if now.timestamp() > data.claims.exp {
            return Err(TokenError::Expired);
        }

        Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::Malformed)
    }
}
