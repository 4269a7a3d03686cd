//! Resolves the caller's identity from an access token.
//!
//! The token is read from the `accessToken` cookie first and from an
//! `Authorization: Bearer` header second. When both are present the cookie
//! wins, even if the header carries a valid token and the cookie does not.

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpMessage, HttpRequest};
use futures::future::LocalBoxFuture;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::token::{TokenCodec, TokenKind};
use crate::auth::ACCESS_TOKEN_COOKIE;
use crate::db::{AccountView, CredentialStore};
use crate::error::{AppError, AuthError};
use crate::{AppState, Result};

pub struct AuthGateway {
    codec: Arc<TokenCodec>,
    store: Arc<dyn CredentialStore>,
}

impl AuthGateway {
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn CredentialStore>) -> Self {
        Self { codec, store }
    }

    pub fn extract_access_token(req: &HttpRequest) -> Option<String> {
        if let Some(cookie) = req.cookie(ACCESS_TOKEN_COOKIE) {
            if !cookie.value().is_empty() {
                return Some(cookie.value().to_string());
            }
        }

        req.headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    /// Never reads or writes the refresh token.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<AccountView> {
        let token = token.ok_or(AuthError::Unauthenticated)?;

        let account_id = self.codec.verify(token, TokenKind::Access).map_err(|e| {
            warn!(code = AuthError::InvalidToken.code(), reason = %e, "Access token rejected");
            AuthError::InvalidToken
        })?;

        let account = self.store.find_by_id(account_id).await?.ok_or_else(|| {
            warn!(
                code = AuthError::InvalidToken.code(),
                account_id = %account_id,
                "Access token names an unknown account"
            );
            AuthError::InvalidToken
        })?;

        debug!(account_id = %account_id, "Request authenticated");
        Ok(account.view())
    }
}

/// Extractor for protected handlers. On success the account view is also
/// placed in the request extensions.
#[derive(Debug, Clone)]
pub struct Authenticated(pub AccountView);

impl FromRequest for Authenticated {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, std::result::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or_else(|| AppError::InternalError("application state is not configured".into()))?;
            let token = AuthGateway::extract_access_token(&req);
            let account = state.gateway.authenticate(token.as_deref()).await?;
            req.extensions_mut().insert(account.clone());
            Ok(Authenticated(account))
        })
    }
}
