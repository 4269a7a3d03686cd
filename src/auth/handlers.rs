use actix_web::cookie::Cookie;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::auth::gateway::Authenticated;
use crate::auth::session::SessionTokens;
use crate::auth::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::error::AppError;
use crate::response::ApiResponse;
use crate::AppState;

fn token_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .secure(true)
        .finish()
}

/// Response with both token cookies set to the same strings as the body.
fn with_token_cookies<T: serde::Serialize>(tokens: &SessionTokens, body: ApiResponse<T>) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(token_cookie(ACCESS_TOKEN_COOKIE, tokens.access_token.clone()))
        .cookie(token_cookie(REFRESH_TOKEN_COOKIE, tokens.refresh_token.clone()))
        .json(body)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let identifier = req.username.as_deref().or(req.email.as_deref()).unwrap_or_default();
    info!("Received login request for: {}", identifier);

    match state
        .sessions
        .login(
            req.username.as_deref(),
            req.email.as_deref(),
            req.password.as_deref().unwrap_or_default(),
        )
        .await
    {
        Ok(outcome) => {
            info!("Login successful for: {}", identifier);
            let tokens = outcome.tokens.clone();
            Ok(with_token_cookies(
                &tokens,
                ApiResponse::ok(outcome, "User logged in successfully"),
            ))
        }
        Err(e) => {
            error!("Login failed for: {}: {}", identifier, e);
            Err(e)
        }
    }
}

pub async fn logout(
    Authenticated(account): Authenticated,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.sessions.logout(account.id).await?;

    let mut response = HttpResponse::Ok().json(ApiResponse::ok(json!({}), "User logged out"));
    for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
        response
            .add_removal_cookie(&token_cookie(name, String::new()))
            .map_err(|e| AppError::InternalError(e.to_string()))?;
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// The `refreshToken` cookie is preferred over the JSON body field.
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let incoming = req
        .cookie(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| body.and_then(|b| b.into_inner().refresh_token));

    let tokens = state.sessions.refresh(incoming.as_deref()).await?;
    Ok(with_token_cookies(
        &tokens,
        ApiResponse::ok(tokens.clone(), "Access token refreshed"),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

pub async fn change_password(
    Authenticated(account): Authenticated,
    req: web::Json<ChangePasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state
        .sessions
        .change_password(
            account.id,
            req.old_password.as_deref().unwrap_or_default(),
            req.new_password.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(json!({}), "Password changed successfully")))
}
