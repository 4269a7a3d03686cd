use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{error, info};

use crate::accounts::service::RegisterInput;
use crate::auth::Authenticated;
use crate::error::AppError;
use crate::response::ApiResponse;
use crate::AppState;

#[derive(MultipartForm)]
pub struct RegisterForm {
    pub username: Option<Text<String>>,
    pub email: Option<Text<String>>,
    #[multipart(rename = "fullName")]
    pub full_name: Option<Text<String>>,
    pub password: Option<Text<String>>,
    pub avatar: Option<TempFile>,
    #[multipart(rename = "coverImage")]
    pub cover_image: Option<TempFile>,
}

fn text(field: Option<Text<String>>) -> String {
    field.map(|t| t.0).unwrap_or_default()
}

fn temp_path(file: &Option<TempFile>) -> Option<PathBuf> {
    file.as_ref().map(|f| f.file.path().to_path_buf())
}

pub async fn register(
    MultipartForm(form): MultipartForm<RegisterForm>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    // The temp files live until `form` drops, after the uploads finish.
    let avatar = temp_path(&form.avatar);
    let cover_image = temp_path(&form.cover_image);
    let RegisterForm { username, email, full_name, password, .. } = form;
    let input = RegisterInput {
        username: text(username),
        email: text(email),
        full_name: text(full_name),
        password: text(password),
        avatar,
        cover_image,
    };
    info!("Received registration request for username: {}", input.username);

    match state.accounts.register(input).await {
        Ok(account) => {
            info!("Registration successful for username: {}", account.username);
            Ok(HttpResponse::Created().json(ApiResponse::new(
                StatusCode::CREATED,
                account,
                "User registered successfully",
            )))
        }
        Err(e) => {
            error!("Registration failed: {}", e);
            Err(e)
        }
    }
}

pub async fn current_user(Authenticated(account): Authenticated) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(account, "Current user fetched successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDetailsRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

pub async fn update_details(
    Authenticated(account): Authenticated,
    req: web::Json<UpdateDetailsRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let updated = state
        .accounts
        .update_details(
            account.id,
            req.full_name.as_deref().unwrap_or_default(),
            req.email.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(updated, "User details updated successfully")))
}

#[derive(MultipartForm)]
pub struct ImagesForm {
    pub avatar: Option<TempFile>,
    #[multipart(rename = "coverImage")]
    pub cover_image: Option<TempFile>,
}

pub async fn update_images(
    Authenticated(account): Authenticated,
    MultipartForm(form): MultipartForm<ImagesForm>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let updated = state
        .accounts
        .update_images(account.id, temp_path(&form.avatar), temp_path(&form.cover_image))
        .await?;
    drop(form);

    Ok(HttpResponse::Ok().json(ApiResponse::ok(updated, "Profile images updated successfully")))
}
