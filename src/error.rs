use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Media error: {0}")]
    MediaError(#[from] MediaError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl AppError {
    /// Message that is safe to show to the caller.
    ///
    /// Store and upstream failures collapse to generic text; their detail
    /// only reaches the logs.
    pub fn client_message(&self) -> String {
        match self {
            AppError::AuthError(e) => e.client_message().to_string(),
            AppError::ValidationError(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::DatabaseError(DatabaseError::NotFound) => "Record not found".to_string(),
            AppError::MediaError(_) => "Could not upload image, please try again later".to_string(),
            AppError::DatabaseError(_) | AppError::ConfigError(_) | AppError::InternalError(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::DatabaseError(DatabaseError::NotFound),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::Conflict(
                "User already exists with this email or username".to_string(),
            ),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::DatabaseError(DatabaseError::ConnectionError(err.to_string()))
            }
            _ => AppError::DatabaseError(DatabaseError::QueryError(err.to_string())),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::DatabaseError(DatabaseError::ConnectionError(err.to_string()))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::MediaError(MediaError::RequestFailed(err.to_string()))
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": self.client_message()
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DatabaseError(DatabaseError::NotFound) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::MediaError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ConfigError(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Authentication failures. All of them surface as 401.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("No credential supplied")]
    Unauthenticated,

    #[error("Password is incorrect")]
    InvalidCredential,

    #[error("Invalid access token")]
    InvalidToken,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token is stale or was already used")]
    TokenReused,
}

impl AuthError {
    /// Stable code for logs. Never sent to the caller.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "AUTH_UNAUTHENTICATED",
            AuthError::InvalidCredential => "AUTH_INVALID_CREDENTIAL",
            AuthError::InvalidToken => "AUTH_INVALID_TOKEN",
            AuthError::InvalidRefreshToken => "AUTH_INVALID_REFRESH_TOKEN",
            AuthError::TokenReused => "AUTH_TOKEN_REUSED",
        }
    }

    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "Unauthorized request",
            AuthError::InvalidCredential => "Password is incorrect",
            AuthError::InvalidToken => "Invalid access token",
            // A reused token must be indistinguishable from any other bad one.
            AuthError::InvalidRefreshToken | AuthError::TokenReused => "Invalid refresh token",
        }
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Record not found")]
    NotFound,
}

impl DatabaseError {
    /// Whether a single retry of an idempotent read is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(self, DatabaseError::ConnectionError(_))
    }
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Upload request failed: {0}")]
    RequestFailed(String),

    #[error("Media host rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Could not read local file: {0}")]
    LocalFile(String),

    #[error("Invalid media host response: {0}")]
    InvalidResponse(String),
}
