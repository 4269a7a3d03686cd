pub mod accounts;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod response;

use std::sync::Arc;
use std::time::Duration;
use actix_web::{web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use accounts::AccountService;
pub use auth::{AuthGateway, SessionManager, SessionPolicy, TokenCodec};
pub use db::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
pub use media::{CloudinaryUploader, MediaUploader};

/// Health check endpoint handler
/// Returns a JSON response with server status, environment and timestamp
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "environment": state.config.environment,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Registers every route. Shared by the binary and the HTTP tests.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    use accounts::handlers as accounts;
    use auth::handlers as auth;

    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/api/v1/users")
            .route("/register", web::post().to(accounts::register))
            .route("/login", web::post().to(auth::login))
            .route("/logout", web::post().to(auth::logout))
            .route("/refresh-token", web::post().to(auth::refresh))
            .route("/change-password", web::post().to(auth::change_password))
            .route("/current-user", web::get().to(accounts::current_user))
            .route("/update-account", web::patch().to(accounts::update_details))
            .route("/update-images", web::patch().to(accounts::update_images)),
    );
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub sessions: Arc<SessionManager>,
    pub gateway: Arc<AuthGateway>,
    pub accounts: Arc<AccountService>,
}

impl AppState {
    /// Connects to Postgres, applies migrations, and wires the media host.
    pub async fn new(config: Settings) -> Result<Self> {
        let store = PgCredentialStore::new_with_options(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(config.database.acquire_timeout_secs),
        )
        .await?;
        store.migrate().await?;

        let media = CloudinaryUploader::new(&config.media)?;
        Self::with_parts(config, Arc::new(store), Arc::new(media))
    }

    /// Builds the state around caller-supplied collaborators.
    pub fn with_parts(
        config: Settings,
        store: Arc<dyn CredentialStore>,
        media: Arc<dyn MediaUploader>,
    ) -> Result<Self> {
        let codec = Arc::new(TokenCodec::from_settings(&config.auth)?);
        let policy = SessionPolicy::from(&config.auth);

        Ok(Self {
            sessions: Arc::new(SessionManager::new(store.clone(), codec.clone(), policy)),
            gateway: Arc::new(AuthGateway::new(codec, store.clone())),
            accounts: Arc::new(AccountService::new(store, media)),
            config: Arc::new(config),
        })
    }
}
