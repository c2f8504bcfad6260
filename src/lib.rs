pub mod config;
pub mod modules;
pub mod services;

use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use config::environment::Config;
use config::DbPool;
use modules::account::account_routes;
use modules::auth::auth_routes;
use services::email::EmailSender;
use services::otp::OtpChallengeManager;
use services::photos::PhotoStore;
use services::recognition::SignatureExtractor;
use services::security::security_headers;
use services::session::SessionStore;

pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub extractor: Arc<dyn SignatureExtractor>,
    pub email: Arc<dyn EmailSender>,
    pub photos: PhotoStore,
    pub sessions: SessionStore,
    pub challenges: OtpChallengeManager,
}

pub fn build_state(
    db: DbPool,
    extractor: Arc<dyn SignatureExtractor>,
    email: Arc<dyn EmailSender>,
    config: Config,
) -> Arc<AppState> {
    Arc::new(AppState {
        photos: PhotoStore::new(&config.upload_dir),
        sessions: SessionStore::default(),
        challenges: OtpChallengeManager::new(config.otp_ttl_minutes),
        db,
        extractor,
        email,
        config,
    })
}

pub async fn create_app(
    db: DbPool,
    extractor: Arc<dyn SignatureExtractor>,
    email: Arc<dyn EmailSender>,
    config: Config,
) -> Router {
    create_app_with_state(build_state(db, extractor, email, config))
}

pub fn create_app_with_state(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/auth", auth_routes())
        .nest("/account", account_routes())
        .layer(middleware::from_fn(security_headers))
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 5)) // 5MB: base64 camera frames are big
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "Face Authentication API"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
