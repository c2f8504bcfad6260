use std::path::Path;
use std::sync::Arc;

use face_auth::config::{environment::Config, init_db};
use face_auth::services::email::SmtpSender;
use face_auth::services::photos::PhotoStore;
use face_auth::services::recognition::extractor::OnnxExtractor;
use face_auth::services::sweep::StaleAccountSweeper;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "face_auth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load environment configuration");

    let db = init_db(&config.database_url).await;
    tracing::info!("Connected to MySQL");

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("Failed to run database migrations");

    let extractor = Arc::new(
        OnnxExtractor::new(
            Path::new(&config.detector_model_path),
            Path::new(&config.embedder_model_path),
            config.embedding_dim,
        )
        .expect("Failed to load face models"),
    );
    tracing::info!("Face models loaded");

    let email = Arc::new(SmtpSender::new(&config.smtp).expect("Failed to configure SMTP transport"));

    let sweeper = StaleAccountSweeper::new(
        db.clone(),
        PhotoStore::new(&config.upload_dir),
        config.stale_account_minutes,
        config.sweep_interval_secs,
    );
    tokio::spawn(async move { sweeper.run().await });

    let bind_addr = config.bind_addr.clone();
    let app = face_auth::create_app(db, extractor, email, config).await;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    tracing::info!("Server running on http://{}", bind_addr);
    axum::serve(listener, app).await.unwrap();
}
