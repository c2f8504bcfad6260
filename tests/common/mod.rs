use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde_json::json;
use sqlx::{MySql, Pool};

use face_auth::config::environment::{Config, SmtpConfig};
use face_auth::modules::auth::model::encode_embedding;
use face_auth::services::email::{EmailError, EmailSender};
use face_auth::services::hashing;
use face_auth::services::recognition::{Embedding, RecognitionError, SignatureExtractor};

// Allow dead_code for utilities used by other test files
#[allow(dead_code)]
pub struct TestContext {
    pub server: TestServer,
    pub db: Pool<MySql>,
    pub state: Arc<face_auth::AppState>,
    pub outbox: Outbox,
    /// Flip on to simulate an SMTP outage.
    pub email_down: Arc<AtomicBool>,
    // Held so saved photos disappear with the test
    upload_dir: tempfile::TempDir,
}

#[allow(dead_code)]
impl TestContext {
    pub async fn new() -> Self {
        Self::with_otp_ttl(10).await
    }

    /// A context whose OTPs are already expired the moment they are issued.
    pub async fn with_expired_otps() -> Self {
        Self::with_otp_ttl(0).await
    }

    pub async fn with_otp_ttl(otp_ttl_minutes: i64) -> Self {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"));

        let db = sqlx::mysql::MySqlPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .expect("Failed to run migrations");

        // Tests are serialized; each starts from an empty dataset
        sqlx::query("DELETE FROM login_history").execute(&db).await.ok();
        sqlx::query("DELETE FROM users").execute(&db).await.ok();

        let upload_dir = tempfile::tempdir().expect("Failed to create upload dir");
        let outbox = Outbox::default();
        let email_down = Arc::new(AtomicBool::new(false));
        let email = Arc::new(RecordingSender {
            outbox: outbox.clone(),
            down: email_down.clone(),
        });

        let config = test_config(
            upload_dir.path().to_string_lossy().into_owned(),
            otp_ttl_minutes,
        );

        let state = face_auth::build_state(db.clone(), Arc::new(StubExtractor), email, config);
        let app = face_auth::create_app_with_state(state.clone());
        let server = TestServer::new(app).expect("Failed to create test server");

        Self {
            server,
            db,
            state,
            outbox,
            email_down,
            upload_dir,
        }
    }

    pub async fn cleanup(&self) {
        sqlx::query("DELETE FROM login_history")
            .execute(&self.db)
            .await
            .ok();
        sqlx::query("DELETE FROM users").execute(&self.db).await.ok();
    }

    /// Marks a session as authenticated without going through the login
    /// flow, for tests whose OTPs are configured to expire instantly.
    pub fn force_session(&self, user_id: i64) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.state.sessions.authenticate(&session_id, user_id);
        session_id
    }

    /// Full two-step login; returns the authenticated session id.
    pub async fn login_session(&self, email: &str, label: &str) -> String {
        let response = self
            .server
            .post("/auth/login")
            .json(&json!({ "email": email, "face_image": face_image(label) }))
            .await;
        response.assert_status(StatusCode::OK);

        let body: serde_json::Value = response.json();
        let session_id = body["session_id"].as_str().expect("session id").to_string();

        let otp = self.outbox.last_otp_for(email).expect("login otp email");
        let (name, value) = session_header(&session_id);
        let response = self
            .server
            .post("/auth/login/verify")
            .add_header(name, value)
            .json(&json!({ "otp": otp }))
            .await;
        response.assert_status(StatusCode::OK);

        session_id
    }
}

fn test_config(upload_dir: String, otp_ttl_minutes: i64) -> Config {
    Config {
        // the pool is injected; the app never dials the database itself
        database_url: String::new(),
        bind_addr: "127.0.0.1:0".to_string(),
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 587,
            username: None,
            password: None,
            from_email: "noreply@test.local".to_string(),
        },
        face_threshold: 0.6,
        otp_ttl_minutes,
        stale_account_minutes: 60,
        sweep_interval_secs: 3600,
        upload_dir,
        detector_model_path: String::new(),
        embedder_model_path: String::new(),
        embedding_dim: STUB_DIM,
    }
}

// =============================================================================
// CAPTURING EMAIL SENDER
// =============================================================================

#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Clone, Default)]
pub struct Outbox(Arc<Mutex<Vec<SentEmail>>>);

#[allow(dead_code)]
impl Outbox {
    /// The 6-digit code from the newest message sent to this address.
    pub fn last_otp_for(&self, email: &str) -> Option<String> {
        let sent = self.0.lock().unwrap();
        sent.iter()
            .rev()
            .find(|m| m.to == email)
            .and_then(|m| extract_otp(&m.text))
    }

    pub fn last_subject_for(&self, email: &str) -> Option<String> {
        let sent = self.0.lock().unwrap();
        sent.iter()
            .rev()
            .find(|m| m.to == email)
            .map(|m| m.subject.clone())
    }

    pub fn count_for(&self, email: &str) -> usize {
        let sent = self.0.lock().unwrap();
        sent.iter().filter(|m| m.to == email).count()
    }
}

fn extract_otp(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|token| token.len() == 6)
        .map(str::to_string)
}

struct RecordingSender {
    outbox: Outbox,
    down: Arc<AtomicBool>,
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        _html_body: &str,
        text_body: &str,
    ) -> Result<(), EmailError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(EmailError::Transport("simulated SMTP outage".to_string()));
        }

        self.outbox.0.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            text: text_body.to_string(),
        });

        Ok(())
    }
}

// =============================================================================
// DETERMINISTIC FACE EXTRACTOR
// =============================================================================

pub const STUB_DIM: usize = 64;

const KNOWN_FACES: &[&str] = &[
    "alice", "bob", "carol", "dave", "erin", "frank", "mallory", "newface",
];

/// One-hot signature per face label: the same label always matches itself
/// (similarity 1.0) and known labels are pairwise orthogonal.
#[allow(dead_code)]
pub fn stub_embedding(label: &str) -> Embedding {
    let index = KNOWN_FACES
        .iter()
        .position(|known| *known == label)
        .unwrap_or_else(|| {
            KNOWN_FACES.len()
                + label.bytes().map(usize::from).sum::<usize>() % (STUB_DIM - KNOWN_FACES.len())
        });

    let mut embedding = vec![0.0; STUB_DIM];
    embedding[index] = 1.0;
    embedding
}

/// Maps the fake image payloads produced by `face_image`/`no_face_image`
/// back to signatures, standing in for the ONNX pipeline.
pub struct StubExtractor;

impl SignatureExtractor for StubExtractor {
    fn extract(&self, image_bytes: &[u8]) -> Result<Option<Embedding>, RecognitionError> {
        let text = String::from_utf8_lossy(image_bytes);
        if text.contains("noface") {
            return Ok(None);
        }
        let label = text.strip_prefix("face:").unwrap_or(&text).to_string();
        Ok(Some(stub_embedding(&label)))
    }
}

// =============================================================================
// REQUEST HELPERS
// =============================================================================

// Helper to generate unique test email
#[allow(dead_code)]
pub fn test_email() -> String {
    format!("test_{}@example.com", uuid::Uuid::new_v4())
}

#[allow(dead_code)]
pub fn test_password() -> &'static str {
    "TestPassword123!"
}

/// A data-URL "photo" the stub extractor resolves to the given face label.
#[allow(dead_code)]
pub fn face_image(label: &str) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        STANDARD.encode(format!("face:{}", label))
    )
}

/// A "photo" in which the stub extractor finds no face.
#[allow(dead_code)]
pub fn no_face_image() -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode("noface"))
}

#[allow(dead_code)]
pub fn session_header(session_id: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-session-id"),
        HeaderValue::from_str(session_id).expect("session id is a valid header value"),
    )
}

/// Inserts an already-activated account directly, bypassing the register
/// flow, for tests that only exercise what comes after activation.
#[allow(dead_code)]
pub async fn seed_verified_user(ctx: &TestContext, name: &str, email: &str, label: &str) -> i64 {
    let password_hash = hashing::hash_password(test_password()).unwrap();
    let embedding = encode_embedding(&stub_embedding(label));

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, embedding, photo_path, is_verified, created_at)
        VALUES (?, ?, ?, ?, NULL, TRUE, ?)
        "#,
    )
    .bind(name)
    .bind(email)
    .bind(&password_hash)
    .bind(&embedding)
    .bind(Utc::now())
    .execute(&ctx.db)
    .await
    .expect("seed user");

    result.last_insert_id() as i64
}
