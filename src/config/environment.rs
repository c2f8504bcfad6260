use std::env;

/// Environment configuration
/// Loads and validates environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub smtp: SmtpConfig,
    /// Cosine-similarity threshold shared by the enrollment uniqueness check
    /// and the login match check.
    pub face_threshold: f32,
    pub otp_ttl_minutes: i64,
    /// Unverified accounts older than this are swept away.
    pub stale_account_minutes: i64,
    pub sweep_interval_secs: u64,
    pub upload_dir: String,
    pub detector_model_path: String,
    pub embedder_model_path: String,
    pub embedding_dim: usize,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let smtp = SmtpConfig {
            host: env::var("SMTP_SERVER").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            port: parse_var("SMTP_PORT", 587)?,
            username: env::var("SMTP_USERNAME").ok(),
            password: env::var("SMTP_PASSWORD").ok(),
            from_email: env::var("FROM_EMAIL").map_err(|_| "FROM_EMAIL must be set".to_string())?,
        };

        let face_threshold = parse_var("FACE_THRESHOLD", 0.6)?;
        let otp_ttl_minutes = parse_var("OTP_EXPIRY_MINUTES", 10)?;
        let stale_account_minutes = parse_var("STALE_ACCOUNT_MINUTES", 60)?;
        let sweep_interval_secs = parse_var("SWEEP_INTERVAL_SECS", 3600)?;

        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "static/uploads".to_string());

        let detector_model_path = env::var("FACE_DETECTOR_MODEL")
            .map_err(|_| "FACE_DETECTOR_MODEL must be set".to_string())?;
        let embedder_model_path = env::var("FACE_EMBEDDING_MODEL")
            .map_err(|_| "FACE_EMBEDDING_MODEL must be set".to_string())?;
        let embedding_dim = parse_var("EMBEDDING_DIM", 512)?;

        Ok(Self {
            database_url,
            bind_addr,
            smtp,
            face_threshold,
            otp_ttl_minutes,
            stale_account_minutes,
            sweep_interval_secs,
            upload_dir,
            detector_model_path,
            embedder_model_path,
            embedding_dim,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| format!("{} is not a valid value", name)),
        Err(_) => Ok(default),
    }
}
