use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Database pool size (default: `5`).
    pub database_max_connections: u32,
    /// Override path for the question bank file; `None` uses the
    /// embedded bank.
    pub question_bank_path: Option<String>,
    /// JWT token configuration (secret, expiry duration).
    pub jwt: JwtConfig,
    /// Billing webhook configuration.
    pub billing: BillingConfig,
}

/// Billing webhook configuration.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Shared secret for webhook signature verification.
    pub webhook_secret: String,
    /// Allowed clock drift on signed webhook timestamps, in seconds
    /// (default: `300`).
    pub signature_tolerance_secs: i64,
    /// Age in minutes after which a `processing` ledger row counts as
    /// stale (default: `30`).
    pub stale_after_mins: i64,
}

impl BillingConfig {
    /// Load billing configuration from environment variables.
    ///
    /// | Env Var                           | Required | Default |
    /// |-----------------------------------|----------|---------|
    /// | `BILLING_WEBHOOK_SECRET`          | **yes**  | --      |
    /// | `BILLING_SIGNATURE_TOLERANCE_SECS`| no       | `300`   |
    /// | `WEBHOOK_STALE_AFTER_MINS`        | no       | `30`    |
    ///
    /// # Panics
    ///
    /// Panics if `BILLING_WEBHOOK_SECRET` is not set or is empty.
    pub fn from_env() -> Self {
        let webhook_secret = std::env::var("BILLING_WEBHOOK_SECRET")
            .expect("BILLING_WEBHOOK_SECRET must be set in the environment");
        assert!(
            !webhook_secret.is_empty(),
            "BILLING_WEBHOOK_SECRET must not be empty"
        );

        let signature_tolerance_secs: i64 = std::env::var("BILLING_SIGNATURE_TOLERANCE_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("BILLING_SIGNATURE_TOLERANCE_SECS must be a valid i64");

        let stale_after_mins: i64 = std::env::var("WEBHOOK_STALE_AFTER_MINS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("WEBHOOK_STALE_AFTER_MINS must be a valid i64");

        Self {
            webhook_secret,
            signature_tolerance_secs,
            stale_after_mins,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `3000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:3001` |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                    |
    /// | `DATABASE_MAX_CONNECTIONS` | `5`                     |
    /// | `QUESTION_BANK_PATH`       | (embedded bank)         |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3001".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let database_max_connections: u32 = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("DATABASE_MAX_CONNECTIONS must be a valid u32");

        let question_bank_path = std::env::var("QUESTION_BANK_PATH").ok();

        let jwt = JwtConfig::from_env();
        let billing = BillingConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_max_connections,
            question_bank_path,
            jwt,
            billing,
        }
    }
}
