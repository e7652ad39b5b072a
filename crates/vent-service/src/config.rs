//! Service configuration.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use vent_core::QuotaPolicy;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8000").
    pub listen_addr: String,

    /// PostgreSQL URL. Without one the service runs on the in-memory store.
    pub database_url: Option<String>,

    /// Connection pool size (default: 10).
    pub database_max_connections: u32,

    /// Shared secret of the identity provider's HS256 bearer tokens.
    pub auth_jwt_secret: Option<String>,

    /// Expected bearer token issuer, if enforced.
    pub auth_issuer: Option<String>,

    /// Expected bearer token audience (default: "authenticated").
    pub auth_audience: String,

    /// Key for the admin endpoints.
    pub admin_api_key: Option<String>,

    /// LiveKit server URL handed to clients.
    pub livekit_url: String,

    /// LiveKit API key.
    pub livekit_api_key: Option<String>,

    /// LiveKit API secret.
    pub livekit_api_secret: Option<String>,

    /// Lifetime of issued media tokens in seconds (default: 600).
    pub livekit_token_ttl_seconds: u64,

    /// LiveKit server API URL. Derived from `livekit_url` when unset.
    pub livekit_api_url: Option<String>,

    /// Name of the conversation agent worker dispatched into rooms.
    pub agent_name: String,

    /// Razorpay API base URL.
    pub razorpay_base_url: String,

    /// Razorpay key ID.
    pub razorpay_key_id: Option<String>,

    /// Razorpay key secret.
    pub razorpay_key_secret: Option<String>,

    /// Razorpay webhook secret.
    pub razorpay_webhook_secret: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Deadline for a single storage call in milliseconds.
    pub store_timeout_ms: u64,

    /// Trial allowance in seconds.
    pub trial_seconds: i64,

    /// Sessions open longer than this are reaped.
    pub max_session_seconds: i64,

    /// Days of access kept after a failed charge.
    pub grace_period_days: i64,

    /// Reaper interval in seconds.
    pub reaper_interval_seconds: u64,

    /// Billing sweep interval in seconds.
    pub billing_sweep_interval_seconds: u64,
}

/// LiveKit secrets file structure.
#[derive(Debug, Deserialize)]
struct LiveKitSecrets {
    api_key: String,
    api_secret: String,
    #[serde(default)]
    url: Option<String>,
}

/// Razorpay secrets file structure.
#[derive(Debug, Deserialize)]
struct RazorpaySecrets {
    key_id: String,
    key_secret: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

const DEFAULT_LIVEKIT_URL: &str = "wss://localhost:7880";
const DEFAULT_RAZORPAY_BASE_URL: &str = "https://api.razorpay.com/v1";
const DEFAULT_AGENT_NAME: &str = "vent-agent";

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // Secrets files take precedence over environment variables
        let (livekit_api_key, livekit_api_secret, livekit_url) = load_livekit_secrets();
        let (razorpay_key_id, razorpay_key_secret, razorpay_webhook_secret) =
            load_razorpay_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections),
            auth_jwt_secret: std::env::var("AUTH_JWT_SECRET").ok(),
            auth_issuer: std::env::var("AUTH_ISSUER").ok(),
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or(defaults.auth_audience),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            livekit_url: livekit_url
                .or_else(|| std::env::var("LIVEKIT_URL").ok())
                .unwrap_or(defaults.livekit_url),
            livekit_api_key,
            livekit_api_secret,
            livekit_token_ttl_seconds: env_or("LIVEKIT_TOKEN_TTL_SECONDS", defaults.livekit_token_ttl_seconds),
            livekit_api_url: std::env::var("LIVEKIT_API_URL").ok().filter(|s| !s.is_empty()),
            agent_name: std::env::var("AGENT_NAME").unwrap_or(defaults.agent_name),
            razorpay_base_url: std::env::var("RAZORPAY_BASE_URL")
                .unwrap_or(defaults.razorpay_base_url),
            razorpay_key_id,
            razorpay_key_secret,
            razorpay_webhook_secret,
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_or("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_or("REQUEST_TIMEOUT_SECONDS", defaults.request_timeout_seconds),
            store_timeout_ms: env_or("STORE_TIMEOUT_MS", defaults.store_timeout_ms),
            trial_seconds: env_or("TRIAL_SECONDS", defaults.trial_seconds),
            max_session_seconds: env_or("MAX_SESSION_SECONDS", defaults.max_session_seconds),
            grace_period_days: env_or("GRACE_PERIOD_DAYS", defaults.grace_period_days),
            reaper_interval_seconds: env_or("REAPER_INTERVAL_SECONDS", defaults.reaper_interval_seconds),
            billing_sweep_interval_seconds: env_or(
                "BILLING_SWEEP_INTERVAL_SECONDS",
                defaults.billing_sweep_interval_seconds,
            ),
        }
    }

    /// Trial policy for the usage meter.
    #[must_use]
    pub const fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            trial_seconds: self.trial_seconds,
        }
    }

    /// HTTP(S) URL of the LiveKit server API.
    #[must_use]
    pub fn livekit_api_url(&self) -> String {
        if let Some(url) = &self.livekit_api_url {
            return url.clone();
        }
        if let Some(rest) = self.livekit_url.strip_prefix("wss://") {
            format!("https://{rest}")
        } else if let Some(rest) = self.livekit_url.strip_prefix("ws://") {
            format!("http://{rest}")
        } else {
            self.livekit_url.clone()
        }
    }

    /// Maximum session duration before reaping.
    #[must_use]
    pub fn max_session_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_session_seconds)
    }

    /// Grace period after a failed charge.
    #[must_use]
    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::days(self.grace_period_days)
    }

    /// Deadline for a single storage call.
    #[must_use]
    pub const fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

const SECRET_DIRS: [&str; 3] = [".secrets", "vent/.secrets", "../.secrets"];

/// Load LiveKit secrets from file or environment.
fn load_livekit_secrets() -> (Option<String>, Option<String>, Option<String>) {
    for dir in SECRET_DIRS {
        let path = format!("{dir}/livekit.json");
        if let Ok(secrets) = load_secrets_file::<LiveKitSecrets>(&path) {
            tracing::info!(path = %path, "Loaded LiveKit secrets from file");
            return (Some(secrets.api_key), Some(secrets.api_secret), secrets.url);
        }
    }

    tracing::debug!("LiveKit secrets file not found, using environment variables");
    (
        std::env::var("LIVEKIT_API_KEY").ok(),
        std::env::var("LIVEKIT_API_SECRET").ok(),
        None,
    )
}

/// Load Razorpay secrets from file or environment.
fn load_razorpay_secrets() -> (Option<String>, Option<String>, Option<String>) {
    for dir in SECRET_DIRS {
        let path = format!("{dir}/razorpay.json");
        if let Ok(secrets) = load_secrets_file::<RazorpaySecrets>(&path) {
            tracing::info!(path = %path, "Loaded Razorpay secrets from file");
            return (
                Some(secrets.key_id),
                Some(secrets.key_secret),
                secrets.webhook_secret,
            );
        }
    }

    tracing::debug!("Razorpay secrets file not found, using environment variables");
    (
        std::env::var("RAZORPAY_KEY_ID").ok(),
        std::env::var("RAZORPAY_KEY_SECRET").ok(),
        std::env::var("RAZORPAY_WEBHOOK_SECRET").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".into(),
            database_url: None,
            database_max_connections: 10,
            auth_jwt_secret: None,
            auth_issuer: None,
            auth_audience: "authenticated".into(),
            admin_api_key: None,
            livekit_url: DEFAULT_LIVEKIT_URL.into(),
            livekit_api_key: None,
            livekit_api_secret: None,
            livekit_token_ttl_seconds: 600,
            livekit_api_url: None,
            agent_name: DEFAULT_AGENT_NAME.into(),
            razorpay_base_url: DEFAULT_RAZORPAY_BASE_URL.into(),
            razorpay_key_id: None,
            razorpay_key_secret: None,
            razorpay_webhook_secret: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 8,
            store_timeout_ms: 3000,
            trial_seconds: vent_core::DEFAULT_TRIAL_SECONDS,
            max_session_seconds: 2 * 60 * 60,
            grace_period_days: 7,
            reaper_interval_seconds: 60,
            billing_sweep_interval_seconds: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8000");
        assert_eq!(config.auth_audience, "authenticated");
        assert_eq!(config.max_session_duration(), chrono::Duration::hours(2));
        assert_eq!(config.grace_period(), chrono::Duration::days(7));
        assert_eq!(config.store_timeout(), std::time::Duration::from_secs(3));
        assert_eq!(config.quota_policy().trial_seconds, 600);
    }

    #[test]
    fn livekit_api_url_follows_media_url() {
        let mut config = ServiceConfig {
            livekit_url: "wss://media.example.com".into(),
            ..ServiceConfig::default()
        };
        assert_eq!(config.livekit_api_url(), "https://media.example.com");

        config.livekit_url = "ws://localhost:7880".into();
        assert_eq!(config.livekit_api_url(), "http://localhost:7880");

        config.livekit_api_url = Some("http://livekit.internal:7880".into());
        assert_eq!(config.livekit_api_url(), "http://livekit.internal:7880");
    }

    #[test]
    fn secrets_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("razorpay.json");
        std::fs::write(
            &path,
            r#"{"key_id":"rzp_test_1","key_secret":"s3cret","webhook_secret":"whsec"}"#,
        )
        .unwrap();

        let secrets: RazorpaySecrets = load_secrets_file(path.to_str().unwrap()).unwrap();
        assert_eq!(secrets.key_id, "rzp_test_1");
        assert_eq!(secrets.webhook_secret.as_deref(), Some("whsec"));
    }

    #[test]
    fn missing_secrets_file_is_not_found() {
        let err = load_secrets_file::<LiveKitSecrets>("/nonexistent/livekit.json").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
