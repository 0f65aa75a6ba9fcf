//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `IUTCART_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `JWT_SECRET` - Token signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `IUTCART_HOST` - Bind address (default: 127.0.0.1)
//! - `IUTCART_PORT` - Listen port (default: 5000)
//! - `IUTCART_BASE_URL` - Frontend URL used in reset links (default: <http://localhost:3000>)
//! - `SESSION_TOKEN_TTL_HOURS` - Session token lifetime (default: 720)
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD` - SMTP relay; emails are only logged without `SMTP_HOST`
//! - `EMAIL_FROM` - Sender mailbox (default: `IUTCart <iutcart@gmail.com>`)
//! - `NOTIFICATION_QUEUE_CAPACITY` - Pending email capacity (default: 256)
//! - `NOTIFICATION_ENQUEUE_TIMEOUT_MS` - Wait for queue capacity (default: 500)
//! - `EMAIL_SEND_TIMEOUT_SECS` - Per-email send timeout (default: 10)
//! - `REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `DATABASE_STATEMENT_TIMEOUT_MS` - `PostgreSQL` `statement_timeout` (default: 5000)
//! - `RATE_LIMIT_AUTH` - Rate limit the `/api/users` routes (default: true)
//! - `LOG_FORMAT` - `text` or `json` (default: text)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT` - Sentry error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_EMAIL_FROM: &str = "IUTCart <iutcart@gmail.com>";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration, loaded once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public frontend URL, prefix of password reset links
    pub base_url: String,
    /// Token signing and verification
    pub tokens: TokenConfig,
    /// SMTP relay; `None` logs emails instead of sending them
    pub email: Option<EmailConfig>,
    /// Sender mailbox for every transactional email
    pub email_from: String,
    /// Notification queue sizing and timeouts
    pub notifications: NotificationConfig,
    /// Upper bound on handling one request
    pub request_timeout: Duration,
    /// `PostgreSQL` `statement_timeout`
    pub statement_timeout: Duration,
    /// Whether the auth routes are rate limited per client IP
    pub rate_limit_auth: bool,
    /// Reverse proxies whose `X-Forwarded-For` hops are believed
    pub trusted_proxies: Vec<IpAddr>,
    /// Emit JSON log lines instead of text
    pub json_logs: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Token configuration.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// HMAC secret shared by every token kind
    pub secret: SecretString,
    /// Lifetime of session tokens
    pub session_ttl: Duration,
}

/// SMTP relay configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .finish()
    }
}

/// Notification queue configuration.
#[derive(Debug, Clone, Copy)]
pub struct NotificationConfig {
    /// Emails that may wait for the worker
    pub queue_capacity: usize,
    /// How long a request waits for queue capacity
    pub enqueue_timeout: Duration,
    /// How long the worker waits for one send
    pub send_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            enqueue_timeout: Duration::from_millis(500),
            send_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the JWT secret fails validation (length, placeholder, entropy).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("IUTCART_DATABASE_URL")?;
        let host = parse_env_or_default("IUTCART_HOST", "127.0.0.1")?;
        let port = parse_env_or_default("IUTCART_PORT", "5000")?;
        let base_url = get_env_or_default("IUTCART_BASE_URL", "http://localhost:3000");
        validate_base_url(&base_url, "IUTCART_BASE_URL")?;

        let secret = get_required_secret("JWT_SECRET")?;
        validate_jwt_secret(&secret, "JWT_SECRET")?;
        let session_ttl = session_ttl_from_hours(
            parse_env_or_default("SESSION_TOKEN_TTL_HOURS", "720")?,
            "SESSION_TOKEN_TTL_HOURS",
        )?;

        let notifications = NotificationConfig {
            queue_capacity: parse_env_or_default("NOTIFICATION_QUEUE_CAPACITY", "256")?,
            enqueue_timeout: Duration::from_millis(parse_env_or_default(
                "NOTIFICATION_ENQUEUE_TIMEOUT_MS",
                "500",
            )?),
            send_timeout: Duration::from_secs(parse_env_or_default(
                "EMAIL_SEND_TIMEOUT_SECS",
                "10",
            )?),
        };
        if notifications.queue_capacity == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "NOTIFICATION_QUEUE_CAPACITY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            host,
            port,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens: TokenConfig {
                secret,
                session_ttl,
            },
            email: EmailConfig::from_env()?,
            email_from: get_env_or_default("EMAIL_FROM", DEFAULT_EMAIL_FROM),
            notifications,
            request_timeout: Duration::from_secs(parse_env_or_default(
                "REQUEST_TIMEOUT_SECS",
                "30",
            )?),
            statement_timeout: Duration::from_millis(parse_env_or_default(
                "DATABASE_STATEMENT_TIMEOUT_MS",
                "5000",
            )?),
            rate_limit_auth: parse_env_or_default("RATE_LIMIT_AUTH", "true")?,
            trusted_proxies: parse_ip_list(
                &get_env_or_default("TRUSTED_PROXIES", ""),
                "TRUSTED_PROXIES",
            )?,
            json_logs: get_env_or_default("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// A configuration for in-process tests: no SMTP, no rate limiting and a
    /// fixed signing secret.
    #[cfg(any(test, feature = "test-util"))]
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            database_url: SecretString::from("postgres://localhost/iutcart_test"),
            host: IpAddr::from([127, 0, 0, 1]),
            port: 5000,
            base_url: "http://localhost:3000".to_string(),
            tokens: TokenConfig {
                secret: SecretString::from("kQ8#vT2!pX9@mZ4$rW7&nB5*cF1^hJ6%"),
                session_ttl: Duration::from_secs(3600),
            },
            email: None,
            email_from: DEFAULT_EMAIL_FROM.to_string(),
            notifications: NotificationConfig::default(),
            request_timeout: Duration::from_secs(30),
            statement_timeout: Duration::from_secs(5),
            rate_limit_auth: false,
            trusted_proxies: Vec::new(),
            json_logs: false,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };
        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_env_or_default("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn session_ttl_from_hours(hours: u64, var_name: &str) -> Result<Duration, ConfigError> {
    hours
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidEnvVar(var_name.to_string(), "too large".to_string()))
}

/// Comma separated IP addresses; empty entries are skipped.
fn parse_ip_list(raw: &str, var_name: &str) -> Result<Vec<IpAddr>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| parse_value(var_name, entry))
        .collect()
}

fn validate_base_url(value: &str, var_name: &str) -> Result<(), ConfigError> {
    let url = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            "must have a host".to_string(),
        ));
    }
    Ok(())
}

/// Validate length, placeholder patterns and entropy of the signing secret.
fn validate_jwt_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    validate_secret_strength(value, var_name)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
