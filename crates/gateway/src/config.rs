//! Gateway configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LUMEN_SIGNING_KEY` - Cookie signing key (min 32 chars, high entropy)
//!
//! ## Optional
//! - `LUMEN_HOST` - Bind address (default: 127.0.0.1)
//! - `LUMEN_PORT` - Listen port (default: 8081)
//! - `LUMEN_AUTH_FAILURE` - `by_path`, `unauthorized` or `redirect` (default: `by_path`)
//! - `LUMEN_LOGIN_PATH` - Redirect target for unauthenticated pages (default: /login)
//! - `LUMEN_RATE_LIMIT_PER_MINUTE` - Sustained requests per minute per client (default: 120)
//! - `LUMEN_RATE_LIMIT_BURST` - Burst size per client (default: 60)
//! - `LUMEN_RATE_LIMIT_BY_USER` - Key authenticated clients by role name (default: false)
//! - `LUMEN_MAX_BODY_BYTES` - Largest accepted request body (default: 8 MiB)
//! - `LUMEN_COMPRESSION_THRESHOLD` - Smallest compressed response body (default: 1024)
//! - `LUMEN_CORS_ORIGINS` - Comma-separated allowed origins (default: mirror request)
//! - `LUMEN_CORS_CREDENTIALS` - Allow credentialed CORS (default: true)
//! - `LUMEN_CORS_MAX_AGE` - Preflight cache lifetime in seconds (default: 600)
//! - `LUMEN_STRICT_HTTPS` - Redirect plain HTTP to HTTPS (default: false)
//! - `LUMEN_PUBLIC_HOSTS` - Comma-separated host names HTTPS redirects may target (default: any)
//! - `LUMEN_SAME_SITE` - `lax` or `strict` (default: lax)
//! - `LUMEN_STRICT_NEGOTIATION` - Answer 406 for unsatisfiable `Accept` (default: false)
//! - `LUMEN_CACHE_TTL_SECS` - Permission/metadata cache lifetime (default: 300)
//! - `LUMEN_DIRECTORY_FILE` - JSON seed for the static directory
//! - `LUMEN_LOG_FORMAT` - `pretty` or `json` (default: pretty)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SIGNING_KEY_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Default maximum request body size (8 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Default minimum body size worth compressing.
pub const DEFAULT_COMPRESSION_THRESHOLD: u16 = 1024;

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
    "insert",
    "enter-",
    "put-your",
    "add-your",
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

/// How `authenticate` and `require_auth` reject an unauthenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthFailureMode {
    /// `401 Unauthorized` for `/api/` paths, `302 Found` to the login page otherwise.
    #[default]
    ByPath,
    /// Always `401 Unauthorized`.
    Unauthorized,
    /// Always `302 Found` to the login page.
    Redirect,
}

impl FromStr for AuthFailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "by_path" | "auto" => Ok(Self::ByPath),
            "unauthorized" | "401" => Ok(Self::Unauthorized),
            "redirect" | "302" => Ok(Self::Redirect),
            other => Err(format!("unknown auth failure mode '{other}'")),
        }
    }
}

/// `SameSite` attribute forced onto outgoing cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSitePolicy {
    #[default]
    Lax,
    Strict,
}

impl FromStr for SameSitePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lax" => Ok(Self::Lax),
            "strict" => Ok(Self::Strict),
            other => Err(format!("SameSite must be 'lax' or 'strict', got '{other}'")),
        }
    }
}

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Authentication behavior.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Rejection style for unauthenticated requests.
    pub failure_mode: AuthFailureMode,
    /// Where browsers are sent to log in.
    pub login_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            failure_mode: AuthFailureMode::ByPath,
            login_path: "/login".to_string(),
        }
    }
}

/// Rate limiter quota.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Sustained requests per minute per client.
    pub per_minute: NonZeroU32,
    /// Requests a fresh client may make back to back.
    pub burst: NonZeroU32,
    /// Key authenticated requests by role name instead of client IP.
    pub key_by_user: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: NonZeroU32::new(120).unwrap_or(NonZeroU32::MIN),
            burst: NonZeroU32::new(60).unwrap_or(NonZeroU32::MIN),
            key_by_user: false,
        }
    }
}

/// Cross-origin policy.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins. Empty means "mirror the request origin" (or `*`
    /// when credentials are disabled).
    pub allowed_origins: Vec<String>,
    /// Whether cookies may accompany cross-origin requests.
    pub allow_credentials: bool,
    /// How long browsers may cache a preflight answer.
    pub max_age: Duration,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allow_credentials: true,
            max_age: Duration::from_secs(600),
        }
    }
}

/// Cookie transport rules.
#[derive(Debug, Clone, Default)]
pub struct CookiePolicy {
    /// Redirect plain-HTTP requests to HTTPS (loopback hosts exempt).
    pub strict_https: bool,
    /// Host names HTTPS redirects may point at. Empty trusts the `Host` header.
    pub public_hosts: Vec<String>,
    /// `SameSite` enforced on outgoing cookies.
    pub same_site: SameSitePolicy,
}

/// Content negotiation policy.
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Answer `406 Not Acceptable` when nothing producible is acceptable.
    pub strict: bool,
    /// Media types handlers can produce, in server preference order.
    pub producible: Vec<String>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            strict: false,
            producible: [
                "application/json",
                "text/html",
                "text/plain",
                "text/csv",
                "application/xml",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Headers applied when the handler leaves them unset.
#[derive(Debug, Clone)]
pub struct DefaultHeadersConfig {
    /// Fallback `Content-Type`.
    pub content_type: String,
    /// Fallback `Cache-Control`.
    pub cache_control: String,
}

impl Default for DefaultHeadersConfig {
    fn default() -> Self {
        Self {
            content_type: "application/json; charset=utf-8".to_string(),
            cache_control: "no-store".to_string(),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Process-wide cookie signing key
    pub signing_key: SecretString,
    /// Authentication behavior
    pub auth: AuthConfig,
    /// Rate limiter quota
    pub rate_limit: RateLimitConfig,
    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,
    /// Smallest response body worth compressing
    pub compression_threshold: u16,
    /// Cross-origin policy
    pub cors: CorsConfig,
    /// Cookie transport rules
    pub cookies: CookiePolicy,
    /// Content negotiation policy
    pub negotiation: NegotiationConfig,
    /// Fallback response headers
    pub default_headers: DefaultHeadersConfig,
    /// Lifetime of cached permissions and metadata
    pub cache_ttl: Duration,
    /// JSON seed file for the static directory
    pub directory_file: Option<PathBuf>,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl Default for GatewayConfig {
    /// Development defaults with a freshly generated signing key.
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8081,
            signing_key: generate_signing_key(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            cors: CorsConfig::default(),
            cookies: CookiePolicy::default(),
            negotiation: NegotiationConfig::default(),
            default_headers: DefaultHeadersConfig::default(),
            cache_ttl: Duration::from_secs(300),
            directory_file: None,
            log_format: LogFormat::default(),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the signing key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let signing_key = get_validated_secret("LUMEN_SIGNING_KEY")?;
        validate_signing_key(&signing_key, "LUMEN_SIGNING_KEY")?;

        let defaults = Self::default();

        Ok(Self {
            host: parse_env_or("LUMEN_HOST", defaults.host)?,
            port: parse_env_or("LUMEN_PORT", defaults.port)?,
            signing_key,
            auth: AuthConfig {
                failure_mode: parse_env_or("LUMEN_AUTH_FAILURE", defaults.auth.failure_mode)?,
                login_path: get_env_or_default("LUMEN_LOGIN_PATH", &defaults.auth.login_path),
            },
            rate_limit: RateLimitConfig {
                per_minute: parse_env_or(
                    "LUMEN_RATE_LIMIT_PER_MINUTE",
                    defaults.rate_limit.per_minute,
                )?,
                burst: parse_env_or("LUMEN_RATE_LIMIT_BURST", defaults.rate_limit.burst)?,
                key_by_user: parse_env_or(
                    "LUMEN_RATE_LIMIT_BY_USER",
                    defaults.rate_limit.key_by_user,
                )?,
            },
            max_body_bytes: parse_env_or("LUMEN_MAX_BODY_BYTES", defaults.max_body_bytes)?,
            compression_threshold: parse_env_or(
                "LUMEN_COMPRESSION_THRESHOLD",
                defaults.compression_threshold,
            )?,
            cors: CorsConfig {
                allowed_origins: get_optional_env("LUMEN_CORS_ORIGINS")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
                allow_credentials: parse_env_or(
                    "LUMEN_CORS_CREDENTIALS",
                    defaults.cors.allow_credentials,
                )?,
                max_age: Duration::from_secs(parse_env_or(
                    "LUMEN_CORS_MAX_AGE",
                    defaults.cors.max_age.as_secs(),
                )?),
            },
            cookies: CookiePolicy {
                strict_https: parse_env_or("LUMEN_STRICT_HTTPS", defaults.cookies.strict_https)?,
                public_hosts: get_optional_env("LUMEN_PUBLIC_HOSTS")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
                same_site: parse_env_or("LUMEN_SAME_SITE", defaults.cookies.same_site)?,
            },
            negotiation: NegotiationConfig {
                strict: parse_env_or("LUMEN_STRICT_NEGOTIATION", defaults.negotiation.strict)?,
                producible: defaults.negotiation.producible,
            },
            default_headers: defaults.default_headers,
            cache_ttl: Duration::from_secs(parse_env_or(
                "LUMEN_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
            directory_file: get_optional_env("LUMEN_DIRECTORY_FILE").map(PathBuf::from),
            log_format: parse_env_or("LUMEN_LOG_FORMAT", defaults.log_format)?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Replace the signing key (tests and embedding hosts).
    #[must_use]
    pub fn with_signing_key(mut self, key: impl Into<String>) -> Self {
        self.signing_key = SecretString::from(key.into());
        self
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Raw signing key bytes.
    #[must_use]
    pub fn signing_key_bytes(&self) -> &[u8] {
        self.signing_key.expose_secret().as_bytes()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Generate a random 256-bit key, hex encoded.
fn generate_signing_key() -> SecretString {
    signing_key_from(&mut rand::rng())
}

fn signing_key_from(rng: &mut impl RngCore) -> SecretString {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    SecretString::from(hex::encode(bytes))
}

/// Split a comma-separated list, dropping blanks.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable, falling back to `default`.
fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Validate that a signing key meets minimum length requirements.
fn validate_signing_key(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SIGNING_KEY_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SIGNING_KEY_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
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
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
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

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
