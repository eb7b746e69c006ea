//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `BACKEND_API_URL` - Base URL of the commerce backend REST API
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `BACKEND_API_KEY` - Service key sent as `X-Api-Key` (high entropy)
//! - `BACKEND_API_TIMEOUT_SECS` - Upstream request timeout (default: 10)
//! - `PAYMENT_FORM_ORIGIN` - Origin the payment form posts to
//!   (default: <https://rc-epay.esewa.com.np>)
//! - `CHECKOUT_MAX_ATTEMPTS` - Payment attempts per window (default: 5)
//! - `CHECKOUT_WINDOW_MINUTES` - Attempt window length (default: 15)
//! - `CHECKOUT_RESET_LIMIT_ON_SUCCESS` - Clear attempts after an order is
//!   created (default: false)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Trace sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_API_KEY_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Default eSewa form endpoint origin (test environment).
pub const DEFAULT_PAYMENT_FORM_ORIGIN: &str = "https://rc-epay.esewa.com.np";

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

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Commerce backend configuration
    pub backend: BackendConfig,
    /// Payment processor configuration
    pub payment: PaymentConfig,
    /// Checkout attempt limiting
    pub checkout: CheckoutConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Commerce backend REST API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://api.example.com/api/v1/`
    pub api_url: Url,
    /// Optional service key identifying this storefront to the backend
    pub api_key: Option<SecretString>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("api_url", &self.api_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Payment processor configuration.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Origin that payment handoff forms may post to. Also added to the
    /// CSP `form-action` directive.
    pub form_origin: Url,
}

/// Checkout attempt limiting configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Attempts allowed per window
    pub max_attempts: u32,
    /// Window length
    pub window: Duration,
    /// Clear the attempt record once an order has been created
    pub reset_limit_on_success: bool,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
            reset_limit_on_success: false,
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env_or_default::<IpAddr>("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;

        let backend = BackendConfig::from_env()?;
        let payment = PaymentConfig::from_env()?;
        let checkout = CheckoutConfig::from_env()?;

        Ok(Self {
            host,
            port,
            base_url,
            backend,
            payment,
            checkout,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// True when served over HTTPS (secure cookies).
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl BackendConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_url = parse_base_url("BACKEND_API_URL", &get_required_env("BACKEND_API_URL")?)?;

        let api_key = match get_optional_env("BACKEND_API_KEY") {
            Some(value) => {
                let secret = validated_secret(value, "BACKEND_API_KEY")?;
                validate_api_key_length(&secret, "BACKEND_API_KEY")?;
                Some(secret)
            }
            None => None,
        };

        let timeout_secs = parse_env_or_default::<u64>("BACKEND_API_TIMEOUT_SECS", "10")?;

        Ok(Self {
            api_url,
            api_key,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw = get_env_or_default("PAYMENT_FORM_ORIGIN", DEFAULT_PAYMENT_FORM_ORIGIN);
        let form_origin = Url::parse(&raw).map_err(|e| {
            ConfigError::InvalidEnvVar("PAYMENT_FORM_ORIGIN".to_string(), e.to_string())
        })?;
        Ok(Self { form_origin })
    }

    /// The origin as it appears in a CSP source list (`https://host[:port]`).
    #[must_use]
    pub fn csp_source(&self) -> String {
        self.form_origin.origin().ascii_serialization()
    }
}

impl CheckoutConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let max_attempts = parse_env_or_default::<u32>("CHECKOUT_MAX_ATTEMPTS", "5")?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CHECKOUT_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let window_minutes = parse_env_or_default::<u64>("CHECKOUT_WINDOW_MINUTES", "15")?;

        Ok(Self {
            max_attempts,
            window: Duration::from_secs(window_minutes * 60),
            reset_limit_on_success: parse_env_or_default("CHECKOUT_RESET_LIMIT_ON_SUCCESS", "false")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a base URL, ensuring a trailing slash so relative joins append.
fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Validate that an API key meets minimum length requirements.
fn validate_api_key_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_API_KEY_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_API_KEY_LENGTH,
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

/// Validate a secret value and wrap it.
fn validated_secret(value: String, key: &str) -> Result<SecretString, ConfigError> {
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
