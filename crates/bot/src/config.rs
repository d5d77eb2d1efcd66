//! Bot configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BOT_TOKEN` - Telegram Bot API token
//!
//! ## Optional
//! - `BOT_HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8080)
//! - `TELEGRAM_API_BASE` - Bot API base URL (default: <https://api.telegram.org>)
//! - `TELEGRAM_WEBHOOK_URL` - Public webhook URL, registered with Telegram at start-up
//! - `TELEGRAM_WEBHOOK_SECRET` - Expected `X-Telegram-Bot-Api-Secret-Token` header
//! - `ADMIN_CHAT_ID` - Chat that receives staff order alerts
//! - `ORDER_COUNTER_FILE` - Counter record path (default: data/order_counter.json)
//! - `COUNTER_PERSIST_TIMEOUT_SECS` - Counter write timeout (default: 5)
//! - `STORE_UTC_OFFSET` - Store time zone offset used for order dates (default: +03:00)
//! - `EMAIL_SHUTDOWN_GRACE_SECS` - How long shutdown waits for queued emails (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text
//!
//! ## Optional (Email - enables staff and customer order emails)
//! - `ADMIN_EMAIL` - Sender address and staff mailbox
//! - `ADMIN_EMAIL_PASSWORD` - SMTP password for `ADMIN_EMAIL`
//! - `SMTP_SERVER` - SMTP server hostname (default: smtp.gmail.com)
//! - `SMTP_PORT` - SMTP port (default: 587)
//! - `SMTP_STARTTLS` - `true` for STARTTLS, `false` for implicit TLS (default: true)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use bakery_orders_core::{ChatId, Email};
use chrono::FixedOffset;
use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_COUNTER_FILE: &str = "data/order_counter.json";
const DEFAULT_STORE_UTC_OFFSET: &str = "+03:00";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
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

/// Bot application configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Telegram Bot API configuration
    pub telegram: TelegramConfig,
    /// Chat that receives staff alerts (optional - staff alert skipped when unset)
    pub admin_chat_id: Option<ChatId>,
    /// Email configuration (optional - email channels skipped when unset)
    pub email: Option<EmailConfig>,
    /// Order sequencing configuration
    pub orders: OrderSequenceConfig,
    /// How long shutdown waits for queued email deliveries
    pub email_shutdown_grace: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Telegram Bot API configuration.
///
/// Implements `Debug` manually to redact the token and webhook secret.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from `@BotFather`
    pub bot_token: SecretString,
    /// Bot API base URL, overridable for a local Bot API server
    pub api_base: String,
    /// Public URL Telegram should deliver updates to
    pub webhook_url: Option<String>,
    /// Shared secret Telegram echoes in `X-Telegram-Bot-Api-Secret-Token`
    pub webhook_secret: Option<SecretString>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("webhook_url", &self.webhook_url)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// STARTTLS on a plain connection (`true`) or implicit TLS (`false`)
    pub starttls: bool,
    /// Sender address, SMTP username and staff mailbox
    pub from_address: Email,
    /// SMTP authentication password
    pub smtp_password: SecretString,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("starttls", &self.starttls)
            .field("from_address", &self.from_address)
            .field("smtp_password", &"[REDACTED]")
            .finish()
    }
}

/// Order numbering configuration.
#[derive(Debug, Clone)]
pub struct OrderSequenceConfig {
    /// Where the counter record is stored
    pub counter_file: PathBuf,
    /// Upper bound on a single counter write
    pub persist_timeout: Duration,
    /// Offset used to decide the calendar date of an order
    pub store_offset: FixedOffset,
}

impl BotConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if the bot token fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("BOT_HOST", "0.0.0.0")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("BOT_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("PORT", "8080")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("PORT".to_string(), e.to_string()))?;

        let telegram = TelegramConfig::from_env()?;
        let admin_chat_id = get_optional_env("ADMIN_CHAT_ID")
            .map(|raw| {
                raw.parse::<ChatId>().map_err(|e| {
                    ConfigError::InvalidEnvVar("ADMIN_CHAT_ID".to_string(), e.to_string())
                })
            })
            .transpose()?;
        let email = EmailConfig::from_env()?;
        let orders = OrderSequenceConfig::from_env()?;
        let email_shutdown_grace = Duration::from_secs(get_parsed_or_default(
            "EMAIL_SHUTDOWN_GRACE_SECS",
            10,
        )?);

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            host,
            port,
            telegram,
            admin_chat_id,
            email,
            orders,
            email_shutdown_grace,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns a reference to the email configuration, if available.
    ///
    /// Returns `None` if `ADMIN_EMAIL` or `ADMIN_EMAIL_PASSWORD` was not set,
    /// which disables both email channels.
    #[must_use]
    pub const fn email(&self) -> Option<&EmailConfig> {
        self.email.as_ref()
    }
}

impl TelegramConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let bot_token = get_required_env("BOT_TOKEN")?;
        validate_secret_strength(&bot_token, "BOT_TOKEN")?;

        let webhook_secret = get_optional_env("TELEGRAM_WEBHOOK_SECRET");
        if let Some(secret) = &webhook_secret {
            validate_webhook_secret(secret)?;
        }

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            api_base: get_env_or_default("TELEGRAM_API_BASE", DEFAULT_TELEGRAM_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            webhook_url: get_optional_env("TELEGRAM_WEBHOOK_URL"),
            webhook_secret: webhook_secret.map(SecretString::from),
        })
    }
}

impl EmailConfig {
    /// Load SMTP configuration.
    ///
    /// Returns `Ok(None)` when neither `ADMIN_EMAIL` nor `ADMIN_EMAIL_PASSWORD`
    /// is set. Setting only the address is tolerated with a warning, since the
    /// address alone cannot send anything.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let address = get_optional_env("ADMIN_EMAIL");
        let password = get_optional_env("ADMIN_EMAIL_PASSWORD");

        let (address, password) = match (address, password) {
            (Some(address), Some(password)) => (address, password),
            (None, None) => return Ok(None),
            (Some(_), None) => {
                tracing::warn!("ADMIN_EMAIL is set without ADMIN_EMAIL_PASSWORD; email disabled");
                return Ok(None);
            }
            (None, Some(_)) => {
                return Err(ConfigError::InvalidEnvVar(
                    "ADMIN_EMAIL".to_string(),
                    "ADMIN_EMAIL_PASSWORD is set but ADMIN_EMAIL is not".to_string(),
                ));
            }
        };

        let from_address = Email::parse(&address)
            .map_err(|e| ConfigError::InvalidEnvVar("ADMIN_EMAIL".to_string(), e.to_string()))?;
        let smtp_port = get_parsed_or_default("SMTP_PORT", 587_u16)?;
        let starttls = parse_bool(&get_env_or_default("SMTP_STARTTLS", "true"))
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "SMTP_STARTTLS".to_string(),
                    "expected true or false".to_string(),
                )
            })?;

        Ok(Some(Self {
            smtp_host: get_env_or_default("SMTP_SERVER", "smtp.gmail.com"),
            smtp_port,
            starttls,
            from_address,
            smtp_password: SecretString::from(password),
        }))
    }
}

impl OrderSequenceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_offset = get_env_or_default("STORE_UTC_OFFSET", DEFAULT_STORE_UTC_OFFSET);
        let store_offset = raw_offset.parse::<FixedOffset>().map_err(|e| {
            ConfigError::InvalidEnvVar("STORE_UTC_OFFSET".to_string(), e.to_string())
        })?;

        Ok(Self {
            counter_file: PathBuf::from(get_env_or_default(
                "ORDER_COUNTER_FILE",
                DEFAULT_COUNTER_FILE,
            )),
            persist_timeout: Duration::from_secs(get_parsed_or_default(
                "COUNTER_PERSIST_TIMEOUT_SECS",
                5,
            )?),
            store_offset,
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

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an optional environment variable, falling back to `default`.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
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
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

/// Telegram only accepts `A-Z`, `a-z`, `0-9`, `_` and `-`, 1 to 256 characters.
fn validate_webhook_secret(secret: &str) -> Result<(), ConfigError> {
    let valid_chars = secret
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if secret.is_empty() || secret.len() > 256 || !valid_chars {
        return Err(ConfigError::InvalidEnvVar(
            "TELEGRAM_WEBHOOK_SECRET".to_string(),
            "must be 1-256 characters of A-Z, a-z, 0-9, _ or -".to_string(),
        ));
    }
    validate_secret_strength(secret, "TELEGRAM_WEBHOOK_SECRET")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_bot_token_shape() {
        // Same shape as a real token: numeric bot id, colon, random suffix
        let entropy = shannon_entropy("7412589630:AAF3kq9ZxYw2LmN8pQr4TuV6sB1cD0eGhJi");
        assert!(entropy > MIN_ENTROPY_BITS_PER_CHAR);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-bot-token-here", "BOT_TOKEN");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("1111111111:aaaaaaaaaaaaaaaa", "BOT_TOKEN");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_webhook_secret_charset() {
        assert!(validate_webhook_secret("k3J_9x-Qw7Lm2Pz8Rt4V").is_ok());
        assert!(validate_webhook_secret("has spaces in it 12345").is_err());
        assert!(validate_webhook_secret("").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_store_offset_parses() {
        let offset: FixedOffset = DEFAULT_STORE_UTC_OFFSET.parse().unwrap();
        assert_eq!(offset.local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn test_socket_addr() {
        let config = BotConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 8080,
            telegram: TelegramConfig {
                bot_token: SecretString::from("123:abc"),
                api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
                webhook_url: None,
                webhook_secret: None,
            },
            admin_chat_id: None,
            email: None,
            orders: OrderSequenceConfig {
                counter_file: PathBuf::from(DEFAULT_COUNTER_FILE),
                persist_timeout: Duration::from_secs(5),
                store_offset: DEFAULT_STORE_UTC_OFFSET.parse().unwrap(),
            },
            email_shutdown_grace: Duration::from_secs(10),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8080);
        assert!(config.email().is_none());
    }

    #[test]
    fn test_telegram_config_debug_redacts_secrets() {
        let config = TelegramConfig {
            bot_token: SecretString::from("7412589630:super-secret-token"),
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            webhook_url: Some("https://bot.example.com/telegram/webhook".to_string()),
            webhook_secret: Some(SecretString::from("hook-secret-value")),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("api.telegram.org"));
        assert!(debug_output.contains("bot.example.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super-secret-token"));
        assert!(!debug_output.contains("hook-secret-value"));
    }

    #[test]
    fn test_email_config_debug_redacts_secrets() {
        let config = EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            starttls: true,
            from_address: Email::parse("orders@example.com").unwrap(),
            smtp_password: SecretString::from("super_secret_smtp_password"),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("smtp.example.com"));
        assert!(debug_output.contains("587"));
        assert!(debug_output.contains("orders@example.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_smtp_password"));
    }
}
