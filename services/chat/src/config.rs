use docuchat_core::ReconnectPolicy;
use reqwest::Url;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Greeting shown as the first bot message when `CHAT_GREETING` is unset.
pub const DEFAULT_GREETING: &str = "Whispers of wisdom await... Ask your question!";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// WebSocket endpoint of the chat service.
    pub ws_url: String,
    /// Multipart upload endpoint for documents.
    pub upload_url: String,
    pub reconnect: ReconnectPolicy,
    /// First bot message of every session; `None` starts with an empty log.
    pub greeting: Option<String>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let ws_url = std::env::var("CHAT_WS_URL").unwrap_or_else(|_| "ws://localhost:8000/ws".to_string());
        validate_url("CHAT_WS_URL", &ws_url, &["ws", "wss"])?;

        let upload_url = std::env::var("UPLOAD_URL")
            .unwrap_or_else(|_| "http://localhost:8000/upload_pdfs/".to_string());
        validate_url("UPLOAD_URL", &upload_url, &["http", "https"])?;

        let strategy = std::env::var("RECONNECT_STRATEGY").unwrap_or_else(|_| "fixed".to_string());
        let reconnect = match strategy.to_lowercase().as_str() {
            "fixed" => ReconnectPolicy::Fixed(Duration::from_secs(parse_var(
                "RECONNECT_DELAY_SECS",
                5u64,
            )?)),
            "backoff" => {
                let factor: f64 = parse_var("RECONNECT_FACTOR", 2.0)?;
                if !(factor.is_finite() && factor >= 1.0) {
                    return Err(ConfigError::InvalidValue(
                        "RECONNECT_FACTOR".to_string(),
                        format!("'{}' must be a number >= 1", factor),
                    ));
                }
                ReconnectPolicy::Backoff {
                    base: Duration::from_millis(parse_var("RECONNECT_BASE_MS", 1000u64)?),
                    factor,
                    cap: Duration::from_secs(parse_var("RECONNECT_CAP_SECS", 30u64)?),
                }
            }
            other => {
                return Err(ConfigError::InvalidValue(
                    "RECONNECT_STRATEGY".to_string(),
                    format!("'{}' is not 'fixed' or 'backoff'", other),
                ));
            }
        };

        let greeting = match std::env::var("CHAT_GREETING") {
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => Some(text),
            Err(_) => Some(DEFAULT_GREETING.to_string()),
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            ws_url,
            upload_url,
            reconnect,
            greeting,
            log_level,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn validate_url(name: &str, raw: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url =
        Url::parse(raw).map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("scheme '{}' is not one of {:?}", url.scheme(), schemes),
        ));
    }
    Ok(())
}
