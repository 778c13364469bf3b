//! services/tutor_api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which generative-AI backend the client factory builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AiProvider {
    Gemini,
    OpenAi,
}

impl FromStr for AiProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(AiProvider::Gemini),
            "openai" => Ok(AiProvider::OpenAi),
            other => Err(format!("'{}' is not one of gemini, openai", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub provider: AiProvider,
    /// The system credential; never changes for the lifetime of the process.
    pub system_api_key: Option<String>,
    pub gemini_base_url: String,
    pub chat_model: String,
    pub alerts_model: String,
    pub credential_store_path: PathBuf,
    pub max_attachment_mb: u64,
    pub rate_limit_cooldown: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server Settings ---
        let bind_address_str = var("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = var("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Provider and System Credential ---
        let provider = var("AI_PROVIDER", "gemini")
            .parse::<AiProvider>()
            .map_err(|e| ConfigError::InvalidValue("AI_PROVIDER".to_string(), e))?;

        let key_var = match provider {
            AiProvider::Gemini => "GEMINI_API_KEY",
            AiProvider::OpenAi => "OPENAI_API_KEY",
        };
        let system_api_key = lookup(key_var).filter(|k| !k.trim().is_empty());

        let gemini_base_url = var(
            "GEMINI_BASE_URL",
            "https://generativelanguage.googleapis.com",
        );
        let chat_model = var("CHAT_MODEL", "gemini-2.5-flash");
        let alerts_model = var("ALERTS_MODEL", "gemini-2.5-flash");

        // --- Credential Store and Limits ---
        let credential_store_path = PathBuf::from(var("CREDENTIAL_STORE_PATH", "./.user_api_key"));

        let max_attachment_mb = parse_number(&var("MAX_ATTACHMENT_MB", "10"), "MAX_ATTACHMENT_MB")?;
        let cooldown_secs = parse_number(
            &var("RATE_LIMIT_COOLDOWN_SECS", "60"),
            "RATE_LIMIT_COOLDOWN_SECS",
        )?;

        Ok(Self {
            bind_address,
            log_level,
            provider,
            system_api_key,
            gemini_base_url,
            chat_model,
            alerts_model,
            credential_store_path,
            max_attachment_mb,
            rate_limit_cooldown: Duration::from_secs(cooldown_secs),
        })
    }
}

fn parse_number(raw: &str, key: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}
