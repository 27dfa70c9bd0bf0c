//! Configuration module for the Voice Relay Gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use voice_relay_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use zeroize::Zeroize;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

/// Path of the ConversationRelay socket endpoint
pub const WS_PATH: &str = "/ws";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TRANSCRIPT_DEDUP_TTL_MS: u64 = 3000;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant on a phone call. \
Your replies are converted to speech, so keep them short and conversational. \
Do not use markdown, bullet points, emojis or special characters.";

pub const DEFAULT_WELCOME_GREETING: &str =
    "Hi! I am a voice assistant powered by Twilio and Open A I .";

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required. Put shared values in .env and secrets in .env.local.")]
    Missing(&'static str),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// How eagerly ConversationRelay treats caller speech as an interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptSensitivity {
    Low,
    Medium,
    #[default]
    High,
}

impl InterruptSensitivity {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for InterruptSensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("expected low, medium or high, got '{other}'")),
        }
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server settings (bind host, port, public host name)
/// - Language model settings (API key, model, base URL)
/// - Call settings (system prompt, greeting, interrupt sensitivity)
/// - Compliance feed settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Public host name (no scheme) that Twilio reaches this server on
    pub public_host: String,

    // Language model settings
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,

    // Call settings
    pub system_prompt: String,
    pub welcome_greeting: String,
    pub interrupt_sensitivity: InterruptSensitivity,

    // Compliance feed
    pub transcript_dedup_ttl_ms: u64,
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        self.openai_api_key.zeroize();
    }
}

impl ServerConfig {
    /// Configuration with every optional field at its default.
    pub fn new(public_host: impl Into<String>, openai_api_key: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            public_host: public_host.into(),
            openai_api_key: openai_api_key.into(),
            openai_model: crate::core::llm::openai::OPENAI_DEFAULT_MODEL.to_string(),
            openai_base_url: crate::core::llm::openai::OPENAI_DEFAULT_BASE_URL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            welcome_greeting: DEFAULT_WELCOME_GREETING.to_string(),
            interrupt_sensitivity: InterruptSensitivity::default(),
            transcript_dedup_ttl_ms: DEFAULT_TRANSCRIPT_DEDUP_TTL_MS,
        }
    }

    /// Load configuration from environment variables only
    ///
    /// Expects `.env` / `.env.local` to have been loaded into the process
    /// environment already (done in `main`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public socket URL handed to ConversationRelay
    pub fn ws_url(&self) -> String {
        format!("wss://{}{}", self.public_host, WS_PATH)
    }

    pub fn transcript_dedup_ttl(&self) -> Duration {
        Duration::from_millis(self.transcript_dedup_ttl_ms)
    }
}
