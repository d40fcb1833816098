//! Application-wide configuration and constants.
//!
//! This module centralizes all configuration values, whether loaded from environment
//! variables or defined as constants.

use figment::{
    providers::{Env, Format, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

/// Service metadata reported by the root endpoint.
pub mod service {
    /// Human readable service name
    pub const TITLE: &str = "Indic-Seamless Speech-to-Text Service";

    /// One-line description
    pub const DESCRIPTION: &str =
        "A REST API service for speech-to-text conversion using a SeamlessM4T v2 model";

    /// Service version
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Audio processing constants
pub mod audio {
    /// Sample rate the speech model expects
    pub const SAMPLE_RATE: u32 = 16000;

    /// Upload extensions accepted by the transcription endpoint
    pub const ALLOWED_EXTENSIONS: [&str; 5] = ["wav", "mp3", "flac", "m4a", "ogg"];

    /// Default maximum upload size (50 MiB)
    pub const MAX_CONTENT_LENGTH: usize = 50 * 1024 * 1024;

    /// Extra body bytes allowed on top of the upload cap for multipart framing
    pub const MULTIPART_OVERHEAD: usize = 64 * 1024;
}

/// Model defaults
pub mod model {
    /// Registry identifier of the default model
    pub const DEFAULT_MODEL_NAME: &str = "ai4bharat/indic-seamless";

    /// Target language used when the form omits one
    pub const DEFAULT_TARGET_LANGUAGE: &str = "English";

    /// Upper bound on generated tokens per request
    pub const MAX_NEW_TOKENS: usize = 256;
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_log_level() -> String { "info".to_string() }
fn default_model_name() -> String { model::DEFAULT_MODEL_NAME.to_string() }
fn default_max_content_length() -> usize { audio::MAX_CONTENT_LENGTH }
fn default_target_sample_rate() -> u32 { audio::SAMPLE_RATE }
fn default_cors_allow_origins() -> Vec<String> { vec!["*".to_string()] }
fn default_max_new_tokens() -> usize { model::MAX_NEW_TOKENS }
fn default_true() -> bool { true }

/// Application configuration loaded from multiple sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Verbose logging and human readable log output
    #[serde(default)]
    pub debug: bool,

    /// Log level filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Model Configuration
    /// Registry identifier of the speech model
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Local cache directory for registry downloads (registry default if unset)
    #[serde(default)]
    pub model_cache_dir: Option<PathBuf>,

    /// Access token for gated registry repositories
    #[serde(default, skip_serializing)]
    pub hf_token: Option<String>,

    /// Memory ceiling in MiB used to pick a loading strategy (detected if unset)
    #[serde(default)]
    pub max_memory_mb: Option<u64>,

    /// Never use an accelerator even if one is present
    #[serde(default)]
    pub force_cpu: bool,

    /// Upper bound on generated tokens per request
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    /// Load the model in the background at startup instead of on first request
    #[serde(default)]
    pub eager_load: bool,

    /// Whether `GET /health` makes a best-effort load attempt
    #[serde(default = "default_true")]
    pub health_triggers_load: bool,

    // Audio Processing Configuration
    /// Maximum upload size in bytes
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Sample rate audio is resampled to before feature extraction
    #[serde(default = "default_target_sample_rate")]
    pub target_sample_rate: u32,

    // HTTP Configuration
    /// Allowed CORS origins; `*` allows any origin
    #[serde(default = "default_cors_allow_origins")]
    pub cors_allow_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
            log_level: default_log_level(),
            model_name: default_model_name(),
            model_cache_dir: None,
            hf_token: None,
            max_memory_mb: None,
            force_cpu: false,
            max_new_tokens: default_max_new_tokens(),
            eager_load: false,
            health_triggers_load: true,
            max_content_length: default_max_content_length(),
            target_sample_rate: default_target_sample_rate(),
            cors_allow_origins: default_cors_allow_origins(),
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with precedence:
    /// 1. Unprefixed environment variables (highest priority)
    /// 2. `STT_`-prefixed environment variables
    /// 3. config.yaml (if exists)
    /// 4. config.toml (if exists)
    /// 5. Built-in defaults (lowest priority)
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// The layered figment used by [`Config::load`].
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Yaml::file("config.yaml"))
            .merge(Env::prefixed("STT_"))
            .merge(Env::raw().only(&[
                "HOST",
                "PORT",
                "DEBUG",
                "LOG_LEVEL",
                "MODEL_NAME",
                "MODEL_CACHE_DIR",
                "HF_TOKEN",
                "MAX_CONTENT_LENGTH",
                "TARGET_SAMPLE_RATE",
                "MAX_MEMORY_MB",
                "FORCE_CPU",
                "MAX_NEW_TOKENS",
                "EAGER_LOAD",
            ]))
    }

    /// Extract and validate a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| AppError::Configuration(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Socket address string the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Total request body limit including multipart framing.
    pub fn body_limit(&self) -> usize {
        self.max_content_length.saturating_add(audio::MULTIPART_OVERHEAD)
    }

    /// Whether CORS should allow every origin.
    pub fn cors_is_permissive(&self) -> bool {
        self.cors_allow_origins.is_empty() || self.cors_allow_origins.iter().any(|o| o == "*")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(AppError::Configuration("HOST cannot be empty".to_string()));
        }

        if self.port == 0 {
            return Err(AppError::Configuration(
                "PORT must be between 1 and 65535".to_string(),
            ));
        }

        if self.model_name.trim().is_empty() {
            return Err(AppError::Configuration(
                "MODEL_NAME cannot be empty".to_string(),
            ));
        }

        if self.max_content_length == 0 {
            return Err(AppError::Configuration(
                "MAX_CONTENT_LENGTH must be greater than zero".to_string(),
            ));
        }

        if !(8_000..=48_000).contains(&self.target_sample_rate) {
            return Err(AppError::Configuration(
                "TARGET_SAMPLE_RATE must be between 8000 and 48000 Hz".to_string(),
            ));
        }

        if self.max_new_tokens == 0 {
            return Err(AppError::Configuration(
                "MAX_NEW_TOKENS must be greater than zero".to_string(),
            ));
        }

        if let Some(path) = &self.model_cache_dir {
            if path.to_string_lossy().contains('\0') {
                return Err(AppError::Configuration(
                    "MODEL_CACHE_DIR contains null bytes".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Export configuration to TOML format
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AppError::Configuration(format!("Failed to serialize to TOML: {}", e)))
    }
}
