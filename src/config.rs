//! Runtime configuration for autopress.
//!
//! Process-wide settings (concurrency, ledger location, media fetching,
//! handler credentials) come from environment variables. Campaigns, sites
//! and translation jobs are YAML documents loaded elsewhere.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::providers::HandlerKind;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Connection settings for one capability handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerSettings {
    /// Base URL of the OpenAI-compatible API.
    pub api_base: String,
    /// API key, if the endpoint requires one.
    pub api_key: Option<String>,
    /// Model used for research and text generation.
    pub model: String,
    /// Model used for image generation; `None` disables images.
    pub image_model: Option<String>,
}

impl HandlerSettings {
    /// Built-in defaults for a handler kind.
    pub fn defaults_for(kind: HandlerKind) -> Self {
        let (api_base, model, image_model) = match kind {
            HandlerKind::OpenAi => ("https://api.openai.com/v1", "gpt-4o", Some("dall-e-3")),
            HandlerKind::Anthropic => ("https://api.anthropic.com/v1", "claude-sonnet-4-5", None),
            HandlerKind::Gemini => (
                "https://generativelanguage.googleapis.com/v1beta/openai",
                "gemini-2.0-flash",
                None,
            ),
            HandlerKind::Perplexity => ("https://api.perplexity.ai", "sonar", None),
            HandlerKind::OpenRouter => ("https://openrouter.ai/api/v1", "openrouter/auto", None),
            HandlerKind::Flux => ("", "flux-pro", Some("flux-pro")),
            HandlerKind::StableDiffusion => {
                ("", "stable-diffusion-xl", Some("stable-diffusion-xl"))
            }
        };

        Self {
            api_base: api_base.to_string(),
            api_key: None,
            model: model.to_string(),
            image_model: image_model.map(str::to_string),
        }
    }
}

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Execution settings
    /// Maximum number of work items processed concurrently.
    pub max_concurrency: usize,
    /// Token ceiling for article generation.
    pub generation_max_tokens: u32,

    // Storage settings
    /// Path of the SQLite dedup ledger.
    pub ledger_path: PathBuf,

    // Image settings
    /// Overall deadline for the parallel image fan-out.
    pub image_fanout_timeout: Duration,
    /// Proxy URL template containing `{url}`.
    pub media_proxy_url: Option<String>,
    /// Hosts fetched directly without the proxy.
    pub media_direct_hosts: Vec<String>,
    /// Attempts on the proxy path before giving up.
    pub media_fetch_attempts: u32,
    /// Base delay for exponential backoff on the proxy path.
    pub media_backoff_base: Duration,

    // Observability
    /// Register Prometheus metrics at startup.
    pub metrics_enabled: bool,

    // Handler settings
    /// Enabled handlers and their connection settings.
    pub handlers: HashMap<HandlerKind, HandlerSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            generation_max_tokens: 8192,
            ledger_path: PathBuf::from("./autopress-ledger.db"),
            image_fanout_timeout: Duration::from_secs(45),
            media_proxy_url: None,
            media_direct_hosts: vec![
                "images.unsplash.com".to_string(),
                "images.pexels.com".to_string(),
                "cdn.pixabay.com".to_string(),
                "oaidalleapiprodscus.blob.core.windows.net".to_string(),
            ],
            media_fetch_attempts: 3,
            media_backoff_base: Duration::from_millis(500),
            metrics_enabled: true,
            handlers: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `AUTOPRESS_MAX_CONCURRENCY`: Concurrent work items (default: 4)
    /// - `AUTOPRESS_MAX_TOKENS`: Article token ceiling (default: 8192)
    /// - `AUTOPRESS_LEDGER_PATH`: SQLite ledger path (default: ./autopress-ledger.db)
    /// - `AUTOPRESS_IMAGE_TIMEOUT_SECS`: Image fan-out deadline (default: 45)
    /// - `AUTOPRESS_MEDIA_PROXY_URL`: Proxy template with `{url}` placeholder
    /// - `AUTOPRESS_MEDIA_DIRECT_HOSTS`: Comma-separated hosts fetched directly
    /// - `AUTOPRESS_MEDIA_FETCH_ATTEMPTS`: Proxy attempts (default: 3)
    /// - `AUTOPRESS_MEDIA_BACKOFF_MS`: Backoff base in ms (default: 500)
    /// - `AUTOPRESS_<HANDLER>_API_KEY`, `_API_BASE`, `_MODEL`, `_IMAGE_MODEL`:
    ///   per-handler settings; a handler is enabled when its key or base is set
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values are invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("AUTOPRESS_MAX_CONCURRENCY") {
            config.max_concurrency = parse_env_value(&val, "AUTOPRESS_MAX_CONCURRENCY")?;
        }

        if let Some(val) = lookup("AUTOPRESS_MAX_TOKENS") {
            config.generation_max_tokens = parse_env_value(&val, "AUTOPRESS_MAX_TOKENS")?;
        }

        if let Some(val) = lookup("AUTOPRESS_LEDGER_PATH") {
            config.ledger_path = PathBuf::from(val);
        }

        if let Some(val) = lookup("AUTOPRESS_IMAGE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "AUTOPRESS_IMAGE_TIMEOUT_SECS")?;
            config.image_fanout_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("AUTOPRESS_MEDIA_PROXY_URL") {
            config.media_proxy_url = Some(val).filter(|v| !v.trim().is_empty());
        }

        if let Some(val) = lookup("AUTOPRESS_MEDIA_DIRECT_HOSTS") {
            config.media_direct_hosts = val
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(val) = lookup("AUTOPRESS_MEDIA_FETCH_ATTEMPTS") {
            config.media_fetch_attempts = parse_env_value(&val, "AUTOPRESS_MEDIA_FETCH_ATTEMPTS")?;
        }

        if let Some(val) = lookup("AUTOPRESS_MEDIA_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "AUTOPRESS_MEDIA_BACKOFF_MS")?;
            config.media_backoff_base = Duration::from_millis(ms);
        }

        if let Some(val) = lookup("AUTOPRESS_METRICS") {
            config.metrics_enabled = parse_env_bool(&val, "AUTOPRESS_METRICS")?;
        }

        for kind in HandlerKind::ALL {
            let prefix = kind.env_prefix();
            let api_key = lookup(&format!("{}_API_KEY", prefix));
            let api_base = lookup(&format!("{}_API_BASE", prefix));
            if api_key.is_none() && api_base.is_none() {
                continue;
            }

            let mut settings = HandlerSettings::defaults_for(kind);
            settings.api_key = api_key;
            if let Some(base) = api_base {
                settings.api_base = base;
            }
            if let Some(model) = lookup(&format!("{}_MODEL", prefix)) {
                settings.model = model;
            }
            if let Some(image_model) = lookup(&format!("{}_IMAGE_MODEL", prefix)) {
                settings.image_model = Some(image_model).filter(|m| !m.is_empty());
            }
            config.handlers.insert(kind, settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.generation_max_tokens < 1024 {
            return Err(ConfigError::ValidationFailed(
                "generation_max_tokens must be at least 1024".to_string(),
            ));
        }

        if self.image_fanout_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "image_fanout_timeout must be greater than 0".to_string(),
            ));
        }

        if self.media_fetch_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "media_fetch_attempts must be greater than 0".to_string(),
            ));
        }

        if let Some(ref proxy) = self.media_proxy_url {
            if !proxy.contains("{url}") {
                return Err(ConfigError::ValidationFailed(
                    "media_proxy_url must contain a {url} placeholder".to_string(),
                ));
            }
        }

        if self.ledger_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "ledger_path cannot be empty".to_string(),
            ));
        }

        for (kind, settings) in &self.handlers {
            if settings.api_base.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} handler requires {}_API_BASE",
                    kind,
                    kind.env_prefix()
                )));
            }
        }

        Ok(())
    }

    /// Builder method to set max concurrency.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Builder method to set the ledger path.
    pub fn with_ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = path.into();
        self
    }

    /// Builder method to set the media proxy template.
    pub fn with_media_proxy_url(mut self, url: impl Into<String>) -> Self {
        self.media_proxy_url = Some(url.into());
        self
    }

    /// Builder method to set the image fan-out timeout.
    pub fn with_image_fanout_timeout(mut self, timeout: Duration) -> Self {
        self.image_fanout_timeout = timeout;
        self
    }

    /// Builder method to enable a handler.
    pub fn with_handler(mut self, kind: HandlerKind, settings: HandlerSettings) -> Self {
        self.handlers.insert(kind, settings);
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
