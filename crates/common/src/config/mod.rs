//! Configuration management for MedRAG services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - The flat variable names of the deployed service (AZURE_OPENAI_ENDPOINT, AI_SEARCH_KEY, ...)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values
//!
//! The loaded [`AppConfig`] is immutable and validated once at startup;
//! components receive the sections they need at construction time.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Azure OpenAI (generation + grounded retrieval) configuration
    pub openai: OpenAIConfig,

    /// Azure AI Search data source configuration
    pub search: SearchConfig,

    /// Chat pipeline behavior
    #[serde(default)]
    pub chat: ChatConfig,

    /// Translation service configuration
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Audio collaborator (blob storage + speech-to-text), optional
    #[serde(default)]
    pub audio: Option<AudioConfig>,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes (audio uploads included)
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Maximum prompt length in characters
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAIConfig {
    /// Full chat-completions URL of the deployment
    pub endpoint: String,

    /// Value of the `api-key` header
    pub api_key: String,

    /// Fine-tuned model used by the response composer
    #[serde(default)]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Enable retries with exponential backoff
    #[serde(default = "default_retry_enabled")]
    pub enabled: bool,

    /// First backoff interval in milliseconds
    #[serde(default = "default_retry_initial_interval")]
    pub initial_interval_ms: u64,

    /// Upper bound for a single backoff interval in milliseconds
    #[serde(default = "default_retry_max_interval")]
    pub max_interval_ms: u64,

    /// Total time budget for all attempts in milliseconds
    #[serde(default = "default_retry_max_elapsed")]
    pub max_elapsed_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Azure AI Search endpoint
    pub endpoint: String,

    /// Semantic configuration name
    pub semantic_configuration: String,

    /// Search admin/query key
    pub key: String,

    /// Index name
    pub index: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatVariant {
    /// Patient-facing chatbot: redaction, refinement, composed answer
    Patient,
    /// Clinician-facing assistant: translation, grounded answer, citations
    Clinician,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationMode {
    /// Parse citation content as typed fields, render HTML at the end
    Structured,
    /// Render HTML first, then mine the fields back out of it
    Legacy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    /// Deployment variant
    #[serde(default = "default_variant")]
    pub variant: ChatVariant,

    /// Number of past turns forwarded to the model
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// How citations are extracted
    #[serde(default = "default_citation_mode")]
    pub citation_mode: CitationMode,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranslationConfig {
    /// Enable translation (clinician variant only)
    #[serde(default = "default_translation_enabled")]
    pub enabled: bool,

    /// Translation REST endpoint
    #[serde(default = "default_translation_endpoint")]
    pub endpoint: String,

    /// API key for the translation endpoint
    pub api_key: Option<String>,

    /// Target language code
    #[serde(default = "default_translation_target")]
    pub target: String,

    /// Request timeout in seconds
    #[serde(default = "default_translation_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// Storage account URL, e.g. https://account.blob.core.windows.net
    pub blob_account_url: String,

    /// Shared access signature (query string without the leading '?')
    pub blob_sas_token: String,

    /// Container for uploaded recordings
    #[serde(default = "default_audio_container")]
    pub audio_container: String,

    /// Speech service subscription key
    pub speech_key: String,

    /// Speech service region, e.g. koreacentral
    pub speech_region: String,

    /// Recognition language
    #[serde(default = "default_speech_language")]
    pub speech_language: String,

    /// Request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (debug, info, warn, error or an EnvFilter string)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 90 }
fn default_body_limit() -> usize { 10 * 1024 * 1024 }
fn default_max_prompt_chars() -> u64 { 4000 }
fn default_upstream_timeout() -> u64 { 30 }
fn default_retry_enabled() -> bool { true }
fn default_retry_initial_interval() -> u64 { 200 }
fn default_retry_max_interval() -> u64 { 2_000 }
fn default_retry_max_elapsed() -> u64 { 5_000 }
fn default_variant() -> ChatVariant { ChatVariant::Patient }
fn default_history_window() -> usize { crate::context::DEFAULT_HISTORY_WINDOW }
fn default_citation_mode() -> CitationMode { CitationMode::Structured }
fn default_translation_enabled() -> bool { true }
fn default_translation_endpoint() -> String {
    "https://translation.googleapis.com/language/translate/v2".to_string()
}
fn default_translation_target() -> String { "en".to_string() }
fn default_translation_timeout() -> u64 { 10 }
fn default_audio_container() -> String { "audio-files".to_string() }
fn default_speech_language() -> String { "ko-KR".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "medrag".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

/// Flat environment variable names used by the deployed service, mapped
/// onto configuration keys. Later entries win when several are set.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("AZURE_OPENAI_ENDPOINT", "openai.endpoint"),
    ("AZURE_OPENAI_KEY", "openai.api_key"),
    ("AZURE_OPENAI_API_KEY", "openai.api_key"),
    ("AZURE_OPENAI_DEPLOYMENT", "openai.model"),
    ("FINE_TUNED_MODEL", "openai.model"),
    ("AI_SEARCH_ENDPOINT", "search.endpoint"),
    ("AI_SEARCH_SEMANTIC", "search.semantic_configuration"),
    ("AI_SEARCH_KEY", "search.key"),
    ("AI_SEARCH_INDEX", "search.index"),
    ("PORT", "server.port"),
    ("BLOB_ACCOUNT_URL", "audio.blob_account_url"),
    ("BLOB_SAS_TOKEN", "audio.blob_sas_token"),
    ("SPEECH_API_KEY", "audio.speech_key"),
    ("SPEECH_REGION", "audio.speech_region"),
    ("GOOGLE_TRANSLATE_API_KEY", "translation.api_key"),
];

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let mut builder = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            );

        for (var, key) in LEGACY_ENV {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        builder.build()?.try_deserialize()
    }

    /// Reject configurations that would only fail on the first request
    pub fn validate(&self) -> Result<()> {
        let mut required = vec![
            ("openai.endpoint", &self.openai.endpoint),
            ("openai.api_key", &self.openai.api_key),
            ("search.endpoint", &self.search.endpoint),
            ("search.semantic_configuration", &self.search.semantic_configuration),
            ("search.key", &self.search.key),
            ("search.index", &self.search.index),
        ];
        if self.chat.variant == ChatVariant::Patient {
            required.push(("openai.model", &self.openai.model));
        }
        if let Some(audio) = &self.audio {
            required.push(("audio.blob_account_url", &audio.blob_account_url));
            required.push(("audio.blob_sas_token", &audio.blob_sas_token));
            required.push(("audio.speech_key", &audio.speech_key));
            required.push(("audio.speech_region", &audio.speech_region));
        }

        if let Some((key, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(AppError::Configuration {
                message: format!("{} must be set", key),
            });
        }

        if !(1..=120).contains(&self.openai.timeout_secs) {
            return Err(AppError::Configuration {
                message: format!(
                    "openai.timeout_secs must be between 1 and 120, got {}",
                    self.openai.timeout_secs
                ),
            });
        }

        if self.chat.variant == ChatVariant::Clinician
            && self.translation.enabled
            && self.translation.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(AppError::Configuration {
                message: "translation.api_key must be set for the clinician variant \
                          (or set translation.enabled = false)"
                    .to_string(),
            });
        }

        // The patient turn makes two completion calls back to back; an audio
        // transcription downloads and then recognizes.
        let mut budget = self.openai.upstream_budget() * 2;
        if let Some(audio) = &self.audio {
            budget = budget.max(Duration::from_secs(audio.timeout_secs) * 2);
        }
        if self.request_timeout() <= budget {
            return Err(AppError::Configuration {
                message: format!(
                    "server.request_timeout_secs ({}s) must exceed the upstream budget of {}s",
                    self.server.request_timeout_secs,
                    budget.as_secs_f64()
                ),
            });
        }

        if self.chat.history_window == 0 {
            return Err(AppError::Configuration {
                message: "chat.history_window must be at least 1".to_string(),
            });
        }

        if self.rate_limit.enabled
            && (self.rate_limit.requests_per_second == 0 || self.rate_limit.burst == 0)
        {
            return Err(AppError::Configuration {
                message: "rate_limit.requests_per_second and rate_limit.burst must be positive"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl OpenAIConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Longest a single completion call can take, retries included
    pub fn upstream_budget(&self) -> Duration {
        let retries = if self.retry.enabled { self.retry.max_elapsed_ms } else { 0 };
        self.timeout() + Duration::from_millis(retries)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            body_limit_bytes: default_body_limit(),
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_retry_enabled(),
            initial_interval_ms: default_retry_initial_interval(),
            max_interval_ms: default_retry_max_interval(),
            max_elapsed_ms: default_retry_max_elapsed(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            history_window: default_history_window(),
            citation_mode: default_citation_mode(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: default_translation_enabled(),
            endpoint: default_translation_endpoint(),
            api_key: None,
            target: default_translation_target(),
            timeout_secs: default_translation_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            openai: OpenAIConfig {
                endpoint: String::new(),
                api_key: String::new(),
                model: String::new(),
                timeout_secs: default_upstream_timeout(),
                retry: RetryConfig::default(),
            },
            search: SearchConfig {
                endpoint: String::new(),
                semantic_configuration: String::new(),
                key: String::new(),
                index: String::new(),
            },
            chat: ChatConfig::default(),
            translation: TranslationConfig::default(),
            audio: None,
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
