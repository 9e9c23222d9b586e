//! Configuration loading, validation, and management for groundchat.
//!
//! Loads configuration from `~/.groundchat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.groundchat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion/embedding service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Chat model (or deployment) used for query rewriting and answers
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model (or deployment) used for vector retrieval
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Total context window of the chat model, in tokens
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,

    /// Tokens reserved for the generated answer
    #[serde(default = "default_response_token_limit")]
    pub response_token_limit: u32,

    /// Answer temperature when a request does not override it
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Token counting strategy: "heuristic" or "tiktoken"
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,

    /// Search index configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Retry policy around collaborator calls
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_token_limit() -> usize {
    4096
}
fn default_response_token_limit() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.3
}
fn default_tokenizer() -> String {
    "heuristic".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("token_limit", &self.token_limit)
            .field("response_token_limit", &self.response_token_limit)
            .field("default_temperature", &self.default_temperature)
            .field("tokenizer", &self.tokenizer)
            .field("search", &self.search)
            .field("retry", &self.retry)
            .finish()
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("backend", &self.backend)
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .field("index", &self.index)
            .field("api_version", &self.api_version)
            .field("sourcepage_field", &self.sourcepage_field)
            .field("content_field", &self.content_field)
            .field("embedding_field", &self.embedding_field)
            .field("query_language", &self.query_language)
            .field("query_speller", &self.query_speller)
            .field("semantic_configuration", &self.semantic_configuration)
            .finish()
    }
}

/// Where passages are retrieved from and how the index is laid out.
#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// "azure" or "in_memory"
    #[serde(default = "default_search_backend")]
    pub backend: String,

    /// Search service endpoint, e.g. `https://<service>.search.windows.net`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Query key for the search service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Index name
    #[serde(default = "default_index")]
    pub index: String,

    /// REST API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Field holding the citation key
    #[serde(default = "default_sourcepage_field")]
    pub sourcepage_field: String,

    /// Field holding passage text
    #[serde(default = "default_content_field")]
    pub content_field: String,

    /// Field holding passage embeddings
    #[serde(default = "default_embedding_field")]
    pub embedding_field: String,

    /// Semantic ranker query language
    #[serde(default = "default_query_language")]
    pub query_language: String,

    /// Semantic ranker speller
    #[serde(default = "default_query_speller")]
    pub query_speller: String,

    /// Semantic configuration name on the index
    #[serde(default = "default_semantic_configuration")]
    pub semantic_configuration: String,
}

fn default_search_backend() -> String {
    "azure".into()
}
fn default_index() -> String {
    "gptkbindex".into()
}
fn default_api_version() -> String {
    "2023-11-01".into()
}
fn default_sourcepage_field() -> String {
    "sourcepage".into()
}
fn default_content_field() -> String {
    "content".into()
}
fn default_embedding_field() -> String {
    "embedding".into()
}
fn default_query_language() -> String {
    "en-us".into()
}
fn default_query_speller() -> String {
    "lexicon".into()
}
fn default_semantic_configuration() -> String {
    "default".into()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: default_search_backend(),
            endpoint: None,
            api_key: None,
            index: default_index(),
            api_version: default_api_version(),
            sourcepage_field: default_sourcepage_field(),
            content_field: default_content_field(),
            embedding_field: default_embedding_field(),
            query_language: default_query_language(),
            query_speller: default_query_speller(),
            semantic_configuration: default_semantic_configuration(),
        }
    }
}

/// Retry policy applied around completion and embedding calls.
///
/// The default of a single attempt means no retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-attempt timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.groundchat/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `GROUNDCHAT_API_KEY`, then `OPENAI_API_KEY`
    /// - `GROUNDCHAT_MODEL`
    /// - `AZURE_SEARCH_ENDPOINT`, `AZURE_SEARCH_KEY`, `AZURE_SEARCH_INDEX`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("GROUNDCHAT_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("GROUNDCHAT_MODEL") {
            self.chat_model = model;
        }
        if let Some(endpoint) = lookup("AZURE_SEARCH_ENDPOINT") {
            self.search.endpoint = Some(endpoint);
        }
        if let Some(key) = lookup("AZURE_SEARCH_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(index) = lookup("AZURE_SEARCH_INDEX") {
            self.search.index = index;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".groundchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.response_token_limit as usize >= self.token_limit {
            return Err(ConfigError::ValidationError(format!(
                "response_token_limit ({}) must be smaller than token_limit ({})",
                self.response_token_limit, self.token_limit
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if !matches!(self.tokenizer.as_str(), "heuristic" | "tiktoken") {
            return Err(ConfigError::ValidationError(format!(
                "unknown tokenizer '{}' (expected \"heuristic\" or \"tiktoken\")",
                self.tokenizer
            )));
        }

        if !matches!(self.search.backend.as_str(), "azure" | "in_memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown search backend '{}' (expected \"azure\" or \"in_memory\")",
                self.search.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            token_limit: default_token_limit(),
            response_token_limit: default_response_token_limit(),
            default_temperature: default_temperature(),
            tokenizer: default_tokenizer(),
            search: SearchConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
