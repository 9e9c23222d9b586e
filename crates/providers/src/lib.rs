//! Language-model provider implementations for groundchat.
//!
//! All providers implement the `groundchat_core::Provider` trait.
//! [`build_from_config`] assembles the provider the pipeline runs against.

pub mod openai_compat;
pub mod retry;

use std::sync::Arc;

use groundchat_config::AppConfig;
use groundchat_core::Provider;
use groundchat_core::error::ProviderError;

pub use openai_compat::{AuthScheme, OpenAiCompatProvider};
pub use retry::RetryProvider;

/// Build the configured provider, wrapped in the configured retry policy.
///
/// Endpoints on `*.openai.azure.com` are addressed with the `api-key` header;
/// everything else uses bearer authentication.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(
            "No API key configured (set GROUNDCHAT_API_KEY or OPENAI_API_KEY)".into(),
        )
    })?;

    let base: Arc<dyn Provider> = if config.api_url.contains(".openai.azure.com") {
        let endpoint = config
            .api_url
            .split("/openai")
            .next()
            .unwrap_or(&config.api_url);
        Arc::new(OpenAiCompatProvider::azure(endpoint, api_key))
    } else {
        Arc::new(OpenAiCompatProvider::new("openai", &config.api_url, api_key))
    };

    Ok(Arc::new(RetryProvider::from_config(base, &config.retry)))
}
