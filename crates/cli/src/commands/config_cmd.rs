//! `groundchat config`: Configuration management commands.

use groundchat_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   API:        {}", config.api_url);
            println!("   Chat model: {} ({} tokens)", config.chat_model, config.token_limit);
            println!("   Embeddings: {}", config.embedding_model);
            println!("   Tokenizer:  {}", config.tokenizer);
            println!(
                "   Search:     {} / {}",
                config.search.backend, config.search.index
            );
            println!("   Retries:    {}", config.retry.max_attempts);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Non-fatal problems with an otherwise valid configuration.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if !config.has_api_key() {
        warnings.push("No API key set (set GROUNDCHAT_API_KEY or OPENAI_API_KEY env var)");
    }

    if config.search.backend == "azure" && config.search.endpoint.is_none() {
        warnings.push("Azure search backend selected but no endpoint set (AZURE_SEARCH_ENDPOINT)");
    }

    if config.search.backend == "in_memory" {
        warnings.push("In-memory search backend starts empty; pass --documents to `ask`");
    }

    warnings
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    // Secrets stay out of terminal output.
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    if config.search.api_key.is_some() {
        config.search.api_key = Some("[REDACTED]".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
