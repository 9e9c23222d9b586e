//! `groundchat doctor`: Diagnose configuration and service health.

use groundchat_config::AppConfig;
use groundchat_core::search::{Ranking, SearchRequest};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 groundchat Doctor: System Diagnostics");
    println!("=========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found");
    } else {
        println!("  ⚠️  No config file at {}, using defaults", config_path.display());
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. See above for details.");
            return Ok(());
        }
    };

    // Completion service
    match groundchat_providers::build_from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Model API reachable ({})", config.api_url),
            Ok(false) => {
                println!("  ❌ Model API rejected the health check ({})", config.api_url);
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Model API unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ⚠️  {e}");
            issues += 1;
        }
    }

    // Search index
    match groundchat_search::build_from_config(&config.search) {
        Ok(search) => {
            let probe = SearchRequest {
                text: Some("*".into()),
                filter: None,
                vectors: vec![],
                top: 1,
                ranking: Ranking::Simple,
            };
            match search.search(probe).await {
                Ok(_) => println!("  ✅ Search index reachable ({} / {})", search.name(), config.search.index),
                Err(e) => {
                    println!("  ❌ Search index query failed: {e}");
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  ⚠️  {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
