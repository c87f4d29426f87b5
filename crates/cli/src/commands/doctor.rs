//! `banter doctor`: Diagnose configuration without calling any provider.

use std::path::Path;
use std::process::ExitCode;

use banter_config::{AppConfig, ConfigError, IndexBackend};
use banter_engine::ResponseEngine;
use banter_providers::registry::build_provider;

pub async fn run(
    explicit_path: Option<&Path>,
    config: Result<AppConfig, ConfigError>,
) -> anyhow::Result<ExitCode> {
    println!("🩺 Banter Doctor — Configuration Diagnostics");
    println!("============================================\n");

    let mut issues = 0;

    let config_path = explicit_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    let config = match config {
        Ok(config) => {
            if config_path.exists() {
                println!("  ✅ Config file valid ({})", config_path.display());
            } else {
                println!("  ℹ️  No config file at {}, using defaults", config_path.display());
            }
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 issue found. See above for details.");
            return Ok(ExitCode::FAILURE);
        }
    };

    // Providers, in fallback order
    for entry in &config.providers {
        if build_provider(entry).is_some() {
            println!("  ✅ Provider {} ({}, {}s timeout)", entry.name, entry.model, entry.timeout_secs);
        } else {
            println!(
                "  ⚠️  Provider {} skipped — set {} or api_key",
                entry.name,
                entry.kind.api_key_env()
            );
        }
    }

    // Memory
    if !config.retrieval.enabled || config.vector_index.backend == IndexBackend::None {
        println!("  ℹ️  Memory retrieval disabled");
    }

    match ResponseEngine::from_config(&config) {
        Ok(engine) => {
            let live = engine.liveness();
            let ready = engine.readiness().await;

            for provider in ready.providers.iter().filter(|p| !p.healthy) {
                println!(
                    "  ❌ Provider {} not ready: {}",
                    provider.name,
                    provider.error.as_deref().unwrap_or("health check failed")
                );
                issues += 1;
            }

            if let Some(memory) = &ready.memory {
                if memory.healthy {
                    println!("  ✅ Memory: {} index, {} embedder", memory.index, memory.embedder);
                } else {
                    println!("  ⚠️  Memory index {} not ready, generations will run without memories", memory.index);
                }
            }

            if ready.ready {
                println!(
                    "  ✅ Fallback chain: {} (up to {}ms)",
                    live.providers.join(" → "),
                    ready.chain_timeout_ms
                );
            } else {
                println!("  ❌ No usable providers — set at least one API key");
                issues += 1;
            }
        }
        Err(e) => {
            println!("  ❌ Engine cannot start: {e}");
            issues += 1;
        }
    }

    println!(
        "  ✅ Request timeout: {}ms",
        config.request_timeout_ms()
    );

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
        Ok(ExitCode::FAILURE)
    }
}
