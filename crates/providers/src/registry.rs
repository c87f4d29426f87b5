//! Provider construction from configuration.
//!
//! Turns the ordered `[[providers]]` list into a [`ProviderRouter`]. Entries
//! without the credentials they need are skipped with a warning, so a
//! deployment with only one API key still gets a working (shorter) chain.

use std::sync::Arc;
use std::time::Duration;

use banter_config::{AppConfig, ProviderConfig, ProviderKind};
use banter_core::provider::Provider;
use tracing::{info, warn};

use crate::anthropic::AnthropicProvider;
use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::router::ProviderRouter;

/// Build the fallback chain from configuration, preserving order.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new();

    for entry in &config.providers {
        match build_provider(entry) {
            Some(provider) => {
                info!(provider = %entry.name, model = %entry.model, "Registered provider");
                router = router.add(provider, Duration::from_secs(entry.timeout_secs));
            }
            None => {
                warn!(
                    provider = %entry.name,
                    env = entry.kind.api_key_env(),
                    "Skipping provider: no API key configured"
                );
            }
        }
    }

    router
}

/// Build one provider, or `None` when it lacks a required API key.
pub fn build_provider(entry: &ProviderConfig) -> Option<Arc<dyn Provider>> {
    let api_key = entry.api_key.clone().filter(|k| !k.trim().is_empty());
    let timeout = Duration::from_secs(entry.timeout_secs);

    let provider: Arc<dyn Provider> = match entry.kind {
        ProviderKind::Gemini => {
            let mut p = GeminiProvider::new(api_key?, &entry.model, timeout).with_name(&entry.name);
            if let Some(url) = &entry.api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        ProviderKind::Anthropic => {
            let mut p = AnthropicProvider::new(api_key?, &entry.model, timeout).with_name(&entry.name);
            if let Some(url) = &entry.api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        ProviderKind::OpenaiCompat => {
            // Self-hosted endpoints (Ollama, vLLM) need no key.
            let api_key = match (&api_key, &entry.api_url) {
                (Some(key), _) => key.clone(),
                (None, Some(_)) => String::new(),
                (None, None) => return None,
            };
            let base_url = entry
                .api_url
                .clone()
                .unwrap_or_else(|| default_base_url(&entry.name));
            Arc::new(OpenAiCompatProvider::new(
                &entry.name,
                base_url,
                api_key,
                &entry.model,
                timeout,
            ))
        }
    };

    Some(provider)
}

/// Get the default base URL for well-known OpenAI-compatible providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
