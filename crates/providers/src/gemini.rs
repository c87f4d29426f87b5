//! Google Gemini provider (`generateContent`).

use std::time::Duration;

use async_trait::async_trait;
use banter_core::error::ProviderError;
use banter_core::provider::*;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::http::{build_client, check_status, parse_json, require_key, send_error};

pub(crate) const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: "gemini".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: build_client(timeout),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn build_payload(request: &ProviderRequest) -> serde_json::Value {
        let mut generation_config = json!({
            "temperature": request.temperature,
            "topP": request.top_p,
            "maxOutputTokens": request.max_tokens,
        });
        if !request.stop.is_empty() {
            generation_config["stopSequences"] = json!(request.stop);
        }

        let mut payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": request.prompt}]
            }],
            "generationConfig": generation_config,
        });

        if let Some(sys) = &request.system {
            payload["systemInstruction"] = json!({"parts": [{"text": sys}]});
        }

        payload
    }

    fn into_response(&self, data: GeminiResponse) -> Result<ProviderResponse, ProviderError> {
        let candidate = data
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("No candidates in response".into()))?;

        let content = candidate
            .content
            .ok_or_else(|| ProviderError::MalformedResponse("No content in candidate".into()))?;

        let full_text: String = content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();

        let usage = data.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ProviderResponse {
            content: full_text,
            model: data.model_version.unwrap_or_else(|| self.model.clone()),
            usage,
            finish_reason: candidate.finish_reason,
        })
    }
}

#[async_trait]
impl banter_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        require_key(&self.name, &self.api_key)
    }

    async fn generate(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        // Key travels in a header so it never shows up in error URLs.
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let payload = Self::build_payload(&request);

        debug!(provider = %self.name, model = %self.model, "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(send_error)?;

        let response = check_status(&self.name, response).await?;
        let data: GeminiResponse = parse_json(response).await?;
        self.into_response(data)
    }
}

// --- Gemini API types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}
