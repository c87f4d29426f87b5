//! Shared HTTP plumbing: status and transport error mapping.
//!
//! Every provider maps transport and status failures the same way so the
//! router can record comparable reasons.

use banter_core::error::ProviderError;
use serde::de::DeserializeOwned;
use tracing::warn;

pub(crate) use banter_core::http::build_client;

/// Seconds to wait when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Readiness of a keyed provider: an empty key can never authenticate.
pub(crate) fn require_key(provider: &str, api_key: &str) -> Result<bool, ProviderError> {
    if api_key.trim().is_empty() {
        return Err(ProviderError::NotConfigured(format!("{provider} has no API key")));
    }
    Ok(true)
}

/// Map a transport-level failure.
pub(crate) fn send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Turn non-success statuses into the matching [`ProviderError`].
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();
        warn!(provider, status, body = %error_body, "Provider returned error");
        return Err(ProviderError::Api {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

/// Decode a success body, treating shape mismatches as malformed output.
pub(crate) async fn parse_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let bytes = response.bytes().await.map_err(send_error)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))
}
