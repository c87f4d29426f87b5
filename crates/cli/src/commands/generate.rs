//! `banter generate`: Run one generation request end to end.

use std::io::Read;
use std::path::Path;
use std::process::ExitCode;

use banter_config::{AppConfig, ConfigError};
use banter_core::{Error, GenerationRequest};
use banter_engine::ResponseEngine;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(
    config: Result<AppConfig, ConfigError>,
    input: &Path,
    pretty: bool,
) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling request");
            on_signal.cancel();
        }
    });

    let (value, code) = match execute(config, input, cancel).await {
        Ok(response) => (serde_json::to_value(&response)?, ExitCode::SUCCESS),
        Err(e) => (error_payload(&e), ExitCode::FAILURE),
    };

    let out = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    println!("{out}");
    Ok(code)
}

async fn execute(
    config: Result<AppConfig, ConfigError>,
    input: &Path,
    cancel: CancellationToken,
) -> Result<banter_core::GenerationResponse, Error> {
    let config = config?;
    let raw = read_input(input)?;
    let request = GenerationRequest::from_json(&raw)?;
    let engine = ResponseEngine::from_config(&config)?;
    engine.generate(request, cancel).await
}

fn read_input(input: &Path) -> Result<String, Error> {
    if input == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .map_err(|e| Error::invalid(format!("cannot read request from stdin: {e}")))?;
        return Ok(raw);
    }
    std::fs::read_to_string(input)
        .map_err(|e| Error::invalid(format!("cannot read request file {}: {e}", input.display())))
}

/// The JSON body printed for a failed request.
pub fn error_payload(error: &Error) -> serde_json::Value {
    json!({
        "code": error.code(),
        "message": error.to_string(),
        "failures": error.failures(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_core::{ProviderError, ProviderFailure};

    #[test]
    fn error_payload_lists_failures_in_order() {
        let err = Error::AllProvidersExhausted {
            failures: vec![
                ProviderFailure {
                    provider: "gemini".into(),
                    error: ProviderError::Timeout("no response within 30000ms".into()),
                },
                ProviderFailure {
                    provider: "openai".into(),
                    error: ProviderError::RateLimited { retry_after_secs: 5 },
                },
            ],
        };
        let payload = error_payload(&err);
        assert_eq!(payload["code"], "ALL_PROVIDERS_EXHAUSTED");
        assert_eq!(payload["failures"][0]["provider"], "gemini");
        assert_eq!(payload["failures"][0]["kind"], "timeout");
        assert_eq!(payload["failures"][1]["provider"], "openai");
    }

    #[test]
    fn error_payload_without_failures() {
        let payload = error_payload(&Error::invalid("bad"));
        assert_eq!(payload["code"], "INVALID_REQUEST");
        assert_eq!(payload["failures"], json!([]));
    }

    #[tokio::test]
    async fn unreadable_input_is_invalid_request() {
        let err = execute(
            Ok(AppConfig::default()),
            Path::new("/nonexistent/request.json"),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }
}
