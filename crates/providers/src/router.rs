//! Provider router: ordered fallback chain with per-provider timeouts.
//!
//! Providers are tried strictly in sequence. When one fails (timeout, rate
//! limit, auth, malformed or rejected output), the reason is recorded and the
//! next provider in the chain is tried. If every provider fails the caller
//! gets all reasons, in chain order.

use banter_core::error::{Error, ProviderError, ProviderFailure};
use banter_core::provider::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The successful outcome of a routed generation.
#[derive(Debug, Clone)]
pub struct Routed<T> {
    /// The accepted output of the winning provider
    pub output: T,
    pub provider: String,
    pub model: String,
    /// Latency of the winning attempt only
    pub latency: Duration,
    /// Failures of providers tried before the winner
    pub failures: Vec<ProviderFailure>,
    pub usage: Option<Usage>,
}

/// Readiness of one chain entry.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub model: String,
    pub timeout_ms: u64,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Routes one generation request across an ordered provider chain.
#[derive(Default)]
pub struct ProviderRouter {
    chain: Vec<RouteEntry>,
}

/// A single entry in the chain.
struct RouteEntry {
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl ProviderRouter {
    /// Create a router with no entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to the chain with a custom timeout.
    pub fn add(mut self, provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        self.chain.push(RouteEntry { provider, timeout });
        self
    }

    /// Add a provider with the default timeout (30s).
    pub fn add_default(self, provider: Arc<dyn Provider>) -> Self {
        self.add(provider, Duration::from_secs(30))
    }

    /// Number of providers in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Provider names in chain order.
    pub fn names(&self) -> Vec<&str> {
        self.chain.iter().map(|e| e.provider.name()).collect()
    }

    /// Sum of every per-provider timeout.
    pub fn total_timeout(&self) -> Duration {
        self.chain.iter().map(|e| e.timeout).sum()
    }

    /// Generate with no post-processing of the provider output.
    pub async fn generate(
        &self,
        request: ProviderRequest,
        cancel: &CancellationToken,
    ) -> Result<Routed<ProviderResponse>, Error> {
        self.generate_with(request, cancel, Ok).await
    }

    /// Generate, passing every raw response through `accept`.
    ///
    /// A rejection from `accept` counts as a provider failure and moves on
    /// to the next provider.
    pub async fn generate_with<T, F>(
        &self,
        request: ProviderRequest,
        cancel: &CancellationToken,
        accept: F,
    ) -> Result<Routed<T>, Error>
    where
        F: Fn(ProviderResponse) -> Result<T, ProviderError>,
    {
        if self.chain.is_empty() {
            return Err(Error::config("no providers configured"));
        }

        let mut failures = Vec::with_capacity(self.chain.len());

        for (i, entry) in self.chain.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let provider_name = entry.provider.name().to_string();

            info!(
                provider = %provider_name,
                attempt = i + 1,
                total = self.chain.len(),
                "Router: trying provider"
            );

            let started = Instant::now();
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(provider = %provider_name, "Router: request cancelled mid-attempt");
                    return Err(Error::Cancelled);
                }
                result = tokio::time::timeout(entry.timeout, entry.provider.generate(request.clone())) => result,
            };
            let latency = started.elapsed();

            let outcome = match attempt {
                Ok(Ok(response)) => {
                    let model = response.model.clone();
                    let usage = response.usage.clone();
                    accept(response).map(|output| (output, model, usage))
                }
                Ok(Err(e)) => Err(e),
                Err(_) => Err(ProviderError::Timeout(format!(
                    "no response within {}ms",
                    entry.timeout.as_millis()
                ))),
            };

            match outcome {
                Ok((output, model, usage)) => {
                    info!(
                        provider = %provider_name,
                        model = %model,
                        latency_ms = latency.as_millis() as u64,
                        failed_before = failures.len(),
                        "Router: provider succeeded"
                    );
                    return Ok(Routed {
                        output,
                        provider: provider_name,
                        model,
                        latency,
                        failures,
                        usage,
                    });
                }
                Err(e) => {
                    warn!(
                        provider = %provider_name,
                        kind = e.kind(),
                        error = %e,
                        "Router: provider failed, trying next"
                    );
                    failures.push(ProviderFailure {
                        provider: provider_name,
                        error: e,
                    });
                }
            }
        }

        Err(Error::AllProvidersExhausted { failures })
    }

    /// Readiness of every provider in chain order. Providers must not hit
    /// the network here.
    pub async fn health_report(&self) -> Vec<ProviderHealth> {
        let mut report = Vec::with_capacity(self.chain.len());
        for entry in &self.chain {
            let (healthy, error) = match entry.provider.health_check().await {
                Ok(healthy) => (healthy, None),
                Err(e) => (false, Some(e.to_string())),
            };
            report.push(ProviderHealth {
                name: entry.provider.name().to_string(),
                model: entry.provider.model().to_string(),
                timeout_ms: entry.timeout.as_millis() as u64,
                healthy,
                error,
            });
        }
        report
    }
}
