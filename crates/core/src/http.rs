//! HTTP client construction shared by remote providers and indexes.

use std::time::Duration;

use tracing::warn;

/// Build a client whose own timeout matches the caller's budget.
///
/// Falls back to a default client if the builder fails (e.g. TLS backend
/// initialisation), so construction never panics.
pub fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}
