//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;

/// Endpoint value shipped before deployment; never a real endpoint.
pub const PLACEHOLDER_ENDPOINT: &str = "YOUR_GOOGLE_SHEET_WEB_APP_URL_HERE";

/// Wait between coming online and the scheduled sync.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(2000);

/// Per-request timeout for deliveries.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// URL receiving one note per POST.
    pub endpoint: String,
    /// Delay between an offline→online transition and the automatic sync.
    pub settle_delay: Duration,
    /// Timeout for a single delivery.
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Creates a configuration for `endpoint` with default timings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets the settling delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns whether the endpoint looks usable.
    pub fn is_configured(&self) -> bool {
        validate_endpoint(&self.endpoint).is_ok()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(PLACEHOLDER_ENDPOINT)
    }
}

/// Checks that `endpoint` is a real http(s) URL.
///
/// # Errors
///
/// `NotConfigured` for an empty value, the placeholder, or anything that is
/// not an absolute http(s) URL.
pub fn validate_endpoint(endpoint: &str) -> SyncResult<reqwest::Url> {
    let trimmed = endpoint.trim();
    let not_configured = || SyncError::NotConfigured {
        endpoint: endpoint.to_string(),
    };
    if trimmed.is_empty() || trimmed == PLACEHOLDER_ENDPOINT {
        return Err(not_configured());
    }
    let url = reqwest::Url::parse(trimmed).map_err(|_| not_configured())?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(not_configured()),
    }
}
