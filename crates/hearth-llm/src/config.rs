//! Inference server connection settings.

use std::time::Duration;

use crate::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "http://localhost:1234/v1";
pub const DEFAULT_API_KEY: &str = "dummy-key";
pub const DEFAULT_MODEL: &str = "local-model";

/// Explicit configuration for [`crate::LocalInferenceClient`]. Nothing is read from the
/// environment here; the binary builds this from its CLI.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Bound on the whole generation call, body included
    pub request_timeout: Duration,
    /// Bound on the liveness probe
    pub probe_timeout: Duration,
    pub retry: RetryPolicy,
}

impl InferenceConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}
