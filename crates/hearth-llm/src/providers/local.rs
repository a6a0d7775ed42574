use async_trait::async_trait;
use futures_util::StreamExt;
use hearth_core::GenerationRequest;
use reqwest::{Client, Response};
use serde_json::Value;

use crate::config::InferenceConfig;
use crate::provider::{FragmentStream, InferenceProvider, LLMChunk, LLMError, Result};

use super::common::openai_compat::{build_chat_body, parse_sse_data};
use super::common::sse::fragment_stream_from_sse;

/// Client for a locally hosted OpenAI-compatible server such as LM Studio.
///
/// Every generation attempt probes `GET {base}/models` first and then posts to
/// `{base}/chat/completions`. Idle connections are not pooled, so each attempt opens its own
/// connection and releases it when the attempt ends.
#[derive(Debug, Clone)]
pub struct LocalInferenceClient {
    client: Client,
    config: InferenceConfig,
}

impl LocalInferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self> {
        let client = Client::builder()
            .no_proxy()
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self { client, config })
    }

    /// Liveness probe bounded by the probe timeout.
    pub async fn check_server_status(&self) -> Result<()> {
        let response = self
            .client
            .get(self.config.endpoint("models"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(|e| LLMError::ServerUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LLMError::ServerUnavailable(format!(
                "probe returned HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }

    /// One attempt: probe, then open the streaming completion.
    async fn open_stream(&self, body: &Value) -> Result<Response> {
        self.check_server_status().await?;

        let response = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.request_timeout)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::Upstream { status, body });
        }

        Ok(response)
    }
}

#[async_trait]
impl InferenceProvider for LocalInferenceClient {
    fn generate_stream(&self, request: GenerationRequest) -> FragmentStream {
        let client = self.clone();

        let stream = async_stream::stream! {
            let body = build_chat_body(&client.config.model, &request);
            let policy = client.config.retry.clone();
            let max_attempts = policy.max_attempts.max(1);

            let mut attempt = 1;
            let opened = loop {
                match client.open_stream(&body).await {
                    Ok(response) => break Some(response),
                    Err(error) if attempt < max_attempts => {
                        let delay = policy.delay_for(attempt);
                        log::warn!(
                            "Inference attempt {}/{} failed: {}; retrying in {:?}",
                            attempt,
                            max_attempts,
                            error,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(error) => {
                        log::error!(
                            "Inference attempt {}/{} failed: {}; giving up after {:?} of backoff",
                            attempt,
                            max_attempts,
                            error,
                            policy.cumulative_delay(attempt - 1)
                        );
                        break None;
                    }
                }
            };

            match opened {
                Some(response) => {
                    log::debug!("Streaming completion opened on attempt {}", attempt);
                    let mut fragments = fragment_stream_from_sse(response, parse_sse_data);
                    while let Some(item) = fragments.next().await {
                        yield item;
                    }
                }
                None => {
                    yield Ok(LLMChunk::Unavailable(policy.exhausted_message()));
                }
            }
        };

        Box::pin(stream)
    }

    async fn list_models(&self) -> Result<Value> {
        let response = self
            .client
            .get(self.config.endpoint("models"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.probe_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::Upstream { status, body });
        }

        Ok(response.json().await?)
    }

    async fn is_available(&self) -> bool {
        match self.check_server_status().await {
            Ok(()) => true,
            Err(error) => {
                log::debug!("Inference server probe failed: {}", error);
                false
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
