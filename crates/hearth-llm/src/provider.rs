use async_trait::async_trait;
use futures::Stream;
use hearth_core::GenerationRequest;
use std::pin::Pin;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Inference server is not available: {0}")]
    ServerUnavailable(String),

    #[error("Inference server returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Stream error: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, LLMError>;

/// One item of a generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LLMChunk {
    /// A generated text fragment.
    Token(String),
    /// Human-readable notice that the server could not be reached after all retries.
    /// Always the last item of its stream.
    Unavailable(String),
}

impl LLMChunk {
    pub fn text(&self) -> &str {
        match self {
            LLMChunk::Token(text) | LLMChunk::Unavailable(text) => text,
        }
    }
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<LLMChunk>> + Send>>;

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Lazily stream fragments for `request`.
    ///
    /// Nothing is sent until the stream is first polled. The stream is finite and cannot be
    /// restarted. Connection failures before the first fragment are retried internally and end in
    /// a single [`LLMChunk::Unavailable`] item instead of an error; errors after streaming has
    /// begun are yielded as `Err`.
    fn generate_stream(&self, request: GenerationRequest) -> FragmentStream;

    /// Raw model list as reported by the server.
    async fn list_models(&self) -> Result<serde_json::Value>;

    /// Liveness probe.
    async fn is_available(&self) -> bool;

    /// Model identifier sent with requests and recorded with results.
    fn model_name(&self) -> &str;
}
