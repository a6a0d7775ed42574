//! Write-back boundary for finished generations.

use async_trait::async_trait;
use thiserror::Error;

/// Final state of one generation, written once after its stream has ended.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRecord {
    pub message_id: i64,
    pub text: String,
    pub elapsed_secs: f64,
    pub estimated_tokens: usize,
    pub model: String,
    pub completed: bool,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("message {0} not found")]
    MessageNotFound(i64),

    #[error("persistence backend error: {0}")]
    Backend(String),
}

/// Persistence collaborator for the relay.
#[async_trait]
pub trait GenerationSink: Send + Sync {
    async fn persist(&self, record: GenerationRecord) -> Result<(), SinkError>;
}
