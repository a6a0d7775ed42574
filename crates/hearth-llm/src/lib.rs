pub mod config;
pub mod provider;
pub mod providers;
pub mod retry;

pub use config::InferenceConfig;
pub use provider::{FragmentStream, InferenceProvider, LLMChunk, LLMError, Result};
pub use providers::LocalInferenceClient;
pub use retry::RetryPolicy;
