use std::path::PathBuf;

use clap::Parser;
use hearth_core::{GenerationParameters, DEFAULT_INSTRUCTION};
use hearth_llm::InferenceConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "hearth-server")]
#[command(about = "Family chat server relaying a local inference server")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Bind address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// SQLite database file
    #[arg(long = "database", env = "DATABASE_PATH", default_value = "./chat.db")]
    pub database_path: PathBuf,

    /// Inference server base URL
    #[arg(long, env = "LM_STUDIO_URL", default_value = "http://localhost:1234/v1")]
    pub llm_base_url: String,

    /// Bearer token for the inference server
    #[arg(long, env = "LM_STUDIO_KEY", default_value = "dummy-key")]
    pub llm_api_key: String,

    /// Model identifier sent with each request
    #[arg(long, env = "LLM_MODEL", default_value = "local-model")]
    pub model: String,

    /// Instruction placed before every conversation
    #[arg(long, env = "SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    #[arg(long, default_value = "2000")]
    pub max_tokens: u32,

    /// Prompt budget in estimated tokens
    #[arg(long, default_value = "4096")]
    pub context_budget: usize,

    #[arg(long, default_value = "0.7")]
    pub temperature: f32,

    #[arg(long, default_value = "0.95")]
    pub top_p: f32,

    #[arg(long, default_value = "40")]
    pub top_k: u32,

    #[arg(long, default_value = "1.1")]
    pub repetition_penalty: f32,

    #[arg(long, default_value = "0.0")]
    pub frequency_penalty: f32,

    #[arg(long, default_value = "0.0")]
    pub presence_penalty: f32,

    /// Stop sequence, may be repeated
    #[arg(long = "stop")]
    pub stop: Vec<String>,
}

/// Everything the server needs, resolved once at start-up.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub inference: InferenceConfig,
    pub defaults: GenerationParameters,
    pub instruction: String,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        let inference = InferenceConfig::default()
            .with_base_url(cli.llm_base_url)
            .with_api_key(cli.llm_api_key)
            .with_model(cli.model);

        let defaults = GenerationParameters {
            max_output_tokens: cli.max_tokens,
            context_budget_tokens: cli.context_budget,
            temperature: cli.temperature,
            top_p: cli.top_p,
            repetition_penalty: cli.repetition_penalty,
            top_k: cli.top_k,
            stop_sequences: cli.stop,
            frequency_penalty: cli.frequency_penalty,
            presence_penalty: cli.presence_penalty,
        };

        let instruction = cli
            .system_prompt
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_INSTRUCTION.to_string());

        Self {
            host: cli.host,
            port: cli.port,
            database_path: cli.database_path,
            inference,
            defaults,
            instruction,
        }
    }
}
