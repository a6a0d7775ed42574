//! OpenAI-compatible request serialization and stream chunk parsing.
//!
//! Local inference servers (LM Studio, llama.cpp server, ...) accept the chat completions shape.
//! Parsing here is lenient: anything that is not a well-formed delta is skipped.

use hearth_core::{GenerationRequest, Turn};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::provider::LLMChunk;

/// What to do with one SSE `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseStep {
    Emit(LLMChunk),
    Skip,
    Stop,
}

pub fn turns_to_openai_compat_json(turns: &[Turn]) -> Vec<Value> {
    turns
        .iter()
        .map(|turn| {
            json!({
                "role": turn.role.as_str(),
                "content": turn.content,
            })
        })
        .collect()
}

/// Build a streaming chat completions body carrying every generation parameter.
pub fn build_chat_body(model: &str, request: &GenerationRequest) -> Value {
    let params = &request.parameters;
    let mut body = json!({
        "model": model,
        "messages": turns_to_openai_compat_json(&request.turns),
        "stream": true,
        "max_tokens": params.max_output_tokens,
        "temperature": params.temperature,
        "top_p": params.top_p,
        "top_k": params.top_k,
        "repeat_penalty": params.repetition_penalty,
        "frequency_penalty": params.frequency_penalty,
        "presence_penalty": params.presence_penalty,
    });

    if !params.stop_sequences.is_empty() {
        body["stop"] = json!(params.stop_sequences);
    }

    body
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// Parse one SSE `data:` payload.
///
/// - `"[DONE]"` -> [`SseStep::Stop`]
/// - a delta with non-empty `content` -> [`SseStep::Emit`]
/// - anything else, including invalid JSON -> [`SseStep::Skip`]
pub fn parse_sse_data(data: &str) -> SseStep {
    let data = data.trim();
    if data == "[DONE]" {
        return SseStep::Stop;
    }
    if data.is_empty() {
        return SseStep::Skip;
    }

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(error) => {
            log::debug!("Skipping malformed stream chunk: {}", error);
            return SseStep::Skip;
        }
    };

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(|content| SseStep::Emit(LLMChunk::Token(content)))
        .unwrap_or(SseStep::Skip)
}
