use serde::{Deserialize, Serialize};

use crate::budget::{estimate_tokens, trim_to_budget, TrimmedContext, DEFAULT_CONTEXT_BUDGET};
use crate::chat::{ConversationHistoryEntry, Turn};
use crate::formatter::format_turns;

/// Sampling and budget parameters sent with every generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationParameters {
    pub max_output_tokens: u32,
    pub context_budget_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub top_k: u32,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            max_output_tokens: 2000,
            context_budget_tokens: DEFAULT_CONTEXT_BUDGET,
            temperature: 0.7,
            top_p: 0.95,
            repetition_penalty: 1.1,
            top_k: 40,
            stop_sequences: Vec::new(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub turns: Vec<Turn>,
    pub parameters: GenerationParameters,
}

impl GenerationRequest {
    pub fn new(turns: Vec<Turn>, parameters: GenerationParameters) -> Self {
        Self { turns, parameters }
    }

    /// Format `history` + `new_message` and trim the result to the parameters' context budget.
    pub fn from_history(
        instruction: &str,
        history: &[ConversationHistoryEntry],
        new_message: &str,
        parameters: GenerationParameters,
    ) -> (Self, TrimmedContext) {
        let turns = format_turns(instruction, history, new_message);
        let trimmed = trim_to_budget(turns, parameters.context_budget_tokens);
        let request = Self::new(trimmed.turns.clone(), parameters);
        (request, trimmed)
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.turns)
    }
}

/// Lifecycle of one generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    Pending,
    Streaming,
    Completed,
    Failed,
}

/// Accumulated output of one generation attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub full_text: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, fragment: &str) {
        self.full_text.push_str(fragment);
    }

    pub fn complete(&mut self) {
        self.completed = true;
        self.error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.completed = false;
        self.error = Some(error.into());
    }

    /// Text to store for this result: the accumulated text, annotated with the error if any.
    pub fn stored_text(&self) -> String {
        match &self.error {
            None => self.full_text.clone(),
            Some(error) if self.full_text.is_empty() => format!("Error: {}", error),
            Some(error) => format!("{}\n\nError: {}", self.full_text, error),
        }
    }
}
