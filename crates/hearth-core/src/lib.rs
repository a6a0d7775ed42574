pub mod budget;
pub mod chat;
pub mod formatter;
pub mod generation;
pub mod persistence;

pub use budget::{estimate_tokens, trim_to_budget, TrimmedContext, DEFAULT_CONTEXT_BUDGET};
pub use chat::{AttachedText, ConversationHistoryEntry, Role, StreamEvent, Turn};
pub use formatter::{append_attachments, format_turns, DEFAULT_INSTRUCTION};
pub use generation::{GenerationParameters, GenerationRequest, GenerationResult, GenerationState};
pub use persistence::{GenerationRecord, GenerationSink, SinkError};
