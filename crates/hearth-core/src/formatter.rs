//! Conversation history -> model-facing turn list.

use crate::chat::{AttachedText, ConversationHistoryEntry, Turn};

pub const DEFAULT_INSTRUCTION: &str =
    "You are a helpful assistant for a family chat. Answer clearly and kindly.";

const ATTACHMENTS_HEADER: &str = "\n\nAttached Files:\n";
const ATTACHMENT_SEPARATOR: &str = "\n---\n";

/// Build the turn list for a generation request.
///
/// One instruction turn, then for every history entry a user turn (when its text is non-empty)
/// followed by an assistant turn (when its response is non-empty), then the new message as the
/// final user turn. Entries keep the order they are given in.
pub fn format_turns(
    instruction: &str,
    history: &[ConversationHistoryEntry],
    new_message: &str,
) -> Vec<Turn> {
    let mut turns = Vec::with_capacity(history.len() * 2 + 2);
    turns.push(Turn::instruction(instruction));

    for entry in history {
        if !entry.user_text.is_empty() {
            turns.push(Turn::user(entry.user_text.clone()));
        }
        if let Some(response) = entry
            .assistant_text
            .as_deref()
            .filter(|response| !response.is_empty())
        {
            turns.push(Turn::assistant(response));
        }
    }

    turns.push(Turn::user(new_message));
    turns
}

/// Inline attached text files after a message body.
pub fn append_attachments(text: &str, attachments: &[AttachedText]) -> String {
    if attachments.is_empty() {
        return text.to_string();
    }

    let blocks: Vec<String> = attachments
        .iter()
        .map(|file| format!("[File: {}]\n{}", file.filename, file.content))
        .collect();

    let mut merged = text.to_string();
    merged.push_str(ATTACHMENTS_HEADER);
    merged.push_str(&blocks.join(ATTACHMENT_SEPARATOR));
    merged
}
