use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_TITLE: &str = "New Conversation";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// List entry: a conversation with the content of its latest message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub last_message: Option<String>,
    pub last_response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetadata {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: String,
    pub content: String,
    pub response: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub attached_files: Vec<FileMetadata>,
    pub token_count: Option<i64>,
    pub generation_time: Option<f64>,
    pub model_used: Option<String>,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<StoredMessage>,
}

/// A file as received from the caller, before validation.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Title for a conversation whose first message is `content`.
pub(crate) fn title_from_message(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() > 50 {
        let head: String = trimmed.chars().take(47).collect();
        Some(format!("{}...", head))
    } else {
        Some(trimmed.to_string())
    }
}
