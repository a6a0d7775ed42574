use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The leading instruction turn. Sent as `system` on the wire.
    #[serde(rename = "system")]
    Instruction,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Instruction => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged utterance in a model-facing conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn instruction(content: impl Into<String>) -> Self {
        Self {
            role: Role::Instruction,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Length in Unicode scalar values, the unit the token estimate works in.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Snapshot of one stored exchange, read by the formatter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationHistoryEntry {
    pub user_text: String,
    pub assistant_text: Option<String>,
    pub sequence_position: i64,
}

impl ConversationHistoryEntry {
    pub fn new(
        user_text: impl Into<String>,
        assistant_text: Option<String>,
        sequence_position: i64,
    ) -> Self {
        Self {
            user_text: user_text.into(),
            assistant_text,
            sequence_position,
        }
    }
}

/// Text content of an attached file, inlined into the user turn it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedText {
    pub filename: String,
    pub content: String,
}
