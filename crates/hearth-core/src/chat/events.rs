use serde_json::{json, Value};

pub const DONE_SENTINEL: &str = "[DONE]";

/// Application-level event streamed to the HTTP caller.
///
/// Each event is written as one `data: <payload>\n\n` frame. Payloads are single-key JSON objects
/// (`{"token": ..}`, `{"progress": ..}`, `{"error": ..}`); `Done` is the literal `[DONE]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    Progress(String),
    Error(String),
    Done,
}

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        Self::Token(text.into())
    }

    pub fn progress(text: impl Into<String>) -> Self {
        Self::Progress(text.into())
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error(text.into())
    }

    /// `Done` and `Error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }

    pub fn payload(&self) -> Option<Value> {
        match self {
            Self::Token(token) => Some(json!({ "token": token })),
            Self::Progress(progress) => Some(json!({ "progress": progress })),
            Self::Error(error) => Some(json!({ "error": error })),
            Self::Done => None,
        }
    }

    pub fn to_sse_frame(&self) -> String {
        match self.payload() {
            Some(payload) => format!("data: {}\n\n", payload),
            None => format!("data: {}\n\n", DONE_SENTINEL),
        }
    }
}
