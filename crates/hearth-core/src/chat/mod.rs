pub mod events;
pub mod types;

pub use events::StreamEvent;
pub use types::{AttachedText, ConversationHistoryEntry, Role, Turn};
