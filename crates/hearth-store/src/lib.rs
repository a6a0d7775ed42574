//! SQLite-backed storage for the chat service.
//!
//! Every operation opens its own connection on the blocking pool, so a generation write-back never
//! shares a handle with request handlers.

pub mod error;
pub mod files;
pub mod storage;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use files::{file_hash, validate_upload, ALLOWED_CONTENT_TYPES, MAX_UPLOAD_BYTES};
pub use storage::SqliteChatStore;
pub use types::{
    Conversation, ConversationDetail, ConversationSummary, FileMetadata, NewUpload, StoredMessage,
};
