//! Upload validation and content hashing.

use sha2::{Digest, Sha256};

use crate::error::{StoreError, StoreResult};
use crate::types::NewUpload;

pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
    "text/csv",
];

/// Content types whose bytes are inlined into the conversation history.
pub const INLINED_CONTENT_TYPES: &[&str] = &["text/plain", "text/csv"];

pub const MAX_UPLOAD_BYTES: usize = 30 * 1024 * 1024;

/// Media type without parameters, lowercased: `"Text/Plain; charset=utf-8"` -> `"text/plain"`.
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn validate_upload(upload: &NewUpload) -> StoreResult<()> {
    if upload.filename.trim().is_empty() {
        return Err(StoreError::InvalidFile("filename is required".to_string()));
    }

    let content_type = normalize_content_type(&upload.content_type);
    if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Err(StoreError::InvalidFile(format!(
            "file type {} not allowed",
            upload.content_type
        )));
    }

    if upload.data.len() > MAX_UPLOAD_BYTES {
        return Err(StoreError::InvalidFile(
            "total file size exceeds 30MB limit".to_string(),
        ));
    }

    Ok(())
}

pub fn file_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
