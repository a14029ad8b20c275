//! Continuation cursors for paged reads.
//!
//! A cursor is the standard base64 encoding of the UTF-8 JSON object
//! `{"hash": .., "range": ..}` naming the last row a page consumed.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::key_codec::PrimaryKey;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("cursor is not valid base64: {0}")]
    Encoding(String),
    #[error("cursor does not hold a hash/range key: {0}")]
    Payload(String),
}

pub fn encode(key: &PrimaryKey) -> String {
    // A struct of two strings always serializes.
    let json = serde_json::to_vec(key).unwrap_or_default();
    STANDARD.encode(json)
}

pub fn decode(cursor: &str) -> Result<PrimaryKey, CursorError> {
    let bytes = STANDARD
        .decode(cursor)
        .map_err(|e| CursorError::Encoding(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| CursorError::Payload(e.to_string()))
}
