//! Protocol-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("decompression error: {0}")]
    DecompressError(String),

    #[error("compression error: {0}")]
    CompressError(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("packet batch is empty")]
    EmptyBatch,

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<serde_json::Error> for ProtoError {
    fn from(e: serde_json::Error) -> Self {
        ProtoError::JsonParse(e.to_string())
    }
}
