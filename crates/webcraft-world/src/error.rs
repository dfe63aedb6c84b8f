//! World-level errors.

use thiserror::Error;

use webcraft_proto::error::ProtoError;
use webcraft_proto::types::ChunkAddr;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("invalid block definition: {0}")]
    InvalidBlockDefinition(String),

    #[error("unknown generator: {0}")]
    UnknownGenerator(String),

    #[error("snapshot size mismatch: expected {expected} cells, got {got}")]
    SnapshotSizeMismatch { expected: usize, got: usize },

    #[error("chunk {0} is not loaded")]
    ChunkNotLoaded(ChunkAddr),

    #[error("chunk generation failed: {0}")]
    Generation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Proto(#[from] ProtoError),
}
