//! Error types for the optimist engine.

use crate::{CollectionName, OperationId, RecordId};
use thiserror::Error;

/// All possible errors from the optimist engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("record not found: {collection}/{record_id}")]
    RecordNotFound {
        collection: CollectionName,
        record_id: RecordId,
    },

    #[error("operation not found: {0}")]
    UnknownOperation(OperationId),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("malformed push event: {0}")]
    MalformedEvent(String),

    #[error("a pending mutation already targets {collection}/{record_id}")]
    ConflictPending {
        collection: CollectionName,
        record_id: RecordId,
    },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidPayload(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
