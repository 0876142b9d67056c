use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(Uuid),

    #[error("Revision '{revision}' not found for item {item}")]
    RevisionNotFound { item: Uuid, revision: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
