use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("invalid transition for {id}: {reason}")]
    InvalidTransition { id: String, reason: String },

    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
