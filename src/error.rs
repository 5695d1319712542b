use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the escalation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("student {0} is busy, retry later")]
    Busy(Uuid),

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
