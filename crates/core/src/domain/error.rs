// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Unknown queue definition: {0}")]
    UnknownDefinition(String),

    #[error("Cursor {cursor} out of bounds for {direction} queue {instance_id} of length {len}")]
    CursorOutOfBounds {
        instance_id: String,
        cursor: i64,
        direction: String,
        len: usize,
    },

    #[error("Invalid queue definition: {0}")]
    InvalidDefinition(String),

    #[error("Invalid context: {0}")]
    InvalidContext(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
