//! Error types for editing operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Document model error: {0}")]
    DocModel(#[from] doc_model::DocModelError),

    #[error("Edit refused: {0}")]
    Refused(String),

    #[error("Undo stack is empty")]
    UndoStackEmpty,

    #[error("Redo stack is empty")]
    RedoStackEmpty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EditError {
    /// Whether the edit was turned away to protect a structural invariant.
    /// Such edits leave the document untouched and are reported to callers
    /// as a refusal rather than a failure.
    pub fn is_refusal(&self) -> bool {
        match self {
            Self::Refused(_) => true,
            Self::DocModel(e) => e.is_refusal(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EditError>;
