//! Error types for document model operations

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DocModelError {
    #[error("Node not found: {0}")]
    NodeNotFound(Uuid),

    #[error("Invalid position: node {node_id}, offset {offset}")]
    InvalidPosition { node_id: Uuid, offset: usize },

    #[error("Document offset {0} is out of range")]
    OffsetOutOfRange(usize),

    #[error("Cannot insert a table inside another table")]
    NestedTable,

    #[error("Cell not found: {0}")]
    CellNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Tree structure error: {0}")]
    TreeStructureError(String),
}

impl DocModelError {
    /// Whether this error is a refused attempt to break a structural
    /// invariant rather than a lookup failure or corrupted tree.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::NestedTable | Self::InvalidOperation(_))
    }
}

pub type Result<T> = std::result::Result<T, DocModelError>;
