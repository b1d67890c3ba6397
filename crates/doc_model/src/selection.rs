//! Cursor position and text selection

use crate::NodeId;
use serde::{Deserialize, Serialize};

/// A position inside a line: the paragraph and a character offset into it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// The paragraph containing this position
    pub node_id: NodeId,
    /// Character offset within the paragraph
    pub offset: usize,
}

impl Position {
    /// Create a new position
    pub fn new(node_id: NodeId, offset: usize) -> Self {
        Self { node_id, offset }
    }

    /// Create a position at the start of a paragraph
    pub fn start_of(node_id: NodeId) -> Self {
        Self { node_id, offset: 0 }
    }
}

/// A text selection.
///
/// `anchor` is where the selection started and `focus` is where the caret
/// is. When both are equal the selection is collapsed to a caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Where the selection started
    pub anchor: Position,
    /// Where the selection ends (caret position)
    pub focus: Position,
}

impl Selection {
    /// Create a new selection
    pub fn new(anchor: Position, focus: Position) -> Self {
        Self { anchor, focus }
    }

    /// Create a collapsed selection (caret only)
    pub fn collapsed(position: Position) -> Self {
        Self {
            anchor: position,
            focus: position,
        }
    }

    /// Create a caret at the start of a paragraph
    pub fn at_start_of(node_id: NodeId) -> Self {
        Self::collapsed(Position::start_of(node_id))
    }

    /// Check if this selection is collapsed (just a caret)
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Whether anchor and focus sit in the same paragraph
    pub fn is_single_line(&self) -> bool {
        self.anchor.node_id == self.focus.node_id
    }

    /// Move the focus, extending the selection
    pub fn extend_to(&self, focus: Position) -> Self {
        Self {
            anchor: self.anchor,
            focus,
        }
    }

    /// Collapse the selection to the focus position
    pub fn collapse_to_focus(&self) -> Self {
        Self::collapsed(self.focus)
    }
}
