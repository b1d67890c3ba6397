//! Node trait shared by every element of the block tree

use crate::NodeId;
use serde::{Deserialize, Serialize};

/// Kinds of node the block tree holds
///
/// Lines live either directly in the document body or inside a table cell.
/// A table owns row groups, a group owns rows, a row owns cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Document,
    Paragraph,
    Run,
    Table,
    RowGroup,
    TableRow,
    TableCell,
}

impl NodeType {
    /// Structural table nodes, from the table down to its cells
    pub fn is_table_part(self) -> bool {
        matches!(self, Self::Table | Self::RowGroup | Self::TableRow | Self::TableCell)
    }

    /// Nodes whose children are lines
    pub fn holds_lines(self) -> bool {
        matches!(self, Self::Document | Self::TableCell)
    }
}

/// Common interface for all tree nodes. Parent links are plain ids and
/// never own the parent.
pub trait Node: std::fmt::Debug {
    fn id(&self) -> NodeId;

    fn node_type(&self) -> NodeType;

    /// Child ids in document order
    fn children(&self) -> &[NodeId];

    /// Parent id, None for the document root and for detached nodes
    fn parent(&self) -> Option<NodeId>;

    fn set_parent(&mut self, parent: Option<NodeId>);

    fn can_have_children(&self) -> bool;

    /// Text held directly by this node; only runs carry text
    fn text_content(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_containers() {
        assert!(NodeType::Document.holds_lines());
        assert!(NodeType::TableCell.holds_lines());
        assert!(!NodeType::TableRow.holds_lines());
        assert!(NodeType::RowGroup.is_table_part());
        assert!(!NodeType::Paragraph.is_table_part());
    }
}
