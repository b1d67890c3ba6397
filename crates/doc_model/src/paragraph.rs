//! Paragraph node - a single line of content
//!
//! A paragraph is either a top-level body line or a line inside a table cell
//! (a cell block). Cell blocks carry a [`CellTag`] naming the table, row and
//! cell they belong to, so the association can be rebuilt from the tag alone.

use crate::{
    CellId, CharacterProperties, Node, NodeId, NodeType, ParagraphProperties, RowGroupId,
    RowGroupKind, TableId,
};
use serde::{Deserialize, Serialize};

/// List flavours a line can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListKind {
    Bullet,
    Ordered,
    Checked,
}

/// Line-level format of a paragraph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineFormat {
    /// Ordinary text line
    #[default]
    Plain,
    /// Heading line with its level (1 = largest)
    Header { level: u8 },
    /// List item line
    List(ListKind),
}

/// Structural attributes stamped on every line inside a table cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellTag {
    pub table_id: TableId,
    pub row_id: RowGroupId,
    pub cell_id: CellId,
    /// Which row group the owning row sits in
    pub group: RowGroupKind,
}

/// A paragraph containing text runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    id: NodeId,
    parent: Option<NodeId>,
    /// IDs of child runs
    children: Vec<NodeId>,
    /// Line-level format
    #[serde(default)]
    pub format: LineFormat,
    /// Cell association when this line lives inside a table
    #[serde(default)]
    pub cell: Option<CellTag>,
    /// Direct paragraph formatting
    #[serde(default)]
    pub direct_formatting: ParagraphProperties,
    /// Formatting for text typed into this line when there is no run to
    /// inherit from
    #[serde(default)]
    pub typing_formatting: CharacterProperties,
}

impl Paragraph {
    /// Create a new empty paragraph
    pub fn new() -> Self {
        Self {
            id: NodeId::new(),
            parent: None,
            children: Vec::new(),
            format: LineFormat::Plain,
            cell: None,
            direct_formatting: ParagraphProperties::default(),
            typing_formatting: CharacterProperties::default(),
        }
    }

    /// Create a paragraph with a line format
    pub fn with_format(format: LineFormat) -> Self {
        Self {
            format,
            ..Self::new()
        }
    }

    /// Create an empty line belonging to a table cell
    pub fn cell_line(tag: CellTag) -> Self {
        Self {
            cell: Some(tag),
            ..Self::new()
        }
    }

    /// Create a sibling line: same cell association and paragraph formatting,
    /// plain line format, no content
    pub fn sibling_of(other: &Paragraph) -> Self {
        Self {
            cell: other.cell.clone(),
            direct_formatting: other.direct_formatting.clone(),
            ..Self::new()
        }
    }

    /// Whether this line is inside a table cell
    pub fn is_cell_line(&self) -> bool {
        self.cell.is_some()
    }

    /// Whether this is a heading line
    pub fn is_header_line(&self) -> bool {
        matches!(self.format, LineFormat::Header { .. })
    }

    /// Whether this is a list item line
    pub fn is_list_line(&self) -> bool {
        matches!(self.format, LineFormat::List(_))
    }

    /// Apply direct formatting to this paragraph
    pub fn apply_direct_formatting(&mut self, formatting: &ParagraphProperties) {
        self.direct_formatting = self.direct_formatting.merge(formatting);
    }

    /// Add a child run ID
    pub fn add_child(&mut self, child_id: NodeId) {
        self.children.push(child_id);
    }

    /// Insert a child at a specific index
    pub fn insert_child(&mut self, index: usize, child_id: NodeId) {
        let index = index.min(self.children.len());
        self.children.insert(index, child_id);
    }

    /// Remove a child by ID
    pub fn remove_child(&mut self, child_id: NodeId) -> bool {
        if let Some(pos) = self.children.iter().position(|&id| id == child_id) {
            self.children.remove(pos);
            true
        } else {
            false
        }
    }

    /// Detach and return all child run IDs
    pub fn take_children(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.children)
    }
}

impl Default for Paragraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for Paragraph {
    fn id(&self) -> NodeId {
        self.id
    }

    fn node_type(&self) -> NodeType {
        NodeType::Paragraph
    }

    fn children(&self) -> &[NodeId] {
        &self.children
    }

    fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    fn can_have_children(&self) -> bool {
        true
    }
}
