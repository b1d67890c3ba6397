//! Text run node - a contiguous span of text with consistent formatting

use crate::{CharacterProperties, Node, NodeId, NodeType};
use serde::{Deserialize, Serialize};

/// A text run - contiguous text with consistent formatting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    id: NodeId,
    parent: Option<NodeId>,
    /// The text content of this run
    pub text: String,
    /// Direct formatting
    #[serde(default)]
    pub direct_formatting: CharacterProperties,
}

impl Run {
    /// Create a new run with text content
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            parent: None,
            text: text.into(),
            direct_formatting: CharacterProperties::default(),
        }
    }

    /// Create a new run with direct formatting
    pub fn with_direct_formatting(
        text: impl Into<String>,
        formatting: CharacterProperties,
    ) -> Self {
        Self {
            id: NodeId::new(),
            parent: None,
            text: text.into(),
            direct_formatting: formatting,
        }
    }

    /// Apply direct formatting to this run
    pub fn apply_direct_formatting(&mut self, formatting: &CharacterProperties) {
        self.direct_formatting = self.direct_formatting.merge(formatting);
    }

    /// Length of the text in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Check if this run is empty
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Byte offset of a character offset, clamped to the end of the text
    pub fn byte_offset(&self, char_offset: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_offset)
            .map(|(byte, _)| byte)
            .unwrap_or(self.text.len())
    }
}

impl Node for Run {
    fn id(&self) -> NodeId {
        self.id
    }

    fn node_type(&self) -> NodeType {
        NodeType::Run
    }

    fn children(&self) -> &[NodeId] {
        // Runs have no children
        &[]
    }

    fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    fn can_have_children(&self) -> bool {
        false
    }

    fn text_content(&self) -> Option<&str> {
        Some(&self.text)
    }
}
