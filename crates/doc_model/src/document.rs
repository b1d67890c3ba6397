//! Document root node

use crate::{Node, NodeId, NodeType};
use serde::{Deserialize, Serialize};

/// The root document node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    id: NodeId,
    /// IDs of top-level body children (paragraphs and tables)
    body_children: Vec<NodeId>,
    /// Version counter for tracking changes
    version: u64,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self {
            id: NodeId::new(),
            body_children: Vec::new(),
            version: 0,
        }
    }

    /// Get the document version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Increment version after a change
    pub fn increment_version(&mut self) {
        self.version += 1;
    }

    /// Add a child to the body
    pub fn add_body_child(&mut self, child_id: NodeId) {
        self.body_children.push(child_id);
        self.increment_version();
    }

    /// Insert a child at a specific index
    pub fn insert_body_child(&mut self, index: usize, child_id: NodeId) {
        let index = index.min(self.body_children.len());
        self.body_children.insert(index, child_id);
        self.increment_version();
    }

    /// Remove a child by ID
    pub fn remove_body_child(&mut self, child_id: NodeId) -> bool {
        if let Some(pos) = self.body_children.iter().position(|&id| id == child_id) {
            self.body_children.remove(pos);
            self.increment_version();
            true
        } else {
            false
        }
    }

    /// Index of a body child
    pub fn body_index_of(&self, child_id: NodeId) -> Option<usize> {
        self.body_children.iter().position(|&id| id == child_id)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for Document {
    fn id(&self) -> NodeId {
        self.id
    }

    fn node_type(&self) -> NodeType {
        NodeType::Document
    }

    fn children(&self) -> &[NodeId] {
        &self.body_children
    }

    fn parent(&self) -> Option<NodeId> {
        None // Document is the root
    }

    fn set_parent(&mut self, _parent: Option<NodeId>) {
        // Document cannot have a parent
    }

    fn can_have_children(&self) -> bool {
        true
    }
}
