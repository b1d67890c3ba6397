//! Node ID generation and structural identifiers
//!
//! Two kinds of identity live here. [`NodeId`] keys nodes in the tree's
//! storage maps. [`TableId`], [`RowGroupId`] and [`CellId`] are the opaque
//! structural identifiers carried as block-level attributes: they tie a line
//! of content to its table, row and cell independently of where the line
//! currently sits in the tree.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Unique identifier for a node in the document tree.
/// Uses UUID v4 for globally unique, stable IDs that survive serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a new random NodeId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a NodeId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for NodeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<NodeId> for Uuid {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

// =============================================================================
// Structural Identifiers
// =============================================================================

macro_rules! structural_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier string
            pub fn from_raw(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the identifier as a string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

structural_id!(
    /// Identifier of a table, shared by every line of content inside it
    TableId
);

structural_id!(
    /// Identifier of one logical row, shared by every cell in that row
    RowGroupId
);

structural_id!(
    /// Identifier of a single cell, carried by each of the cell's lines
    CellId
);

/// Kinds of structural identifier handed out by [`IdGenerator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Table,
    RowGroup,
    Cell,
}

impl IdKind {
    fn prefix(self) -> &'static str {
        match self {
            IdKind::Table => "tbl",
            IdKind::RowGroup => "row",
            IdKind::Cell => "cell",
        }
    }
}

static ISSUED: AtomicU64 = AtomicU64::new(0);

/// Issues structural identifiers.
///
/// Every identifier combines a process-wide counter with a random suffix, so
/// two identifiers are never equal within a process and are vanishingly
/// unlikely to collide across processes. Callers must treat the result as
/// opaque; the counter is not an ordering guarantee.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdGenerator;

impl IdGenerator {
    /// Identifier for a new table
    pub fn new_table_id() -> TableId {
        TableId(Self::issue(IdKind::Table))
    }

    /// Identifier for a new row
    pub fn new_row_group_id() -> RowGroupId {
        RowGroupId(Self::issue(IdKind::RowGroup))
    }

    /// Identifier for a new cell
    pub fn new_cell_id() -> CellId {
        CellId(Self::issue(IdKind::Cell))
    }

    fn issue(kind: IdKind) -> String {
        let serial = ISSUED.fetch_add(1, Ordering::Relaxed);
        let entropy = Uuid::new_v4().simple().to_string();
        format!("{}-{:x}-{}", kind.prefix(), serial, &entropy[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_cell_ids_are_distinct() {
        let ids: HashSet<CellId> = (0..1000).map(|_| IdGenerator::new_cell_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_kinds_do_not_share_ids() {
        let table = IdGenerator::new_table_id();
        let row = IdGenerator::new_row_group_id();
        let cell = IdGenerator::new_cell_id();
        assert_ne!(table.as_str(), row.as_str());
        assert_ne!(row.as_str(), cell.as_str());
    }

    #[test]
    fn test_structural_id_serializes_as_plain_string() {
        let id = CellId::from_raw("cell-1-abcdef01");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cell-1-abcdef01\"");
    }
}
