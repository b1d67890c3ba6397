//! Extension points around table editing
//!
//! Hosts plug in here instead of patching editor behavior. Hook failures
//! are logged and never abort the edit that triggered them.

use doc_model::{CellId, TableId};
use serde::{Deserialize, Serialize};

/// Structural edits reported to [`TableEditHooks`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructuralOp {
    InsertTable,
    DeleteTable,
    InsertRow,
    DeleteRow,
    InsertColumn,
    DeleteColumn,
    MergeCells,
    SplitCell,
    ResizeColumn,
    ClearCells,
    StyleCells,
}

/// Observes and may veto structural table edits
pub trait TableEditHooks: Send {
    /// Called before a structural edit. Returning false refuses the edit.
    fn before_structural_edit(&mut self, _op: StructuralOp) -> bool {
        true
    }

    /// Called after a structural edit was applied
    fn after_structural_edit(&mut self, _op: StructuralOp) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Table-adjacent tooling the host draws (handles, menus, resize grips)
pub trait TableTooling: Send {
    /// Show tooling for a cell
    fn show(&mut self, table: &TableId, cell: &CellId) -> anyhow::Result<()>;

    /// Hide all tooling
    fn hide(&mut self) -> anyhow::Result<()>;
}

/// Hooks that allow everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl TableEditHooks for NoopHooks {}

/// Tooling that draws nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTooling;

impl TableTooling for NoopTooling {
    fn show(&mut self, _table: &TableId, _cell: &CellId) -> anyhow::Result<()> {
        Ok(())
    }

    fn hide(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
