//! Table editing commands
//!
//! This module implements commands for creating and modifying tables:
//! - InsertTable: Create a new table (optionally from pasted cell texts)
//! - InsertRow / InsertColumn: Add rows above/below and columns left/right
//! - DeleteRow / DeleteColumn / DeleteTable: Remove table elements
//! - MergeCells / SplitCell: Rectangular cell merging
//! - SetColumnWidth: Commit a column resize
//! - SetCellShading / SetCellBorders: Format cells
//! - ClearCells: Empty a set of cells down to one line each
//! - ApplyCellFormats: Stamp character and paragraph formats onto cells
//!
//! Each command runs on a copy of the tree, so a refused edit leaves the
//! live document untouched.

use crate::{caret_at_offset, relocate_selection, Command, CommandResult, EditError, Result};
use doc_model::{
    CellBorders, CellId, CharacterProperties, DocumentTree, NodeId, ParagraphProperties,
    PastedTable, Position, Selection, TableSpec,
};
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Build a result that carries the selection across the edit
fn relocated(tree: &DocumentTree, new_tree: DocumentTree, selection: &Selection) -> CommandResult {
    let new_selection = relocate_selection(tree, &new_tree, selection);
    CommandResult::with_snapshot(new_tree, new_selection, tree, selection)
}

// =============================================================================
// InsertTable Command
// =============================================================================

/// Insert a new table at a position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertTable {
    pub spec: TableSpec,
    pub position: Position,
}

impl InsertTable {
    /// Create a new InsertTable command
    pub fn new(rows: usize, columns: usize, position: Position) -> Self {
        Self::from_spec(TableSpec::new(rows, columns), position)
    }

    /// Insert a table with a fully specified shape
    pub fn from_spec(spec: TableSpec, position: Position) -> Self {
        Self { spec, position }
    }

    /// Insert a table recovered from pasted markup. Returns None for a
    /// paste without cells.
    pub fn from_paste(pasted: &PastedTable, column_width: f32, position: Position) -> Option<Self> {
        pasted.to_spec(column_width).map(|spec| Self::from_spec(spec, position))
    }
}

impl Command for InsertTable {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        new_tree.insert_table(&self.spec, &self.position)?;
        Ok(relocated(tree, new_tree, selection))
    }

    fn display_name(&self) -> &str {
        "Insert Table"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// DeleteTable Command
// =============================================================================

/// Delete a table; the caret lands where the table started
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTable {
    pub table: NodeId,
}

impl DeleteTable {
    pub fn new(table: NodeId) -> Self {
        Self { table }
    }
}

impl Command for DeleteTable {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        let start = new_tree.delete_table(self.table)?;
        let caret = caret_at_offset(&new_tree, start);
        Ok(CommandResult::with_snapshot(new_tree, caret, tree, selection))
    }

    fn display_name(&self) -> &str {
        "Delete Table"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// InsertRow Command
// =============================================================================

/// Insert a row above or below an existing row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertRow {
    pub row: NodeId,
    pub below: bool,
    /// Typing format given to the new cells' lines
    pub cell_format: CharacterProperties,
}

impl InsertRow {
    pub fn above(row: NodeId) -> Self {
        Self {
            row,
            below: false,
            cell_format: CharacterProperties::default(),
        }
    }

    pub fn below(row: NodeId) -> Self {
        Self {
            below: true,
            ..Self::above(row)
        }
    }

    pub fn with_cell_format(mut self, format: CharacterProperties) -> Self {
        self.cell_format = format;
        self
    }
}

impl Command for InsertRow {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        new_tree.insert_row_relative(self.row, self.below, &self.cell_format)?;
        Ok(relocated(tree, new_tree, selection))
    }

    fn display_name(&self) -> &str {
        if self.below {
            "Insert Row Below"
        } else {
            "Insert Row Above"
        }
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// InsertColumn Command
// =============================================================================

/// Insert a column left or right of a cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertColumn {
    pub cell: NodeId,
    pub right: bool,
    pub cell_format: CharacterProperties,
}

impl InsertColumn {
    pub fn left(cell: NodeId) -> Self {
        Self {
            cell,
            right: false,
            cell_format: CharacterProperties::default(),
        }
    }

    pub fn right(cell: NodeId) -> Self {
        Self {
            right: true,
            ..Self::left(cell)
        }
    }

    pub fn with_cell_format(mut self, format: CharacterProperties) -> Self {
        self.cell_format = format;
        self
    }
}

impl Command for InsertColumn {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        new_tree.insert_column_relative(self.cell, self.right, &self.cell_format)?;
        Ok(relocated(tree, new_tree, selection))
    }

    fn display_name(&self) -> &str {
        if self.right {
            "Insert Column Right"
        } else {
            "Insert Column Left"
        }
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// DeleteRow / DeleteColumn Commands
// =============================================================================

/// Delete a row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRow {
    pub row: NodeId,
}

impl DeleteRow {
    pub fn new(row: NodeId) -> Self {
        Self { row }
    }
}

impl Command for DeleteRow {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        new_tree.delete_row(self.row)?;
        Ok(relocated(tree, new_tree, selection))
    }

    fn display_name(&self) -> &str {
        "Delete Row"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Delete a grid column of a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteColumn {
    pub table: NodeId,
    pub column: usize,
}

impl DeleteColumn {
    pub fn new(table: NodeId, column: usize) -> Self {
        Self { table, column }
    }
}

impl Command for DeleteColumn {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        new_tree.delete_column(self.table, self.column)?;
        Ok(relocated(tree, new_tree, selection))
    }

    fn display_name(&self) -> &str {
        "Delete Column"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// MergeCells / SplitCell Commands
// =============================================================================

/// Merge the rectangle spanned by two cells into its top-left cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeCells {
    pub first: NodeId,
    pub second: NodeId,
}

impl MergeCells {
    pub fn new(first: NodeId, second: NodeId) -> Self {
        Self { first, second }
    }
}

impl Command for MergeCells {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        let anchor = new_tree.merge_cells(self.first, self.second)?;
        let caret = new_tree
            .get_table_cell(anchor)
            .and_then(|cell| cell.blocks().first().copied())
            .map(Selection::at_start_of);
        let result = match caret {
            Some(caret) => CommandResult::with_snapshot(new_tree, caret, tree, selection),
            None => relocated(tree, new_tree, selection),
        };
        Ok(result)
    }

    fn display_name(&self) -> &str {
        "Merge Cells"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Split a merged cell back into single cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitCell {
    pub cell: NodeId,
}

impl SplitCell {
    pub fn new(cell: NodeId) -> Self {
        Self { cell }
    }
}

impl Command for SplitCell {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        new_tree.split_cell(self.cell)?;
        Ok(relocated(tree, new_tree, selection))
    }

    fn display_name(&self) -> &str {
        "Split Cell"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// SetColumnWidth Command
// =============================================================================

/// Commit the width of one grid column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetColumnWidth {
    pub table: NodeId,
    pub column: usize,
    /// Width in points
    pub width: f32,
}

impl SetColumnWidth {
    pub fn new(table: NodeId, column: usize, width: f32) -> Self {
        Self { table, column, width }
    }
}

impl Command for SetColumnWidth {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        new_tree.set_column_width(self.table, self.column, self.width)?;
        Ok(CommandResult::with_snapshot(new_tree, *selection, tree, selection))
    }

    fn display_name(&self) -> &str {
        "Resize Column"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Cell Styling Commands
// =============================================================================

/// Set (or clear) the background of a set of cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCellShading {
    pub cells: Vec<NodeId>,
    pub shading: Option<String>,
}

impl SetCellShading {
    pub fn new(cells: Vec<NodeId>, shading: Option<String>) -> Self {
        Self { cells, shading }
    }
}

impl Command for SetCellShading {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        for &cell in &self.cells {
            new_tree.set_cell_shading(cell, self.shading.clone())?;
        }
        Ok(CommandResult::with_snapshot(new_tree, *selection, tree, selection))
    }

    fn display_name(&self) -> &str {
        "Set Cell Shading"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Set (or clear) the borders of a set of cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCellBorders {
    pub cells: Vec<NodeId>,
    pub borders: Option<CellBorders>,
}

impl SetCellBorders {
    pub fn new(cells: Vec<NodeId>, borders: Option<CellBorders>) -> Self {
        Self { cells, borders }
    }
}

impl Command for SetCellBorders {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        for &cell in &self.cells {
            new_tree.set_cell_borders(cell, self.borders.clone())?;
        }
        Ok(CommandResult::with_snapshot(new_tree, *selection, tree, selection))
    }

    fn display_name(&self) -> &str {
        "Set Cell Borders"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// ClearCells Command
// =============================================================================

/// Reduce every listed cell to one empty line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearCells {
    pub cells: Vec<NodeId>,
}

impl ClearCells {
    pub fn new(cells: Vec<NodeId>) -> Self {
        Self { cells }
    }
}

impl Command for ClearCells {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        if self.cells.is_empty() {
            return Err(EditError::InvalidCommand("No cells to clear".into()));
        }
        let mut new_tree = tree.clone();
        let mut first_line = None;
        for &cell in &self.cells {
            let kept = new_tree.clear_cell(cell)?;
            first_line.get_or_insert(kept);
        }
        let caret = first_line.map(Selection::at_start_of).unwrap_or(*selection);
        Ok(CommandResult::with_snapshot(new_tree, caret, tree, selection))
    }

    fn display_name(&self) -> &str {
        "Clear Cells"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// ApplyCellFormats Command
// =============================================================================

/// Give the still-empty lines of the named cells the captured typing
/// formatting, and alignment where a line has none of its own. Text already
/// in a cell keeps its formatting. Cells are looked up by identifier when
/// the command runs; cells that no longer exist are skipped, and the command
/// fails only when none of them resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyCellFormats {
    pub cells: Vec<CellId>,
    pub characters: CharacterProperties,
    pub paragraph: ParagraphProperties,
}

impl ApplyCellFormats {
    pub fn new(
        cells: Vec<CellId>,
        characters: CharacterProperties,
        paragraph: ParagraphProperties,
    ) -> Self {
        Self {
            cells,
            characters,
            paragraph,
        }
    }
}

impl Command for ApplyCellFormats {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        let mut resolved = 0;
        let mut touched = Vec::new();
        for cell_id in &self.cells {
            let Some(cell_node) = tree.find_cell_by_id(cell_id) else { continue };
            resolved += 1;
            let lines = tree
                .get_table_cell(cell_node)
                .map(|cell| cell.blocks().to_vec())
                .unwrap_or_default();
            for line in lines {
                let Some(para) = tree.get_paragraph(line) else { continue };
                let empty = tree.paragraph_len(line) == 0;
                let align = self.paragraph.alignment.is_some()
                    && para.direct_formatting.alignment.is_none();
                if empty {
                    new_tree.apply_character_format(line, 0, 0, &self.characters)?;
                }
                if align {
                    new_tree.apply_paragraph_format(line, &self.paragraph)?;
                }
                if empty || align {
                    touched.push(line);
                }
            }
        }
        if resolved == 0 {
            return Err(EditError::ExecutionFailed("None of the target cells exist".into()));
        }
        Ok(CommandResult::with_line_snapshot(new_tree, *selection, tree, &touched, selection))
    }

    fn display_name(&self) -> &str {
        "Apply Cell Formats"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
