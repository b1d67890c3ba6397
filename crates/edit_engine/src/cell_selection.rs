//! Rectangular cell-range selection
//!
//! The selection remembers its anchor and focus cells by identifier only.
//! The rectangle is recomputed against the live tree on every query, so a
//! selection survives edits elsewhere in the table and quietly becomes
//! empty once one of its corner cells is deleted.

use doc_model::{CellId, CellRect, DocumentTree, NodeId, TableId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Lifecycle of a cell-range selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionState {
    /// Nothing selected
    #[default]
    Idle,
    /// One cell selected
    SingleCell,
    /// Pointer is down and dragging across cells
    RangeSelecting,
    /// A range of cells was committed
    RangeSelected,
}

/// Cells covered by a selection, resolved against a specific tree
#[derive(Debug, Clone)]
pub struct SelectedCells {
    /// Table node the cells belong to
    pub table: NodeId,
    /// Normalized rectangle, grown to whole cells
    pub rect: CellRect,
    /// Cells in row-major order
    pub cells: Vec<NodeId>,
    set: HashSet<NodeId>,
}

impl SelectedCells {
    /// Whether a cell is part of the selection
    pub fn contains(&self, cell: NodeId) -> bool {
        self.set.contains(&cell)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Anchor/focus selection over the cells of one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRangeSelection {
    state: SelectionState,
    anchor: Option<CellId>,
    focus: Option<CellId>,
    table: Option<TableId>,
}

impl CellRangeSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn anchor(&self) -> Option<&CellId> {
        self.anchor.as_ref()
    }

    pub fn focus(&self) -> Option<&CellId> {
        self.focus.as_ref()
    }

    pub fn table(&self) -> Option<&TableId> {
        self.table.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.state == SelectionState::Idle
    }

    // ========================================================================
    // Pointer input
    // ========================================================================

    /// Start a range at a cell. Returns false if the cell is not in a table.
    pub fn pointer_down(&mut self, tree: &DocumentTree, cell: NodeId) -> bool {
        let Some(tag) = tree.cell_tag_for(cell) else {
            return false;
        };
        self.table = Some(tag.table_id);
        self.anchor = Some(tag.cell_id.clone());
        self.focus = Some(tag.cell_id);
        self.state = SelectionState::RangeSelecting;
        true
    }

    /// Drag over a cell. Returns true if the focus moved. Cells of other
    /// tables are ignored.
    pub fn pointer_move(&mut self, tree: &DocumentTree, cell: NodeId) -> bool {
        if self.state != SelectionState::RangeSelecting {
            return false;
        }
        let Some(tag) = tree.cell_tag_for(cell) else {
            return false;
        };
        if self.table.as_ref() != Some(&tag.table_id) || self.focus.as_ref() == Some(&tag.cell_id) {
            return false;
        }
        self.focus = Some(tag.cell_id);
        true
    }

    /// Finish dragging
    pub fn pointer_up(&mut self) {
        if self.state == SelectionState::RangeSelecting {
            self.state = if self.anchor == self.focus {
                SelectionState::SingleCell
            } else {
                SelectionState::RangeSelected
            };
        }
    }

    // ========================================================================
    // Programmatic changes
    // ========================================================================

    /// Select exactly one cell
    pub fn select_single(&mut self, tree: &DocumentTree, cell: NodeId) -> bool {
        if !self.pointer_down(tree, cell) {
            return false;
        }
        self.state = SelectionState::SingleCell;
        true
    }

    /// Move the focus while keeping the anchor (shift+click, shift+arrow).
    /// Without an anchor in the same table this selects the cell alone.
    pub fn extend_to(&mut self, tree: &DocumentTree, cell: NodeId) -> bool {
        let Some(tag) = tree.cell_tag_for(cell) else {
            return false;
        };
        if self.anchor.is_none() || self.table.as_ref() != Some(&tag.table_id) {
            return self.select_single(tree, cell);
        }
        self.focus = Some(tag.cell_id);
        self.state = if self.anchor == self.focus {
            SelectionState::SingleCell
        } else {
            SelectionState::RangeSelected
        };
        true
    }

    /// Back to Idle
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Drop the selection if its table, anchor or focus no longer resolve.
    /// Returns true if it was cleared.
    pub fn revalidate(&mut self, tree: &DocumentTree) -> bool {
        if self.is_idle() {
            return false;
        }
        if self.resolve(tree).is_none() {
            tracing::debug!("Cell selection no longer resolves, clearing it");
            self.clear();
            return true;
        }
        false
    }

    fn resolve(&self, tree: &DocumentTree) -> Option<(NodeId, NodeId, NodeId)> {
        let table = tree.find_table_by_id(self.table.as_ref()?)?;
        let anchor = tree.find_cell_by_id(self.anchor.as_ref()?)?;
        let focus = tree.find_cell_by_id(self.focus.as_ref()?)?;
        let in_table = |cell: NodeId| {
            tree.cell_tag_for(cell)
                .map(|tag| Some(&tag.table_id) == self.table.as_ref())
                .unwrap_or(false)
        };
        (in_table(anchor) && in_table(focus)).then_some((table, anchor, focus))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The cells currently selected, or None when idle or unresolvable
    pub fn selected_cells(&self, tree: &DocumentTree) -> Option<SelectedCells> {
        if self.is_idle() {
            return None;
        }
        let (table, anchor, focus) = self.resolve(tree)?;
        let map = tree.table_grid_map(table)?;
        let rect = map.placement(anchor)?.rect.union(&map.placement(focus)?.rect);
        let rect = map.expand_to_whole_cells(rect);
        let cells = map.cells_in(&rect);
        let set = cells.iter().copied().collect();
        Some(SelectedCells { table, rect, cells, set })
    }

    /// Number of selected cells (0 when idle)
    pub fn cell_count(&self, tree: &DocumentTree) -> usize {
        self.selected_cells(tree).map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{Node, Position, TableSpec};
    use proptest::prelude::*;

    fn doc_with_table(rows: usize, columns: usize) -> (DocumentTree, NodeId) {
        let mut tree = DocumentTree::with_empty_paragraph();
        let at = Position::start_of(tree.document.children()[0]);
        let table = tree.insert_table(&TableSpec::new(rows, columns), &at).unwrap();
        (tree, table)
    }

    fn cell(tree: &DocumentTree, table: NodeId, row: usize, col: usize) -> NodeId {
        tree.table_grid_map(table).unwrap().slot(row, col).unwrap()
    }

    #[test]
    fn test_drag_lifecycle() {
        let (tree, table) = doc_with_table(3, 3);
        let mut selection = CellRangeSelection::new();
        assert!(selection.selected_cells(&tree).is_none());

        assert!(selection.pointer_down(&tree, cell(&tree, table, 0, 0)));
        assert_eq!(selection.state(), SelectionState::RangeSelecting);
        assert!(selection.pointer_move(&tree, cell(&tree, table, 1, 1)));
        assert!(!selection.pointer_move(&tree, cell(&tree, table, 1, 1)));
        selection.pointer_up();
        assert_eq!(selection.state(), SelectionState::RangeSelected);

        let selected = selection.selected_cells(&tree).unwrap();
        assert_eq!(selected.len(), 4);
        assert!(selected.contains(cell(&tree, table, 1, 0)));
        assert!(!selected.contains(cell(&tree, table, 2, 2)));
    }

    #[test]
    fn test_click_without_drag_is_single_cell() {
        let (tree, table) = doc_with_table(2, 2);
        let mut selection = CellRangeSelection::new();
        selection.pointer_down(&tree, cell(&tree, table, 1, 0));
        selection.pointer_up();
        assert_eq!(selection.state(), SelectionState::SingleCell);
        assert_eq!(selection.cell_count(&tree), 1);
    }

    #[test]
    fn test_moves_into_other_table_are_ignored() {
        let (mut tree, table) = doc_with_table(2, 2);
        let end = *tree.document.children().last().unwrap();
        let other = tree.insert_table(&TableSpec::new(1, 1), &Position::start_of(end)).unwrap();

        let mut selection = CellRangeSelection::new();
        selection.pointer_down(&tree, cell(&tree, table, 0, 0));
        assert!(!selection.pointer_move(&tree, cell(&tree, other, 0, 0)));
        assert_eq!(selection.cell_count(&tree), 1);
    }

    #[test]
    fn test_extend_to() {
        let (tree, table) = doc_with_table(3, 3);
        let mut selection = CellRangeSelection::new();
        selection.extend_to(&tree, cell(&tree, table, 0, 2));
        assert_eq!(selection.state(), SelectionState::SingleCell);

        selection.extend_to(&tree, cell(&tree, table, 2, 1));
        assert_eq!(selection.state(), SelectionState::RangeSelected);
        let selected = selection.selected_cells(&tree).unwrap();
        assert_eq!(selected.rect, CellRect::spanning(0, 1, 2, 2));
        assert_eq!(selected.len(), 6);
    }

    #[test]
    fn test_rectangle_grows_over_merged_cells() {
        let (mut tree, table) = doc_with_table(3, 3);
        let merged = tree.merge_cells(cell(&tree, table, 0, 1), cell(&tree, table, 1, 2)).unwrap();

        let mut selection = CellRangeSelection::new();
        selection.pointer_down(&tree, cell(&tree, table, 1, 0));
        selection.pointer_move(&tree, cell(&tree, table, 2, 1));
        selection.pointer_up();

        let selected = selection.selected_cells(&tree).unwrap();
        assert!(selected.contains(merged));
        assert_eq!(selected.rect, CellRect::spanning(0, 0, 2, 2));
    }

    #[test]
    fn test_deleting_anchor_cell_clears_selection() {
        let (mut tree, table) = doc_with_table(2, 2);
        let mut selection = CellRangeSelection::new();
        selection.pointer_down(&tree, cell(&tree, table, 0, 0));
        selection.pointer_move(&tree, cell(&tree, table, 1, 1));
        selection.pointer_up();

        let first_row = tree.table_rows_in_order(table)[0];
        tree.delete_row(first_row).unwrap();

        assert!(selection.selected_cells(&tree).is_none());
        assert!(selection.revalidate(&tree));
        assert!(selection.is_idle());
        assert!(!selection.revalidate(&tree));
    }

    proptest! {
        #[test]
        fn selection_covers_exactly_the_rectangle(
            rows in 1usize..5,
            columns in 1usize..5,
            r1 in 0usize..5, c1 in 0usize..5,
            r2 in 0usize..5, c2 in 0usize..5,
        ) {
            let (tree, table) = doc_with_table(rows, columns);
            let (r1, r2) = (r1 % rows, r2 % rows);
            let (c1, c2) = (c1 % columns, c2 % columns);

            let mut selection = CellRangeSelection::new();
            prop_assert!(selection.pointer_down(&tree, cell(&tree, table, r1, c1)));
            selection.pointer_move(&tree, cell(&tree, table, r2, c2));
            selection.pointer_up();

            let selected = selection.selected_cells(&tree).unwrap();
            let rect = CellRect::spanning(r1, c1, r2, c2);
            prop_assert_eq!(selected.rect, rect);
            prop_assert_eq!(selected.len(), rect.row_span() * rect.col_span());
            for r in 0..rows {
                for c in 0..columns {
                    let inside = selected.contains(cell(&tree, table, r, c));
                    prop_assert_eq!(inside, rect.contains(r, c));
                }
            }
        }
    }
}
