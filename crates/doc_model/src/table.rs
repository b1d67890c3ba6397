//! Table model - tables, row groups, rows, cells and column definitions
//!
//! A table owns up to three row groups in a fixed order: a temporary
//! placeholder group used while the table is being built, an optional header
//! group, and a body group. Rows own cells and cells own their lines (cell
//! blocks, stored as paragraphs). Parent links are plain ids used for upward
//! traversal only; the owning side is always the child list.

use crate::{CellId, Node, NodeId, NodeType, RowGroupId, TableId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Width Types
// =============================================================================

/// How width is specified for columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum WidthType {
    /// Fixed width in points
    Fixed,
    /// Auto-fit to content
    #[default]
    Auto,
    /// Percentage of available width
    Percent,
}

/// Width specification with value and type
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TableWidth {
    /// Width value (interpretation depends on width_type)
    pub value: f32,
    /// How to interpret the value
    pub width_type: WidthType,
}

impl TableWidth {
    /// Create a fixed width in points
    pub fn fixed(points: f32) -> Self {
        Self {
            value: points,
            width_type: WidthType::Fixed,
        }
    }
}

// =============================================================================
// Borders
// =============================================================================

/// Border style type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableBorderStyle {
    #[default]
    None,
    Single,
    Double,
    Dotted,
    Dashed,
}

/// A single border definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBorder {
    pub style: TableBorderStyle,
    /// Border width in points
    pub width: f32,
    /// Border color (CSS color string)
    pub color: String,
}

impl Default for TableBorder {
    fn default() -> Self {
        Self {
            style: TableBorderStyle::Single,
            width: 0.5,
            color: "#000000".to_string(),
        }
    }
}

/// Cell borders (all four sides)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellBorders {
    pub top: Option<TableBorder>,
    pub bottom: Option<TableBorder>,
    pub left: Option<TableBorder>,
    pub right: Option<TableBorder>,
}

impl CellBorders {
    /// Create borders with all sides the same
    pub fn all(border: TableBorder) -> Self {
        Self {
            top: Some(border.clone()),
            bottom: Some(border.clone()),
            left: Some(border.clone()),
            right: Some(border),
        }
    }
}

// =============================================================================
// Column Definitions
// =============================================================================

/// Definition of a column in the table grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridColumn {
    pub width: TableWidth,
}

impl GridColumn {
    /// Create a column with fixed width
    pub fn fixed(points: f32) -> Self {
        Self {
            width: TableWidth::fixed(points),
        }
    }
}

/// Column layout of a table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableGrid {
    pub columns: Vec<GridColumn>,
}

impl TableGrid {
    /// Create a grid with equal fixed-width columns
    pub fn with_equal_columns(count: usize, column_width: f32) -> Self {
        Self {
            columns: vec![GridColumn::fixed(column_width); count],
        }
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Insert a column at an index (clamped to the end)
    pub fn insert_column(&mut self, index: usize, column: GridColumn) {
        let index = index.min(self.columns.len());
        self.columns.insert(index, column);
    }

    /// Remove a column
    pub fn remove_column(&mut self, index: usize) -> Option<GridColumn> {
        if index < self.columns.len() {
            Some(self.columns.remove(index))
        } else {
            None
        }
    }
}

// =============================================================================
// Cell
// =============================================================================

/// Styling attributes of a table cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellProperties {
    /// Cell borders
    pub borders: Option<CellBorders>,
    /// Background color (CSS color string)
    pub shading: Option<String>,
}

/// A cell in a table row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCell {
    id: NodeId,
    parent: Option<NodeId>,
    /// Stable structural identifier, stamped on every line of the cell
    cell_id: CellId,
    /// Lines of content; never empty once the cell is attached
    blocks: Vec<NodeId>,
    /// Styling attributes
    pub properties: CellProperties,
    /// Number of grid columns this cell spans (colspan)
    pub grid_span: u32,
    /// Number of rows this cell spans (rowspan)
    pub row_span: u32,
}

impl TableCell {
    /// Create a new empty cell with the given identifier
    pub fn new(cell_id: CellId) -> Self {
        Self {
            id: NodeId::new(),
            parent: None,
            cell_id,
            blocks: Vec::new(),
            properties: CellProperties::default(),
            grid_span: 1,
            row_span: 1,
        }
    }

    /// The cell's structural identifier
    pub fn cell_id(&self) -> &CellId {
        &self.cell_id
    }

    /// Lines of content in order
    pub fn blocks(&self) -> &[NodeId] {
        &self.blocks
    }

    /// Add a block
    pub fn add_block(&mut self, block_id: NodeId) {
        self.blocks.push(block_id);
    }

    /// Insert a block at an index (clamped to the end)
    pub fn insert_block(&mut self, index: usize, block_id: NodeId) {
        let index = index.min(self.blocks.len());
        self.blocks.insert(index, block_id);
    }

    /// Remove a block by ID
    pub fn remove_block(&mut self, block_id: NodeId) -> bool {
        if let Some(pos) = self.blocks.iter().position(|&id| id == block_id) {
            self.blocks.remove(pos);
            true
        } else {
            false
        }
    }

    /// Get effective grid span (at least 1)
    pub fn effective_grid_span(&self) -> usize {
        self.grid_span.max(1) as usize
    }

    /// Get effective row span (at least 1)
    pub fn effective_row_span(&self) -> usize {
        self.row_span.max(1) as usize
    }

    /// Whether this cell covers more than one grid slot
    pub fn is_merged(&self) -> bool {
        self.effective_grid_span() > 1 || self.effective_row_span() > 1
    }
}

impl Node for TableCell {
    fn id(&self) -> NodeId {
        self.id
    }

    fn node_type(&self) -> NodeType {
        NodeType::TableCell
    }

    fn children(&self) -> &[NodeId] {
        &self.blocks
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

// =============================================================================
// Row
// =============================================================================

/// A row in a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRow {
    id: NodeId,
    parent: Option<NodeId>,
    /// Identifier shared by every cell line in this row
    row_id: RowGroupId,
    /// IDs of child cells
    cells: Vec<NodeId>,
    /// Row height in points (None = auto)
    pub height: Option<f32>,
}

impl TableRow {
    /// Create a new empty row
    pub fn new(row_id: RowGroupId) -> Self {
        Self {
            id: NodeId::new(),
            parent: None,
            row_id,
            cells: Vec::new(),
            height: None,
        }
    }

    /// The row's structural identifier
    pub fn row_id(&self) -> &RowGroupId {
        &self.row_id
    }

    /// Insert a cell at a specific index (clamped to the end)
    pub fn insert_cell(&mut self, index: usize, cell_id: NodeId) {
        let index = index.min(self.cells.len());
        self.cells.insert(index, cell_id);
    }

    /// Remove a cell by ID
    pub fn remove_cell(&mut self, cell_id: NodeId) -> bool {
        if let Some(pos) = self.cells.iter().position(|&id| id == cell_id) {
            self.cells.remove(pos);
            true
        } else {
            false
        }
    }

    /// Get the number of cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

impl Node for TableRow {
    fn id(&self) -> NodeId {
        self.id
    }

    fn node_type(&self) -> NodeType {
        NodeType::TableRow
    }

    fn children(&self) -> &[NodeId] {
        &self.cells
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

// =============================================================================
// Row Group
// =============================================================================

/// Which section of a table a row group is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowGroupKind {
    /// Placeholder present only while a table is being built
    Temporary,
    /// Header rows
    Header,
    /// Body rows
    Body,
}

/// An ordered group of rows within a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowGroup {
    id: NodeId,
    parent: Option<NodeId>,
    kind: RowGroupKind,
    rows: Vec<NodeId>,
}

impl RowGroup {
    /// Create an empty group
    pub fn new(kind: RowGroupKind) -> Self {
        Self {
            id: NodeId::new(),
            parent: None,
            kind,
            rows: Vec::new(),
        }
    }

    /// The group's kind
    pub fn kind(&self) -> RowGroupKind {
        self.kind
    }

    /// Insert a row (clamped to the end)
    pub fn insert_row(&mut self, index: usize, row_id: NodeId) {
        let index = index.min(self.rows.len());
        self.rows.insert(index, row_id);
    }

    /// Remove a row by ID
    pub fn remove_row(&mut self, row_id: NodeId) -> bool {
        if let Some(pos) = self.rows.iter().position(|&id| id == row_id) {
            self.rows.remove(pos);
            true
        } else {
            false
        }
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a row within the group
    pub fn index_of(&self, row_id: NodeId) -> Option<usize> {
        self.rows.iter().position(|&id| id == row_id)
    }
}

impl Node for RowGroup {
    fn id(&self) -> NodeId {
        self.id
    }

    fn node_type(&self) -> NodeType {
        NodeType::RowGroup
    }

    fn children(&self) -> &[NodeId] {
        &self.rows
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

// =============================================================================
// Table
// =============================================================================

/// A table: row groups plus column definitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    id: NodeId,
    parent: Option<NodeId>,
    table_id: TableId,
    /// Group slots in document order: temporary, header, body
    groups: Vec<NodeId>,
    temporary: Option<NodeId>,
    header: Option<NodeId>,
    body: Option<NodeId>,
    /// Column definitions (widths)
    pub grid: TableGrid,
}

impl Table {
    /// Create a table with no groups
    pub fn new(table_id: TableId, grid: TableGrid) -> Self {
        Self {
            id: NodeId::new(),
            parent: None,
            table_id,
            groups: Vec::new(),
            temporary: None,
            header: None,
            body: None,
            grid,
        }
    }

    /// The table's structural identifier
    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    /// The group of a given kind, if present
    pub fn group(&self, kind: RowGroupKind) -> Option<NodeId> {
        match kind {
            RowGroupKind::Temporary => self.temporary,
            RowGroupKind::Header => self.header,
            RowGroupKind::Body => self.body,
        }
    }

    /// Attach a group in its slot. Returns false if the slot is taken.
    pub fn set_group(&mut self, kind: RowGroupKind, group_id: NodeId) -> bool {
        if self.group(kind).is_some() {
            return false;
        }
        match kind {
            RowGroupKind::Temporary => self.temporary = Some(group_id),
            RowGroupKind::Header => self.header = Some(group_id),
            RowGroupKind::Body => self.body = Some(group_id),
        }
        self.rebuild_group_order();
        true
    }

    /// Detach a group slot, returning the group that occupied it
    pub fn clear_group(&mut self, kind: RowGroupKind) -> Option<NodeId> {
        let removed = match kind {
            RowGroupKind::Temporary => self.temporary.take(),
            RowGroupKind::Header => self.header.take(),
            RowGroupKind::Body => self.body.take(),
        };
        self.rebuild_group_order();
        removed
    }

    fn rebuild_group_order(&mut self) {
        self.groups = [self.temporary, self.header, self.body]
            .into_iter()
            .flatten()
            .collect();
    }

    /// A table with neither header nor body rows has no meaning
    pub fn is_structurally_empty(&self) -> bool {
        self.header.is_none() && self.body.is_none()
    }

    /// Get the number of columns (from grid)
    pub fn column_count(&self) -> usize {
        self.grid.column_count()
    }
}

impl Node for Table {
    fn id(&self) -> NodeId {
        self.id
    }

    fn node_type(&self) -> NodeType {
        NodeType::Table
    }

    fn children(&self) -> &[NodeId] {
        &self.groups
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

// =============================================================================
// Grid Geometry
// =============================================================================

/// A normalized rectangle of grid slots (inclusive bounds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRect {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl CellRect {
    /// Build a rectangle from two corners in any order
    pub fn spanning(r1: usize, c1: usize, r2: usize, c2: usize) -> Self {
        Self {
            start_row: r1.min(r2),
            start_col: c1.min(c2),
            end_row: r1.max(r2),
            end_col: c1.max(c2),
        }
    }

    /// Number of rows covered
    pub fn row_span(&self) -> usize {
        self.end_row - self.start_row + 1
    }

    /// Number of columns covered
    pub fn col_span(&self) -> usize {
        self.end_col - self.start_col + 1
    }

    /// Check if a slot is within this rectangle
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.start_row && row <= self.end_row && col >= self.start_col && col <= self.end_col
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &CellRect) -> CellRect {
        CellRect {
            start_row: self.start_row.min(other.start_row),
            start_col: self.start_col.min(other.start_col),
            end_row: self.end_row.max(other.end_row),
            end_col: self.end_col.max(other.end_col),
        }
    }
}

/// Where a cell sits on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPlacement {
    /// Top-left slot and extent
    pub rect: CellRect,
    /// Index of the cell inside its row's cell list
    pub index_in_row: usize,
}

/// Slot occupancy of a run of rows, accounting for row and column spans
#[derive(Debug, Clone, Default)]
pub struct GridMap {
    rows: Vec<NodeId>,
    slots: Vec<Vec<Option<NodeId>>>,
    placements: HashMap<NodeId, CellPlacement>,
}

impl GridMap {
    /// Build the map by laying cells out left to right, skipping slots
    /// already covered by row spans from above. `cells_of` yields each row's
    /// cells with their (grid span, row span).
    pub fn build<F>(rows: &[NodeId], mut cells_of: F) -> Self
    where
        F: FnMut(NodeId) -> Vec<(NodeId, usize, usize)>,
    {
        let mut map = GridMap {
            rows: rows.to_vec(),
            slots: vec![Vec::new(); rows.len()],
            placements: HashMap::new(),
        };

        for (r, &row_id) in rows.iter().enumerate() {
            let mut col = 0;
            let cells = cells_of(row_id);
            for (index_in_row, (cell_id, colspan, rowspan)) in cells.into_iter().enumerate() {
                while map.slot(r, col).is_some() {
                    col += 1;
                }
                let last_row = (r + rowspan.max(1) - 1).min(rows.len().saturating_sub(1));
                for rr in r..=last_row {
                    for cc in col..col + colspan.max(1) {
                        map.occupy(rr, cc, cell_id);
                    }
                }
                map.placements.insert(
                    cell_id,
                    CellPlacement {
                        rect: CellRect {
                            start_row: r,
                            start_col: col,
                            end_row: last_row,
                            end_col: col + colspan.max(1) - 1,
                        },
                        index_in_row,
                    },
                );
                col += colspan.max(1);
            }
        }
        map
    }

    fn occupy(&mut self, row: usize, col: usize, cell: NodeId) {
        let line = &mut self.slots[row];
        if line.len() <= col {
            line.resize(col + 1, None);
        }
        line[col] = Some(cell);
    }

    /// The cell covering a slot
    pub fn slot(&self, row: usize, col: usize) -> Option<NodeId> {
        self.slots.get(row).and_then(|line| line.get(col)).copied().flatten()
    }

    /// Placement of a cell
    pub fn placement(&self, cell: NodeId) -> Option<CellPlacement> {
        self.placements.get(&cell).copied()
    }

    /// Row node ids in map order
    pub fn rows(&self) -> &[NodeId] {
        &self.rows
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Occupied width of a row
    pub fn row_width(&self, row: usize) -> usize {
        self.slots
            .get(row)
            .map(|line| line.iter().filter(|slot| slot.is_some()).count())
            .unwrap_or(0)
    }

    /// Cells whose top-left slot lies inside the rectangle, in row-major order
    pub fn cells_in(&self, rect: &CellRect) -> Vec<NodeId> {
        let mut found: Vec<(usize, usize, NodeId)> = self
            .placements
            .iter()
            .filter(|(_, p)| rect.contains(p.rect.start_row, p.rect.start_col))
            .map(|(&id, p)| (p.rect.start_row, p.rect.start_col, id))
            .collect();
        found.sort_by_key(|&(r, c, _)| (r, c));
        found.into_iter().map(|(_, _, id)| id).collect()
    }

    /// Distinct cells covering any slot of a row, left to right
    pub fn cells_covering_row(&self, row: usize) -> Vec<NodeId> {
        let mut cells: Vec<NodeId> = Vec::new();
        if let Some(line) = self.slots.get(row) {
            for cell in line.iter().flatten() {
                if !cells.contains(cell) {
                    cells.push(*cell);
                }
            }
        }
        cells
    }

    /// Distinct cells covering any slot of a column, top to bottom
    pub fn cells_covering_column(&self, col: usize) -> Vec<NodeId> {
        let mut cells: Vec<NodeId> = Vec::new();
        for row in 0..self.slots.len() {
            if let Some(cell) = self.slot(row, col) {
                if !cells.contains(&cell) {
                    cells.push(cell);
                }
            }
        }
        cells
    }

    /// Grow a rectangle until no cell straddles its edge
    pub fn expand_to_whole_cells(&self, rect: CellRect) -> CellRect {
        let mut current = rect;
        loop {
            let mut grown = current;
            for placement in self.placements.values() {
                let p = placement.rect;
                let overlaps = p.start_row <= current.end_row
                    && p.end_row >= current.start_row
                    && p.start_col <= current.end_col
                    && p.end_col >= current.start_col;
                if overlaps {
                    grown = grown.union(&p);
                }
            }
            if grown == current {
                return current;
            }
            current = grown;
        }
    }
}

// =============================================================================
// Table Context
// =============================================================================

/// Everything known about a document position that falls inside a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableContext {
    pub table: NodeId,
    pub group: NodeId,
    pub group_kind: RowGroupKind,
    pub row: NodeId,
    pub cell: NodeId,
    /// The line the position is in
    pub block: NodeId,
    /// Row index across the whole table (header rows first)
    pub row_index: usize,
    /// Grid column of the cell's top-left slot
    pub column_index: usize,
    /// Offset from the start of the cell's first line, counting one
    /// position for each line break
    pub offset_in_cell: usize,
    /// Offset within the line
    pub offset_in_block: usize,
}
