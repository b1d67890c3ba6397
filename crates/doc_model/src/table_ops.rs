//! Structural table operations on the document tree
//!
//! Every operation here either completes and leaves each row group with a
//! uniform grid width, or fails before touching the tree.

use crate::{
    CellBorders, CellId, CellTag, CharacterProperties, DocModelError, DocumentTree, GridColumn,
    GridMap, IdGenerator, Node, NodeId, Paragraph, Position, Result, RowGroup, RowGroupKind, Run,
    Table, TableCell, TableContext, TableGrid, TableId, TableRow, TableWidth,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default column width in points for new tables
pub const DEFAULT_COLUMN_WIDTH: f32 = 120.0;

/// Shape of a table to insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub rows: usize,
    pub columns: usize,
    /// Leading rows placed in the header group
    pub header_rows: usize,
    /// Width of each column in points
    pub column_width: f32,
    /// Optional initial text, row-major
    #[serde(default)]
    pub contents: Vec<Vec<String>>,
}

impl TableSpec {
    /// An empty table of the given size
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            header_rows: 0,
            column_width: DEFAULT_COLUMN_WIDTH,
            contents: Vec::new(),
        }
    }

    pub fn with_header_rows(mut self, header_rows: usize) -> Self {
        self.header_rows = header_rows;
        self
    }

    pub fn with_column_width(mut self, width: f32) -> Self {
        self.column_width = width;
        self
    }

    pub fn with_contents(mut self, contents: Vec<Vec<String>>) -> Self {
        self.contents = contents;
        self
    }
}

/// A table recovered from pasted markup: cell texts row by row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PastedTable {
    pub rows: Vec<Vec<String>>,
    /// Leading rows that were header rows in the source
    #[serde(default)]
    pub header_rows: usize,
}

impl PastedTable {
    /// Widest row determines the column count
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// The structural insert this paste amounts to, or None if it holds no cells
    pub fn to_spec(&self, column_width: f32) -> Option<TableSpec> {
        let columns = self.column_count();
        if self.rows.is_empty() || columns == 0 {
            return None;
        }
        Some(
            TableSpec::new(self.rows.len(), columns)
                .with_header_rows(self.header_rows)
                .with_column_width(column_width)
                .with_contents(self.rows.clone()),
        )
    }
}

/// Result of inserting a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowInsertion {
    pub row: NodeId,
    /// Cells created for the row; slots covered by a taller cell from above
    /// get no new cell
    pub cells: Vec<CellId>,
}

impl DocumentTree {
    // =========================================================================
    // Lookup
    // =========================================================================

    /// Get a table by ID
    pub fn get_table(&self, id: NodeId) -> Option<&Table> {
        self.nodes.tables.get(&id)
    }

    /// Get a mutable table by ID
    pub fn get_table_mut(&mut self, id: NodeId) -> Option<&mut Table> {
        self.nodes.tables.get_mut(&id)
    }

    /// Get a row group by ID
    pub fn get_row_group(&self, id: NodeId) -> Option<&RowGroup> {
        self.nodes.row_groups.get(&id)
    }

    /// Get a table row by ID
    pub fn get_table_row(&self, id: NodeId) -> Option<&TableRow> {
        self.nodes.table_rows.get(&id)
    }

    /// Get a table cell by ID
    pub fn get_table_cell(&self, id: NodeId) -> Option<&TableCell> {
        self.nodes.table_cells.get(&id)
    }

    /// Get a mutable table cell by ID
    pub fn get_table_cell_mut(&mut self, id: NodeId) -> Option<&mut TableCell> {
        self.nodes.table_cells.get_mut(&id)
    }

    /// Find a table node by its structural identifier
    pub fn find_table_by_id(&self, table_id: &TableId) -> Option<NodeId> {
        self.nodes.tables
            .iter()
            .find(|(_, table)| table.table_id() == table_id)
            .map(|(&id, _)| id)
    }

    /// Describe where a position sits inside a table. Returns None when the
    /// position is outside every table or when the chain from line to table
    /// is inconsistent.
    pub fn locate_table_context(&self, position: &Position) -> Option<TableContext> {
        let para = self.nodes.paragraphs.get(&position.node_id)?;
        let tag = para.cell.as_ref()?;
        let cell_node = para.parent()?;
        let cell = self.nodes.table_cells.get(&cell_node)?;
        let row_node = cell.parent()?;
        let row = self.nodes.table_rows.get(&row_node)?;
        let group_node = row.parent()?;
        let group = self.nodes.row_groups.get(&group_node)?;
        let table_node = group.parent()?;
        let table = self.nodes.tables.get(&table_node)?;

        if cell.cell_id() != &tag.cell_id
            || row.row_id() != &tag.row_id
            || table.table_id() != &tag.table_id
        {
            return None;
        }
        if position.offset > self.paragraph_len(position.node_id) {
            return None;
        }

        let mut offset_in_cell = 0;
        let mut found = false;
        for &block in cell.blocks() {
            if block == position.node_id {
                found = true;
                break;
            }
            offset_in_cell += self.paragraph_len(block) + 1;
        }
        if !found {
            return None;
        }

        let placement = self.table_grid_map(table_node)?.placement(cell_node)?;
        Some(TableContext {
            table: table_node,
            group: group_node,
            group_kind: group.kind(),
            row: row_node,
            cell: cell_node,
            block: position.node_id,
            row_index: placement.rect.start_row,
            column_index: placement.rect.start_col,
            offset_in_cell: offset_in_cell + position.offset,
            offset_in_block: position.offset,
        })
    }

    /// Rows of a table across all of its groups, in order
    pub fn table_rows_in_order(&self, table_node: NodeId) -> Vec<NodeId> {
        let Some(table) = self.nodes.tables.get(&table_node) else {
            return Vec::new();
        };
        table.children()
            .iter()
            .filter_map(|group| self.nodes.row_groups.get(group))
            .flat_map(|group| group.children().iter().copied())
            .collect()
    }

    fn grid_map_for(&self, rows: &[NodeId]) -> GridMap {
        GridMap::build(rows, |row_id| {
            self.nodes.table_rows
                .get(&row_id)
                .map(|row| {
                    row.children()
                        .iter()
                        .filter_map(|id| {
                            self.nodes.table_cells
                                .get(id)
                                .map(|cell| {
                                    (*id, cell.effective_grid_span(), cell.effective_row_span())
                                })
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Slot map of one row group
    pub fn group_grid_map(&self, group_node: NodeId) -> Option<GridMap> {
        let group = self.nodes.row_groups.get(&group_node)?;
        Some(self.grid_map_for(group.children()))
    }

    /// Slot map of a whole table, header rows first
    pub fn table_grid_map(&self, table_node: NodeId) -> Option<GridMap> {
        self.nodes.tables.get(&table_node)?;
        Some(self.grid_map_for(&self.table_rows_in_order(table_node)))
    }

    /// Linear offset of the first line of a body child
    pub fn body_child_start_offset(&self, child: NodeId) -> Option<usize> {
        let mut offset = 0;
        for &id in self.document.children() {
            if id == child {
                return Some(offset);
            }
            let blocks = if self.nodes.tables.contains_key(&id) {
                self.table_blocks(id)
            } else {
                vec![id]
            };
            offset += blocks.iter().map(|&b| self.paragraph_len(b) + 1).sum::<usize>();
        }
        None
    }

    /// The cell tag a line inside this cell must carry
    pub fn cell_tag_for(&self, cell_node: NodeId) -> Option<CellTag> {
        let cell = self.nodes.table_cells.get(&cell_node)?;
        let row = self.nodes.table_rows.get(&cell.parent()?)?;
        let group = self.nodes.row_groups.get(&row.parent()?)?;
        let table = self.nodes.tables.get(&group.parent()?)?;
        Some(CellTag {
            table_id: table.table_id().clone(),
            row_id: row.row_id().clone(),
            cell_id: cell.cell_id().clone(),
            group: group.kind(),
        })
    }

    fn group_of_cell(&self, cell_node: NodeId) -> Result<NodeId> {
        self.nodes.table_cells
            .get(&cell_node)
            .and_then(|cell| cell.parent())
            .and_then(|row| self.nodes.table_rows.get(&row))
            .and_then(|row| row.parent())
            .ok_or(DocModelError::NodeNotFound(cell_node.as_uuid()))
    }

    fn table_of_group(&self, group_node: NodeId) -> Result<NodeId> {
        self.nodes.row_groups
            .get(&group_node)
            .and_then(|group| group.parent())
            .ok_or(DocModelError::NodeNotFound(group_node.as_uuid()))
    }

    // =========================================================================
    // Construction
    // =========================================================================

    fn attach_group(&mut self, table_node: NodeId, kind: RowGroupKind) -> Result<NodeId> {
        if let Some(existing) = self.nodes.tables.get(&table_node).and_then(|t| t.group(kind)) {
            return Ok(existing);
        }
        let mut group = RowGroup::new(kind);
        let group_node = group.id();
        group.set_parent(Some(table_node));
        let table = self.nodes.tables.get_mut(&table_node)
            .ok_or(DocModelError::NodeNotFound(table_node.as_uuid()))?;
        table.set_group(kind, group_node);
        self.nodes.row_groups.insert(group_node, group);
        Ok(group_node)
    }

    fn detach_group(&mut self, table_node: NodeId, kind: RowGroupKind) {
        let removed = self.nodes.tables
            .get_mut(&table_node)
            .and_then(|table| table.clear_group(kind));
        if let Some(group_node) = removed {
            self.remove_group_subtree(group_node);
        }
    }

    fn create_row(&mut self, group_node: NodeId, index: usize) -> Result<NodeId> {
        let mut row = TableRow::new(IdGenerator::new_row_group_id());
        let row_node = row.id();
        row.set_parent(Some(group_node));
        let group = self.nodes.row_groups.get_mut(&group_node)
            .ok_or(DocModelError::NodeNotFound(group_node.as_uuid()))?;
        group.insert_row(index, row_node);
        self.nodes.table_rows.insert(row_node, row);
        Ok(row_node)
    }

    /// Create a cell with one line and attach it to a row
    fn create_cell(
        &mut self,
        row_node: NodeId,
        index: usize,
        cell_format: &CharacterProperties,
        text: Option<&str>,
    ) -> Result<(NodeId, CellId)> {
        let cell_id = IdGenerator::new_cell_id();
        let mut cell = TableCell::new(cell_id.clone());
        let cell_node = cell.id();
        cell.set_parent(Some(row_node));
        let row = self.nodes.table_rows.get_mut(&row_node)
            .ok_or(DocModelError::NodeNotFound(row_node.as_uuid()))?;
        row.insert_cell(index, cell_node);
        self.nodes.table_cells.insert(cell_node, cell);

        let tag = self.cell_tag_for(cell_node)
            .ok_or_else(|| {
                DocModelError::TreeStructureError("Row is not attached to a table".into())
            })?;
        let mut line = Paragraph::cell_line(tag);
        line.typing_formatting = cell_format.clone();
        let line_id = self.insert_paragraph(line, cell_node, None)?;
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            self.insert_run(Run::with_direct_formatting(text, cell_format.clone()), line_id, None)?;
        }
        Ok((cell_node, cell_id))
    }

    // =========================================================================
    // Insert / Delete Table
    // =========================================================================

    /// Insert a table at a position so that it becomes its own block.
    ///
    /// A position in the middle of a line splits the line; a table that
    /// would end the document gets an empty line after it. Positions inside
    /// an existing table are refused.
    pub fn insert_table(&mut self, spec: &TableSpec, at: &Position) -> Result<NodeId> {
        if spec.rows == 0 || spec.columns == 0 {
            return Err(DocModelError::InvalidOperation(
                "A table needs at least one row and one column".into(),
            ));
        }
        let para = self.nodes.paragraphs.get(&at.node_id)
            .ok_or(DocModelError::NodeNotFound(at.node_id.as_uuid()))?;
        if para.is_cell_line() || para.parent() != Some(self.root_id()) {
            return Err(DocModelError::NestedTable);
        }
        let len = self.paragraph_len(at.node_id);
        if at.offset > len {
            return Err(DocModelError::InvalidPosition {
                node_id: at.node_id.as_uuid(),
                offset: at.offset,
            });
        }
        let body_index = self.document.body_index_of(at.node_id)
            .ok_or_else(|| DocModelError::TreeStructureError("Line missing from body".into()))?;

        let insert_index = if at.offset == 0 {
            body_index
        } else if at.offset == len {
            body_index + 1
        } else {
            self.split_block(at)?;
            body_index + 1
        };

        let table_node = self.build_table(spec)?;
        self.document.insert_body_child(insert_index, table_node);

        if insert_index + 1 == self.document.children().len() {
            let root = self.root_id();
            self.insert_paragraph(Paragraph::new(), root, None)?;
        }
        Ok(table_node)
    }

    fn build_table(&mut self, spec: &TableSpec) -> Result<NodeId> {
        let mut table = Table::new(
            IdGenerator::new_table_id(),
            TableGrid::with_equal_columns(spec.columns, spec.column_width),
        );
        let table_node = table.id();
        table.set_parent(Some(self.root_id()));
        self.nodes.tables.insert(table_node, table);
        self.attach_group(table_node, RowGroupKind::Temporary)?;

        let header_rows = spec.header_rows.min(spec.rows);
        let no_format = CharacterProperties::default();
        for r in 0..spec.rows {
            let kind = if r < header_rows { RowGroupKind::Header } else { RowGroupKind::Body };
            let group_node = self.attach_group(table_node, kind)?;
            let index =
                self.nodes.row_groups.get(&group_node).map(RowGroup::row_count).unwrap_or(0);
            let row_node = self.create_row(group_node, index)?;
            for c in 0..spec.columns {
                let text = spec.contents.get(r).and_then(|row| row.get(c)).map(String::as_str);
                self.create_cell(row_node, c, &no_format, text)?;
            }
        }

        self.detach_group(table_node, RowGroupKind::Temporary);
        Ok(table_node)
    }

    /// Remove a table and everything in it. Returns the linear offset where
    /// the table used to start. The body is never left without a line.
    pub fn delete_table(&mut self, table_node: NodeId) -> Result<usize> {
        let start = self.body_child_start_offset(table_node)
            .ok_or(DocModelError::NodeNotFound(table_node.as_uuid()))?;
        self.remove_table_subtree(table_node);
        self.document.remove_body_child(table_node);
        self.ensure_body_line()?;
        Ok(start)
    }

    /// Remove every table that has neither header nor body rows. Returns the
    /// identifiers of removed tables; a second call finds nothing to do.
    pub fn prune_empty_tables(&mut self) -> Result<Vec<TableId>> {
        let empty: Vec<(NodeId, TableId)> = self.tables()
            .filter(|table| table.is_structurally_empty())
            .map(|table| (table.id(), table.table_id().clone()))
            .collect();

        let mut removed = Vec::new();
        for (node, table_id) in empty {
            self.remove_table_subtree(node);
            self.document.remove_body_child(node);
            removed.push(table_id);
        }
        if !removed.is_empty() {
            self.ensure_body_line()?;
        }
        Ok(removed)
    }

    fn remove_table_subtree(&mut self, table_node: NodeId) {
        if let Some(table) = self.nodes.tables.remove(&table_node) {
            for &group in table.children() {
                self.remove_group_subtree(group);
            }
        }
    }

    fn remove_group_subtree(&mut self, group_node: NodeId) {
        if let Some(group) = self.nodes.row_groups.remove(&group_node) {
            for &row in group.children() {
                self.remove_row_subtree(row);
            }
        }
    }

    fn remove_row_subtree(&mut self, row_node: NodeId) {
        if let Some(row) = self.nodes.table_rows.remove(&row_node) {
            for &cell in row.children() {
                self.remove_cell_subtree(cell);
            }
        }
    }

    fn remove_cell_subtree(&mut self, cell_node: NodeId) {
        if let Some(cell) = self.nodes.table_cells.remove(&cell_node) {
            for &block in cell.blocks() {
                if let Some(para) = self.nodes.paragraphs.remove(&block) {
                    for run in para.children() {
                        self.nodes.runs.remove(run);
                    }
                }
            }
        }
    }

    fn detach_cell(&mut self, cell_node: NodeId) {
        if let Some(row_node) = self.nodes.table_cells.get(&cell_node).and_then(|c| c.parent()) {
            if let Some(row) = self.nodes.table_rows.get_mut(&row_node) {
                row.remove_cell(cell_node);
            }
        }
        self.remove_cell_subtree(cell_node);
    }

    /// Re-stamp every line of a cell with the tag matching its current place
    fn retag_cell(&mut self, cell_node: NodeId) {
        let Some(tag) = self.cell_tag_for(cell_node) else { return };
        let blocks = self.nodes.table_cells
            .get(&cell_node)
            .map(|cell| cell.blocks().to_vec())
            .unwrap_or_default();
        for block in blocks {
            if let Some(para) = self.nodes.paragraphs.get_mut(&block) {
                para.cell = Some(tag.clone());
            }
        }
    }

    // =========================================================================
    // Rows
    // =========================================================================

    /// Insert a row into a table group at an index. The group is created if
    /// the table does not have one of that kind yet. Slots covered by a
    /// taller cell spanning across the insertion point extend that cell
    /// instead of getting a new one.
    pub fn insert_row(
        &mut self,
        table_node: NodeId,
        kind: RowGroupKind,
        index: usize,
        cell_format: &CharacterProperties,
    ) -> Result<RowInsertion> {
        if kind == RowGroupKind::Temporary {
            return Err(DocModelError::InvalidOperation(
                "Rows cannot be added to the temporary group".into(),
            ));
        }
        let columns = self.nodes.tables
            .get(&table_node)
            .ok_or(DocModelError::NodeNotFound(table_node.as_uuid()))?
            .column_count();
        if columns == 0 {
            return Err(DocModelError::InvalidOperation("Table has no columns".into()));
        }

        let group_node = self.attach_group(table_node, kind)?;
        let map = self.group_grid_map(group_node)
            .ok_or(DocModelError::NodeNotFound(group_node.as_uuid()))?;
        let index = index.min(map.row_count());
        let row_node = self.create_row(group_node, index)?;

        let mut cells = Vec::new();
        let mut extended = HashSet::new();
        let mut col = 0;
        while col < columns {
            let straddling = if index > 0 && index < map.row_count() {
                map.slot(index - 1, col).filter(|&above| map.slot(index, col) == Some(above))
            } else {
                None
            };
            if let Some(cell_node) = straddling {
                if extended.insert(cell_node) {
                    if let Some(cell) = self.nodes.table_cells.get_mut(&cell_node) {
                        cell.row_span = cell.row_span.max(1) + 1;
                    }
                }
                col = map.placement(cell_node).map(|p| p.rect.end_col + 1).unwrap_or(col + 1);
                continue;
            }
            let position = cells.len();
            let (_, cell_id) = self.create_cell(row_node, position, cell_format, None)?;
            cells.push(cell_id);
            col += 1;
        }

        Ok(RowInsertion { row: row_node, cells })
    }

    /// Insert a row directly above or below an existing row
    pub fn insert_row_relative(
        &mut self,
        row_node: NodeId,
        below: bool,
        cell_format: &CharacterProperties,
    ) -> Result<RowInsertion> {
        let group_node = self.nodes.table_rows
            .get(&row_node)
            .and_then(|row| row.parent())
            .ok_or(DocModelError::NodeNotFound(row_node.as_uuid()))?;
        let group = self.nodes.row_groups.get(&group_node)
            .ok_or(DocModelError::NodeNotFound(group_node.as_uuid()))?;
        let kind = group.kind();
        let index = group.index_of(row_node)
            .ok_or_else(|| DocModelError::TreeStructureError("Row missing from its group".into()))?;
        let table_node = self.table_of_group(group_node)?;
        let index = if below { index + 1 } else { index };
        self.insert_row(table_node, kind, index, cell_format)
    }

    /// Delete a row. Cells reaching down from above shrink; tall cells
    /// starting in this row move to the next row. A group left with no rows
    /// is removed from its table.
    pub fn delete_row(&mut self, row_node: NodeId) -> Result<()> {
        let group_node = self.nodes.table_rows
            .get(&row_node)
            .and_then(|row| row.parent())
            .ok_or(DocModelError::NodeNotFound(row_node.as_uuid()))?;
        let table_node = self.table_of_group(group_node)?;
        let map = self.group_grid_map(group_node)
            .ok_or(DocModelError::NodeNotFound(group_node.as_uuid()))?;
        let r = map.rows()
            .iter()
            .position(|&id| id == row_node)
            .ok_or_else(|| DocModelError::TreeStructureError("Row missing from its group".into()))?;

        for cell_node in map.cells_covering_row(r) {
            let Some(placement) = map.placement(cell_node) else { continue };
            let rect = placement.rect;
            if rect.start_row < r {
                if let Some(cell) = self.nodes.table_cells.get_mut(&cell_node) {
                    cell.row_span = cell.row_span.saturating_sub(1).max(1);
                }
            } else if rect.end_row > r {
                let next_row = map.rows()[r + 1];
                let index = self.nodes.table_rows
                    .get(&next_row)
                    .map(|row| {
                        row.children()
                            .iter()
                            .filter(|id| {
                                map.placement(**id)
                                    .map(|p| p.rect.start_col < rect.start_col)
                                    .unwrap_or(false)
                            })
                            .count()
                    })
                    .unwrap_or(0);
                if let Some(row) = self.nodes.table_rows.get_mut(&row_node) {
                    row.remove_cell(cell_node);
                }
                if let Some(row) = self.nodes.table_rows.get_mut(&next_row) {
                    row.insert_cell(index, cell_node);
                }
                if let Some(cell) = self.nodes.table_cells.get_mut(&cell_node) {
                    cell.set_parent(Some(next_row));
                    cell.row_span = cell.row_span.saturating_sub(1).max(1);
                }
                self.retag_cell(cell_node);
            }
        }

        self.remove_row_subtree(row_node);
        let now_empty = match self.nodes.row_groups.get_mut(&group_node) {
            Some(group) => {
                group.remove_row(row_node);
                group.row_count() == 0
            }
            None => false,
        };
        if now_empty {
            if let Some(kind) = self.nodes.row_groups.get(&group_node).map(RowGroup::kind) {
                self.detach_group(table_node, kind);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Columns
    // =========================================================================

    /// Insert a column before grid column `col_index` (clamped to the end)
    /// in every header and body row. Returns the new cells.
    pub fn insert_column(
        &mut self,
        table_node: NodeId,
        col_index: usize,
        cell_format: &CharacterProperties,
    ) -> Result<Vec<CellId>> {
        let table = self.nodes.tables.get(&table_node)
            .ok_or(DocModelError::NodeNotFound(table_node.as_uuid()))?;
        let columns = table.column_count();
        let col_index = col_index.min(columns);
        let width = table.grid.columns
            .get(col_index.saturating_sub(1))
            .map(|c| c.width)
            .unwrap_or_else(|| TableWidth::fixed(DEFAULT_COLUMN_WIDTH));
        let groups: Vec<NodeId> = [RowGroupKind::Header, RowGroupKind::Body]
            .into_iter()
            .filter_map(|kind| table.group(kind))
            .collect();

        let mut created = Vec::new();
        for group_node in groups {
            let Some(map) = self.group_grid_map(group_node) else { continue };
            let mut extended = HashSet::new();
            for (r, &row_node) in map.rows().iter().enumerate() {
                let straddling = if col_index > 0 && col_index < columns {
                    map.slot(r, col_index - 1).filter(|&left| map.slot(r, col_index) == Some(left))
                } else {
                    None
                };
                if let Some(cell_node) = straddling {
                    if extended.insert(cell_node) {
                        if let Some(cell) = self.nodes.table_cells.get_mut(&cell_node) {
                            cell.grid_span = cell.grid_span.max(1) + 1;
                        }
                    }
                    continue;
                }
                let index = self.nodes.table_rows
                    .get(&row_node)
                    .map(|row| {
                        row.children()
                            .iter()
                            .filter(|id| {
                                map.placement(**id)
                                    .map(|p| p.rect.start_col < col_index)
                                    .unwrap_or(false)
                            })
                            .count()
                    })
                    .unwrap_or(0);
                let (_, cell_id) = self.create_cell(row_node, index, cell_format, None)?;
                created.push(cell_id);
            }
        }

        if let Some(table) = self.nodes.tables.get_mut(&table_node) {
            table.grid.insert_column(col_index, GridColumn { width });
        }
        Ok(created)
    }

    /// Insert a column directly left or right of a cell
    pub fn insert_column_relative(
        &mut self,
        cell_node: NodeId,
        right: bool,
        cell_format: &CharacterProperties,
    ) -> Result<Vec<CellId>> {
        let group_node = self.group_of_cell(cell_node)?;
        let table_node = self.table_of_group(group_node)?;
        let placement = self.group_grid_map(group_node)
            .and_then(|map| map.placement(cell_node))
            .ok_or(DocModelError::NodeNotFound(cell_node.as_uuid()))?;
        let index = if right { placement.rect.end_col + 1 } else { placement.rect.start_col };
        self.insert_column(table_node, index, cell_format)
    }

    /// Delete grid column `col_index`. Wide cells shrink; other cells in the
    /// column are removed. Deleting the last column empties the table so the
    /// next prune removes it.
    pub fn delete_column(&mut self, table_node: NodeId, col_index: usize) -> Result<()> {
        let table = self.nodes.tables.get(&table_node)
            .ok_or(DocModelError::NodeNotFound(table_node.as_uuid()))?;
        if col_index >= table.column_count() {
            return Err(DocModelError::InvalidOperation(format!(
                "Column {} is out of range",
                col_index
            )));
        }
        let groups: Vec<NodeId> = [RowGroupKind::Header, RowGroupKind::Body]
            .into_iter()
            .filter_map(|kind| table.group(kind))
            .collect();

        for group_node in groups {
            let Some(map) = self.group_grid_map(group_node) else { continue };
            for cell_node in map.cells_covering_column(col_index) {
                let span =
                    self.nodes.table_cells.get(&cell_node).map(TableCell::effective_grid_span);
                match span {
                    Some(span) if span > 1 => {
                        if let Some(cell) = self.nodes.table_cells.get_mut(&cell_node) {
                            cell.grid_span = (span - 1) as u32;
                        }
                    }
                    Some(_) => self.detach_cell(cell_node),
                    None => {}
                }
            }
        }

        let remaining = match self.nodes.tables.get_mut(&table_node) {
            Some(table) => {
                table.grid.remove_column(col_index);
                table.column_count()
            }
            None => 0,
        };
        if remaining == 0 {
            self.detach_group(table_node, RowGroupKind::Header);
            self.detach_group(table_node, RowGroupKind::Body);
        }
        Ok(())
    }

    /// Commit a column resize
    pub fn set_column_width(
        &mut self,
        table_node: NodeId,
        col_index: usize,
        width: f32,
    ) -> Result<()> {
        if !(width.is_finite() && width > 0.0) {
            return Err(DocModelError::InvalidOperation(format!("Invalid column width {}", width)));
        }
        let table = self.nodes.tables.get_mut(&table_node)
            .ok_or(DocModelError::NodeNotFound(table_node.as_uuid()))?;
        let column = table.grid.columns.get_mut(col_index)
            .ok_or_else(|| {
                DocModelError::InvalidOperation(format!("Column {} is out of range", col_index))
            })?;
        column.width = TableWidth::fixed(width);
        Ok(())
    }

    // =========================================================================
    // Merge / Split
    // =========================================================================

    /// Merge the rectangle spanned by two cells of the same group into its
    /// top-left cell. Non-empty lines of covered cells move into the merged
    /// cell. Returns the merged cell.
    pub fn merge_cells(&mut self, first: NodeId, second: NodeId) -> Result<NodeId> {
        let group_node = self.group_of_cell(first)?;
        if self.group_of_cell(second)? != group_node {
            return Err(DocModelError::InvalidOperation(
                "Cells to merge must be in the same row group".into(),
            ));
        }
        let map = self.group_grid_map(group_node)
            .ok_or(DocModelError::NodeNotFound(group_node.as_uuid()))?;
        let (a, b) = match (map.placement(first), map.placement(second)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(DocModelError::TreeStructureError("Cell is not on the grid".into())),
        };
        let rect = a.rect.union(&b.rect);
        if map.expand_to_whole_cells(rect) != rect {
            return Err(DocModelError::InvalidOperation(
                "Merge range must be a rectangle of whole cells".into(),
            ));
        }
        let cells = map.cells_in(&rect);
        let Some((&anchor, covered)) = cells.split_first() else {
            return Err(DocModelError::InvalidOperation("Nothing to merge".into()));
        };
        if covered.is_empty() {
            return Err(DocModelError::InvalidOperation("Nothing to merge".into()));
        }

        for &cell_node in covered {
            let blocks = self.nodes.table_cells
                .get(&cell_node)
                .map(|cell| cell.blocks().to_vec())
                .unwrap_or_default();
            for block in blocks {
                if self.paragraph_len(block) == 0 {
                    continue;
                }
                if let Some(cell) = self.nodes.table_cells.get_mut(&cell_node) {
                    cell.remove_block(block);
                }
                if let Some(cell) = self.nodes.table_cells.get_mut(&anchor) {
                    cell.add_block(block);
                }
                if let Some(para) = self.nodes.paragraphs.get_mut(&block) {
                    para.set_parent(Some(anchor));
                }
            }
            self.detach_cell(cell_node);
        }

        if let Some(cell) = self.nodes.table_cells.get_mut(&anchor) {
            cell.grid_span = rect.col_span() as u32;
            cell.row_span = rect.row_span() as u32;
        }
        self.retag_cell(anchor);
        Ok(anchor)
    }

    /// Split a merged cell back into single-slot cells. The original cell
    /// keeps its content and the top-left slot. Returns the new cells.
    pub fn split_cell(&mut self, cell_node: NodeId) -> Result<Vec<CellId>> {
        let cell = self.nodes.table_cells.get(&cell_node)
            .ok_or(DocModelError::NodeNotFound(cell_node.as_uuid()))?;
        if !cell.is_merged() {
            return Err(DocModelError::InvalidOperation("Cell is not merged".into()));
        }
        let format = cell.blocks()
            .first()
            .map(|&b| self.character_format_at(&Position::start_of(b)))
            .unwrap_or_default();
        let group_node = self.group_of_cell(cell_node)?;
        let map = self.group_grid_map(group_node)
            .ok_or(DocModelError::NodeNotFound(group_node.as_uuid()))?;
        let placement = map.placement(cell_node)
            .ok_or_else(|| DocModelError::TreeStructureError("Cell is not on the grid".into()))?;
        let rect = placement.rect;

        let mut insert_plan = Vec::new();
        for r in rect.start_row..=rect.end_row {
            let row_node = map.rows()[r];
            let (index, count) = if r == rect.start_row {
                (placement.index_in_row + 1, rect.col_span() - 1)
            } else {
                let index = self.nodes.table_rows
                    .get(&row_node)
                    .map(|row| {
                        row.children()
                            .iter()
                            .filter(|id| {
                                map.placement(**id)
                                    .map(|p| p.rect.start_col < rect.start_col)
                                    .unwrap_or(false)
                            })
                            .count()
                    })
                    .unwrap_or(0);
                (index, rect.col_span())
            };
            insert_plan.push((row_node, index, count));
        }

        if let Some(cell) = self.nodes.table_cells.get_mut(&cell_node) {
            cell.grid_span = 1;
            cell.row_span = 1;
        }

        let mut created = Vec::new();
        for (row_node, index, count) in insert_plan {
            for k in 0..count {
                let (_, cell_id) = self.create_cell(row_node, index + k, &format, None)?;
                created.push(cell_id);
            }
        }
        Ok(created)
    }

    // =========================================================================
    // Cell Styling
    // =========================================================================

    /// Set or clear a cell's background color
    pub fn set_cell_shading(&mut self, cell_node: NodeId, shading: Option<String>) -> Result<()> {
        let cell = self.nodes.table_cells.get_mut(&cell_node)
            .ok_or(DocModelError::NodeNotFound(cell_node.as_uuid()))?;
        cell.properties.shading = shading;
        Ok(())
    }

    /// Set or clear a cell's borders
    pub fn set_cell_borders(
        &mut self,
        cell_node: NodeId,
        borders: Option<CellBorders>,
    ) -> Result<()> {
        let cell = self.nodes.table_cells.get_mut(&cell_node)
            .ok_or(DocModelError::NodeNotFound(cell_node.as_uuid()))?;
        cell.properties.borders = borders;
        Ok(())
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check a table's structural invariants: uniform width per group, at
    /// least one line per cell, and lines tagged with their own cell
    pub fn validate_table(&self, table_node: NodeId) -> Result<()> {
        let table = self.nodes.tables.get(&table_node)
            .ok_or(DocModelError::NodeNotFound(table_node.as_uuid()))?;
        let columns = table.column_count();

        for &group_node in table.children() {
            let map = self.group_grid_map(group_node)
                .ok_or_else(|| DocModelError::TreeStructureError("Dangling row group".into()))?;
            for r in 0..map.row_count() {
                if map.row_width(r) != columns {
                    return Err(DocModelError::TreeStructureError(format!(
                        "Row {} covers {} columns, expected {}",
                        r,
                        map.row_width(r),
                        columns
                    )));
                }
            }
            for &row_node in map.rows() {
                let row = self.nodes.table_rows.get(&row_node)
                    .ok_or_else(|| DocModelError::TreeStructureError("Dangling row".into()))?;
                for &cell_node in row.children() {
                    let cell = self.nodes.table_cells.get(&cell_node)
                        .ok_or_else(|| DocModelError::TreeStructureError("Dangling cell".into()))?;
                    if cell.blocks().is_empty() {
                        return Err(DocModelError::TreeStructureError(format!(
                            "Cell {} has no lines",
                            cell.cell_id()
                        )));
                    }
                    let tag = self.cell_tag_for(cell_node);
                    for block in cell.blocks() {
                        let para = self.nodes.paragraphs.get(block).ok_or_else(|| {
                            DocModelError::TreeStructureError("Dangling line".into())
                        })?;
                        if para.cell != tag {
                            return Err(DocModelError::TreeStructureError(format!(
                                "Line in cell {} carries a stale tag",
                                cell.cell_id()
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
