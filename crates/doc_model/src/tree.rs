//! Document tree operations and storage
//!
//! Positions are addressed two ways: a [`Position`] names a line (paragraph)
//! and a character offset inside it, and a linear document offset counts
//! characters across every line in reading order with one extra position per
//! line for its line break. Lines inside tables are walked group by group,
//! row by row, cell by cell.

use crate::{
    CellId, CharacterProperties, Document, DocModelError, LineFormat, Node, NodeId, NodeType,
    Paragraph, ParagraphProperties, Position, Result, RowGroup, Run, Table, TableCell, TableRow,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Storage for different node types
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStorage {
    pub paragraphs: HashMap<NodeId, Paragraph>,
    pub runs: HashMap<NodeId, Run>,
    pub tables: HashMap<NodeId, Table>,
    pub row_groups: HashMap<NodeId, RowGroup>,
    pub table_rows: HashMap<NodeId, TableRow>,
    pub table_cells: HashMap<NodeId, TableCell>,
}

/// A saved copy of one line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub paragraph: Paragraph,
    pub runs: Vec<Run>,
}

impl LineSnapshot {
    pub fn line(&self) -> NodeId {
        self.paragraph.id()
    }
}

/// The complete document tree structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTree {
    /// The root document
    pub document: Document,
    /// Storage for all nodes
    pub nodes: NodeStorage,
}

impl DocumentTree {
    /// Create a new empty document tree
    pub fn new() -> Self {
        Self {
            document: Document::new(),
            nodes: NodeStorage::default(),
        }
    }

    /// Create a document tree with a single empty paragraph
    pub fn with_empty_paragraph() -> Self {
        let mut tree = Self::new();
        let para = Paragraph::new();
        let para_id = para.id();
        tree.nodes.paragraphs.insert(para_id, para);
        tree.document.add_body_child(para_id);
        if let Some(para) = tree.nodes.paragraphs.get_mut(&para_id) {
            para.set_parent(Some(tree.document.id()));
        }
        tree
    }

    /// Create a document with one body line per entry
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Result<Self> {
        if lines.is_empty() {
            return Ok(Self::with_empty_paragraph());
        }
        let mut tree = Self::new();
        let root = tree.root_id();
        for line in lines {
            let para_id = tree.insert_paragraph(Paragraph::new(), root, None)?;
            if !line.as_ref().is_empty() {
                tree.insert_run(Run::new(line.as_ref()), para_id, None)?;
            }
        }
        Ok(tree)
    }

    /// Get the document root ID
    pub fn root_id(&self) -> NodeId {
        self.document.id()
    }

    /// Get a paragraph by ID
    pub fn get_paragraph(&self, id: NodeId) -> Option<&Paragraph> {
        self.nodes.paragraphs.get(&id)
    }

    /// Get a mutable paragraph by ID
    pub fn get_paragraph_mut(&mut self, id: NodeId) -> Option<&mut Paragraph> {
        self.nodes.paragraphs.get_mut(&id)
    }

    /// Get a run by ID
    pub fn get_run(&self, id: NodeId) -> Option<&Run> {
        self.nodes.runs.get(&id)
    }

    /// Get a mutable run by ID
    pub fn get_run_mut(&mut self, id: NodeId) -> Option<&mut Run> {
        self.nodes.runs.get_mut(&id)
    }

    /// Get the node type for a given ID
    pub fn node_type(&self, id: NodeId) -> Option<NodeType> {
        if id == self.document.id() {
            return Some(NodeType::Document);
        }
        if self.nodes.paragraphs.contains_key(&id) {
            return Some(NodeType::Paragraph);
        }
        if self.nodes.runs.contains_key(&id) {
            return Some(NodeType::Run);
        }
        if self.nodes.tables.contains_key(&id) {
            return Some(NodeType::Table);
        }
        if self.nodes.row_groups.contains_key(&id) {
            return Some(NodeType::RowGroup);
        }
        if self.nodes.table_rows.contains_key(&id) {
            return Some(NodeType::TableRow);
        }
        if self.nodes.table_cells.contains_key(&id) {
            return Some(NodeType::TableCell);
        }
        None
    }

    /// All node ids of a given type, in document order
    pub fn descendants_of_type(&self, node_type: NodeType) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.collect_descendants(self.root_id(), node_type, &mut found);
        found
    }

    fn collect_descendants(&self, id: NodeId, node_type: NodeType, found: &mut Vec<NodeId>) {
        let children: Vec<NodeId> = match self.node_type(id) {
            Some(NodeType::Document) => self.document.children().to_vec(),
            Some(NodeType::Paragraph) => self.children_of::<Paragraph>(id, &self.nodes.paragraphs),
            Some(NodeType::Table) => self.children_of::<Table>(id, &self.nodes.tables),
            Some(NodeType::RowGroup) => self.children_of::<RowGroup>(id, &self.nodes.row_groups),
            Some(NodeType::TableRow) => self.children_of::<TableRow>(id, &self.nodes.table_rows),
            Some(NodeType::TableCell) => self.children_of::<TableCell>(id, &self.nodes.table_cells),
            Some(NodeType::Run) | None => Vec::new(),
        };
        for child in children {
            if self.node_type(child) == Some(node_type) {
                found.push(child);
            }
            self.collect_descendants(child, node_type, found);
        }
    }

    fn children_of<N: Node>(&self, id: NodeId, map: &HashMap<NodeId, N>) -> Vec<NodeId> {
        map.get(&id).map(|node| node.children().to_vec()).unwrap_or_default()
    }

    // =========================================================================
    // Paragraphs and Runs
    // =========================================================================

    /// Insert a paragraph into the document body or a table cell
    pub fn insert_paragraph(
        &mut self,
        mut para: Paragraph,
        parent_id: NodeId,
        index: Option<usize>,
    ) -> Result<NodeId> {
        let para_id = para.id();
        para.set_parent(Some(parent_id));

        if parent_id == self.document.id() {
            match index {
                Some(idx) => self.document.insert_body_child(idx, para_id),
                None => self.document.add_body_child(para_id),
            }
        } else if let Some(cell) = self.nodes.table_cells.get_mut(&parent_id) {
            match index {
                Some(idx) => cell.insert_block(idx, para_id),
                None => cell.add_block(para_id),
            }
        } else {
            return Err(DocModelError::InvalidOperation(
                "Paragraphs can only be children of the document or a table cell".into(),
            ));
        }

        self.nodes.paragraphs.insert(para_id, para);
        Ok(para_id)
    }

    /// Insert a run into a paragraph
    pub fn insert_run(
        &mut self,
        mut run: Run,
        para_id: NodeId,
        index: Option<usize>,
    ) -> Result<NodeId> {
        let run_id = run.id();
        run.set_parent(Some(para_id));

        let para = self.nodes.paragraphs.get_mut(&para_id)
            .ok_or(DocModelError::NodeNotFound(para_id.as_uuid()))?;

        match index {
            Some(idx) => para.insert_child(idx, run_id),
            None => para.add_child(run_id),
        }

        self.nodes.runs.insert(run_id, run);
        Ok(run_id)
    }

    /// Remove a run from the tree
    pub fn remove_run(&mut self, run_id: NodeId) -> Result<Run> {
        let run = self.nodes.runs.remove(&run_id)
            .ok_or(DocModelError::NodeNotFound(run_id.as_uuid()))?;

        if let Some(parent_id) = run.parent() {
            if let Some(para) = self.nodes.paragraphs.get_mut(&parent_id) {
                para.remove_child(run_id);
            }
        }

        Ok(run)
    }

    /// Remove a paragraph and its runs from whichever container holds it
    pub fn remove_paragraph(&mut self, para_id: NodeId) -> Result<Paragraph> {
        let para = self.nodes.paragraphs.remove(&para_id)
            .ok_or(DocModelError::NodeNotFound(para_id.as_uuid()))?;

        for &child_id in para.children() {
            self.nodes.runs.remove(&child_id);
        }

        match para.parent() {
            Some(parent) if parent == self.document.id() => {
                self.document.remove_body_child(para_id);
            }
            Some(parent) => {
                if let Some(cell) = self.nodes.table_cells.get_mut(&parent) {
                    cell.remove_block(para_id);
                }
            }
            None => {}
        }

        Ok(para)
    }

    /// Copy of one line and its runs, enough to put the line back later
    pub fn snapshot_line(&self, para_id: NodeId) -> Option<LineSnapshot> {
        let paragraph = self.nodes.paragraphs.get(&para_id)?.clone();
        let runs = paragraph
            .children()
            .iter()
            .filter_map(|run_id| self.nodes.runs.get(run_id).cloned())
            .collect();
        Some(LineSnapshot { paragraph, runs })
    }

    /// Put a line back the way a snapshot saw it. The line must still exist
    /// in the same container.
    pub fn restore_line(&mut self, snapshot: &LineSnapshot) -> Result<()> {
        let para_id = snapshot.paragraph.id();
        let current = self.nodes.paragraphs.get(&para_id)
            .ok_or(DocModelError::NodeNotFound(para_id.as_uuid()))?;
        if current.parent() != snapshot.paragraph.parent() {
            return Err(DocModelError::TreeStructureError(format!(
                "Line {} moved since it was saved", para_id
            )));
        }
        for run_id in current.children().to_vec() {
            self.nodes.runs.remove(&run_id);
        }
        for run in &snapshot.runs {
            self.nodes.runs.insert(run.id(), run.clone());
        }
        self.nodes.paragraphs.insert(para_id, snapshot.paragraph.clone());
        Ok(())
    }

    /// Iterate over all top-level body paragraphs
    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.document.children()
            .iter()
            .filter_map(|id| self.nodes.paragraphs.get(id))
    }

    /// Get all tables in the document
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.document.children()
            .iter()
            .filter_map(|id| self.nodes.tables.get(id))
    }

    /// Plain text of one line
    pub fn paragraph_text(&self, para_id: NodeId) -> String {
        let mut text = String::new();
        if let Some(para) = self.nodes.paragraphs.get(&para_id) {
            for run_id in para.children() {
                if let Some(run) = self.nodes.runs.get(run_id) {
                    text.push_str(&run.text);
                }
            }
        }
        text
    }

    /// Length of one line in characters
    pub fn paragraph_len(&self, para_id: NodeId) -> usize {
        self.nodes.paragraphs
            .get(&para_id)
            .map(|para| {
                para.children()
                    .iter()
                    .filter_map(|id| self.nodes.runs.get(id))
                    .map(Run::char_len)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Get the total text content of the document, one line per block
    pub fn text_content(&self) -> String {
        let mut result = String::new();
        for block in self.blocks_in_order() {
            result.push_str(&self.paragraph_text(block));
            result.push('\n');
        }
        result
    }

    /// Whether the document holds nothing but one empty line
    pub fn is_empty_document(&self) -> bool {
        let children = self.document.children();
        children.len() == 1
            && self.nodes.paragraphs.contains_key(&children[0])
            && self.paragraph_len(children[0]) == 0
    }

    // =========================================================================
    // Linear Offsets
    // =========================================================================

    /// Every line in reading order, including lines inside table cells
    pub fn blocks_in_order(&self) -> Vec<NodeId> {
        let mut blocks = Vec::new();
        for &child in self.document.children() {
            if self.nodes.paragraphs.contains_key(&child) {
                blocks.push(child);
            } else if self.nodes.tables.contains_key(&child) {
                blocks.extend(self.table_blocks(child));
            }
        }
        blocks
    }

    /// Lines of one table in reading order
    pub fn table_blocks(&self, table_id: NodeId) -> Vec<NodeId> {
        let mut blocks = Vec::new();
        let Some(table) = self.nodes.tables.get(&table_id) else {
            return blocks;
        };
        for group_id in table.children() {
            let Some(group) = self.nodes.row_groups.get(group_id) else { continue };
            for row_id in group.children() {
                let Some(row) = self.nodes.table_rows.get(row_id) else { continue };
                for cell_id in row.children() {
                    if let Some(cell) = self.nodes.table_cells.get(cell_id) {
                        blocks.extend_from_slice(cell.blocks());
                    }
                }
            }
        }
        blocks
    }

    /// Total number of linear positions in the document
    pub fn content_length(&self) -> usize {
        self.blocks_in_order()
            .iter()
            .map(|&block| self.paragraph_len(block) + 1)
            .sum()
    }

    /// Linear offset of the start of a line
    pub fn block_start_offset(&self, para_id: NodeId) -> Option<usize> {
        let mut offset = 0;
        for block in self.blocks_in_order() {
            if block == para_id {
                return Some(offset);
            }
            offset += self.paragraph_len(block) + 1;
        }
        None
    }

    /// Convert a linear offset into a line position
    pub fn resolve_offset(&self, offset: usize) -> Result<Position> {
        let mut start = 0;
        for block in self.blocks_in_order() {
            let len = self.paragraph_len(block);
            if offset <= start + len {
                return Ok(Position::new(block, offset - start));
            }
            start += len + 1;
        }
        Err(DocModelError::OffsetOutOfRange(offset))
    }

    /// Convert a line position into a linear offset
    pub fn offset_of(&self, position: &Position) -> Result<usize> {
        let start = self.block_start_offset(position.node_id)
            .ok_or(DocModelError::NodeNotFound(position.node_id.as_uuid()))?;
        if position.offset > self.paragraph_len(position.node_id) {
            return Err(DocModelError::InvalidPosition {
                node_id: position.node_id.as_uuid(),
                offset: position.offset,
            });
        }
        Ok(start + position.offset)
    }

    /// The line before this one in reading order
    pub fn previous_block(&self, para_id: NodeId) -> Option<NodeId> {
        let blocks = self.blocks_in_order();
        let index = blocks.iter().position(|&id| id == para_id)?;
        index.checked_sub(1).map(|i| blocks[i])
    }

    /// The line after this one in reading order
    pub fn next_block(&self, para_id: NodeId) -> Option<NodeId> {
        let blocks = self.blocks_in_order();
        let index = blocks.iter().position(|&id| id == para_id)?;
        blocks.get(index + 1).copied()
    }

    /// Clamp a position into the valid range of its line
    pub fn clamp_position(&self, position: Position) -> Option<Position> {
        if !self.nodes.paragraphs.contains_key(&position.node_id) {
            return None;
        }
        let len = self.paragraph_len(position.node_id);
        Some(Position::new(position.node_id, position.offset.min(len)))
    }

    // =========================================================================
    // Text Editing
    // =========================================================================

    /// Split runs so that a run boundary falls exactly at `offset`.
    /// Returns the index of the first run starting at or after the offset.
    fn split_runs_at(&mut self, para_id: NodeId, offset: usize) -> Result<usize> {
        let run_ids = self.nodes.paragraphs
            .get(&para_id)
            .ok_or(DocModelError::NodeNotFound(para_id.as_uuid()))?
            .children()
            .to_vec();

        let mut acc = 0;
        for (index, run_id) in run_ids.iter().enumerate() {
            let run = self.nodes.runs.get(run_id)
                .ok_or(DocModelError::NodeNotFound(run_id.as_uuid()))?;
            let len = run.char_len();
            if offset == acc {
                return Ok(index);
            }
            if offset < acc + len {
                let split_at = run.byte_offset(offset - acc);
                let tail_text = run.text[split_at..].to_string();
                let formatting = run.direct_formatting.clone();
                if let Some(run) = self.nodes.runs.get_mut(run_id) {
                    run.text.truncate(split_at);
                }
                let tail = Run::with_direct_formatting(tail_text, formatting);
                self.insert_run(tail, para_id, Some(index + 1))?;
                return Ok(index + 1);
            }
            acc += len;
        }
        Ok(run_ids.len())
    }

    /// Formatting that applies to text at a position: the run holding the
    /// character before the caret, or the line's typing formatting when the
    /// line is empty
    pub fn character_format_at(&self, position: &Position) -> CharacterProperties {
        let Some(para) = self.nodes.paragraphs.get(&position.node_id) else {
            return CharacterProperties::default();
        };

        let mut acc = 0;
        let mut first: Option<&Run> = None;
        for run in para.children().iter().filter_map(|id| self.nodes.runs.get(id)) {
            if run.is_empty() {
                continue;
            }
            first.get_or_insert(run);
            let len = run.char_len();
            if position.offset > acc && position.offset <= acc + len {
                return run.direct_formatting.clone();
            }
            acc += len;
        }

        match first {
            Some(run) => run.direct_formatting.clone(),
            None => para.typing_formatting.clone(),
        }
    }

    /// Insert text at a position. Line breaks in `text` split the line.
    /// When `formatting` is given it is layered over the formatting found at
    /// the position. Returns the caret position after the inserted text.
    pub fn insert_text(
        &mut self,
        position: &Position,
        text: &str,
        formatting: Option<&CharacterProperties>,
    ) -> Result<Position> {
        self.insert_text_with(position, text, &|base: &CharacterProperties| match formatting {
            Some(overlay) => base.merge(overlay),
            None => base.clone(),
        })
    }

    /// Insert text carrying exactly the given formatting, ignoring whatever
    /// formatting surrounds the position
    pub fn insert_text_exact(
        &mut self,
        position: &Position,
        text: &str,
        formatting: &CharacterProperties,
    ) -> Result<Position> {
        self.insert_text_with(position, text, &|_: &CharacterProperties| formatting.clone())
    }

    fn insert_text_with(
        &mut self,
        position: &Position,
        text: &str,
        resolve: &dyn Fn(&CharacterProperties) -> CharacterProperties,
    ) -> Result<Position> {
        let mut caret = *position;
        for (index, segment) in text.split('\n').enumerate() {
            if index > 0 {
                let new_line = self.split_block(&caret)?;
                caret = Position::start_of(new_line);
            }
            if !segment.is_empty() {
                caret = self.insert_segment(&caret, segment, resolve)?;
            }
        }
        Ok(caret)
    }

    fn insert_segment(
        &mut self,
        position: &Position,
        text: &str,
        resolve: &dyn Fn(&CharacterProperties) -> CharacterProperties,
    ) -> Result<Position> {
        let para_id = position.node_id;
        if !self.nodes.paragraphs.contains_key(&para_id) {
            return Err(DocModelError::NodeNotFound(para_id.as_uuid()));
        }
        if position.offset > self.paragraph_len(para_id) {
            return Err(DocModelError::InvalidPosition {
                node_id: para_id.as_uuid(),
                offset: position.offset,
            });
        }

        let effective = resolve(&self.character_format_at(position));
        let index = self.split_runs_at(para_id, position.offset)?;
        let run_ids = self.nodes.paragraphs
            .get(&para_id)
            .map(|para| para.children().to_vec())
            .unwrap_or_default();

        // Extend the preceding run when its formatting already matches
        let previous = index.checked_sub(1).and_then(|i| run_ids.get(i)).copied();
        match previous.and_then(|id| self.nodes.runs.get_mut(&id)) {
            Some(run) if run.direct_formatting == effective => run.text.push_str(text),
            _ => {
                let run = Run::with_direct_formatting(text, effective);
                self.insert_run(run, para_id, Some(index))?;
            }
        }

        Ok(Position::new(para_id, position.offset + text.chars().count()))
    }

    /// Delete characters `[start, end)` of one line
    pub fn delete_text(&mut self, para_id: NodeId, start: usize, end: usize) -> Result<()> {
        let len = self.paragraph_len(para_id);
        let (start, end) = (start.min(end).min(len), end.max(start).min(len));
        if start == end {
            return Ok(());
        }

        let first_format = self.character_format_at(&Position::new(para_id, start + 1));
        let from = self.split_runs_at(para_id, start)?;
        let to = self.split_runs_at(para_id, end)?;
        let doomed: Vec<NodeId> = self.nodes.paragraphs
            .get(&para_id)
            .map(|para| para.children()[from..to].to_vec())
            .unwrap_or_default();
        for run_id in doomed {
            self.remove_run(run_id)?;
        }

        if self.paragraph_len(para_id) == 0 {
            if let Some(para) = self.nodes.paragraphs.get_mut(&para_id) {
                para.typing_formatting = first_format;
            }
        }
        Ok(())
    }

    /// Delete everything between two positions. Both ends must share a
    /// container: the same cell, or the document body with no table between.
    pub fn delete_range(&mut self, start: &Position, end: &Position) -> Result<Position> {
        let (a, b) = (self.offset_of(start)?, self.offset_of(end)?);
        let (first, last) = if a <= b { (*start, *end) } else { (*end, *start) };

        if first.node_id == last.node_id {
            self.delete_text(first.node_id, first.offset, last.offset)?;
            return Ok(first);
        }

        let blocks = self.blocks_in_order();
        let from = blocks.iter().position(|&id| id == first.node_id)
            .ok_or(DocModelError::NodeNotFound(first.node_id.as_uuid()))?;
        let to = blocks.iter().position(|&id| id == last.node_id)
            .ok_or(DocModelError::NodeNotFound(last.node_id.as_uuid()))?;

        let container = self.container_of(first.node_id);
        let spanned = &blocks[from..=to];
        if spanned.iter().any(|&id| self.container_of(id) != container) {
            return Err(DocModelError::InvalidOperation(
                "Range crosses a table or cell boundary".into(),
            ));
        }
        let first_len = self.paragraph_len(first.node_id);
        self.delete_text(first.node_id, first.offset, first_len)?;
        self.delete_text(last.node_id, 0, last.offset)?;
        for &middle in &spanned[1..spanned.len() - 1] {
            self.remove_paragraph(middle)?;
        }
        self.join_with_next(first.node_id, last.node_id)?;
        Ok(first)
    }

    /// Move the runs of `next` onto the end of `para` and drop `next`
    fn join_with_next(&mut self, para_id: NodeId, next_id: NodeId) -> Result<()> {
        let runs = self.nodes.paragraphs
            .get_mut(&next_id)
            .ok_or(DocModelError::NodeNotFound(next_id.as_uuid()))?
            .take_children();
        for run_id in runs {
            if let Some(run) = self.nodes.runs.get_mut(&run_id) {
                run.set_parent(Some(para_id));
            }
            if let Some(para) = self.nodes.paragraphs.get_mut(&para_id) {
                para.add_child(run_id);
            }
        }
        self.remove_paragraph(next_id)?;
        Ok(())
    }

    /// Apply character formatting to characters `[start, end)` of one line.
    /// An empty range on an empty line sets the line's typing formatting.
    pub fn apply_character_format(
        &mut self,
        para_id: NodeId,
        start: usize,
        end: usize,
        props: &CharacterProperties,
    ) -> Result<()> {
        let len = self.paragraph_len(para_id);
        let para = self.nodes.paragraphs.get_mut(&para_id)
            .ok_or(DocModelError::NodeNotFound(para_id.as_uuid()))?;
        if len == 0 {
            para.typing_formatting = para.typing_formatting.merge(props);
            return Ok(());
        }

        let (start, end) = (start.min(len), end.min(len));
        if start >= end {
            return Ok(());
        }
        let from = self.split_runs_at(para_id, start)?;
        let to = self.split_runs_at(para_id, end)?;
        let targets: Vec<NodeId> = self.nodes.paragraphs
            .get(&para_id)
            .map(|para| para.children()[from..to].to_vec())
            .unwrap_or_default();
        for run_id in targets {
            if let Some(run) = self.nodes.runs.get_mut(&run_id) {
                run.apply_direct_formatting(props);
            }
        }
        Ok(())
    }

    /// Apply paragraph formatting to a line
    pub fn apply_paragraph_format(
        &mut self,
        para_id: NodeId,
        props: &ParagraphProperties,
    ) -> Result<()> {
        let para = self.nodes.paragraphs.get_mut(&para_id)
            .ok_or(DocModelError::NodeNotFound(para_id.as_uuid()))?;
        para.apply_direct_formatting(props);
        Ok(())
    }

    /// Change the line format of a paragraph
    pub fn set_line_format(&mut self, para_id: NodeId, format: LineFormat) -> Result<()> {
        let para = self.nodes.paragraphs.get_mut(&para_id)
            .ok_or(DocModelError::NodeNotFound(para_id.as_uuid()))?;
        para.format = format;
        Ok(())
    }

    // =========================================================================
    // Block Structure
    // =========================================================================

    /// The node holding a line: the document root or a table cell
    pub fn container_of(&self, para_id: NodeId) -> Option<NodeId> {
        self.nodes.paragraphs.get(&para_id).and_then(|para| para.parent())
    }

    fn container_children(&self, container: NodeId) -> Option<&[NodeId]> {
        if container == self.document.id() {
            Some(self.document.children())
        } else {
            self.nodes.table_cells.get(&container).map(|cell| cell.blocks())
        }
    }

    /// Split a line at a position. The new line follows the original in the
    /// same container, inherits its cell tag, paragraph formatting and line
    /// format, and receives everything after the split point.
    pub fn split_block(&mut self, position: &Position) -> Result<NodeId> {
        let para_id = position.node_id;
        let original = self.nodes.paragraphs.get(&para_id)
            .ok_or(DocModelError::NodeNotFound(para_id.as_uuid()))?;
        let container = original.parent()
            .ok_or_else(|| DocModelError::TreeStructureError("Detached paragraph".into()))?;
        let mut new_para = Paragraph::sibling_of(original);
        new_para.format = original.format;
        let carried_format = self.character_format_at(position);
        new_para.typing_formatting = carried_format;

        let index = self.container_children(container)
            .and_then(|children| children.iter().position(|&id| id == para_id))
            .ok_or_else(|| {
                DocModelError::TreeStructureError("Paragraph missing from its container".into())
            })?;

        let split = self.split_runs_at(para_id, position.offset)?;
        let moved: Vec<NodeId> = self.nodes.paragraphs
            .get_mut(&para_id)
            .map(|para| {
                let tail = para.children()[split..].to_vec();
                for id in &tail {
                    para.remove_child(*id);
                }
                tail
            })
            .unwrap_or_default();

        let new_id = self.insert_paragraph(new_para, container, Some(index + 1))?;
        for run_id in moved {
            if let Some(run) = self.nodes.runs.get_mut(&run_id) {
                run.set_parent(Some(new_id));
            }
            if let Some(para) = self.nodes.paragraphs.get_mut(&new_id) {
                para.add_child(run_id);
            }
        }
        Ok(new_id)
    }

    /// Remove a line entirely. A cell always keeps at least one line.
    pub fn remove_block(&mut self, para_id: NodeId) -> Result<()> {
        if let Some(cell_id) = self.container_of(para_id).filter(|&c| c != self.root_id()) {
            let only = self.nodes.table_cells
                .get(&cell_id)
                .map(|cell| cell.blocks().len() <= 1)
                .unwrap_or(false);
            if only {
                return Err(DocModelError::InvalidOperation(
                    "Cannot remove the only line of a cell".into(),
                ));
            }
        }
        self.remove_paragraph(para_id)?;
        Ok(())
    }

    /// Whether a line is the only line of its cell
    pub fn is_only_block_in_cell(&self, para_id: NodeId) -> bool {
        self.container_of(para_id)
            .and_then(|cell_id| self.nodes.table_cells.get(&cell_id))
            .map(|cell| cell.blocks().len() == 1)
            .unwrap_or(false)
    }

    /// Find a cell node by its structural identifier
    pub fn find_cell_by_id(&self, cell_id: &CellId) -> Option<NodeId> {
        self.nodes.table_cells
            .iter()
            .find(|(_, cell)| cell.cell_id() == cell_id)
            .map(|(&id, _)| id)
    }

    /// Reduce a cell to one empty plain line, keeping the line's cell tag
    pub fn clear_cell(&mut self, cell_id: NodeId) -> Result<NodeId> {
        let blocks = self.nodes.table_cells
            .get(&cell_id)
            .ok_or(DocModelError::NodeNotFound(cell_id.as_uuid()))?
            .blocks()
            .to_vec();
        let (&keep, rest) = blocks.split_first()
            .ok_or_else(|| DocModelError::TreeStructureError("Cell has no lines".into()))?;

        for &block in rest {
            self.remove_paragraph(block)?;
        }
        let len = self.paragraph_len(keep);
        self.delete_text(keep, 0, len)?;
        self.set_line_format(keep, LineFormat::Plain)?;
        Ok(keep)
    }

    /// Make sure the body holds at least one line; returns the first line
    pub fn ensure_body_line(&mut self) -> Result<NodeId> {
        if self.document.children().is_empty() {
            let root = self.root_id();
            return self.insert_paragraph(Paragraph::new(), root, None);
        }
        self.blocks_in_order()
            .first()
            .copied()
            .ok_or_else(|| DocModelError::TreeStructureError("Document has no lines".into()))
    }
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_line(tree: &DocumentTree) -> NodeId {
        tree.document.children()[0]
    }

    #[test]
    fn test_empty_document_has_one_position() {
        let tree = DocumentTree::with_empty_paragraph();
        assert_eq!(tree.content_length(), 1);
        assert!(tree.is_empty_document());
        assert_eq!(tree.resolve_offset(0).unwrap(), Position::start_of(first_line(&tree)));
        assert!(tree.resolve_offset(1).is_err());
    }

    #[test]
    fn test_offsets_count_line_breaks() {
        let tree = DocumentTree::from_lines(&["abc", "de"]).unwrap();
        let second = tree.document.children()[1];
        assert_eq!(tree.content_length(), 7);
        assert_eq!(tree.block_start_offset(second), Some(4));
        assert_eq!(tree.resolve_offset(5).unwrap(), Position::new(second, 1));
        assert_eq!(tree.offset_of(&Position::new(second, 2)).unwrap(), 6);
    }

    #[test]
    fn test_from_lines() {
        let tree = DocumentTree::from_lines(&["one", "", "three"]).unwrap();
        let lines = tree.blocks_in_order();
        assert_eq!(lines.len(), 3);
        assert_eq!(tree.paragraph_text(lines[2]), "three");
        assert!(tree.get_paragraph(lines[1]).unwrap().children().is_empty());

        let empty = DocumentTree::from_lines::<&str>(&[]).unwrap();
        assert!(empty.is_empty_document());
    }

    #[test]
    fn test_restore_line_from_snapshot() {
        let mut tree = DocumentTree::from_lines(&["ab", "cd"]).unwrap();
        let (first, second) = (tree.document.children()[0], tree.document.children()[1]);
        let saved = tree.snapshot_line(first).unwrap();

        let bold = CharacterProperties::bold();
        tree.insert_text(&Position::new(first, 1), "X", Some(&bold)).unwrap();
        tree.insert_text(&Position::new(second, 2), "!", None).unwrap();
        assert_eq!(tree.get_paragraph(first).unwrap().children().len(), 3);

        tree.restore_line(&saved).unwrap();
        assert_eq!(tree.paragraph_text(first), "ab");
        assert_eq!(tree.get_paragraph(first).unwrap().children().len(), 1);
        assert_eq!(tree.nodes.runs.len(), 2);
        assert_eq!(tree.paragraph_text(second), "cd!");

        tree.remove_paragraph(first).unwrap();
        assert!(tree.restore_line(&saved).is_err());
    }

    #[test]
    fn test_insert_text_extends_matching_run() {
        let mut tree = DocumentTree::from_lines(&["hello"]).unwrap();
        let para = first_line(&tree);
        let caret = tree.insert_text(&Position::new(para, 5), " world", None).unwrap();
        assert_eq!(caret.offset, 11);
        assert_eq!(tree.paragraph_text(para), "hello world");
        assert_eq!(tree.get_paragraph(para).unwrap().children().len(), 1);
    }

    #[test]
    fn test_insert_formatted_text_creates_run() {
        let mut tree = DocumentTree::from_lines(&["ab"]).unwrap();
        let para = first_line(&tree);
        tree.insert_text(&Position::new(para, 1), "X", Some(&CharacterProperties::bold())).unwrap();
        assert_eq!(tree.paragraph_text(para), "aXb");
        assert_eq!(tree.get_paragraph(para).unwrap().children().len(), 3);
        assert_eq!(tree.character_format_at(&Position::new(para, 2)).bold, Some(true));
        assert_eq!(tree.character_format_at(&Position::new(para, 3)).bold, None);
    }

    #[test]
    fn test_insert_text_with_newline_splits() {
        let mut tree = DocumentTree::with_empty_paragraph();
        let para = first_line(&tree);
        let caret = tree.insert_text(&Position::start_of(para), "one\ntwo", None).unwrap();
        assert_eq!(tree.document.children().len(), 2);
        assert_eq!(tree.text_content(), "one\ntwo\n");
        assert_eq!(caret.offset, 3);
    }

    #[test]
    fn test_insert_text_exact_ignores_surroundings() {
        let mut tree = DocumentTree::with_empty_paragraph();
        let para = first_line(&tree);
        let bold = CharacterProperties::bold();
        tree.insert_text(&Position::start_of(para), "ab", Some(&bold)).unwrap();
        let plain = CharacterProperties::default();
        tree.insert_text_exact(&Position::new(para, 2), "c", &plain).unwrap();
        assert_eq!(tree.paragraph_text(para), "abc");
        assert_eq!(tree.character_format_at(&Position::new(para, 3)).bold, None);
    }

    #[test]
    fn test_empty_line_uses_typing_formatting() {
        let mut tree = DocumentTree::with_empty_paragraph();
        let para = first_line(&tree);
        tree.apply_character_format(para, 0, 0, &CharacterProperties::bold()).unwrap();
        tree.insert_text(&Position::start_of(para), "x", None).unwrap();
        assert_eq!(tree.character_format_at(&Position::new(para, 1)).bold, Some(true));
    }

    #[test]
    fn test_delete_text_remembers_format_of_emptied_line() {
        let mut tree = DocumentTree::with_empty_paragraph();
        let para = first_line(&tree);
        let bold = CharacterProperties::bold();
        tree.insert_text(&Position::start_of(para), "abc", Some(&bold)).unwrap();
        tree.delete_text(para, 0, 3).unwrap();
        assert_eq!(tree.paragraph_len(para), 0);
        assert_eq!(tree.get_paragraph(para).unwrap().typing_formatting.bold, Some(true));
    }

    #[test]
    fn test_apply_format_splits_runs() {
        let mut tree = DocumentTree::from_lines(&["abcdef"]).unwrap();
        let para = first_line(&tree);
        tree.apply_character_format(para, 2, 4, &CharacterProperties::bold()).unwrap();
        assert_eq!(tree.get_paragraph(para).unwrap().children().len(), 3);
        assert_eq!(tree.paragraph_text(para), "abcdef");
        assert_eq!(tree.character_format_at(&Position::new(para, 3)).bold, Some(true));
    }

    #[test]
    fn test_split_and_join_lines() {
        let mut tree = DocumentTree::from_lines(&["hello world"]).unwrap();
        let para = first_line(&tree);
        let new_line = tree.split_block(&Position::new(para, 5)).unwrap();
        assert_eq!(tree.paragraph_text(para), "hello");
        assert_eq!(tree.paragraph_text(new_line), " world");

        let caret =
            tree.delete_range(&Position::new(para, 5), &Position::start_of(new_line)).unwrap();
        assert_eq!(caret, Position::new(para, 5));
        assert_eq!(tree.text_content(), "hello world\n");
        assert!(tree.get_paragraph(new_line).is_none());
    }

    #[test]
    fn test_descendants_of_type() {
        let tree = DocumentTree::from_lines(&["a", "b"]).unwrap();
        assert_eq!(tree.descendants_of_type(NodeType::Paragraph).len(), 2);
        assert_eq!(tree.descendants_of_type(NodeType::Run).len(), 2);
        assert!(tree.descendants_of_type(NodeType::Table).is_empty());
    }

    #[test]
    fn test_tree_serializes() {
        let tree = DocumentTree::from_lines(&["a"]).unwrap();
        let json = serde_json::to_string(&tree).unwrap();
        let back: DocumentTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back.text_content(), "a\n");
    }
}
