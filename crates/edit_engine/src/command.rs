//! Command system for document editing
//!
//! Every command works on a copy of the tree and hands back the new tree
//! together with an inverse. Edits confined to existing lines save just
//! those lines; structural edits save the whole document.

use crate::{EditError, Result};
use doc_model::{
    CharacterProperties, DocumentTree, LineFormat, LineSnapshot, NodeId, ParagraphProperties,
    Position, Selection,
};
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Result of applying a command
#[derive(Debug)]
pub struct CommandResult {
    /// The new document tree after the command
    pub tree: DocumentTree,
    /// The new selection after the command
    pub selection: Selection,
    /// The inverse command (for undo)
    pub inverse: Box<dyn Command>,
}

impl CommandResult {
    /// Build a result whose inverse restores `before`
    pub fn with_snapshot(
        tree: DocumentTree,
        selection: Selection,
        before: &DocumentTree,
        before_selection: &Selection,
    ) -> Self {
        Self {
            tree,
            selection,
            inverse: Box::new(RestoreSnapshot::new(before.clone(), *before_selection)),
        }
    }

    /// Build a result whose inverse puts `lines` back as they were in
    /// `before`. Falls back to a whole snapshot when a line is missing.
    pub fn with_line_snapshot(
        tree: DocumentTree,
        selection: Selection,
        before: &DocumentTree,
        lines: &[NodeId],
        before_selection: &Selection,
    ) -> Self {
        let saved: Option<Vec<LineSnapshot>> =
            lines.iter().map(|&line| before.snapshot_line(line)).collect();
        match saved {
            Some(lines) => Self {
                tree,
                selection,
                inverse: Box::new(RestoreLines::new(lines, *before_selection)),
            },
            None => Self::with_snapshot(tree, selection, before, before_selection),
        }
    }
}

/// Trait for all editing commands
pub trait Command: std::fmt::Debug + Send + Sync {
    /// Apply this command to a document
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult>;

    /// Try to merge this command with another (for batching)
    fn merge_with(&self, _other: &dyn Command) -> Option<Box<dyn Command>> {
        None
    }

    /// Get a display name for this command
    fn display_name(&self) -> &str;

    /// Clone this command into a box
    fn clone_box(&self) -> Box<dyn Command>;

    /// Downcasting support for merging
    fn as_any(&self) -> &dyn Any;
}

// ============================================================================
// Selection helpers
// ============================================================================

/// Carry a selection over an edit. Positions whose line survived are clamped
/// into it; positions whose line vanished fall back to the same linear
/// offset in the new tree, clamped to the document end.
pub fn relocate_selection(
    before: &DocumentTree,
    after: &DocumentTree,
    selection: &Selection,
) -> Selection {
    Selection::new(
        relocate_position(before, after, &selection.anchor),
        relocate_position(before, after, &selection.focus),
    )
}

fn relocate_position(before: &DocumentTree, after: &DocumentTree, position: &Position) -> Position {
    if let Some(clamped) = after.clamp_position(*position) {
        if after.block_start_offset(clamped.node_id).is_some() {
            return clamped;
        }
    }
    let offset = before.offset_of(position).unwrap_or(0);
    caret_at_offset(after, offset).focus
}

/// A collapsed selection at a linear offset, clamped to the document end
pub fn caret_at_offset(tree: &DocumentTree, offset: usize) -> Selection {
    let last = tree.content_length().saturating_sub(1);
    match tree.resolve_offset(offset.min(last)) {
        Ok(position) => Selection::collapsed(position),
        Err(_) => Selection::at_start_of(tree.root_id()),
    }
}

// ============================================================================
// RestoreSnapshot
// ============================================================================

/// Replace the whole document and selection with a saved copy
#[derive(Debug, Clone)]
pub struct RestoreSnapshot {
    tree: DocumentTree,
    selection: Selection,
}

impl RestoreSnapshot {
    pub fn new(tree: DocumentTree, selection: Selection) -> Self {
        Self { tree, selection }
    }
}

impl Command for RestoreSnapshot {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        Ok(CommandResult::with_snapshot(self.tree.clone(), self.selection, tree, selection))
    }

    fn display_name(&self) -> &str {
        "Restore"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// RestoreLines
// ============================================================================

/// Put a set of lines back the way they were saved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreLines {
    lines: Vec<LineSnapshot>,
    selection: Selection,
}

impl RestoreLines {
    pub fn new(lines: Vec<LineSnapshot>, selection: Selection) -> Self {
        Self { lines, selection }
    }

    /// Lines this command restores
    pub fn lines(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.lines.iter().map(LineSnapshot::line)
    }
}

impl Command for RestoreLines {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let lines: Vec<NodeId> = self.lines().collect();
        let mut new_tree = tree.clone();
        for line in &self.lines {
            new_tree.restore_line(line)?;
        }
        let restored = new_tree
            .clamp_position(self.selection.anchor)
            .zip(new_tree.clamp_position(self.selection.focus))
            .map(|(anchor, focus)| Selection::new(anchor, focus))
            .unwrap_or_else(|| relocate_selection(tree, &new_tree, selection));
        Ok(CommandResult::with_line_snapshot(new_tree, restored, tree, &lines, selection))
    }

    fn display_name(&self) -> &str {
        "Restore Lines"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// InsertText
// ============================================================================

/// How inserted text is formatted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum TextFormatting {
    /// Take the formatting found at the insertion point
    #[default]
    Inherit,
    /// Layer these properties over the formatting at the insertion point
    Overlay(CharacterProperties),
    /// Use exactly these properties
    Exact(CharacterProperties),
}

/// Insert text at a position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertText {
    pub position: Position,
    pub text: String,
    #[serde(default)]
    pub formatting: TextFormatting,
}

impl InsertText {
    pub fn new(position: Position, text: impl Into<String>) -> Self {
        Self {
            position,
            text: text.into(),
            formatting: TextFormatting::Inherit,
        }
    }

    /// Set how the inserted text is formatted
    pub fn with_formatting(mut self, formatting: TextFormatting) -> Self {
        self.formatting = formatting;
        self
    }
}

impl Command for InsertText {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        let caret = match &self.formatting {
            TextFormatting::Inherit => new_tree.insert_text(&self.position, &self.text, None)?,
            TextFormatting::Overlay(props) => {
                new_tree.insert_text(&self.position, &self.text, Some(props))?
            }
            TextFormatting::Exact(props) => {
                new_tree.insert_text_exact(&self.position, &self.text, props)?
            }
        };
        let selection_after = Selection::collapsed(caret);
        if self.text.contains('\n') {
            return Ok(CommandResult::with_snapshot(new_tree, selection_after, tree, selection));
        }
        let line = self.position.node_id;
        Ok(CommandResult::with_line_snapshot(new_tree, selection_after, tree, &[line], selection))
    }

    fn merge_with(&self, other: &dyn Command) -> Option<Box<dyn Command>> {
        let next = other.as_any().downcast_ref::<InsertText>()?;
        let continues = next.position.node_id == self.position.node_id
            && next.position.offset == self.position.offset + self.text.chars().count()
            && next.formatting == self.formatting
            && !self.text.contains('\n')
            && !next.text.contains('\n');
        if !continues {
            return None;
        }
        Some(Box::new(InsertText {
            position: self.position,
            text: format!("{}{}", self.text, next.text),
            formatting: self.formatting.clone(),
        }))
    }

    fn display_name(&self) -> &str {
        "Insert Text"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// DeleteRange
// ============================================================================

/// Delete a range of text. Ranges spanning lines join the end lines; the
/// range must not leave its cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRange {
    pub start: Position,
    pub end: Position,
}

impl DeleteRange {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

impl Command for DeleteRange {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        let caret = new_tree.delete_range(&self.start, &self.end)?;
        let selection_after = Selection::collapsed(caret);
        if self.start.node_id != self.end.node_id {
            return Ok(CommandResult::with_snapshot(new_tree, selection_after, tree, selection));
        }
        let line = self.start.node_id;
        Ok(CommandResult::with_line_snapshot(new_tree, selection_after, tree, &[line], selection))
    }

    fn display_name(&self) -> &str {
        "Delete"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// Lines touched by a range, each with the character span inside it
fn line_spans(
    tree: &DocumentTree,
    start: &Position,
    end: &Position,
) -> Result<Vec<(NodeId, usize, usize)>> {
    let (a, b) = (tree.offset_of(start)?, tree.offset_of(end)?);
    let (first, last) = if a <= b { (*start, *end) } else { (*end, *start) };
    if first.node_id == last.node_id {
        return Ok(vec![(first.node_id, first.offset, last.offset)]);
    }

    let blocks = tree.blocks_in_order();
    let from = blocks.iter().position(|&id| id == first.node_id);
    let to = blocks.iter().position(|&id| id == last.node_id);
    let (from, to) = match (from, to) {
        (Some(from), Some(to)) => (from, to),
        _ => {
            return Err(EditError::InvalidCommand("Range endpoints are not in the document".into()))
        }
    };

    Ok(blocks[from..=to]
        .iter()
        .map(|&block| {
            let start = if block == first.node_id { first.offset } else { 0 };
            let end = if block == last.node_id { last.offset } else { tree.paragraph_len(block) };
            (block, start, end)
        })
        .collect())
}

/// Apply character formatting across a range. A collapsed range on an empty
/// line sets the formatting new text on that line will take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatText {
    pub start: Position,
    pub end: Position,
    pub properties: CharacterProperties,
}

impl FormatText {
    pub fn new(start: Position, end: Position, properties: CharacterProperties) -> Self {
        Self { start, end, properties }
    }

    /// Format a whole line (or its typing formatting when empty)
    pub fn whole_line(tree: &DocumentTree, line: NodeId, properties: CharacterProperties) -> Self {
        let end = Position::new(line, tree.paragraph_len(line));
        Self::new(Position::start_of(line), end, properties)
    }
}

impl Command for FormatText {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        let spans = line_spans(tree, &self.start, &self.end)?;
        for &(line, start, end) in &spans {
            new_tree.apply_character_format(line, start, end, &self.properties)?;
        }
        let new_selection = relocate_selection(tree, &new_tree, selection);
        let lines: Vec<NodeId> = spans.iter().map(|(line, _, _)| *line).collect();
        Ok(CommandResult::with_line_snapshot(new_tree, new_selection, tree, &lines, selection))
    }

    fn display_name(&self) -> &str {
        "Format Text"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Apply paragraph formatting to every line a range touches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatParagraph {
    pub start: Position,
    pub end: Position,
    pub properties: ParagraphProperties,
}

impl FormatParagraph {
    pub fn new(start: Position, end: Position, properties: ParagraphProperties) -> Self {
        Self { start, end, properties }
    }
}

impl Command for FormatParagraph {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        let lines: Vec<NodeId> = line_spans(tree, &self.start, &self.end)?
            .into_iter()
            .map(|(line, _, _)| line)
            .collect();
        for &line in &lines {
            new_tree.apply_paragraph_format(line, &self.properties)?;
        }
        Ok(CommandResult::with_line_snapshot(new_tree, *selection, tree, &lines, selection))
    }

    fn display_name(&self) -> &str {
        "Format Paragraph"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Line structure
// ============================================================================

/// Change the line format of one line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLineFormat {
    pub line: NodeId,
    pub format: LineFormat,
}

impl SetLineFormat {
    pub fn new(line: NodeId, format: LineFormat) -> Self {
        Self { line, format }
    }
}

impl Command for SetLineFormat {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        new_tree.set_line_format(self.line, self.format)?;
        Ok(CommandResult::with_line_snapshot(new_tree, *selection, tree, &[self.line], selection))
    }

    fn display_name(&self) -> &str {
        "Set Line Format"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Split a line in two; the caret lands at the start of the new line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitLine {
    pub position: Position,
    /// Line format for the new line; None keeps the original line's format
    pub new_line_format: Option<LineFormat>,
}

impl SplitLine {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            new_line_format: None,
        }
    }

    pub fn with_new_line_format(mut self, format: LineFormat) -> Self {
        self.new_line_format = Some(format);
        self
    }
}

impl Command for SplitLine {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let mut new_tree = tree.clone();
        let new_line = new_tree.split_block(&self.position)?;
        if let Some(format) = self.new_line_format {
            new_tree.set_line_format(new_line, format)?;
        }
        let caret = Selection::at_start_of(new_line);
        Ok(CommandResult::with_snapshot(new_tree, caret, tree, selection))
    }

    fn display_name(&self) -> &str {
        "Split Line"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Remove a line entirely and put the caret one position before where the
/// line started
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveLine {
    pub line: NodeId,
}

impl RemoveLine {
    pub fn new(line: NodeId) -> Self {
        Self { line }
    }
}

impl Command for RemoveLine {
    fn apply(&self, tree: &DocumentTree, selection: &Selection) -> Result<CommandResult> {
        let start = tree.block_start_offset(self.line)
            .ok_or_else(|| EditError::InvalidCommand(format!("Line not found: {}", self.line)))?;
        let mut new_tree = tree.clone();
        new_tree.remove_block(self.line)?;
        let caret = caret_at_offset(&new_tree, start.saturating_sub(1));
        Ok(CommandResult::with_snapshot(new_tree, caret, tree, selection))
    }

    fn display_name(&self) -> &str {
        "Remove Line"
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
