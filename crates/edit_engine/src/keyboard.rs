//! Keyboard handling inside tables
//!
//! Decides, for each key event, whether the host may apply its default
//! behavior or whether the event must be swallowed, and which structural
//! rewrites replace the default. Bindings run in registration order; a
//! binding that allows lets later bindings run, one that suppresses ends
//! evaluation.

use crate::SelectedCells;
use doc_model::{DocumentTree, NodeId, Paragraph, Position, Selection};
use serde::{Deserialize, Serialize};

/// Keys the table editor cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Backspace,
    Delete,
    Enter,
    Escape,
    Tab,
    Char(char),
}

/// A key press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: Key,
    pub shift: bool,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self { key, shift: false }
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }
}

impl From<Key> for KeyEvent {
    fn from(key: Key) -> Self {
        Self::new(key)
    }
}

/// Whether the host may go on handling a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyOutcome {
    Allow,
    Suppress,
}

/// A structural edit that replaces the host's default key behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRewrite {
    /// Delete the line entirely and put the caret just before where it was
    RemoveLine { line: NodeId },
    /// Split a header line; the continuation becomes plain cell content
    SplitHeaderLine { at: Position },
    /// Turn a list or header line into a plain line of the same cell and
    /// select that cell
    ConvertToCellLine { line: NodeId },
    /// Reset the cell-range selection
    ClearCellSelection,
    /// Empty every cell of the cell-range selection
    ClearSelectedCells,
}

/// What to do with a key event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAction {
    pub outcome: KeyOutcome,
    pub rewrites: Vec<KeyRewrite>,
}

impl KeyAction {
    pub fn allow() -> Self {
        Self {
            outcome: KeyOutcome::Allow,
            rewrites: Vec::new(),
        }
    }

    pub fn suppress() -> Self {
        Self {
            outcome: KeyOutcome::Suppress,
            rewrites: Vec::new(),
        }
    }

    fn rewrite(outcome: KeyOutcome, rewrite: KeyRewrite) -> Self {
        Self {
            outcome,
            rewrites: vec![rewrite],
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.outcome == KeyOutcome::Suppress
    }
}

// ============================================================================
// Bindings
// ============================================================================

/// Kind of line a binding applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineContext {
    Any,
    CellLine,
    CellHeaderLine,
    CellListLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    MultiCellDelete,
    EmptyHeaderLine,
    VerticalArrowInCell,
    BackspaceAtCellLineStart,
    DeleteAtCellLineEnd,
    EnterAtHeaderEnd,
    EnterInEmptyListLine,
    Escape,
}

#[derive(Debug, Clone)]
struct KeyBinding {
    keys: &'static [Key],
    context: LineContext,
    collapsed: Option<bool>,
    empty_line: Option<bool>,
    empty_suffix: Option<bool>,
    at_line_start: Option<bool>,
    rule: Rule,
}

impl KeyBinding {
    fn new(keys: &'static [Key], context: LineContext, rule: Rule) -> Self {
        Self {
            keys,
            context,
            collapsed: None,
            empty_line: None,
            empty_suffix: None,
            at_line_start: None,
            rule,
        }
    }

    fn collapsed(mut self, value: bool) -> Self {
        self.collapsed = Some(value);
        self
    }

    fn empty_line(mut self, value: bool) -> Self {
        self.empty_line = Some(value);
        self
    }

    fn empty_suffix(mut self, value: bool) -> Self {
        self.empty_suffix = Some(value);
        self
    }

    fn at_line_start(mut self, value: bool) -> Self {
        self.at_line_start = Some(value);
        self
    }

    fn matches(&self, key: Key, facts: &LineFacts) -> bool {
        let context = match self.context {
            LineContext::Any => true,
            LineContext::CellLine => facts.para.is_cell_line(),
            LineContext::CellHeaderLine => facts.para.is_cell_line() && facts.para.is_header_line(),
            LineContext::CellListLine => facts.para.is_cell_line() && facts.para.is_list_line(),
        };
        let flag = |wanted: Option<bool>, actual: bool| wanted.map_or(true, |w| w == actual);
        self.keys.contains(&key)
            && context
            && flag(self.collapsed, facts.collapsed)
            && flag(self.empty_line, facts.empty_line)
            && flag(self.empty_suffix, facts.empty_suffix)
            && flag(self.at_line_start, facts.at_line_start)
    }
}

/// Everything the rules look at, computed once per event
struct LineFacts<'a> {
    tree: &'a DocumentTree,
    position: Position,
    para: &'a Paragraph,
    collapsed: bool,
    empty_line: bool,
    empty_suffix: bool,
    at_line_start: bool,
    /// Text selection endpoints lie in different cells
    spans_cells: bool,
    /// Size of the cell-range selection when the caret is inside its
    /// table, 0 otherwise
    selected_cells: usize,
}

impl<'a> LineFacts<'a> {
    fn gather(
        tree: &'a DocumentTree,
        selection: &Selection,
        cell_range: Option<&SelectedCells>,
    ) -> Option<Self> {
        let position = selection.focus;
        let para = tree.get_paragraph(position.node_id)?;
        let len = tree.paragraph_len(position.node_id);
        let cell_of = |pos: &Position| {
            tree.get_paragraph(pos.node_id)
                .and_then(|p| p.cell.as_ref())
                .map(|tag| tag.cell_id.clone())
        };
        let (anchor_cell, focus_cell) = (cell_of(&selection.anchor), cell_of(&selection.focus));
        let caret_table = tree.locate_table_context(&position).map(|ctx| ctx.table);
        let selected_cells = cell_range
            .filter(|range| caret_table == Some(range.table))
            .map(SelectedCells::len)
            .unwrap_or(0);
        Some(Self {
            tree,
            position,
            para,
            collapsed: selection.is_collapsed(),
            empty_line: len == 0,
            empty_suffix: position.offset >= len,
            at_line_start: position.offset == 0,
            spans_cells: anchor_cell != focus_cell
                && (anchor_cell.is_some() || focus_cell.is_some()),
            selected_cells,
        })
    }

    fn line(&self) -> NodeId {
        self.position.node_id
    }

    fn remove_line(&self) -> KeyRewrite {
        KeyRewrite::RemoveLine { line: self.line() }
    }

    fn same_cell(&self, other: &Paragraph) -> bool {
        match (&self.para.cell, &other.cell) {
            (Some(mine), Some(theirs)) => mine.cell_id == theirs.cell_id,
            _ => false,
        }
    }

    fn previous_line(&self) -> Option<&'a Paragraph> {
        self.tree.previous_block(self.line()).and_then(|id| self.tree.get_paragraph(id))
    }

    fn next_line(&self) -> Option<&'a Paragraph> {
        self.tree.next_block(self.line()).and_then(|id| self.tree.get_paragraph(id))
    }

    fn only_line_in_cell(&self) -> bool {
        self.tree.is_only_block_in_cell(self.line())
    }

    /// The caret sits on the very first position of its table
    fn at_table_start(&self) -> bool {
        let Some(ctx) = self.tree.locate_table_context(&self.position) else {
            return false;
        };
        match (self.tree.body_child_start_offset(ctx.table), self.tree.offset_of(&self.position)) {
            (Some(start), Ok(offset)) => start == offset,
            _ => false,
        }
    }
}

// ============================================================================
// KeyboardMachine
// ============================================================================

/// Classifies key events inside tables
#[derive(Debug, Clone)]
pub struct KeyboardMachine {
    bindings: Vec<KeyBinding>,
}

impl KeyboardMachine {
    pub fn new() -> Self {
        use Key::*;
        use LineContext::*;

        let bindings = vec![
            KeyBinding::new(&[Backspace, Delete], Any, Rule::MultiCellDelete),
            KeyBinding::new(&[Backspace, Delete], CellHeaderLine, Rule::EmptyHeaderLine)
                .collapsed(true)
                .empty_line(true),
            KeyBinding::new(&[ArrowUp, ArrowDown], CellLine, Rule::VerticalArrowInCell),
            KeyBinding::new(&[Backspace], CellLine, Rule::BackspaceAtCellLineStart)
                .collapsed(true)
                .at_line_start(true),
            KeyBinding::new(&[Delete], CellLine, Rule::DeleteAtCellLineEnd)
                .collapsed(true)
                .empty_suffix(true),
            KeyBinding::new(&[Enter], CellHeaderLine, Rule::EnterAtHeaderEnd)
                .collapsed(true)
                .empty_suffix(true),
            KeyBinding::new(&[Enter], CellListLine, Rule::EnterInEmptyListLine)
                .collapsed(true)
                .empty_line(true),
            KeyBinding::new(&[Escape], Any, Rule::Escape),
        ];
        Self { bindings }
    }

    /// Decide what a key event does given the document, the caret and the
    /// current cell-range selection. The range only counts while the caret
    /// is inside its table.
    pub fn handle(
        &self,
        tree: &DocumentTree,
        selection: &Selection,
        cell_range: Option<&SelectedCells>,
        event: KeyEvent,
    ) -> KeyAction {
        let Some(facts) = LineFacts::gather(tree, selection, cell_range) else {
            return KeyAction::allow();
        };

        let mut action = KeyAction::allow();
        for binding in self.bindings.iter().filter(|b| b.matches(event.key, &facts)) {
            let step = Self::run(binding.rule, &facts);
            action.rewrites.extend(step.rewrites);
            if step.outcome == KeyOutcome::Suppress {
                tracing::debug!("Key {:?} suppressed by {:?}", event.key, binding.rule);
                action.outcome = KeyOutcome::Suppress;
                return action;
            }
        }
        action
    }

    fn run(rule: Rule, facts: &LineFacts) -> KeyAction {
        match rule {
            Rule::MultiCellDelete => {
                if facts.selected_cells > 1 {
                    KeyAction::rewrite(KeyOutcome::Suppress, KeyRewrite::ClearSelectedCells)
                } else if !facts.collapsed && facts.spans_cells {
                    KeyAction::suppress()
                } else {
                    KeyAction::allow()
                }
            }
            Rule::EmptyHeaderLine => {
                let previous_in_cell =
                    facts.previous_line().map(|p| facts.same_cell(p)).unwrap_or(false);
                let rewrite = if previous_in_cell {
                    KeyRewrite::RemoveLine { line: facts.line() }
                } else {
                    KeyRewrite::ConvertToCellLine { line: facts.line() }
                };
                KeyAction::rewrite(KeyOutcome::Suppress, rewrite)
            }
            Rule::VerticalArrowInCell => KeyAction::suppress(),
            Rule::BackspaceAtCellLineStart => Self::backspace_at_line_start(facts),
            Rule::DeleteAtCellLineEnd => {
                if facts.next_line().map(|n| facts.same_cell(n)).unwrap_or(false) {
                    KeyAction::allow()
                } else if facts.empty_line && !facts.only_line_in_cell() {
                    KeyAction::rewrite(KeyOutcome::Suppress, facts.remove_line())
                } else {
                    KeyAction::suppress()
                }
            }
            Rule::EnterAtHeaderEnd => {
                let rewrite = KeyRewrite::SplitHeaderLine { at: facts.position };
                KeyAction::rewrite(KeyOutcome::Suppress, rewrite)
            }
            Rule::EnterInEmptyListLine => {
                let rewrite = KeyRewrite::ConvertToCellLine { line: facts.line() };
                KeyAction::rewrite(KeyOutcome::Suppress, rewrite)
            }
            Rule::Escape => KeyAction::rewrite(KeyOutcome::Allow, KeyRewrite::ClearCellSelection),
        }
    }

    fn backspace_at_line_start(facts: &LineFacts) -> KeyAction {
        if facts.at_table_start() {
            return KeyAction::suppress();
        }
        let Some(previous) = facts.previous_line() else {
            return KeyAction::suppress();
        };
        let other_cell = !facts.same_cell(previous);
        let guarded = previous.is_list_line() || previous.is_header_line() || other_cell;
        if !guarded {
            return KeyAction::allow();
        }
        if facts.empty_line && !facts.only_line_in_cell() {
            return KeyAction::rewrite(KeyOutcome::Suppress, facts.remove_line());
        }
        if other_cell {
            return KeyAction::suppress();
        }
        KeyAction::allow()
    }
}

impl Default for KeyboardMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CellRangeSelection;
    use doc_model::{LineFormat, ListKind, Node, TableSpec};

    /// Table at the very start of the document followed by one body line
    fn doc_with_table(rows: usize, columns: usize) -> (DocumentTree, NodeId) {
        let mut tree = DocumentTree::with_empty_paragraph();
        let at = Position::start_of(tree.document.children()[0]);
        let table = tree.insert_table(&TableSpec::new(rows, columns), &at).unwrap();
        (tree, table)
    }

    fn cell_line(tree: &DocumentTree, table: NodeId, row: usize, col: usize) -> NodeId {
        let cell = tree.table_grid_map(table).unwrap().slot(row, col).unwrap();
        tree.get_table_cell(cell).unwrap().blocks()[0]
    }

    fn press(tree: &DocumentTree, at: Position, key: Key) -> KeyAction {
        KeyboardMachine::new().handle(tree, &Selection::collapsed(at), None, key.into())
    }

    #[test]
    fn test_backspace_at_table_start_is_suppressed() {
        let (mut tree, table) = doc_with_table(2, 2);
        let line = cell_line(&tree, table, 0, 0);
        tree.insert_text(&Position::start_of(line), "x", None).unwrap();

        let action = press(&tree, Position::start_of(line), Key::Backspace);
        assert_eq!(action, KeyAction::suppress());
    }

    #[test]
    fn test_vertical_arrows_suppressed_only_in_cells() {
        let (tree, table) = doc_with_table(1, 1);
        let line = cell_line(&tree, table, 0, 0);
        assert!(press(&tree, Position::start_of(line), Key::ArrowDown).is_suppressed());
        assert!(!press(&tree, Position::start_of(line), Key::ArrowLeft).is_suppressed());

        let body = *tree.document.children().last().unwrap();
        assert!(!press(&tree, Position::start_of(body), Key::ArrowUp).is_suppressed());
    }

    #[test]
    fn test_backspace_into_previous_cell_is_suppressed() {
        let (mut tree, table) = doc_with_table(1, 2);
        let line = cell_line(&tree, table, 0, 1);
        tree.insert_text(&Position::start_of(line), "text", None).unwrap();
        assert!(press(&tree, Position::start_of(line), Key::Backspace).is_suppressed());
    }

    #[test]
    fn test_backspace_removes_empty_second_line_after_other_cell() {
        let (mut tree, table) = doc_with_table(1, 2);
        let first = cell_line(&tree, table, 0, 1);
        // An empty line that is not the cell's only block, placed first
        tree.split_block(&Position::start_of(first)).unwrap();
        let action = press(&tree, Position::start_of(first), Key::Backspace);
        assert_eq!(
            action.rewrites,
            vec![KeyRewrite::RemoveLine { line: first }]
        );
        assert!(action.is_suppressed());
    }

    #[test]
    fn test_backspace_within_cell_is_allowed() {
        let (mut tree, table) = doc_with_table(1, 1);
        let line = cell_line(&tree, table, 0, 0);
        tree.insert_text(&Position::start_of(line), "ab\ncd", None).unwrap();
        let second = tree.next_block(line).unwrap();
        assert_eq!(press(&tree, Position::start_of(second), Key::Backspace), KeyAction::allow());
    }

    #[test]
    fn test_backspace_after_list_line_in_same_cell() {
        let (mut tree, table) = doc_with_table(1, 1);
        let line = cell_line(&tree, table, 0, 0);
        tree.insert_text(&Position::start_of(line), "item\n", None).unwrap();
        tree.set_line_format(line, LineFormat::List(ListKind::Bullet)).unwrap();
        let second = tree.next_block(line).unwrap();
        tree.set_line_format(second, LineFormat::Plain).unwrap();

        let action = press(&tree, Position::start_of(second), Key::Backspace);
        assert_eq!(action.rewrites, vec![KeyRewrite::RemoveLine { line: second }]);

        tree.insert_text(&Position::start_of(second), "more", None).unwrap();
        assert_eq!(press(&tree, Position::start_of(second), Key::Backspace), KeyAction::allow());
    }

    #[test]
    fn test_delete_at_cell_end() {
        let (mut tree, table) = doc_with_table(1, 2);
        let line = cell_line(&tree, table, 0, 0);
        tree.insert_text(&Position::start_of(line), "ab", None).unwrap();
        assert!(press(&tree, Position::new(line, 2), Key::Delete).is_suppressed());
        assert_eq!(press(&tree, Position::new(line, 1), Key::Delete), KeyAction::allow());

        tree.insert_text(&Position::new(line, 2), "\n", None).unwrap();
        assert_eq!(press(&tree, Position::new(line, 2), Key::Delete), KeyAction::allow());
        let empty = tree.next_block(line).unwrap();
        let action = press(&tree, Position::start_of(empty), Key::Delete);
        assert_eq!(action.rewrites, vec![KeyRewrite::RemoveLine { line: empty }]);
    }

    #[test]
    fn test_enter_at_header_end_splits() {
        let (mut tree, table) = doc_with_table(1, 1);
        let line = cell_line(&tree, table, 0, 0);
        tree.insert_text(&Position::start_of(line), "Title", None).unwrap();
        tree.set_line_format(line, LineFormat::Header { level: 2 }).unwrap();

        let action = press(&tree, Position::new(line, 5), Key::Enter);
        let split = KeyRewrite::SplitHeaderLine { at: Position::new(line, 5) };
        assert_eq!(action.rewrites, vec![split]);
        assert!(action.is_suppressed());
        assert_eq!(press(&tree, Position::new(line, 2), Key::Enter), KeyAction::allow());
    }

    #[test]
    fn test_enter_in_empty_list_line_converts() {
        let (mut tree, table) = doc_with_table(1, 1);
        let line = cell_line(&tree, table, 0, 0);
        tree.set_line_format(line, LineFormat::List(ListKind::Ordered)).unwrap();
        let action = press(&tree, Position::start_of(line), Key::Enter);
        assert_eq!(action.rewrites, vec![KeyRewrite::ConvertToCellLine { line }]);
    }

    #[test]
    fn test_empty_header_line_takes_precedence() {
        let (mut tree, table) = doc_with_table(1, 1);
        let line = cell_line(&tree, table, 0, 0);
        tree.set_line_format(line, LineFormat::Header { level: 1 }).unwrap();
        let action = press(&tree, Position::start_of(line), Key::Backspace);
        assert_eq!(action.rewrites, vec![KeyRewrite::ConvertToCellLine { line }]);

        tree.insert_text(&Position::start_of(line), "x", None).unwrap();
        let second = tree.split_block(&Position::new(line, 1)).unwrap();
        let action = press(&tree, Position::start_of(second), Key::Delete);
        assert_eq!(action.rewrites, vec![KeyRewrite::RemoveLine { line: second }]);
    }

    #[test]
    fn test_escape_clears_cell_selection() {
        let tree = DocumentTree::with_empty_paragraph();
        let line = tree.document.children()[0];
        let action = press(&tree, Position::start_of(line), Key::Escape);
        assert_eq!(action.outcome, KeyOutcome::Allow);
        assert_eq!(action.rewrites, vec![KeyRewrite::ClearCellSelection]);
    }

    fn drag_range(tree: &DocumentTree, table: NodeId) -> SelectedCells {
        let map = tree.table_grid_map(table).unwrap();
        let mut range = CellRangeSelection::new();
        range.pointer_down(tree, map.slot(0, 0).unwrap());
        range.pointer_move(tree, map.slot(0, 1).unwrap());
        range.pointer_up();
        range.selected_cells(tree).unwrap()
    }

    #[test]
    fn test_multi_cell_delete() {
        let (tree, table) = doc_with_table(1, 2);
        let (a, b) = (cell_line(&tree, table, 0, 0), cell_line(&tree, table, 0, 1));
        let selection = Selection::new(Position::start_of(a), Position::start_of(b));
        let machine = KeyboardMachine::new();
        let range = drag_range(&tree, table);

        let action = machine.handle(&tree, &selection, Some(&range), Key::Backspace.into());
        assert_eq!(action.rewrites, vec![KeyRewrite::ClearSelectedCells]);
        assert!(action.is_suppressed());

        let action = machine.handle(&tree, &selection, None, Key::Delete.into());
        assert_eq!(action, KeyAction::suppress());
    }

    #[test]
    fn test_cell_range_ignored_with_caret_outside_table() {
        let (mut tree, table) = doc_with_table(1, 2);
        let range = drag_range(&tree, table);
        let body = *tree.document.children().last().unwrap();
        tree.insert_text(&Position::start_of(body), "after", None).unwrap();

        let caret = Selection::collapsed(Position::new(body, 3));
        let machine = KeyboardMachine::new();
        let action = machine.handle(&tree, &caret, Some(&range), Key::Backspace.into());
        assert_eq!(action, KeyAction::allow());
    }
}
