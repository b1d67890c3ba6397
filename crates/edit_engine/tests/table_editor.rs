//! End-to-end table editing sessions driven through `TableEditor`

use doc_model::{
    Alignment, CellBorders, CellId, CharacterProperties, DocumentTree, Node, NodeId, Position,
    Selection, TableBorder, TableId,
};
use edit_engine::{
    EditOutcome, EditSource, EditorEvent, FormatKey, FormatValue, Key, KeyEvent, KeyOutcome,
    StructuralOp, TableEditHooks, TableEditor, TableEditorSettings, TableTooling,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn only_table(tree: &DocumentTree) -> NodeId {
    tree.tables().next().map(|t| t.id()).expect("document has a table")
}

fn cell_at(tree: &DocumentTree, row: usize, col: usize) -> NodeId {
    let map = tree.table_grid_map(only_table(tree)).expect("grid map");
    map.slot(row, col).expect("slot is covered")
}

fn first_line(tree: &DocumentTree, cell: NodeId) -> NodeId {
    tree.get_table_cell(cell).expect("cell").blocks()[0]
}

fn row_count(tree: &DocumentTree) -> usize {
    tree.table_rows_in_order(only_table(tree)).len()
}

#[test]
fn insert_table_places_caret_in_first_cell() {
    init_tracing();
    let mut editor = TableEditor::new();

    assert_eq!(editor.insert_table(2, 3).unwrap(), EditOutcome::Applied);

    let tree = editor.tree();
    let table = tree.get_table(only_table(tree)).unwrap();
    assert_eq!(table.column_count(), 3);
    assert_eq!(row_count(tree), 2);

    let ids: HashSet<CellId> = (0..2)
        .flat_map(|r| (0..3).map(move |c| (r, c)))
        .map(|(r, c)| tree.get_table_cell(cell_at(tree, r, c)).unwrap().cell_id().clone())
        .collect();
    assert_eq!(ids.len(), 6);

    let ctx = editor.table_context().expect("caret in table");
    assert_eq!((ctx.row_index, ctx.column_index), (0, 0));
}

#[test]
fn nested_table_is_refused_without_changes() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(1, 1).unwrap();
    let before = editor.tree().text_content();
    let depth = editor.engine().undo_manager().undo_depth();

    let outcome = editor.insert_table(2, 2).unwrap();

    assert!(outcome.is_refused());
    assert_eq!(editor.tree().text_content(), before);
    assert_eq!(editor.tree().tables().count(), 1);
    assert_eq!(editor.engine().undo_manager().undo_depth(), depth);
}

#[test]
fn deleting_every_row_removes_the_table() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(2, 2).unwrap();

    assert!(editor.delete_row().unwrap().is_applied());
    assert_eq!(row_count(editor.tree()), 1);
    assert!(editor.delete_row().unwrap().is_applied());

    assert_eq!(editor.tree().tables().count(), 0);
    assert_eq!(editor.tree().text_content(), "\n");
    assert!(editor.table_context().is_none());
}

#[test]
fn bold_follows_caret_across_cells_until_toggled_off() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(1, 3).unwrap();

    editor.toggle_format(FormatKey::Bold, Some(FormatValue::On));
    editor.insert_text("a").unwrap();

    let second = first_line(editor.tree(), cell_at(editor.tree(), 0, 1));
    editor.set_selection(Selection::at_start_of(second), EditSource::User);
    editor.insert_text("b").unwrap();
    let format = editor.tree().character_format_at(&Position::new(second, 1));
    assert_eq!(format.bold, Some(true));

    let third = first_line(editor.tree(), cell_at(editor.tree(), 0, 2));
    editor.set_selection(Selection::at_start_of(third), EditSource::User);
    editor.toggle_format(FormatKey::Bold, None);
    editor.insert_text("c").unwrap();
    let format = editor.tree().character_format_at(&Position::new(third, 1));
    assert_ne!(format.bold, Some(true));
}

#[test]
fn leaving_the_table_ends_the_format_session() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(1, 1).unwrap();
    editor.toggle_format(FormatKey::Italic, Some(FormatValue::On));
    assert!(editor.active_formats().contains(FormatKey::Italic));

    let body_line = *editor.tree().document.children().last().unwrap();
    editor.set_selection(Selection::at_start_of(body_line), EditSource::User);

    assert!(editor.active_formats().is_empty());
}

#[test]
fn backspace_at_table_start_is_suppressed() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(2, 2).unwrap();
    let before = editor.tree().text_content();

    let outcome = editor.handle_key(KeyEvent::from(Key::Backspace)).unwrap();

    assert_eq!(outcome, KeyOutcome::Suppress);
    assert_eq!(editor.tree().text_content(), before);
}

#[test]
fn delete_on_trailing_empty_line_removes_it() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(1, 2).unwrap();
    editor.insert_text("ab\n").unwrap();

    let cell = cell_at(editor.tree(), 0, 0);
    let lines = editor.tree().get_table_cell(cell).unwrap().blocks().to_vec();
    assert_eq!(lines.len(), 2);
    editor.set_selection(Selection::at_start_of(lines[1]), EditSource::User);

    let outcome = editor.handle_key(KeyEvent::from(Key::Delete)).unwrap();

    assert_eq!(outcome, KeyOutcome::Suppress);
    assert_eq!(editor.tree().get_table_cell(cell).unwrap().blocks().len(), 1);
    let caret = editor.selection().focus;
    assert_eq!(caret.node_id, lines[0]);
    assert_eq!(caret.offset, 2);
}

#[test]
fn inserted_row_gets_formats_reapplied_without_history() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(1, 2).unwrap();
    editor.toggle_format(FormatKey::Alignment, Some(FormatValue::Align(Alignment::Center)));

    assert!(editor.insert_row(true).unwrap().is_applied());
    assert_eq!(editor.scheduler().pending(), 1);
    let depth = editor.engine().undo_manager().undo_depth();

    let outcomes = editor.tick(10).unwrap();

    assert_eq!(outcomes, vec![EditOutcome::Applied]);
    assert_eq!(editor.engine().undo_manager().undo_depth(), depth);
    let tree = editor.tree();
    for col in 0..2 {
        let line = first_line(tree, cell_at(tree, 1, col));
        let para = tree.get_paragraph(line).unwrap();
        assert_eq!(para.direct_formatting.alignment, Some(Alignment::Center));
    }
}

fn touch_editor() -> TableEditor {
    let settings = TableEditorSettings::default().with_touch_platform(true);
    let mut editor = TableEditor::new().with_settings(settings);
    editor.insert_table(2, 1).unwrap();
    editor.viewport_resized(800.0, 0);
    editor.viewport_resized(400.0, 1000);
    editor
}

#[test]
fn structural_insert_waits_for_viewport_to_settle() {
    init_tracing();
    let mut editor = touch_editor();

    let outcome = editor.insert_row(true).unwrap();
    assert!(matches!(outcome, EditOutcome::Deferred(_)));
    assert_eq!(row_count(editor.tree()), 2);

    assert!(editor.tick(1100).unwrap().is_empty());
    assert_eq!(row_count(editor.tree()), 2);

    let outcomes = editor.tick(1300).unwrap();
    assert_eq!(outcomes, vec![EditOutcome::Applied]);
    assert_eq!(row_count(editor.tree()), 3);
}

#[test]
fn deferred_insert_for_deleted_cell_is_abandoned() {
    init_tracing();
    let mut editor = touch_editor();

    assert!(matches!(editor.insert_row(true).unwrap(), EditOutcome::Deferred(_)));
    assert!(editor.delete_row().unwrap().is_applied());
    assert_eq!(row_count(editor.tree()), 1);

    assert!(editor.tick(1300).unwrap().is_empty());
    assert_eq!(row_count(editor.tree()), 1);
    assert_eq!(editor.scheduler().pending(), 0);
}

#[test]
fn deleting_table_cancels_its_deferred_work() {
    init_tracing();
    let mut editor = touch_editor();
    editor.insert_row(false).unwrap();
    assert_eq!(editor.scheduler().pending(), 1);

    assert!(editor.delete_table().unwrap().is_applied());

    assert_eq!(editor.scheduler().pending(), 0);
    assert_eq!(editor.tree().tables().count(), 0);
}

#[test]
fn silent_caret_placement_emits_no_selection_event() {
    init_tracing();
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut editor = TableEditor::new();
    let sink = events.clone();
    editor.subscribe(Box::new(move |event: &EditorEvent| sink.lock().unwrap().push(*event)));

    editor.insert_table(1, 1).unwrap();

    let expected = vec![
        EditorEvent::ContentChanged { source: EditSource::User },
        EditorEvent::SelectionChanged { source: EditSource::User },
    ];
    assert_eq!(*events.lock().unwrap(), expected);

    let body_line = *editor.tree().document.children().last().unwrap();
    editor.set_selection(Selection::at_start_of(body_line), EditSource::Silent);
    assert_eq!(*events.lock().unwrap(), expected);

    editor.set_selection(Selection::at_start_of(body_line), EditSource::User);
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[2], EditorEvent::SelectionChanged { source: EditSource::User });
}

#[test]
fn undo_restores_document_without_table() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(2, 2).unwrap();
    assert!(editor.can_undo());

    editor.undo().unwrap();

    assert_eq!(editor.tree().tables().count(), 0);
    assert_eq!(editor.tree().text_content(), "\n");
    assert!(editor.can_redo());

    editor.redo().unwrap();
    assert_eq!(editor.tree().tables().count(), 1);
}

struct VetoRowDeletes;

impl TableEditHooks for VetoRowDeletes {
    fn before_structural_edit(&mut self, op: StructuralOp) -> bool {
        op != StructuralOp::DeleteRow
    }
}

#[test]
fn hook_can_veto_structural_edit() {
    init_tracing();
    let mut editor = TableEditor::new().with_hooks(Box::new(VetoRowDeletes));
    editor.insert_table(2, 2).unwrap();

    assert!(editor.delete_row().unwrap().is_refused());
    assert_eq!(row_count(editor.tree()), 2);
    assert!(editor.insert_row(true).unwrap().is_applied());
}

struct BrokenTooling {
    shown: Arc<Mutex<Vec<TableId>>>,
}

impl TableTooling for BrokenTooling {
    fn show(&mut self, table: &TableId, _cell: &CellId) -> anyhow::Result<()> {
        self.shown.lock().unwrap().push(table.clone());
        anyhow::bail!("tooling surface unavailable")
    }

    fn hide(&mut self) -> anyhow::Result<()> {
        anyhow::bail!("tooling surface unavailable")
    }
}

#[test]
fn tooling_failure_does_not_abort_edit() {
    init_tracing();
    let shown = Arc::new(Mutex::new(Vec::new()));
    let tooling = BrokenTooling { shown: shown.clone() };
    let mut editor = TableEditor::new().with_tooling(Box::new(tooling));

    assert!(editor.insert_table(1, 2).unwrap().is_applied());
    assert_eq!(editor.tree().tables().count(), 1);
    assert_eq!(shown.lock().unwrap().len(), 1);

    editor.on_scroll();
    assert!(editor.cell_selection().is_idle());
}

#[test]
fn drag_select_merge_and_split() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(2, 2).unwrap();
    let (top_left, bottom_right) = (cell_at(editor.tree(), 0, 0), cell_at(editor.tree(), 1, 1));

    assert!(editor.pointer_down(top_left));
    assert!(editor.pointer_move(bottom_right));
    editor.pointer_up();
    assert_eq!(editor.cell_selection().cell_count(editor.tree()), 4);
    assert!(editor.is_cell_selected(cell_at(editor.tree(), 0, 1)));

    assert!(editor.merge_selected_cells().unwrap().is_applied());
    for (r, c) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        assert_eq!(cell_at(editor.tree(), r, c), top_left);
    }

    assert!(editor.split_cell().unwrap().is_applied());
    let cells: HashSet<NodeId> = [(0, 0), (0, 1), (1, 0), (1, 1)]
        .into_iter()
        .map(|(r, c)| cell_at(editor.tree(), r, c))
        .collect();
    assert_eq!(cells.len(), 4);
}

#[test]
fn clear_selected_cells_with_backspace() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(1, 2).unwrap();
    editor.insert_text("left").unwrap();
    let right = cell_at(editor.tree(), 0, 1);
    let right_line = first_line(editor.tree(), right);
    editor.set_selection(Selection::at_start_of(right_line), EditSource::User);
    editor.insert_text("right").unwrap();

    let left = cell_at(editor.tree(), 0, 0);
    editor.pointer_down(left);
    editor.pointer_move(right);
    editor.pointer_up();

    let outcome = editor.handle_key(KeyEvent::from(Key::Backspace)).unwrap();

    assert_eq!(outcome, KeyOutcome::Suppress);
    for cell in [left, right] {
        let line = first_line(editor.tree(), cell);
        assert_eq!(editor.tree().paragraph_len(line), 0);
    }
}

#[test]
fn deleting_last_table_restores_default_formats() {
    init_tracing();
    let mut editor = TableEditor::new().with_default_formats(CharacterProperties::bold());
    editor.insert_table(1, 1).unwrap();

    assert!(editor.delete_table().unwrap().is_applied());

    assert!(editor.tree().is_empty_document());
    let line = editor.selection().focus.node_id;
    assert_eq!(editor.tree().character_format_at(&Position::start_of(line)).bold, Some(true));
}

/// Two cells holding "left" and "right", both selected by dragging
fn editor_with_dragged_cells() -> (TableEditor, NodeId, NodeId) {
    let mut editor = TableEditor::new();
    editor.insert_table(1, 2).unwrap();
    editor.insert_text("left").unwrap();
    let right = cell_at(editor.tree(), 0, 1);
    let right_line = first_line(editor.tree(), right);
    editor.set_selection(Selection::at_start_of(right_line), EditSource::User);
    editor.insert_text("right").unwrap();

    let left = cell_at(editor.tree(), 0, 0);
    editor.pointer_down(left);
    editor.pointer_move(right);
    editor.pointer_up();
    (editor, left, right)
}

#[test]
fn caret_leaving_table_drops_cell_selection() {
    init_tracing();
    let (mut editor, left, right) = editor_with_dragged_cells();
    assert!(!editor.cell_selection().is_idle());

    let body_line = *editor.tree().document.children().last().unwrap();
    editor.set_selection(Selection::at_start_of(body_line), EditSource::User);
    assert!(editor.table_context().is_none());
    assert!(editor.cell_selection().is_idle());
    assert!(!editor.is_cell_selected(left));

    let outcome = editor.handle_key(KeyEvent::from(Key::Backspace)).unwrap();

    assert_eq!(outcome, KeyOutcome::Allow);
    let tree = editor.tree();
    assert_eq!(tree.paragraph_text(first_line(tree, left)), "left");
    assert_eq!(tree.paragraph_text(first_line(tree, right)), "right");
}

#[test]
fn toggle_off_in_new_row_survives_deferred_reapply() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(1, 2).unwrap();
    editor.toggle_format(FormatKey::Bold, Some(FormatValue::On));
    editor.insert_text("a").unwrap();
    assert!(editor.insert_row(true).unwrap().is_applied());
    assert_eq!(editor.scheduler().pending(), 1);

    let new_line = first_line(editor.tree(), cell_at(editor.tree(), 1, 0));
    editor.set_selection(Selection::at_start_of(new_line), EditSource::User);
    editor.toggle_format(FormatKey::Bold, None);
    editor.insert_text("plain").unwrap();
    let before_tick = editor.tree().character_format_at(&Position::new(new_line, 3));
    assert_ne!(before_tick.bold, Some(true));

    editor.tick(100).unwrap();

    assert_eq!(editor.scheduler().pending(), 0);
    let after_tick = editor.tree().character_format_at(&Position::new(new_line, 3));
    assert_ne!(after_tick.bold, Some(true));
    assert_eq!(editor.tree().paragraph_text(new_line), "plain");
}

#[test]
fn cell_selection_follows_rows_inserted_inside_it() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(2, 2).unwrap();
    let (top_left, bottom_right) = (cell_at(editor.tree(), 0, 0), cell_at(editor.tree(), 1, 1));
    editor.pointer_down(top_left);
    editor.pointer_move(bottom_right);
    editor.pointer_up();
    assert!(editor.is_cell_selected(bottom_right));

    assert!(editor.insert_row(true).unwrap().is_applied());

    assert_eq!(row_count(editor.tree()), 3);
    let inserted = cell_at(editor.tree(), 1, 0);
    assert!(editor.is_cell_selected(inserted));
    assert!(editor.is_cell_selected(bottom_right));

    editor.click_outside();
    assert!(!editor.is_cell_selected(inserted));
}

#[test]
fn styling_applies_to_selected_cells_only() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(2, 2).unwrap();
    let (a, b) = (cell_at(editor.tree(), 0, 0), cell_at(editor.tree(), 0, 1));
    editor.pointer_down(a);
    editor.pointer_move(b);
    editor.pointer_up();

    let borders = CellBorders::all(TableBorder::default());
    assert!(editor.set_cell_borders(Some(borders.clone())).unwrap().is_applied());
    assert!(editor.set_cell_shading(Some("#eeeeee".into())).unwrap().is_applied());

    let tree = editor.tree();
    for cell in [a, b] {
        let properties = &tree.get_table_cell(cell).unwrap().properties;
        assert_eq!(properties.borders.as_ref(), Some(&borders));
        assert_eq!(properties.shading.as_deref(), Some("#eeeeee"));
    }
    let untouched = &tree.get_table_cell(cell_at(tree, 1, 0)).unwrap().properties;
    assert!(untouched.borders.is_none());
    assert!(untouched.shading.is_none());
}

#[test]
fn undo_keeps_formats_reapplied_after_the_undone_edit() {
    init_tracing();
    let mut editor = TableEditor::new();
    editor.insert_table(1, 2).unwrap();
    editor.toggle_format(FormatKey::Alignment, Some(FormatValue::Align(Alignment::Center)));
    assert!(editor.insert_row(true).unwrap().is_applied());
    let table = only_table(editor.tree());
    assert!(editor.set_column_width(table, 0, 150.0).unwrap().is_applied());

    assert_eq!(editor.tick(10).unwrap(), vec![EditOutcome::Applied]);
    editor.undo().unwrap();

    let centered = |editor: &TableEditor| {
        let tree = editor.tree();
        (0..2).all(|col| {
            let line = first_line(tree, cell_at(tree, 1, col));
            tree.get_paragraph(line).unwrap().direct_formatting.alignment == Some(Alignment::Center)
        })
    };
    assert_eq!(row_count(editor.tree()), 2);
    assert!(centered(&editor));

    editor.redo().unwrap();
    assert!(centered(&editor));
}
