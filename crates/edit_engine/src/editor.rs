//! Table editor façade
//!
//! One [`TableEditor`] per editor instance. It owns the editing engine and
//! all table session state (cell-range selection, active formats, pending
//! deferred work, tooling visibility) and turns host input into atomic
//! edits. Invariant-breaking requests come back as
//! [`EditOutcome::Refused`]; the document is left untouched.

use crate::{
    ActiveFormats, ApplyCellFormats, CellRangeSelection, ClearCells, Command, DeferredStructuralOp,
    DeferredTask, DeleteColumn, DeleteRange, DeleteRow, DeleteTable, EditSource, EditingEngine,
    EventListener, FormatKey, FormatText, FormatTracker, FormatValue, InsertColumn, InsertRow,
    InsertTable, InsertText, KeyEvent, KeyOutcome, KeyRewrite, KeyboardMachine, MergeCells,
    NoopHooks, NoopTooling, RemoveLine, Result, Scheduler, SelectedCells, SetCellBorders,
    SetCellShading, SetColumnWidth, SetLineFormat, SplitCell, SplitLine, StructuralOp,
    SubscriptionId, TableEditHooks, TableEditorSettings, TableTooling, TaskHandle, TaskKey,
    TextFormatting, UndoManager, ViewportMonitor,
};
use doc_model::{
    CellBorders, CellId, CharacterProperties, DocumentTree, LineFormat, Node, NodeId, PastedTable,
    Selection, TableContext, TableId, TableSpec,
};
use std::cell::RefCell;
use std::collections::HashSet;

/// What became of a requested edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The edit was applied
    Applied,
    /// The edit was queued and will run on a later tick
    Deferred(TaskHandle),
    /// The edit would have broken the table structure; nothing changed
    Refused { reason: String },
}

impl EditOutcome {
    fn refused(reason: impl Into<String>) -> Self {
        Self::Refused { reason: reason.into() }
    }

    fn not_in_table() -> Self {
        Self::refused("The caret is not inside a table")
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn is_refused(&self) -> bool {
        matches!(self, Self::Refused { .. })
    }
}

/// Selected cells resolved for one document revision and range
struct SelectionCache {
    revision: u64,
    range: CellRangeSelection,
    cells: Option<SelectedCells>,
}

/// Table editing session for one editor instance
pub struct TableEditor {
    engine: EditingEngine,
    cell_selection: CellRangeSelection,
    selected_cache: RefCell<Option<SelectionCache>>,
    keyboard: KeyboardMachine,
    tracker: FormatTracker,
    scheduler: Scheduler,
    viewport: ViewportMonitor,
    settings: TableEditorSettings,
    hooks: Box<dyn TableEditHooks>,
    tooling: Box<dyn TableTooling>,
    /// Cell the tooling is currently shown for
    tooling_target: Option<(TableId, CellId)>,
    last_clicked_cell: Option<CellId>,
    /// Formats restored when deleting a table leaves the document empty
    default_formats: CharacterProperties,
    now_ms: u64,
}

impl TableEditor {
    /// Create an editor over an empty document
    pub fn new() -> Self {
        Self::with_tree(DocumentTree::with_empty_paragraph())
    }

    /// Create an editor over an existing document
    pub fn with_tree(tree: DocumentTree) -> Self {
        let settings = TableEditorSettings::default();
        let viewport = ViewportMonitor::new(
            settings.viewport_settle_window_ms,
            settings.viewport_height_threshold,
        );
        Self {
            engine: EditingEngine::with_tree(tree)
                .with_undo_limits(settings.undo_limit, settings.undo_batch_threshold()),
            cell_selection: CellRangeSelection::new(),
            selected_cache: RefCell::new(None),
            keyboard: KeyboardMachine::new(),
            tracker: FormatTracker::new(),
            scheduler: Scheduler::new(),
            viewport,
            settings,
            hooks: Box::new(NoopHooks),
            tooling: Box::new(NoopTooling),
            tooling_target: None,
            last_clicked_cell: None,
            default_formats: CharacterProperties::default(),
            now_ms: 0,
        }
    }

    /// Replace the settings
    pub fn with_settings(mut self, settings: TableEditorSettings) -> Self {
        *self.engine.undo_manager_mut() =
            UndoManager::with_limits(settings.undo_limit, settings.undo_batch_threshold());
        self.viewport = ViewportMonitor::new(
            settings.viewport_settle_window_ms,
            settings.viewport_height_threshold,
        );
        self.settings = settings;
        self
    }

    pub fn with_hooks(mut self, hooks: Box<dyn TableEditHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_tooling(mut self, tooling: Box<dyn TableTooling>) -> Self {
        self.tooling = tooling;
        self
    }

    pub fn with_default_formats(mut self, formats: CharacterProperties) -> Self {
        self.default_formats = formats;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn engine(&self) -> &EditingEngine {
        &self.engine
    }

    pub fn tree(&self) -> &DocumentTree {
        self.engine.tree()
    }

    pub fn selection(&self) -> Selection {
        self.engine.selection()
    }

    pub fn settings(&self) -> &TableEditorSettings {
        &self.settings
    }

    pub fn cell_selection(&self) -> &CellRangeSelection {
        &self.cell_selection
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The active-format mapping of the current table session
    pub fn active_formats(&self) -> &ActiveFormats {
        self.tracker.active()
    }

    pub fn last_clicked_cell(&self) -> Option<&CellId> {
        self.last_clicked_cell.as_ref()
    }

    /// Where the caret sits inside a table, if it does
    pub fn table_context(&self) -> Option<TableContext> {
        self.engine.tree().locate_table_context(&self.engine.selection().focus)
    }

    /// Whether a cell is part of the cell-range selection. The resolved
    /// cell set is reused until the document or the range changes.
    pub fn is_cell_selected(&self, cell: NodeId) -> bool {
        self.with_selected(|selected| selected.map(|s| s.contains(cell)).unwrap_or(false))
    }

    fn with_selected<R>(&self, f: impl FnOnce(Option<&SelectedCells>) -> R) -> R {
        let revision = self.engine.revision();
        let mut cache = self.selected_cache.borrow_mut();
        let fresh = cache
            .as_ref()
            .map(|c| c.revision == revision && c.range == self.cell_selection)
            .unwrap_or(false);
        if !fresh {
            *cache = Some(SelectionCache {
                revision,
                range: self.cell_selection.clone(),
                cells: self.cell_selection.selected_cells(self.engine.tree()),
            });
        }
        f(cache.as_ref().and_then(|c| c.cells.as_ref()))
    }

    pub fn subscribe(&mut self, listener: EventListener) -> SubscriptionId {
        self.engine.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.engine.unsubscribe(id)
    }

    // ========================================================================
    // Selection and session state
    // ========================================================================

    /// Move the caret or text selection
    pub fn set_selection(&mut self, selection: Selection, source: EditSource) {
        self.engine.set_selection(selection, source);
        self.sync_session();
    }

    /// Bring cell selection, format tracking and tooling in line with the
    /// current document and caret. A cell range does not outlive the caret
    /// leaving its table.
    fn sync_session(&mut self) {
        self.cell_selection.revalidate(self.engine.tree());
        let caret_table = self.table_context().and_then(|ctx| self.table_id_of(ctx.table));
        let left = self
            .cell_selection
            .table()
            .map(|table| caret_table.as_ref() != Some(table))
            .unwrap_or(false);
        if left {
            tracing::debug!("Caret left the selected table, clearing cell selection");
            self.cell_selection.clear();
        }
        self.tracker.observe(self.engine.tree(), &self.engine.selection());
        self.refresh_tooling();
    }

    fn refresh_tooling(&mut self) {
        let tree = self.engine.tree();
        let target = self
            .table_context()
            .and_then(|ctx| tree.cell_tag_for(ctx.cell))
            .map(|tag| (tag.table_id, tag.cell_id));
        if target == self.tooling_target {
            return;
        }
        let result = match &target {
            Some((table, cell)) => self.tooling.show(table, cell),
            None => self.tooling.hide(),
        };
        if let Err(e) = result {
            tracing::warn!("Table tooling failed: {}", e);
        }
        self.tooling_target = target;
    }

    fn hide_tooling(&mut self) {
        if self.tooling_target.take().is_some() {
            if let Err(e) = self.tooling.hide() {
                tracing::warn!("Table tooling failed to hide: {}", e);
            }
        }
    }

    // ========================================================================
    // Edit pipeline
    // ========================================================================

    /// Run one atomic edit. Refusals are logged and reported, not returned
    /// as errors.
    fn run(
        &mut self,
        op: Option<StructuralOp>,
        command: Box<dyn Command>,
        source: EditSource,
    ) -> Result<EditOutcome> {
        if let Some(op) = op {
            if !self.hooks.before_structural_edit(op) {
                tracing::debug!("Structural edit {:?} vetoed", op);
                return Ok(EditOutcome::refused("Vetoed by table edit hook"));
            }
        }

        let name = command.display_name().to_string();
        if let Err(e) = self.engine.execute(command, source) {
            if e.is_refusal() {
                tracing::warn!("{} refused: {}", name, e);
                return Ok(EditOutcome::refused(e.to_string()));
            }
            return Err(e);
        }

        for table_id in self.engine.take_pruned_tables() {
            self.scheduler.cancel_for_table(&table_id);
        }
        if let Some(op) = op {
            if let Err(e) = self.hooks.after_structural_edit(op) {
                tracing::warn!("After-edit hook for {:?} failed: {}", op, e);
            }
        }

        if source == EditSource::Silent {
            self.cell_selection.revalidate(self.engine.tree());
        } else {
            self.sync_session();
        }
        Ok(EditOutcome::Applied)
    }

    fn table_id_of(&self, table: NodeId) -> Option<TableId> {
        self.engine.tree().get_table(table).map(|t| t.table_id().clone())
    }

    /// Cell identifiers of a table in reading order
    fn table_cell_ids(tree: &DocumentTree, table: NodeId) -> Vec<CellId> {
        tree.table_rows_in_order(table)
            .into_iter()
            .filter_map(|row| tree.get_table_row(row))
            .flat_map(|row| row.children().iter().copied())
            .filter_map(|cell| tree.get_table_cell(cell).map(|c| c.cell_id().clone()))
            .collect()
    }

    /// Cells to style: the cell-range selection, or the caret's cell
    fn target_cells(&self) -> Vec<NodeId> {
        let selected = self.with_selected(|s| s.filter(|s| !s.is_empty()).map(|s| s.cells.clone()));
        selected
            .or_else(|| self.table_context().map(|ctx| vec![ctx.cell]))
            .unwrap_or_default()
    }

    /// The user is working in the caret's cell: deferred formatting skips it
    fn release_caret_cell(&mut self) {
        let tree = self.engine.tree();
        let tag = self.table_context().and_then(|ctx| tree.cell_tag_for(ctx.cell));
        if let Some(tag) = tag {
            self.scheduler.release_cell(&tag.cell_id);
        }
    }

    // ========================================================================
    // Tables
    // ========================================================================

    /// Insert an empty table at the caret and put the caret in its first cell
    pub fn insert_table(&mut self, rows: usize, columns: usize) -> Result<EditOutcome> {
        let spec =
            TableSpec::new(rows, columns).with_column_width(self.settings.default_column_width);
        self.insert_table_with(spec)
    }

    /// Insert a table recovered from pasted markup
    pub fn paste_table(&mut self, pasted: &PastedTable) -> Result<EditOutcome> {
        match pasted.to_spec(self.settings.default_column_width) {
            Some(spec) => self.insert_table_with(spec),
            None => Ok(EditOutcome::refused("Pasted table has no cells")),
        }
    }

    /// Insert a table of any shape at the caret
    pub fn insert_table_with(&mut self, spec: TableSpec) -> Result<EditOutcome> {
        let position = self.engine.selection().focus;
        let existing: HashSet<TableId> =
            self.engine.tree().tables().map(|t| t.table_id().clone()).collect();

        let outcome = self.run(
            Some(StructuralOp::InsertTable),
            Box::new(InsertTable::from_spec(spec, position)),
            EditSource::User,
        )?;
        if !outcome.is_applied() {
            return Ok(outcome);
        }

        let tree = self.engine.tree();
        let first_line = tree
            .tables()
            .find(|t| !existing.contains(t.table_id()))
            .and_then(|t| tree.table_blocks(t.id()).first().copied());
        if let Some(line) = first_line {
            self.engine.set_selection(Selection::at_start_of(line), EditSource::Silent);
            self.sync_session();
        }
        Ok(outcome)
    }

    /// Delete the table holding the caret
    pub fn delete_table(&mut self) -> Result<EditOutcome> {
        let Some(ctx) = self.table_context() else {
            return Ok(EditOutcome::not_in_table());
        };
        let table_id = self.table_id_of(ctx.table);
        let command = Box::new(DeleteTable::new(ctx.table));
        let outcome = self.run(Some(StructuralOp::DeleteTable), command, EditSource::User)?;
        if !outcome.is_applied() {
            return Ok(outcome);
        }

        if let Some(table_id) = table_id {
            self.scheduler.cancel_for_table(&table_id);
        }
        self.cell_selection.clear();
        if self.engine.tree().is_empty_document() && !self.default_formats.is_empty() {
            let line = self.engine.selection().focus.node_id;
            let formats = self.default_formats.clone();
            let restore = FormatText::whole_line(self.engine.tree(), line, formats);
            self.run(None, Box::new(restore), EditSource::Silent)?;
        }
        Ok(outcome)
    }

    // ========================================================================
    // Rows and columns
    // ========================================================================

    /// Insert a row above or below the caret's row
    pub fn insert_row(&mut self, below: bool) -> Result<EditOutcome> {
        self.insert_structural(|cell| DeferredStructuralOp::InsertRow { cell, below })
    }

    /// Insert a column left or right of the caret's cell
    pub fn insert_column(&mut self, right: bool) -> Result<EditOutcome> {
        self.insert_structural(|cell| DeferredStructuralOp::InsertColumn { cell, right })
    }

    fn insert_structural(
        &mut self,
        make: impl FnOnce(CellId) -> DeferredStructuralOp,
    ) -> Result<EditOutcome> {
        let Some(ctx) = self.table_context() else {
            return Ok(EditOutcome::not_in_table());
        };
        let Some(tag) = self.engine.tree().cell_tag_for(ctx.cell) else {
            return Ok(EditOutcome::not_in_table());
        };
        self.tracker.observe(self.engine.tree(), &self.engine.selection());
        let op = make(tag.cell_id);

        if self.settings.touch_platform {
            if let Some(due) = self.viewport.settles_at(self.now_ms) {
                let task = DeferredTask::CommitStructural { table: tag.table_id, op };
                let handle = self.scheduler.schedule(task, due, Some(TaskKey::StructuralCommit));
                tracing::debug!("Structural insert deferred until {}ms for the viewport", due);
                return Ok(EditOutcome::Deferred(handle));
            }
        }
        self.commit_structural(ctx.table, &tag.table_id, ctx.cell, &op)
    }

    /// Apply a row/column insert and schedule format reapplication for the
    /// cells it created
    fn commit_structural(
        &mut self,
        table: NodeId,
        table_id: &TableId,
        cell: NodeId,
        op: &DeferredStructuralOp,
    ) -> Result<EditOutcome> {
        let (characters, paragraph) = self.tracker.captured();
        let before: HashSet<CellId> =
            Self::table_cell_ids(self.engine.tree(), table).into_iter().collect();

        let (structural, command): (StructuralOp, Box<dyn Command>) = match op {
            DeferredStructuralOp::InsertRow { below, .. } => {
                let row = self.engine.tree().get_table_cell(cell).and_then(|c| c.parent());
                let Some(row) = row else {
                    return Ok(EditOutcome::refused("Cell is not in a row"));
                };
                let command = if *below { InsertRow::below(row) } else { InsertRow::above(row) };
                (StructuralOp::InsertRow, Box::new(command.with_cell_format(characters.clone())))
            }
            DeferredStructuralOp::InsertColumn { right, .. } => {
                let command = if *right {
                    InsertColumn::right(cell)
                } else {
                    InsertColumn::left(cell)
                };
                (StructuralOp::InsertColumn, Box::new(command.with_cell_format(characters.clone())))
            }
        };

        let outcome = self.run(Some(structural), command, EditSource::User)?;
        if !outcome.is_applied() {
            return Ok(outcome);
        }

        let created: Vec<CellId> = Self::table_cell_ids(self.engine.tree(), table)
            .into_iter()
            .filter(|id| !before.contains(id))
            .collect();
        let has_formats = !characters.is_empty() || !paragraph.is_empty();
        if let (Some(first), true) = (created.first().cloned(), has_formats) {
            let task = DeferredTask::ReapplyFormats {
                table: table_id.clone(),
                cells: created,
                characters,
                paragraph,
            };
            let due = self.now_ms + self.settings.format_reapply_delay_ms;
            self.scheduler.schedule(task, due, Some(TaskKey::FormatReapply(first)));
        }
        Ok(outcome)
    }

    /// Delete the caret's row
    pub fn delete_row(&mut self) -> Result<EditOutcome> {
        let Some(ctx) = self.table_context() else {
            return Ok(EditOutcome::not_in_table());
        };
        self.run(Some(StructuralOp::DeleteRow), Box::new(DeleteRow::new(ctx.row)), EditSource::User)
    }

    /// Delete the caret's column
    pub fn delete_column(&mut self) -> Result<EditOutcome> {
        let Some(ctx) = self.table_context() else {
            return Ok(EditOutcome::not_in_table());
        };
        let command = DeleteColumn::new(ctx.table, ctx.column_index);
        self.run(Some(StructuralOp::DeleteColumn), Box::new(command), EditSource::User)
    }

    /// Commit a column resize
    pub fn set_column_width(
        &mut self,
        table: NodeId,
        column: usize,
        width: f32,
    ) -> Result<EditOutcome> {
        let command = SetColumnWidth::new(table, column, width);
        self.run(Some(StructuralOp::ResizeColumn), Box::new(command), EditSource::User)
    }

    // ========================================================================
    // Cells
    // ========================================================================

    /// Merge the selected cell range into its top-left cell
    pub fn merge_selected_cells(&mut self) -> Result<EditOutcome> {
        let range = self.with_selected(|s| s.map(|s| (s.table, s.rect, s.len())));
        let Some((table, rect, count)) = range else {
            return Ok(EditOutcome::refused("No cell range is selected"));
        };
        if count < 2 {
            return Ok(EditOutcome::refused("Select at least two cells to merge"));
        }
        let corners = self.engine.tree().table_grid_map(table).and_then(|map| {
            Some((map.slot(rect.start_row, rect.start_col)?, map.slot(rect.end_row, rect.end_col)?))
        });
        let Some((first, last)) = corners else {
            return Ok(EditOutcome::refused("Selected range is not on the grid"));
        };

        let command = Box::new(MergeCells::new(first, last));
        let outcome = self.run(Some(StructuralOp::MergeCells), command, EditSource::User)?;
        if outcome.is_applied() {
            self.cell_selection.select_single(self.engine.tree(), first);
        }
        Ok(outcome)
    }

    /// Split the caret's cell back into single cells
    pub fn split_cell(&mut self) -> Result<EditOutcome> {
        let Some(ctx) = self.table_context() else {
            return Ok(EditOutcome::not_in_table());
        };
        let command = Box::new(SplitCell::new(ctx.cell));
        self.run(Some(StructuralOp::SplitCell), command, EditSource::User)
    }

    /// Empty every selected cell down to one line
    pub fn clear_selected_cells(&mut self) -> Result<EditOutcome> {
        let selected = self.with_selected(|s| s.filter(|s| !s.is_empty()).map(|s| s.cells.clone()));
        let Some(cells) = selected else {
            return Ok(EditOutcome::refused("No cell range is selected"));
        };
        self.run(Some(StructuralOp::ClearCells), Box::new(ClearCells::new(cells)), EditSource::User)
    }

    /// Set or clear the background of the selected cells (or the caret's cell)
    pub fn set_cell_shading(&mut self, shading: Option<String>) -> Result<EditOutcome> {
        let cells = self.target_cells();
        if cells.is_empty() {
            return Ok(EditOutcome::not_in_table());
        }
        let command = Box::new(SetCellShading::new(cells, shading));
        self.run(Some(StructuralOp::StyleCells), command, EditSource::User)
    }

    /// Set or clear the borders of the selected cells (or the caret's cell)
    pub fn set_cell_borders(&mut self, borders: Option<CellBorders>) -> Result<EditOutcome> {
        let cells = self.target_cells();
        if cells.is_empty() {
            return Ok(EditOutcome::not_in_table());
        }
        let command = Box::new(SetCellBorders::new(cells, borders));
        self.run(Some(StructuralOp::StyleCells), command, EditSource::User)
    }

    // ========================================================================
    // Text and formats
    // ========================================================================

    /// Type text at the caret, replacing any selected text. Inside a table
    /// the text carries the session's active formats.
    pub fn insert_text(&mut self, text: &str) -> Result<EditOutcome> {
        let selection = self.engine.selection();
        if !selection.is_collapsed() {
            let command = Box::new(DeleteRange::new(selection.anchor, selection.focus));
            let outcome = self.run(None, command, EditSource::User)?;
            if !outcome.is_applied() {
                return Ok(outcome);
            }
        }

        self.release_caret_cell();
        let position = self.engine.selection().focus;
        self.tracker.observe(self.engine.tree(), &self.engine.selection());
        let in_table = self.engine.tree().locate_table_context(&position).is_some();
        let formatting = match self.tracker.restamp_formatting() {
            Some(props) if in_table => TextFormatting::Exact(props),
            _ => TextFormatting::Inherit,
        };
        let command = InsertText::new(position, text).with_formatting(formatting);
        self.run(None, Box::new(command), EditSource::User)
    }

    /// Explicitly turn a format on (with a value) or off (with None) for
    /// text typed next. Pending reapplication no longer touches the caret's
    /// cell.
    pub fn toggle_format(&mut self, key: FormatKey, value: Option<FormatValue>) {
        self.tracker.toggle(key, value);
        self.release_caret_cell();
    }

    // ========================================================================
    // Keyboard
    // ========================================================================

    /// Handle a key press. Returns whether the host may apply its default
    /// behavior.
    pub fn handle_key(&mut self, event: KeyEvent) -> Result<KeyOutcome> {
        let action = self.with_selected(|range| {
            self.keyboard.handle(self.engine.tree(), &self.engine.selection(), range, event)
        });
        for rewrite in action.rewrites {
            self.perform_rewrite(rewrite)?;
        }
        Ok(action.outcome)
    }

    fn perform_rewrite(&mut self, rewrite: KeyRewrite) -> Result<()> {
        tracing::trace!("Performing key rewrite {:?}", rewrite);
        match rewrite {
            KeyRewrite::RemoveLine { line } => {
                self.run(None, Box::new(RemoveLine::new(line)), EditSource::User)?;
                self.cell_selection.clear();
                self.hide_tooling();
                self.refresh_tooling();
            }
            KeyRewrite::SplitHeaderLine { at } => {
                let command = SplitLine::new(at).with_new_line_format(LineFormat::Plain);
                self.run(None, Box::new(command), EditSource::User)?;
            }
            KeyRewrite::ConvertToCellLine { line } => {
                let command = Box::new(SetLineFormat::new(line, LineFormat::Plain));
                let outcome = self.run(None, command, EditSource::User)?;
                if outcome.is_applied() {
                    if let Some(cell) = self.engine.tree().container_of(line) {
                        self.cell_selection.select_single(self.engine.tree(), cell);
                    }
                }
            }
            KeyRewrite::ClearCellSelection => self.cell_selection.clear(),
            KeyRewrite::ClearSelectedCells => {
                self.clear_selected_cells()?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Pointer and viewport
    // ========================================================================

    /// Pointer pressed on a cell: starts a range and puts the caret in it
    pub fn pointer_down(&mut self, cell: NodeId) -> bool {
        if !self.cell_selection.pointer_down(self.engine.tree(), cell) {
            return false;
        }
        let Some(target) = self.engine.tree().get_table_cell(cell) else {
            return false;
        };
        self.last_clicked_cell = Some(target.cell_id().clone());
        if let Some(&line) = target.blocks().first() {
            self.engine.set_selection(Selection::at_start_of(line), EditSource::User);
        }
        self.sync_session();
        true
    }

    /// Pointer dragged over a cell
    pub fn pointer_move(&mut self, cell: NodeId) -> bool {
        self.cell_selection.pointer_move(self.engine.tree(), cell)
    }

    /// Pointer released
    pub fn pointer_up(&mut self) {
        self.cell_selection.pointer_up();
    }

    /// Shift+click or shift+arrow: move the range focus to a cell
    pub fn extend_cell_selection(&mut self, cell: NodeId) -> bool {
        self.cell_selection.extend_to(self.engine.tree(), cell)
    }

    /// Click somewhere outside the table
    pub fn click_outside(&mut self) {
        self.cell_selection.clear();
        self.refresh_tooling();
    }

    /// The document scrolled: tooling hides and the cell range resets
    pub fn on_scroll(&mut self) {
        self.hide_tooling();
        self.cell_selection.clear();
    }

    /// The host viewport changed height
    pub fn viewport_resized(&mut self, height: f32, now_ms: u64) {
        self.advance_clock(now_ms);
        if self.viewport.record(height, now_ms) {
            tracing::trace!("Significant viewport change to {}", height);
        }
    }

    /// Tell the editor what time it is without running due work
    pub fn advance_clock(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    // ========================================================================
    // Deferred work
    // ========================================================================

    /// Run every deferred task due at `now_ms`. Tasks whose cells no longer
    /// exist are dropped.
    pub fn tick(&mut self, now_ms: u64) -> Result<Vec<EditOutcome>> {
        self.advance_clock(now_ms);
        let mut outcomes = Vec::new();
        for (handle, task) in self.scheduler.take_due(self.now_ms) {
            match task {
                DeferredTask::ReapplyFormats { table, cells, characters, paragraph } => {
                    let tree = self.engine.tree();
                    let live = tree.find_table_by_id(&table).is_some()
                        && cells.iter().any(|id| tree.find_cell_by_id(id).is_some());
                    if !live {
                        tracing::warn!("Format reapply target in table {} is gone", table);
                        continue;
                    }
                    let (characters, paragraph) = if self.tracker.session() == Some(&table) {
                        self.tracker.without_toggled_off(&characters, &paragraph)
                    } else {
                        (characters, paragraph)
                    };
                    if characters.is_empty() && paragraph.is_empty() {
                        continue;
                    }
                    let command = ApplyCellFormats::new(cells, characters, paragraph);
                    match self.run(None, Box::new(command), EditSource::Silent) {
                        Ok(outcome) => outcomes.push(outcome),
                        Err(e) => tracing::warn!("Format reapply failed: {}", e),
                    }
                }
                DeferredTask::CommitStructural { table, op } => {
                    if self.settings.touch_platform {
                        if let Some(due) = self.viewport.settles_at(self.now_ms) {
                            let task = DeferredTask::CommitStructural { table, op };
                            let key = Some(TaskKey::StructuralCommit);
                            let handle = self.scheduler.schedule(task, due, key);
                            outcomes.push(EditOutcome::Deferred(handle));
                            continue;
                        }
                    }
                    let cell_id = match &op {
                        DeferredStructuralOp::InsertRow { cell, .. } => cell,
                        DeferredStructuralOp::InsertColumn { cell, .. } => cell,
                    };
                    let tree = self.engine.tree();
                    let in_table = |cell: &NodeId| {
                        tree.cell_tag_for(*cell).map(|t| t.table_id == table).unwrap_or(false)
                    };
                    let resolved = tree
                        .find_cell_by_id(cell_id)
                        .filter(in_table)
                        .zip(tree.find_table_by_id(&table));
                    let Some((cell, table_node)) = resolved else {
                        tracing::warn!(
                            "Deferred structural insert {:?} abandoned: cell {} no longer exists",
                            handle,
                            cell_id
                        );
                        continue;
                    };
                    outcomes.push(self.commit_structural(table_node, &table, cell, &op)?);
                }
            }
        }
        Ok(outcomes)
    }

    // ========================================================================
    // History
    // ========================================================================

    pub fn undo(&mut self) -> Result<()> {
        self.engine.undo()?;
        self.sync_session();
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        self.engine.redo()?;
        self.sync_session();
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.engine.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.engine.can_redo()
    }
}

impl Default for TableEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TableEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableEditor")
            .field("engine", &self.engine)
            .field("cell_selection", &self.cell_selection)
            .field("tracker", &self.tracker)
            .field("scheduler", &self.scheduler)
            .field("now_ms", &self.now_ms)
            .finish()
    }
}
