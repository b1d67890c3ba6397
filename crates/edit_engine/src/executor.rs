//! Command execution engine
//!
//! Every edit goes through [`EditingEngine::execute`] as one atomic step with
//! a declared [`EditSource`]. User edits are followed, inside the same step,
//! by removal of tables left without header and body rows.
//!
//! Silent edits stay out of history, but undoing the entry they were made on
//! top of replays them, so deferred work is not lost to an older inverse.

use crate::{
    relocate_selection, Command, EditSource, EditorEvent, EventListener, RestoreSnapshot, Result,
    SubscriptionId, UndoManager,
};
use doc_model::{DocumentTree, Selection, TableId};
use std::time::Duration;

/// The main editing engine that manages document state and command execution
pub struct EditingEngine {
    /// Current document tree
    tree: DocumentTree,
    /// Current selection
    selection: Selection,
    /// Undo manager
    undo_manager: UndoManager,
    listeners: Vec<(SubscriptionId, EventListener)>,
    next_subscription: u64,
    /// Tables removed by pruning since the last call to `take_pruned_tables`
    pruned: Vec<TableId>,
    /// Bumped on every change to the document
    revision: u64,
}

impl EditingEngine {
    /// Create a new editing engine with a single empty line
    pub fn new() -> Self {
        Self::with_tree(DocumentTree::with_empty_paragraph())
    }

    /// Create an editing engine with a specific document tree
    pub fn with_tree(mut tree: DocumentTree) -> Self {
        let selection = match tree.ensure_body_line() {
            Ok(line) => Selection::at_start_of(line),
            Err(_) => Selection::at_start_of(tree.root_id()),
        };

        Self {
            tree,
            selection,
            undo_manager: UndoManager::new(),
            listeners: Vec::new(),
            next_subscription: 0,
            pruned: Vec::new(),
            revision: 0,
        }
    }

    /// Replace the undo manager's limits
    pub fn with_undo_limits(mut self, max_entries: usize, batch_threshold: Duration) -> Self {
        self.undo_manager = UndoManager::with_limits(max_entries, batch_threshold);
        self
    }

    /// Get the current document tree
    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    /// Get the current selection
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Counter that changes whenever the document does
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Total number of linear positions in the document
    pub fn content_length(&self) -> usize {
        self.tree.content_length()
    }

    /// Set the selection. Silent changes are not announced.
    pub fn set_selection(&mut self, selection: Selection, source: EditSource) {
        self.selection = selection;
        if source != EditSource::Silent {
            self.emit(EditorEvent::SelectionChanged { source });
        }
    }

    /// Execute a command as one atomic edit
    pub fn execute(&mut self, command: Box<dyn Command>, source: EditSource) -> Result<()> {
        let result = command.apply(&self.tree, &self.selection)?;
        let mut tree = result.tree;
        let mut selection = result.selection;
        let mut inverse = result.inverse;

        if source == EditSource::User {
            let before_prune = tree.clone();
            let removed = tree.prune_empty_tables()?;
            if !removed.is_empty() {
                for table_id in &removed {
                    tracing::debug!("Pruned empty table {}", table_id);
                }
                selection = relocate_selection(&before_prune, &tree, &selection);
                inverse = Box::new(RestoreSnapshot::new(self.tree.clone(), self.selection));
                self.pruned.extend(removed);
            }
        }

        tracing::trace!("Executed {} ({:?})", command.display_name(), source);

        if source.records_history() {
            self.undo_manager.push(command, inverse);
        } else {
            self.undo_manager.record_silent(command);
        }
        self.tree = tree;
        self.selection = selection;
        self.revision += 1;

        self.emit(EditorEvent::ContentChanged { source });
        if source != EditSource::Silent {
            self.emit(EditorEvent::SelectionChanged { source });
        }
        Ok(())
    }

    /// Undo the last command. Silent edits made on top of it are replayed
    /// onto the restored document; ones that no longer apply are dropped.
    pub fn undo(&mut self) -> Result<()> {
        let depth = self.undo_manager.undo_depth();
        let (command, inverse) = self.undo_manager.pop_undo()?;
        let result = inverse.apply(&self.tree, &self.selection)?;
        self.undo_manager.push_redo(command, result.inverse);

        let mut tree = result.tree;
        for silent in self.undo_manager.take_silent_at(depth) {
            match silent.apply(&tree, &result.selection) {
                Ok(replayed) => tree = replayed.tree,
                Err(e) => {
                    tracing::debug!("Dropped silent {} on undo: {}", silent.display_name(), e)
                }
            }
        }

        self.tree = tree;
        self.selection = result.selection;
        self.revision += 1;
        self.emit_user_change();
        Ok(())
    }

    /// Redo the last undone command
    pub fn redo(&mut self) -> Result<()> {
        let (command, redo) = self.undo_manager.pop_redo()?;
        let result = redo.apply(&self.tree, &self.selection)?;
        self.undo_manager.push_after_redo(command, result.inverse);

        self.tree = result.tree;
        self.selection = result.selection;
        self.revision += 1;
        self.emit_user_change();
        Ok(())
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.undo_manager.can_undo()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        self.undo_manager.can_redo()
    }

    /// Access the undo manager
    pub fn undo_manager(&self) -> &UndoManager {
        &self.undo_manager
    }

    /// Mutable access to the undo manager
    pub fn undo_manager_mut(&mut self) -> &mut UndoManager {
        &mut self.undo_manager
    }

    /// Tables pruned since the last call
    pub fn take_pruned_tables(&mut self) -> Vec<TableId> {
        std::mem::take(&mut self.pruned)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Register a listener for content and selection changes
    pub fn subscribe(&mut self, listener: EventListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: EditorEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    fn emit_user_change(&mut self) {
        self.emit(EditorEvent::ContentChanged { source: EditSource::User });
        self.emit(EditorEvent::SelectionChanged { source: EditSource::User });
    }
}

impl Default for EditingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EditingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditingEngine")
            .field("selection", &self.selection)
            .field("undo_manager", &self.undo_manager)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FormatText, InsertText};
    use doc_model::{CharacterProperties, Node, NodeId, Position, TableSpec};
    use std::sync::{Arc, Mutex};

    fn body_line(engine: &EditingEngine) -> NodeId {
        engine.tree().blocks_in_order()[0]
    }

    fn recorder(engine: &mut EditingEngine) -> Arc<Mutex<Vec<EditorEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        engine.subscribe(Box::new(move |event| sink.lock().unwrap().push(*event)));
        events
    }

    #[test]
    fn test_execute_and_undo() {
        let mut engine = EditingEngine::new();
        let para = body_line(&engine);
        engine
            .execute(Box::new(InsertText::new(Position::start_of(para), "Hello")), EditSource::User)
            .unwrap();
        assert_eq!(engine.tree().paragraph_text(para), "Hello");

        engine.undo().unwrap();
        assert_eq!(engine.tree().paragraph_text(para), "");
        assert!(engine.can_redo());

        engine.redo().unwrap();
        assert_eq!(engine.tree().paragraph_text(para), "Hello");
        assert!(engine.can_undo());
    }

    #[test]
    fn test_silent_edits_skip_history_and_selection_events() {
        let mut engine = EditingEngine::new();
        let events = recorder(&mut engine);
        let para = body_line(&engine);

        let format = FormatText::whole_line(engine.tree(), para, CharacterProperties::bold());
        engine.execute(Box::new(format), EditSource::Silent).unwrap();

        assert!(!engine.can_undo());
        assert_eq!(
            *events.lock().unwrap(),
            vec![EditorEvent::ContentChanged { source: EditSource::Silent }]
        );
    }

    #[test]
    fn test_events_arrive_in_order() {
        let mut engine = EditingEngine::new();
        let events = recorder(&mut engine);
        let para = body_line(&engine);

        engine
            .execute(Box::new(InsertText::new(Position::start_of(para), "x")), EditSource::Api)
            .unwrap();
        engine.set_selection(Selection::at_start_of(para), EditSource::User);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                EditorEvent::ContentChanged { source: EditSource::Api },
                EditorEvent::SelectionChanged { source: EditSource::Api },
                EditorEvent::SelectionChanged { source: EditSource::User },
            ]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let mut engine = EditingEngine::new();
        let events = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&events);
        let id = engine.subscribe(Box::new(move |_| *sink.lock().unwrap() += 1));
        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));

        engine.set_selection(engine.selection(), EditSource::User);
        assert_eq!(*events.lock().unwrap(), 0);
    }

    #[test]
    fn test_undo_keeps_silent_edits_made_after_it() {
        let tree = DocumentTree::from_lines(&["abc", "def"]).unwrap();
        let (first, second) = (tree.blocks_in_order()[0], tree.blocks_in_order()[1]);
        let mut engine = EditingEngine::with_tree(tree);
        let start = engine.revision();

        engine
            .execute(Box::new(InsertText::new(Position::new(first, 3), "!")), EditSource::User)
            .unwrap();
        engine
            .execute(Box::new(InsertText::new(Position::new(second, 1), "\n")), EditSource::User)
            .unwrap();
        let bold = FormatText::whole_line(engine.tree(), first, CharacterProperties::bold());
        engine.execute(Box::new(bold), EditSource::Silent).unwrap();
        assert_eq!(engine.revision(), start + 3);

        engine.undo().unwrap();
        assert_eq!(engine.tree().text_content(), "abc!\ndef\n");
        assert_eq!(engine.tree().character_format_at(&Position::new(first, 2)).bold, Some(true));

        engine.undo().unwrap();
        assert_eq!(engine.tree().paragraph_text(first), "abc");
        assert_eq!(engine.revision(), start + 5);
    }

    fn tree_with_rowless_table() -> DocumentTree {
        let mut tree = DocumentTree::with_empty_paragraph();
        let line = tree.document.children()[0];
        let table = tree.insert_table(&TableSpec::new(1, 1), &Position::start_of(line)).unwrap();
        let row = tree.table_rows_in_order(table)[0];
        tree.delete_row(row).unwrap();
        tree
    }

    #[test]
    fn test_user_edits_prune_empty_tables() {
        let mut engine = EditingEngine::with_tree(tree_with_rowless_table());
        assert_eq!(engine.tree().tables().count(), 1);
        let para = body_line(&engine);

        engine
            .execute(Box::new(InsertText::new(Position::start_of(para), "a")), EditSource::User)
            .unwrap();
        assert_eq!(engine.tree().tables().count(), 0);
        assert_eq!(engine.take_pruned_tables().len(), 1);
        assert!(engine.take_pruned_tables().is_empty());

        // Undo restores the table together with the text
        engine.undo().unwrap();
        assert_eq!(engine.tree().tables().count(), 1);
    }

    #[test]
    fn test_silent_edits_do_not_prune() {
        let mut engine = EditingEngine::with_tree(tree_with_rowless_table());
        let para = body_line(&engine);
        engine
            .execute(Box::new(InsertText::new(Position::start_of(para), "a")), EditSource::Silent)
            .unwrap();
        assert_eq!(engine.tree().tables().count(), 1);
    }
}
