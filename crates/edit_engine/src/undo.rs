//! Undo/redo manager with command batching

use crate::{Command, EditError, Result};
use std::time::{Duration, Instant};

/// Default maximum number of undo entries
pub const DEFAULT_UNDO_LIMIT: usize = 100;

/// Default window inside which consecutive typing is batched
pub const DEFAULT_BATCH_THRESHOLD: Duration = Duration::from_millis(500);

/// An entry in the undo stack
struct UndoEntry {
    /// The original command
    command: Box<dyn Command>,
    /// The inverse command (for undo)
    inverse: Box<dyn Command>,
    /// When this entry was created
    timestamp: Instant,
}

/// Manages undo and redo stacks
pub struct UndoManager {
    /// Stack of commands that can be undone
    undo_stack: Vec<UndoEntry>,
    /// Stack of commands that can be redone, each paired with the command
    /// it redoes
    redo_stack: Vec<(Box<dyn Command>, Box<dyn Command>)>,
    /// Maximum number of undo entries
    max_entries: usize,
    /// Time threshold for batching (commands within this time are merged)
    batch_threshold: Duration,
    /// Whether we're currently in an IME composition
    in_composition: bool,
    /// Silent edits, each with the undo depth it was made at
    silent_log: Vec<(usize, Box<dyn Command>)>,
}

impl UndoManager {
    /// Create a new undo manager
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_UNDO_LIMIT, DEFAULT_BATCH_THRESHOLD)
    }

    /// Create with custom limits
    pub fn with_limits(max_entries: usize, batch_threshold: Duration) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
            batch_threshold,
            in_composition: false,
            silent_log: Vec::new(),
        }
    }

    /// Record an executed command together with its inverse.
    ///
    /// A command that merges into the previous entry keeps that entry's
    /// inverse, so one undo returns to the state before the whole batch.
    pub fn push(&mut self, command: Box<dyn Command>, inverse: Box<dyn Command>) {
        self.redo_stack.clear();

        let now = Instant::now();
        if let Some(last) = self.undo_stack.last_mut() {
            if !self.in_composition && now.duration_since(last.timestamp) < self.batch_threshold {
                if let Some(merged) = last.command.merge_with(command.as_ref()) {
                    last.command = merged;
                    last.timestamp = now;
                    return;
                }
            }
        }

        self.push_entry(command, inverse, now);
    }

    /// Record a redone command. Leaves the redo stack alone and never merges.
    pub fn push_after_redo(&mut self, command: Box<dyn Command>, inverse: Box<dyn Command>) {
        self.push_entry(command, inverse, Instant::now());
    }

    fn push_entry(
        &mut self,
        command: Box<dyn Command>,
        inverse: Box<dyn Command>,
        timestamp: Instant,
    ) {
        self.undo_stack.push(UndoEntry {
            command,
            inverse,
            timestamp,
        });
        while self.undo_stack.len() > self.max_entries {
            self.undo_stack.remove(0);
            self.silent_log.retain(|(depth, _)| *depth > 1);
            for (depth, _) in self.silent_log.iter_mut() {
                *depth -= 1;
            }
        }
    }

    /// Remember a silent edit made on top of the current undo entry. Undoing
    /// that entry replays it.
    pub fn record_silent(&mut self, command: Box<dyn Command>) {
        let depth = self.undo_stack.len();
        if depth == 0 {
            return;
        }
        self.silent_log.push((depth, command));
        if self.silent_log.len() > self.max_entries {
            self.silent_log.remove(0);
        }
    }

    /// Take the silent edits made on top of the entry at `depth`, oldest
    /// first
    pub fn take_silent_at(&mut self, depth: usize) -> Vec<Box<dyn Command>> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.silent_log)
            .into_iter()
            .partition(|(at, _)| *at == depth);
        self.silent_log = kept;
        taken.into_iter().map(|(_, command)| command).collect()
    }

    /// Pop the last entry for undo. Returns the command that was run and
    /// its inverse; the caller applies the inverse and hands the result's
    /// inverse back through [`UndoManager::push_redo`].
    pub fn pop_undo(&mut self) -> Result<(Box<dyn Command>, Box<dyn Command>)> {
        let entry = self.undo_stack.pop().ok_or(EditError::UndoStackEmpty)?;
        Ok((entry.command, entry.inverse))
    }

    /// Make an undone command available for redo
    pub fn push_redo(&mut self, command: Box<dyn Command>, redo: Box<dyn Command>) {
        self.redo_stack.push((command, redo));
    }

    /// Pop a command for redo: the original command and the command that
    /// brings the document back to its post-edit state
    pub fn pop_redo(&mut self) -> Result<(Box<dyn Command>, Box<dyn Command>)> {
        self.redo_stack.pop().ok_or(EditError::RedoStackEmpty)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of undo entries
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Display name of the command the next undo reverts
    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.last().map(|entry| entry.command.display_name())
    }

    /// Start IME composition (disables batching)
    pub fn begin_composition(&mut self) {
        self.in_composition = true;
    }

    /// End IME composition
    pub fn end_composition(&mut self) {
        self.in_composition = false;
    }

    /// Check if in composition
    pub fn in_composition(&self) -> bool {
        self.in_composition
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.silent_log.clear();
    }
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UndoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoManager")
            .field("undo", &self.undo_stack.len())
            .field("redo", &self.redo_stack.len())
            .field("silent", &self.silent_log.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}
