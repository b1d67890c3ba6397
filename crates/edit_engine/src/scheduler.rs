//! Deferred work driven by a host clock
//!
//! Tasks are plain data. The host advances time with [`Scheduler::take_due`]
//! and executes whatever comes back, in the order the tasks were issued.
//! Every task names its cells by identifier and must re-resolve them before
//! acting.

use doc_model::{CellId, CharacterProperties, ParagraphProperties, TableId};
use serde::{Deserialize, Serialize};

/// Handle to a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskHandle(u64);

/// A structural insert waiting for the viewport to settle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeferredStructuralOp {
    InsertRow { cell: CellId, below: bool },
    InsertColumn { cell: CellId, right: bool },
}

/// Work to do later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeferredTask {
    /// Stamp captured formats onto cells created by a structural insert
    ReapplyFormats {
        table: TableId,
        cells: Vec<CellId>,
        characters: CharacterProperties,
        paragraph: ParagraphProperties,
    },
    /// Run a structural insert that was postponed
    CommitStructural { table: TableId, op: DeferredStructuralOp },
}

impl DeferredTask {
    /// Table the task works on
    pub fn table(&self) -> &TableId {
        match self {
            DeferredTask::ReapplyFormats { table, .. } => table,
            DeferredTask::CommitStructural { table, .. } => table,
        }
    }
}

/// Tasks with the same key supersede each other
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKey {
    StructuralCommit,
    /// Format reapplication for the cells created alongside this one
    FormatReapply(CellId),
}

#[derive(Debug, Clone)]
struct ScheduledTask {
    handle: TaskHandle,
    due_ms: u64,
    key: Option<TaskKey>,
    task: DeferredTask,
}

/// Cancellable queue of deferred tasks
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    next_handle: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task to run at `due_ms`. A pending task with the same key is
    /// dropped in favor of this one.
    pub fn schedule(
        &mut self,
        task: DeferredTask,
        due_ms: u64,
        key: Option<TaskKey>,
    ) -> TaskHandle {
        if let Some(key) = &key {
            let before = self.tasks.len();
            self.tasks.retain(|t| t.key.as_ref() != Some(key));
            if self.tasks.len() != before {
                tracing::debug!("Superseded pending task {:?}", key);
            }
        }
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        tracing::trace!("Scheduled task {} due at {}ms", handle.0, due_ms);
        self.tasks.push(ScheduledTask { handle, due_ms, key, task });
        handle
    }

    /// Cancel a task. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.handle != handle);
        self.tasks.len() != before
    }

    /// Cancel every task working on a table; returns how many were dropped
    pub fn cancel_for_table(&mut self, table: &TableId) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.task.table() != table);
        let dropped = before - self.tasks.len();
        if dropped > 0 {
            tracing::debug!("Cancelled {} tasks for table {}", dropped, table);
        }
        dropped
    }

    /// The user took over a cell: pending format reapplication leaves it
    /// alone. Tasks left without cells are dropped. Returns true if any
    /// task changed.
    pub fn release_cell(&mut self, cell: &CellId) -> bool {
        let mut changed = false;
        for scheduled in self.tasks.iter_mut() {
            if let DeferredTask::ReapplyFormats { cells, .. } = &mut scheduled.task {
                let before = cells.len();
                cells.retain(|id| id != cell);
                changed |= cells.len() != before;
            }
        }
        self.tasks.retain(|t| {
            !matches!(&t.task, DeferredTask::ReapplyFormats { cells, .. } if cells.is_empty())
        });
        if changed {
            tracing::debug!("Released cell {} from pending format reapply", cell);
        }
        changed
    }

    /// Remove and return every task due at `now_ms`, in issue order
    pub fn take_due(&mut self, now_ms: u64) -> Vec<(TaskHandle, DeferredTask)> {
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|t| t.due_ms <= now_ms);
        self.tasks = pending;
        due.into_iter().map(|t| (t.handle, t.task)).collect()
    }

    /// Whether a task is still waiting
    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.tasks.iter().any(|t| t.handle == handle)
    }

    /// Number of waiting tasks
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reapply(table: &str) -> DeferredTask {
        DeferredTask::ReapplyFormats {
            table: TableId::from_raw(table),
            cells: vec![CellId::from_raw("c1")],
            characters: CharacterProperties::bold(),
            paragraph: ParagraphProperties::default(),
        }
    }

    fn commit(cell: &str) -> DeferredTask {
        DeferredTask::CommitStructural {
            table: TableId::from_raw("t"),
            op: DeferredStructuralOp::InsertRow { cell: CellId::from_raw(cell), below: true },
        }
    }

    #[test]
    fn test_due_tasks_run_in_issue_order() {
        let mut scheduler = Scheduler::new();
        let late = scheduler.schedule(reapply("a"), 30, None);
        let early = scheduler.schedule(reapply("b"), 10, None);

        assert!(scheduler.take_due(5).is_empty());
        let due = scheduler.take_due(30);
        assert_eq!(due.iter().map(|(h, _)| *h).collect::<Vec<_>>(), vec![late, early]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_cancel() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(reapply("a"), 10, None);
        assert!(scheduler.is_pending(handle));
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));
        assert!(scheduler.take_due(100).is_empty());
    }

    #[test]
    fn test_same_key_supersedes() {
        let mut scheduler = Scheduler::new();
        let first = scheduler.schedule(commit("c1"), 10, Some(TaskKey::StructuralCommit));
        let second = scheduler.schedule(commit("c2"), 20, Some(TaskKey::StructuralCommit));
        scheduler.schedule(reapply("a"), 10, None);

        assert!(!scheduler.is_pending(first));
        assert!(scheduler.is_pending(second));
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn test_release_cell() {
        let mut scheduler = Scheduler::new();
        let task = DeferredTask::ReapplyFormats {
            table: TableId::from_raw("t"),
            cells: vec![CellId::from_raw("c1"), CellId::from_raw("c2")],
            characters: CharacterProperties::bold(),
            paragraph: ParagraphProperties::default(),
        };
        let key = TaskKey::FormatReapply(CellId::from_raw("c1"));
        let handle = scheduler.schedule(task, 10, Some(key));

        assert!(scheduler.release_cell(&CellId::from_raw("c1")));
        assert!(!scheduler.release_cell(&CellId::from_raw("c1")));
        assert!(scheduler.is_pending(handle));
        let due = scheduler.take_due(10);
        match &due[0].1 {
            DeferredTask::ReapplyFormats { cells, .. } => {
                assert_eq!(cells, &vec![CellId::from_raw("c2")])
            }
            other => panic!("unexpected task {:?}", other),
        }

        scheduler.schedule(reapply("t"), 10, None);
        assert!(scheduler.release_cell(&CellId::from_raw("c1")));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_cancel_for_table() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(reapply("a"), 10, None);
        scheduler.schedule(reapply("b"), 10, None);
        scheduler.schedule(reapply("a"), 20, None);

        assert_eq!(scheduler.cancel_for_table(&TableId::from_raw("a")), 2);
        assert_eq!(scheduler.pending(), 1);
    }
}
