//! Edit sources and change notifications

use serde::{Deserialize, Serialize};

/// Who caused an edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditSource {
    /// Direct user input
    User,
    /// A programmatic edit made on the user's behalf
    Api,
    /// Housekeeping that must not look like an edit: no history entry and no
    /// selection notifications
    Silent,
}

impl EditSource {
    /// Whether edits from this source are recorded in undo history
    pub fn records_history(self) -> bool {
        !matches!(self, Self::Silent)
    }
}

/// Notifications delivered to subscribers in the order edits happen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditorEvent {
    ContentChanged { source: EditSource },
    SelectionChanged { source: EditSource },
}

/// Handle returned by [`crate::EditingEngine::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// A subscriber callback
pub type EventListener = Box<dyn FnMut(&EditorEvent) + Send>;
