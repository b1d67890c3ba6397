//! Edit Engine - Commands, undo/redo, and the table editing session
//!
//! Every edit is a [`Command`] run by the [`EditingEngine`], which keeps
//! history and notifies listeners. [`TableEditor`] layers table behavior on
//! top: cell-range selection, keyboard rules, active-format tracking and
//! deferred work driven by a host clock.

mod command;
mod executor;
mod undo;
mod error;
mod events;
mod table_commands;
mod cell_selection;
mod keyboard;
mod format_tracker;
mod scheduler;
mod viewport;
mod settings;
mod hooks;
mod editor;

pub use command::*;
pub use executor::*;
pub use undo::*;
pub use error::*;
pub use events::*;
pub use table_commands::*;
pub use cell_selection::*;
pub use keyboard::*;
pub use format_tracker::*;
pub use scheduler::*;
pub use viewport::*;
pub use settings::*;
pub use hooks::*;
pub use editor::*;
