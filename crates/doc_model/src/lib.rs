//! Document Model - Core document tree structure and types
//!
//! This crate provides the block tree the table editor works on: body lines,
//! text runs, and tables made of row groups, rows, cells and cell lines, all
//! keyed by stable node IDs.

mod node;
mod document;
mod paragraph;
mod run;
mod selection;
mod node_id;
mod tree;
mod table_ops;
mod error;
pub mod style;
pub mod table;

pub use node::*;
pub use document::*;
pub use paragraph::*;
pub use run::*;
pub use selection::*;
pub use node_id::*;
pub use tree::*;
pub use table_ops::*;
pub use error::*;
pub use style::*;
pub use table::*;
