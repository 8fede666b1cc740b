//! # Crossview Core Types
//!
//! The vocabulary shared by every other crate in the workspace: scalar cell
//! values, join/group keys, and the request-scoped `Table` snapshot.
//!
//! A `Table` never promises a schema. Callers ask `has_column` before they
//! read a column, and absence is an ordinary answer rather than a failure.

pub mod enums;
pub mod error;
pub mod table;
pub mod value;

// Re-export the core types to provide a clean public API.
pub use enums::DataSystem;
pub use error::CoreError;
pub use table::{RowView, Table};
pub use value::{KeyValue, Value};
