//! # Crossview Datastore Crate
//!
//! This crate is the only place that knows where table snapshots come from.
//! Everything above it asks a `TableLoader` for `(system, table)` and gets an
//! in-memory `Table` back.
//!
//! ## Architectural Principles
//!
//! - **Layer 2 Adapter:** Encapsulates file layout and CSV parsing behind the
//!   `TableLoader` trait so reports never touch paths or bytes.
//! - **Structural failures only:** A missing dataset is `NotFound`, bytes that
//!   cannot become rows and columns are `MalformedData`. Sparse data is not an
//!   error at this layer.
//! - **Thread-safe:** Loaders are `Send + Sync` and may be shared by every
//!   report running concurrently.
//!
//! ## Public API
//!
//! - `TableLoader`: The capability consumed by the reports.
//! - `CsvTableLoader`: Reads the configured CSV export layout from disk.
//! - `MemoryTableLoader`: Serves pre-built tables (tests, embedding).
//! - `profile_table`: Row, null and duplicate statistics for one table.
//! - `LoaderError`: The specific error types that can be returned from this crate.

pub mod csv_loader;
pub mod error;
pub mod loader;
pub mod profile;

pub use csv_loader::{CsvTableLoader, SourceStatus, read_csv};
pub use error::LoaderError;
pub use loader::{MemoryTableLoader, TableLoader};
pub use profile::{ColumnProfile, TableProfile, profile_table};
