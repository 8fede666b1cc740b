//! # Crossview Reports
//!
//! The named reports, cross-domain and single-store. Each report loads its
//! tables through a `TableLoader`, joins them with the planner, aggregates
//! and correlates, evaluates insights, and assembles a JSON mapping with `summary`,
//! `breakdown`, optional `insights` and `provenance` sections.
//!
//! ## Architectural Principles
//!
//! - **Layer 2 Composition:** This crate owns no calculation logic of its own;
//!   it composes `analytics` primitives over tables supplied by `datastore`.
//! - **Degrade, don't abort:** A relationship with no usable join keys switches
//!   the report to per-table summaries (`mode: separate_analysis`). Only a
//!   missing or corrupt source table, or a required column, fails a report.
//! - **Independent executions:** `AnalyticsOrchestrator::run` shares nothing
//!   mutable between calls, so reports may run concurrently on any threads.
//!
//! ## Public API
//!
//! - `AnalyticsOrchestrator`: runs a `ReportKind` with `ReportParams`.
//! - `ReportKind`: the catalogue of report names.
//! - `ReportError`: the single failure a report can return.

mod activity;
mod claims;
mod cross;
mod identity;
mod portfolio;
mod quality;

pub mod envelope;
pub mod error;
pub mod orchestrator;

pub use envelope::ReportBuilder;
pub use error::ReportError;
pub use orchestrator::{AnalyticsOrchestrator, ReportKind, ReportParams};
