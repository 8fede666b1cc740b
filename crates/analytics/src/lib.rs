//! # Crossview Analytics
//!
//! The calculation layer: joins, grouped aggregation, calendar bucketing,
//! correlation and rule-based insights over in-memory `Table` snapshots.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It performs no I/O and has
//!   no knowledge of where tables come from. It depends only on `core-types`.
//! - **Absence is explicit:** A missing column or an empty series yields an
//!   omitted metric (`Option`) or a documented zero, never a panic. Only
//!   structurally impossible requests (unknown group keys, malformed bucket
//!   definitions) are errors.
//! - **Stateless:** `JoinPlanner` and `InsightEngine` hold no state and the
//!   `TemporalBucketer` only its reference instant, so every component is safe
//!   to share across threads.
//!
//! ## Public API
//!
//! - `JoinPlanner`, `KeyPair`, `JoinKind`, `JoinOutcome`, `JoinResult`: key
//!   selection and hash joins with a fallback signal.
//! - `group_by`, `MetricSpec`, `Reducer`, `Buckets`, `percentile`,
//!   `value_counts`: the aggregator.
//! - `TemporalBucketer`, `Period`: timestamp parsing and calendar buckets.
//! - `pearson`, `pearson_aligned`, `ratio`, `safe_div`: correlation and
//!   zero-guarded ratios.
//! - `InsightEngine`, `Signal`, `Metric`: threshold rules to advisory text.

pub mod aggregate;
pub mod correlation;
pub mod error;
pub mod insights;
pub mod join;
pub mod numeric;
pub mod temporal;

pub use aggregate::{
    Buckets, GroupRow, Grouped, MetricSpec, Reducer, SummaryStats, bucket, count_keys, group_by,
    percentile, value_counts,
};
pub use correlation::{align_union, pearson, pearson_aligned, ratio, safe_div};
pub use error::AnalyticsError;
pub use insights::{InsightEngine, Metric, Signal};
pub use join::{JoinKind, JoinOutcome, JoinPlanner, JoinResult, KeyPair};
pub use numeric::{percent, round2, round_dp};
pub use temporal::{Period, TemporalBucketer, WEEKDAYS, parse_timestamp, trailing, weekday_name};
