use crate::error::AnalyticsError;
use core_types::{CoreError, KeyValue, Table, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Only rows with a match on both sides.
    Inner,
    /// Every left row; unmatched ones get nulls on the right side.
    Left,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
        }
    }
}

/// A candidate `(left column, right column)` pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyPair {
    pub left: String,
    pub right: String,
}

impl KeyPair {
    pub fn new(left: &str, right: &str) -> Self {
        Self {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    /// Builds the ordered candidate list from `(left, right)` literals.
    pub fn candidates(pairs: &[(&str, &str)]) -> Vec<KeyPair> {
        pairs.iter().map(|(l, r)| KeyPair::new(l, r)).collect()
    }
}

impl fmt::Display for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.left, self.right)
    }
}

/// Either a completed join or the signal that no candidate pair was usable.
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    Joined(JoinResult),
    Fallback { tried: Vec<KeyPair> },
}

impl JoinOutcome {
    pub fn joined(&self) -> Option<&JoinResult> {
        match self {
            JoinOutcome::Joined(result) => Some(result),
            JoinOutcome::Fallback { .. } => None,
        }
    }

    pub fn into_joined(self) -> Option<JoinResult> {
        match self {
            JoinOutcome::Joined(result) => Some(result),
            JoinOutcome::Fallback { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, JoinOutcome::Fallback { .. })
    }
}

/// The joined table plus what was needed to produce it.
#[derive(Debug, Clone)]
pub struct JoinResult {
    table: Table,
    keys: KeyPair,
    kind: JoinKind,
    matched: Vec<bool>,
    left_rows: Vec<usize>,
    right_columns: Vec<(String, String)>,
    right_key_column: String,
}

impl JoinResult {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    /// One flag per output row: whether it carries a right-side match.
    pub fn matched(&self) -> &[bool] {
        &self.matched
    }

    pub fn matched_rows(&self) -> usize {
        self.matched.iter().filter(|m| **m).count()
    }

    /// Output name of the right key column; non-null exactly on matched rows.
    pub fn right_key_column(&self) -> &str {
        &self.right_key_column
    }

    /// Output name of a right-side column, which differs from `original`
    /// when it collided with a left column.
    pub fn right_column(&self, original: &str) -> Option<&str> {
        self.right_columns
            .iter()
            .find(|(from, _)| from == original)
            .map(|(_, to)| to.as_str())
    }

    /// Left input rows that found at least one match.
    pub fn matched_left_rows(&self) -> usize {
        let mut rows: Vec<usize> = self
            .left_rows
            .iter()
            .zip(&self.matched)
            .filter(|(_, matched)| **matched)
            .map(|(row, _)| *row)
            .collect();
        rows.dedup();
        rows.len()
    }

    /// Distinct left-key values that found at least one match.
    pub fn matched_left_keys(&self) -> usize {
        let Some(i) = self.table.column_index(&self.keys.left) else {
            return 0;
        };
        let mut keys: Vec<KeyValue> = self
            .table
            .rows()
            .zip(&self.matched)
            .filter(|(_, matched)| **matched)
            .filter_map(|(row, _)| row.values()[i].key())
            .collect();
        keys.sort();
        keys.dedup();
        keys.len()
    }

    /// Only the rows that found a match.
    pub fn matched_table(&self) -> Table {
        let indices: Vec<usize> = self
            .matched
            .iter()
            .enumerate()
            .filter(|(_, m)| **m)
            .map(|(i, _)| i)
            .collect();
        self.table.take(&indices)
    }
}

/// Selects a key pair and performs hash joins.
///
/// The planner holds no state; every call is independent.
#[derive(Debug, Default, Clone, Copy)]
pub struct JoinPlanner;

impl JoinPlanner {
    pub fn new() -> Self {
        Self
    }

    /// The first candidate whose columns exist on both tables.
    pub fn select<'c>(&self, left: &Table, right: &Table, candidates: &'c [KeyPair]) -> Option<&'c KeyPair> {
        candidates
            .iter()
            .find(|pair| left.has_column(&pair.left) && right.has_column(&pair.right))
    }

    /// Joins on the first usable candidate, or signals `Fallback`.
    ///
    /// An error here means the inputs were inconsistent, never that a key
    /// pair was missing.
    pub fn join(
        &self,
        left: &Table,
        right: &Table,
        candidates: &[KeyPair],
        how: JoinKind,
    ) -> Result<JoinOutcome, AnalyticsError> {
        let Some(keys) = self.select(left, right, candidates) else {
            debug!(
                left = left.name(),
                right = right.name(),
                tried = candidates.len(),
                "No usable join key pair"
            );
            return Ok(JoinOutcome::Fallback {
                tried: candidates.to_vec(),
            });
        };
        debug!(left = left.name(), right = right.name(), keys = %keys, how = how.as_str(), "Join key selected");
        Ok(JoinOutcome::Joined(hash_join(left, right, keys, how)?))
    }
}

/// Right-side output names, suffixing any that collide with a left column.
fn right_output_names(left: &Table, right: &Table) -> Vec<String> {
    let mut taken: Vec<String> = left.columns().to_vec();
    right
        .columns()
        .iter()
        .map(|column| {
            let mut name = column.clone();
            if taken.contains(&name) {
                name = format!("{column}_{}", right.name());
                let mut n = 2;
                while taken.contains(&name) {
                    name = format!("{column}_{}_{n}", right.name());
                    n += 1;
                }
            }
            taken.push(name.clone());
            name
        })
        .collect()
}

fn key_index(table: &Table, column: usize) -> HashMap<KeyValue, Vec<usize>> {
    let mut index: HashMap<KeyValue, Vec<usize>> = HashMap::new();
    for (i, row) in table.rows().enumerate() {
        if let Some(key) = row.values()[column].key() {
            index.entry(key).or_default().push(i);
        }
    }
    index
}

fn hash_join(left: &Table, right: &Table, keys: &KeyPair, how: JoinKind) -> Result<JoinResult, AnalyticsError> {
    let right_names = right_output_names(left, right);
    let right_columns: Vec<(String, String)> = right
        .columns()
        .iter()
        .cloned()
        .zip(right_names.iter().cloned())
        .collect();
    let right_key_column = right_columns
        .iter()
        .find(|(from, _)| *from == keys.right)
        .map(|(_, to)| to.clone())
        .unwrap_or_else(|| keys.right.clone());

    let lk = left.column_index(&keys.left).ok_or_else(|| CoreError::ColumnNotFound {
        table: left.name().to_string(),
        column: keys.left.clone(),
    })?;
    let rk = right.column_index(&keys.right).ok_or_else(|| CoreError::ColumnNotFound {
        table: right.name().to_string(),
        column: keys.right.clone(),
    })?;

    // matches[l] holds the right rows for left row l, in right order.
    let mut matches: Vec<Vec<usize>> = vec![Vec::new(); left.len()];
    if right.len() <= left.len() {
        let index = key_index(right, rk);
        for (l, row) in left.rows().enumerate() {
            if let Some(bucket) = row.values()[lk].key().and_then(|k| index.get(&k)) {
                matches[l].extend_from_slice(bucket);
            }
        }
    } else {
        let index = key_index(left, lk);
        for (r, row) in right.rows().enumerate() {
            if let Some(bucket) = row.values()[rk].key().and_then(|k| index.get(&k)) {
                for &l in bucket {
                    matches[l].push(r);
                }
            }
        }
    }

    let mut columns = left.columns().to_vec();
    columns.extend(right_names);
    let mut rows = Vec::new();
    let mut matched = Vec::new();
    let mut left_rows = Vec::new();
    let nulls = vec![Value::Null; right.columns().len()];

    for (l, row) in left.rows().enumerate() {
        if matches[l].is_empty() {
            if how == JoinKind::Left {
                let mut out = row.values().to_vec();
                out.extend(nulls.iter().cloned());
                rows.push(out);
                matched.push(false);
                left_rows.push(l);
            }
            continue;
        }
        for &r in &matches[l] {
            let Some(other) = right.row(r) else { continue };
            let mut out = row.values().to_vec();
            out.extend_from_slice(other.values());
            rows.push(out);
            matched.push(true);
            left_rows.push(l);
        }
    }

    Ok(JoinResult {
        table: Table::from_rows(left.name(), columns, rows)?,
        keys: keys.clone(),
        kind: how,
        matched,
        left_rows,
        right_columns,
        right_key_column,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policies() -> Table {
        Table::from_records(
            "policies",
            vec![
                vec![("id", Value::from(1)), ("policy_number", Value::from("P-1")), ("premium", Value::from(100.0))],
                vec![("id", Value::from(2)), ("policy_number", Value::from("P-2")), ("premium", Value::from(80.0))],
                vec![("id", Value::from(3)), ("policy_number", Value::from("P-3")), ("premium", Value::from(60.0))],
            ],
        )
    }

    fn claims() -> Table {
        Table::from_records(
            "reclamos",
            vec![
                vec![("policy_number", Value::from("P-1")), ("monto", Value::from(500.0))],
                vec![("policy_number", Value::from("P-1")), ("monto", Value::from(250.0))],
                vec![("policy_number", Value::from("P-3")), ("monto", Value::from(10.0))],
                vec![("policy_number", Value::Null), ("monto", Value::from(1.0))],
            ],
        )
    }

    #[test]
    fn identity_join_on_a_unique_column_keeps_every_row() {
        let table = policies();
        let outcome = JoinPlanner::new()
            .join(&table, &table, &KeyPair::candidates(&[("id", "id")]), JoinKind::Inner)
            .expect("widths agree");
        let result = outcome.into_joined().expect("id exists on both sides");
        assert_eq!(result.table().len(), table.len());
        assert_eq!(result.right_key_column(), "id_policies");
        assert_eq!(result.table().numeric("premium_policies"), table.numeric("premium"));
    }

    #[test]
    fn later_candidate_is_used_when_the_first_is_absent() {
        let candidates = KeyPair::candidates(&[("policy_id", "id"), ("policy_number", "policy_number")]);
        let outcome = JoinPlanner::new()
            .join(&claims(), &policies(), &candidates, JoinKind::Inner)
            .expect("widths agree");

        assert!(!outcome.is_fallback());
        let result = outcome.into_joined().expect("second pair matches");
        assert_eq!(result.keys(), &KeyPair::new("policy_number", "policy_number"));
        assert_eq!(result.table().len(), 3);
    }

    #[test]
    fn left_join_fans_out_and_keeps_unmatched_rows() {
        let outcome = JoinPlanner::new().join(
            &policies(),
            &claims(),
            &KeyPair::candidates(&[("policy_number", "policy_number")]),
            JoinKind::Left,
        )
        .expect("widths agree");
        let result = outcome.into_joined().expect("joinable");
        let table = result.table();

        assert_eq!(table.len(), 4);
        assert_eq!(result.matched(), &[true, true, false, true]);
        assert_eq!(result.matched_left_keys(), 2);
        assert_eq!(result.matched_left_rows(), 2);
        assert_eq!(result.right_column("policy_number"), Some("policy_number_reclamos"));
        assert_eq!(result.right_column("monto"), Some("monto"));
        assert_eq!(table.non_null_count(result.right_key_column()), 3);
        assert_eq!(table.numeric("monto"), Some(vec![500.0, 250.0, 10.0]));
        assert_eq!(table.name(), "policies");
    }

    #[test]
    fn left_join_never_loses_left_rows() {
        let planner = JoinPlanner::new();
        let candidates = KeyPair::candidates(&[("policy_number", "policy_number")]);
        for (left, right) in [(policies(), claims()), (claims(), policies())] {
            let result = planner
                .join(&left, &right, &candidates, JoinKind::Left)
                .ok()
                .and_then(JoinOutcome::into_joined)
                .expect("joinable");
            assert!(result.table().len() >= left.len());
        }
    }

    #[test]
    fn row_order_follows_the_left_side_whichever_side_is_indexed() {
        // Left is smaller here, so the left side is the one indexed.
        let left = Table::from_records(
            "agents",
            vec![vec![("code", Value::from("B"))], vec![("code", Value::from("A"))]],
        );
        let right = Table::from_records(
            "policies",
            vec![
                vec![("agent_id", Value::from("A")), ("n", Value::from(1))],
                vec![("agent_id", Value::from("B")), ("n", Value::from(2))],
                vec![("agent_id", Value::from("A")), ("n", Value::from(3))],
            ],
        );
        let result = JoinPlanner::new()
            .join(&left, &right, &KeyPair::candidates(&[("code", "agent_id")]), JoinKind::Inner)
            .ok()
            .and_then(JoinOutcome::into_joined)
            .expect("joinable");
        assert_eq!(result.table().numeric("n"), Some(vec![2.0, 1.0, 3.0]));
    }

    #[test]
    fn missing_keys_signal_fallback() {
        let candidates = KeyPair::candidates(&[("policy_id", "id")]);
        match JoinPlanner::new().join(&claims(), &policies(), &candidates, JoinKind::Left) {
            Err(e) => panic!("join failed: {e}"),
            Ok(JoinOutcome::Joined(_)) => panic!("no pair should have been usable"),
            Ok(JoinOutcome::Fallback { tried }) => assert_eq!(tried, candidates),
        }
    }

    #[test]
    fn joined_rows_carry_both_sides_at_full_width() {
        let left = policies();
        let right = claims();
        let result = JoinPlanner::new()
            .join(&left, &right, &KeyPair::candidates(&[("policy_number", "policy_number")]), JoinKind::Left)
            .expect("widths agree")
            .into_joined()
            .expect("joinable");
        let width = left.columns().len() + right.columns().len();
        assert_eq!(result.table().columns().len(), width);
        assert!(result.table().rows().all(|row| row.values().len() == width));
        assert_eq!(result.matched().len(), result.table().len());
    }

    #[test]
    fn null_keys_never_match() {
        let left = Table::from_records("l", vec![vec![("k", Value::Null)]]);
        let right = Table::from_records("r", vec![vec![("k", Value::Null)]]);
        let result = JoinPlanner::new()
            .join(&left, &right, &KeyPair::candidates(&[("k", "k")]), JoinKind::Left)
            .ok()
            .and_then(JoinOutcome::into_joined)
            .expect("columns exist");
        assert_eq!(result.matched(), &[false]);
    }
}
