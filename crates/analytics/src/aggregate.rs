use crate::error::AnalyticsError;
use crate::numeric::round_dp;
use core_types::{CoreError, KeyValue, Table, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

/// How a group's values for one column collapse into a single figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Number of non-null values.
    Count,
    Sum,
    Mean,
    Median,
    /// Sample standard deviation (n - 1).
    Std,
    Min,
    Max,
    /// Number of distinct non-null values.
    Distinct,
    /// First non-null value in row order.
    First,
}

impl Reducer {
    pub fn suffix(&self) -> &'static str {
        match self {
            Reducer::Count => "count",
            Reducer::Sum => "sum",
            Reducer::Mean => "mean",
            Reducer::Median => "median",
            Reducer::Std => "std",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::Distinct => "distinct",
            Reducer::First => "first",
        }
    }
}

/// One requested output field: a column and the reducer applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub column: String,
    pub reducer: Reducer,
    pub alias: Option<String>,
}

impl MetricSpec {
    pub fn new(column: &str, reducer: Reducer) -> Self {
        Self {
            column: column.to_string(),
            reducer,
            alias: None,
        }
    }

    pub fn alias(mut self, name: &str) -> Self {
        self.alias = Some(name.to_string());
        self
    }

    /// `<column>_<reducer>` unless an alias was given.
    pub fn output_name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.column, self.reducer.suffix()))
    }
}

pub type GroupKey = Vec<KeyValue>;

/// Row indices of a table partitioned by the values of one or more key columns.
///
/// Rows with a null in any key column belong to no group.
#[derive(Debug)]
pub struct Grouped<'a> {
    table: &'a Table,
    keys: Vec<String>,
    groups: BTreeMap<GroupKey, Vec<usize>>,
}

/// Partitions `table` by `keys`.
///
/// Every key column must exist; callers guard with `has_column` first.
pub fn group_by<'a>(table: &'a Table, keys: &[&str]) -> Result<Grouped<'a>, AnalyticsError> {
    let mut indices = Vec::with_capacity(keys.len());
    for key in keys {
        let i = table.column_index(key).ok_or_else(|| CoreError::ColumnNotFound {
            table: table.name().to_string(),
            column: key.to_string(),
        })?;
        indices.push(i);
    }

    let mut groups: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
    for (row_idx, row) in table.rows().enumerate() {
        let values = row.values();
        let key: Option<GroupKey> = indices.iter().map(|&i| values[i].key()).collect();
        if let Some(key) = key {
            groups.entry(key).or_default().push(row_idx);
        }
    }

    Ok(Grouped {
        table,
        keys: keys.iter().map(|k| k.to_string()).collect(),
        groups,
    })
}

impl<'a> Grouped<'a> {
    pub fn table(&self) -> &'a Table {
        self.table
    }

    pub fn key_columns(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups in ascending key order with the row indices of each.
    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &[usize])> {
        self.groups.iter().map(|(k, rows)| (k, rows.as_slice()))
    }

    /// Row count per group.
    pub fn sizes(&self) -> Vec<(GroupKey, usize)> {
        self.groups.iter().map(|(k, rows)| (k.clone(), rows.len())).collect()
    }

    /// One `GroupRow` per group holding every computable metric.
    ///
    /// A spec whose column does not exist contributes nothing to any group,
    /// and a reducer that is undefined for a group (e.g. the mean of no
    /// values) is left out of that group only.
    pub fn aggregate(&self, specs: &[MetricSpec]) -> Vec<GroupRow> {
        let present: Vec<(&MetricSpec, usize)> = specs
            .iter()
            .filter_map(|spec| self.table.column_index(&spec.column).map(|i| (spec, i)))
            .collect();

        self.groups
            .iter()
            .map(|(key, rows)| {
                let mut metrics = BTreeMap::new();
                for (spec, col) in &present {
                    let values: Vec<&Value> = rows
                        .iter()
                        .filter_map(|&r| self.table.row(r))
                        .map(|row| &row.values()[*col])
                        .collect();
                    if let Some(value) = reduce(&values, spec.reducer) {
                        metrics.insert(spec.output_name(), value);
                    }
                }
                GroupRow {
                    key: key.clone(),
                    size: rows.len(),
                    metrics,
                }
            })
            .collect()
    }
}

/// The reduced metrics of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub key: GroupKey,
    /// Number of rows in the group, nulls included.
    pub size: usize,
    pub metrics: BTreeMap<String, Value>,
}

impl GroupRow {
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(Value::as_f64)
    }

    /// The group key rendered for display; composite keys are joined with " | ".
    pub fn label(&self) -> String {
        self.key
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Metrics as a JSON object with floats rounded to `dp` places.
    pub fn metrics_json(&self, dp: u32) -> serde_json::Map<String, serde_json::Value> {
        self.metrics
            .iter()
            .map(|(name, value)| {
                let json = match value {
                    Value::Float(f) => Value::Float(round_dp(*f, dp)).to_json(),
                    other => other.to_json(),
                };
                (name.clone(), json)
            })
            .collect()
    }
}

/// Collapses a column slice with `reducer`; `None` when undefined.
pub fn reduce(values: &[&Value], reducer: Reducer) -> Option<Value> {
    let numbers = || values.iter().filter_map(|v| v.as_f64()).collect::<Vec<f64>>();
    match reducer {
        Reducer::Count => Some(Value::from(values.iter().filter(|v| !v.is_null()).count())),
        Reducer::Distinct => {
            let distinct: HashSet<KeyValue> = values.iter().filter_map(|v| v.key()).collect();
            Some(Value::from(distinct.len()))
        }
        Reducer::Sum => Some(Value::Float(sum(&numbers()))),
        Reducer::Mean => mean(&numbers()).map(Value::Float),
        Reducer::Median => median(&numbers()).map(Value::Float),
        Reducer::Std => std_dev(&numbers()).map(Value::Float),
        Reducer::Min => min(&numbers()).map(Value::Float),
        Reducer::Max => max(&numbers()).map(Value::Float),
        Reducer::First => values.iter().find(|v| !v.is_null()).map(|v| (*v).clone()),
    }
}

pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(sum(values) / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Sample standard deviation; needs at least two values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().min_by(|a, b| a.total_cmp(b))
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().max_by(|a, b| a.total_cmp(b))
}

/// The `p`-th percentile (0-100) with linear interpolation between the two
/// nearest order statistics.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let weight = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * weight)
}

/// The usual descriptive statistics of a numeric series.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
}

impl SummaryStats {
    /// `None` for an empty series.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        Some(Self {
            count: values.len(),
            sum: sum(values),
            mean: mean(values)?,
            median: median(values)?,
            std: std_dev(values),
            min: min(values)?,
            max: max(values)?,
        })
    }
}

/// Frequency of each distinct non-null value of a column, most frequent
/// first; ties keep first-appearance order. `None` if the column is absent.
pub fn value_counts(table: &Table, column: &str) -> Option<Vec<(KeyValue, usize)>> {
    let values = table.column(column).ok()?;
    Some(count_keys(values.into_iter().filter_map(Value::key)))
}

/// Frequencies of arbitrary keys, most frequent first, ties by first appearance.
pub fn count_keys<K, I>(keys: I) -> Vec<(K, usize)>
where
    K: std::hash::Hash + Eq + Clone,
    I: IntoIterator<Item = K>,
{
    let mut counts: HashMap<K, (usize, usize)> = HashMap::new();
    for (position, key) in keys.into_iter().enumerate() {
        counts.entry(key).or_insert((position, 0)).1 += 1;
    }
    let mut ordered: Vec<(K, usize, usize)> = counts
        .into_iter()
        .map(|(k, (first, count))| (k, first, count))
        .collect();
    ordered.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)));
    ordered.into_iter().map(|(k, _, count)| (k, count)).collect()
}

/// Labelled, half-open intervals `[breakpoints[i], breakpoints[i + 1])`.
///
/// The highest interval is open-ended upward and values below the first
/// breakpoint fall into the lowest interval, so every value gets a label.
#[derive(Debug, Clone, PartialEq)]
pub struct Buckets {
    breakpoints: Vec<f64>,
    labels: Vec<String>,
}

impl Buckets {
    pub fn new(breakpoints: &[f64], labels: &[&str]) -> Result<Self, AnalyticsError> {
        if breakpoints.is_empty() || breakpoints.len() != labels.len() {
            return Err(AnalyticsError::InvalidBuckets(format!(
                "{} breakpoints for {} labels",
                breakpoints.len(),
                labels.len()
            )));
        }
        let ascending = breakpoints
            .windows(2)
            .all(|w| w[0].partial_cmp(&w[1]) == Some(Ordering::Less));
        if !ascending || breakpoints.iter().any(|b| !b.is_finite()) {
            return Err(AnalyticsError::InvalidBuckets(
                "breakpoints must be finite and strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            breakpoints: breakpoints.to_vec(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label_for(&self, value: f64) -> &str {
        let opened = self.breakpoints.partition_point(|bp| *bp <= value);
        &self.labels[opened.saturating_sub(1)]
    }

    pub fn assign(&self, values: &[f64]) -> Vec<&str> {
        values.iter().map(|v| self.label_for(*v)).collect()
    }

    /// Occupancy of every bucket in label order, empty buckets included.
    pub fn counts(&self, values: &[f64]) -> Vec<(&str, usize)> {
        let mut counts = vec![0usize; self.labels.len()];
        for v in values {
            let opened = self.breakpoints.partition_point(|bp| *bp <= *v);
            counts[opened.saturating_sub(1)] += 1;
        }
        self.labels.iter().map(String::as_str).zip(counts).collect()
    }
}

/// Labels each value with the interval it falls in.
pub fn bucket(values: &[f64], breakpoints: &[f64], labels: &[&str]) -> Result<Vec<String>, AnalyticsError> {
    let buckets = Buckets::new(breakpoints, labels)?;
    Ok(buckets.assign(values).into_iter().map(str::to_string).collect())
}
