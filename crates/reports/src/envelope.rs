use analytics::{GroupRow, JoinResult, KeyPair, round2};
use chrono::{DateTime, SecondsFormat, Utc};
use core_types::DataSystem;
use itertools::Itertools;
use serde_json::{Map, Value, json};
use std::fmt::Display;
use uuid::Uuid;

/// Accumulates the sections of one report and renders the final mapping.
///
/// Every report has the same envelope: `report`, `summary`, `breakdown`,
/// optional `insights` and a `provenance` section recording which tables were
/// read and which join keys were actually chosen.
#[derive(Debug)]
pub struct ReportBuilder {
    name: &'static str,
    summary: Map<String, Value>,
    breakdown: Map<String, Value>,
    insights: Option<Vec<String>>,
    parameters: Map<String, Value>,
    sources: Vec<Value>,
    joins: Vec<Value>,
    separate_analysis: bool,
}

impl ReportBuilder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            summary: Map::new(),
            breakdown: Map::new(),
            insights: None,
            parameters: Map::new(),
            sources: Vec::new(),
            joins: Vec::new(),
            separate_analysis: false,
        }
    }

    pub fn parameter(&mut self, key: &str, value: impl Into<Value>) {
        self.parameters.insert(key.to_string(), value.into());
    }

    pub fn summary(&mut self, key: &str, value: impl Into<Value>) {
        self.summary.insert(key.to_string(), value.into());
    }

    /// Inserts a summary figure only when it could be computed.
    pub fn summary_opt(&mut self, key: &str, value: Option<impl Into<Value>>) {
        if let Some(value) = value {
            self.summary(key, value);
        }
    }

    pub fn breakdown(&mut self, key: &str, value: impl Into<Value>) {
        self.breakdown.insert(key.to_string(), value.into());
    }

    pub fn insights(&mut self, messages: Vec<String>) {
        self.insights = Some(messages);
    }

    pub fn source(&mut self, system: DataSystem, table: &str) {
        let entry = json!({ "system": system.as_str(), "table": table });
        if !self.sources.contains(&entry) {
            self.sources.push(entry);
        }
    }

    pub fn joined(&mut self, relationship: &str, result: &JoinResult) {
        self.joins.push(json!({
            "relationship": relationship,
            "status": "joined",
            "left_key": result.keys().left,
            "right_key": result.keys().right,
            "how": result.kind().as_str(),
        }));
    }

    pub fn fallback(&mut self, relationship: &str, tried: &[KeyPair]) {
        self.separate_analysis = true;
        let tried: Vec<String> = tried.iter().map(ToString::to_string).collect();
        self.joins.push(json!({
            "relationship": relationship,
            "status": "fallback",
            "tried": tried,
        }));
    }

    pub fn finish(mut self, generated_at: DateTime<Utc>) -> Value {
        if self.separate_analysis {
            self.summary
                .insert("mode".to_string(), Value::from("separate_analysis"));
        }

        let mut report = Map::new();
        report.insert("report".to_string(), Value::from(self.name));
        report.insert("summary".to_string(), Value::Object(self.summary));
        report.insert("breakdown".to_string(), Value::Object(self.breakdown));
        if let Some(insights) = self.insights {
            report.insert("insights".to_string(), Value::from(insights));
        }
        report.insert(
            "provenance".to_string(),
            json!({
                "report_id": Uuid::new_v4().to_string(),
                "generated_at": generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                "parameters": Value::Object(self.parameters),
                "sources": self.sources,
                "joins": self.joins,
            }),
        );
        Value::Object(report)
    }
}

/// A float rounded to two decimals.
pub fn money(value: f64) -> Value {
    Value::from(round2(value))
}

pub fn money_opt(value: Option<f64>) -> Option<Value> {
    value.map(money)
}

/// `label -> count` in the given order.
pub fn counts<K: Display, N: Into<Value>>(pairs: impl IntoIterator<Item = (K, N)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, n)| (k.to_string(), n.into()))
        .collect()
}

/// `group label -> metrics`, in group order.
pub fn grouped(rows: &[GroupRow]) -> Map<String, Value> {
    rows.iter()
        .map(|row| (row.label(), Value::Object(row.metrics_json(2))))
        .collect()
}

/// The top `n` groups by `metric`, highest first. Groups without the metric
/// sort last; ties keep group order.
pub fn ranked<'a>(rows: &[&'a GroupRow], metric: &str, n: usize) -> Vec<&'a GroupRow> {
    rows.iter()
        .copied()
        .sorted_by(|a, b| {
            let a = a.get_f64(metric).unwrap_or(f64::NEG_INFINITY);
            let b = b.get_f64(metric).unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        })
        .take(n)
        .collect()
}

/// The first key with the highest count; `None` when every count is zero.
pub fn peak<K: Copy>(pairs: &[(K, usize)]) -> Option<K> {
    pairs
        .iter()
        .fold(None::<(K, usize)>, |best, &(key, n)| match best {
            Some((_, m)) if m >= n => best,
            _ if n == 0 => best,
            _ => Some((key, n)),
        })
        .map(|(key, _)| key)
}

/// The first key with the lowest non-zero count; `None` when every count is zero.
pub fn trough<K: Copy>(pairs: &[(K, usize)]) -> Option<K> {
    pairs
        .iter()
        .fold(None::<(K, usize)>, |best, &(key, n)| match best {
            _ if n == 0 => best,
            Some((_, m)) if m <= n => best,
            _ => Some((key, n)),
        })
        .map(|(key, _)| key)
}
