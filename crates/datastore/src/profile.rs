use analytics::percent;
use core_types::{KeyValue, Table, Value};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    /// `int`, `float`, `bool`, `text`, `mixed`, or `empty` for an all-null column.
    pub kind: &'static str,
    pub nulls: usize,
    pub null_percentage: f64,
    pub distinct: usize,
}

/// Shape and completeness of one table snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TableProfile {
    pub table: String,
    pub rows: usize,
    pub columns: Vec<ColumnProfile>,
    /// Rows identical to an earlier row.
    pub duplicate_rows: usize,
    pub duplicate_percentage: f64,
    /// Share of non-null cells over all cells.
    pub completeness: f64,
}

pub fn profile_table(table: &Table) -> TableProfile {
    let rows = table.len();
    let mut total_nulls = 0;

    let columns: Vec<ColumnProfile> = table
        .columns()
        .iter()
        .filter_map(|name| {
            let values = table.column(name).ok()?;
            let nulls = values.iter().filter(|v| v.is_null()).count();
            total_nulls += nulls;
            let distinct: HashSet<KeyValue> = values.iter().filter_map(|v| v.key()).collect();
            Some(ColumnProfile {
                name: name.clone(),
                kind: column_kind(&values),
                nulls,
                null_percentage: percent(nulls, rows),
                distinct: distinct.len(),
            })
        })
        .collect();

    let mut seen: HashSet<Vec<Option<KeyValue>>> = HashSet::with_capacity(rows);
    let duplicate_rows = table
        .rows()
        .filter(|row| !seen.insert(row.values().iter().map(Value::key).collect()))
        .count();

    let cells = rows * table.columns().len();
    TableProfile {
        table: table.name().to_string(),
        rows,
        columns,
        duplicate_rows,
        duplicate_percentage: percent(duplicate_rows, rows),
        completeness: if cells == 0 {
            0.0
        } else {
            percent(cells - total_nulls, cells)
        },
    }
}

fn column_kind(values: &[&Value]) -> &'static str {
    let mut kind: Option<&'static str> = None;
    for value in values {
        let this = match value {
            Value::Null => continue,
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        };
        match kind {
            None => kind = Some(this),
            Some(k) if k != this => return "mixed",
            Some(_) => {}
        }
    }
    kind.unwrap_or("empty")
}
