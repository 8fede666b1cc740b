use crate::error::CoreError;
use crate::value::Value;
use std::collections::HashMap;

static NULL: Value = Value::Null;

/// An immutable, request-scoped snapshot of a dataset.
///
/// Rows keep their source order and are never deduplicated. The column set is
/// whatever the source happened to contain, so every consumer is expected to
/// guard reads with `has_column`.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Creates an empty table with the given columns.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self {
            name: name.into(),
            columns,
            index,
            rows: Vec::new(),
        }
    }

    /// Builds a table from rows that all match the column list in width.
    pub fn from_rows(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, CoreError> {
        let mut table = Self::new(name, columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Builds a table from heterogeneous records.
    ///
    /// The column set is the union of all record fields in first-seen order;
    /// a record that lacks a field gets a null in that column.
    pub fn from_records<K, I>(name: impl Into<String>, records: Vec<I>) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let records: Vec<Vec<(String, Value)>> = records
            .into_iter()
            .map(|r| r.into_iter().map(|(k, v)| (k.into(), v)).collect())
            .collect();

        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for (key, _) in record {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let mut table = Self::new(name, columns);
        for record in records {
            let mut row = vec![Value::Null; table.columns.len()];
            for (key, value) in record {
                if let Some(&i) = table.index.get(&key) {
                    row[i] = value;
                }
            }
            table.rows.push(row);
        }
        table
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), CoreError> {
        if row.len() != self.columns.len() {
            return Err(CoreError::RowWidthMismatch {
                table: self.name.clone(),
                row: self.rows.len(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Every value of a column, in row order.
    ///
    /// Fails with `ColumnNotFound` when the column is absent; callers are
    /// expected to have checked `has_column` first.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>, CoreError> {
        let i = self.column_index(name).ok_or_else(|| CoreError::ColumnNotFound {
            table: self.name.clone(),
            column: name.to_string(),
        })?;
        Ok(self.rows.iter().map(|row| &row[i]).collect())
    }

    /// Non-null numeric values of a column, or `None` if the column is absent.
    pub fn numeric(&self, name: &str) -> Option<Vec<f64>> {
        let i = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row[i].as_f64()).collect())
    }

    /// Number of non-null cells in a column; 0 when the column is absent.
    pub fn non_null_count(&self, name: &str) -> usize {
        self.column_index(name)
            .map(|i| self.rows.iter().filter(|row| !row[i].is_null()).count())
            .unwrap_or(0)
    }

    pub fn row(&self, i: usize) -> Option<RowView<'_>> {
        self.rows.get(i).map(|values| RowView { table: self, values })
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> {
        self.rows.iter().map(move |values| RowView { table: self, values })
    }

    /// A new table holding the rows for which `keep` returns true, in order.
    pub fn filter<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&RowView<'_>) -> bool,
    {
        let rows = self
            .rows()
            .filter(|row| keep(row))
            .map(|row| row.values.to_vec())
            .collect();
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            index: self.index.clone(),
            rows,
        }
    }

    /// A new table with rows taken by index (indices may repeat).
    pub fn take(&self, indices: &[usize]) -> Table {
        let rows = indices
            .iter()
            .filter_map(|&i| self.rows.get(i).cloned())
            .collect();
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            index: self.index.clone(),
            rows,
        }
    }

    /// A new table with a derived column appended, or replaced if it exists.
    pub fn with_column(&self, name: &str, values: Vec<Value>) -> Result<Table, CoreError> {
        if values.len() != self.rows.len() {
            return Err(CoreError::RowWidthMismatch {
                table: self.name.clone(),
                row: values.len(),
                expected: self.rows.len(),
                actual: values.len(),
            });
        }
        let mut table = self.clone();
        match table.column_index(name) {
            Some(i) => {
                for (row, value) in table.rows.iter_mut().zip(values) {
                    row[i] = value;
                }
            }
            None => {
                table.index.insert(name.to_string(), table.columns.len());
                table.columns.push(name.to_string());
                for (row, value) in table.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(table)
    }

    /// Same data under another name.
    pub fn renamed(mut self, name: impl Into<String>) -> Table {
        self.name = name.into();
        self
    }
}

/// A borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    table: &'a Table,
    values: &'a [Value],
}

impl<'a> RowView<'a> {
    /// The cell under `column`; `Null` when the column does not exist.
    pub fn get(&self, column: &str) -> &'a Value {
        match self.table.column_index(column) {
            Some(i) => &self.values[i],
            None => &NULL,
        }
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}
