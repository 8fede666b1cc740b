use crate::error::LoaderError;
use crate::loader::TableLoader;
use configuration::DataSettings;
use core_types::{DataSystem, Table, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info};

/// Whether one configured table has a file on disk.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub system: DataSystem,
    pub table: String,
    pub path: PathBuf,
    pub available: bool,
}

/// Loads tables from CSV exports laid out under a data root.
#[derive(Debug, Clone)]
pub struct CsvTableLoader {
    data: DataSettings,
}

impl CsvTableLoader {
    pub fn new(data: DataSettings) -> Self {
        Self { data }
    }

    pub fn settings(&self) -> &DataSettings {
        &self.data
    }

    /// Configured table names per system.
    pub fn catalog(&self) -> BTreeMap<DataSystem, Vec<String>> {
        DataSystem::ALL
            .iter()
            .map(|system| (*system, self.data.tables_for(*system)))
            .collect()
    }

    /// Every configured table and whether its file exists.
    pub fn availability(&self) -> Vec<SourceStatus> {
        let mut statuses = Vec::new();
        for (system, tables) in self.catalog() {
            for table in tables {
                let Some(path) = self.data.path_for(system, &table) else {
                    continue;
                };
                statuses.push(SourceStatus {
                    system,
                    available: path.is_file(),
                    table,
                    path,
                });
            }
        }
        statuses
    }
}

impl TableLoader for CsvTableLoader {
    fn get_table(&self, system: DataSystem, name: &str) -> Result<Table, LoaderError> {
        let not_found = || LoaderError::NotFound {
            system,
            table: name.to_string(),
        };
        let path = self.data.path_for(system, name).ok_or_else(not_found)?;
        if !path.is_file() {
            debug!(path = %path.display(), "Export file missing");
            return Err(not_found());
        }

        let file = File::open(&path).map_err(|source| LoaderError::Io {
            path: path.clone(),
            source,
        })?;
        let table = read_csv(file, system, name)?;
        info!(%system, table = name, rows = table.len(), columns = table.columns().len(), "Loaded table");
        Ok(table)
    }
}

/// Parses CSV bytes into a typed `Table`.
///
/// Each column gets a single type: all-integer cells become `Int`, all-numeric
/// cells `Float`, all `true`/`false` cells `Bool`, anything else `Text`.
/// Empty cells are null and do not influence the inferred type. A column with
/// any zero-padded number (`"007"`) stays `Text` so identifiers keep their
/// exact spelling.
pub fn read_csv<R: Read>(reader: R, system: DataSystem, name: &str) -> Result<Table, LoaderError> {
    let malformed = |reason: String| LoaderError::MalformedData {
        system,
        table: name.to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| malformed(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(malformed("missing header row".to_string()));
    }

    let mut raw: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| malformed(e.to_string()))?;
        raw.push(record.iter().map(str::to_string).collect());
    }

    let kinds: Vec<CellKind> = (0..headers.len())
        .map(|i| infer_kind(raw.iter().map(|row| row[i].as_str())))
        .collect();

    let rows = raw
        .into_iter()
        .map(|row| {
            row.iter()
                .zip(&kinds)
                .map(|(cell, kind)| kind.parse(cell))
                .collect()
        })
        .collect();

    Table::from_rows(name, headers, rows).map_err(|e| malformed(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Int,
    Float,
    Bool,
    Text,
}

impl CellKind {
    fn parse(&self, cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            CellKind::Int => cell.parse::<i64>().map(Value::Int).unwrap_or(Value::Null),
            CellKind::Float => cell.parse::<f64>().map(Value::Float).unwrap_or(Value::Null),
            CellKind::Bool => parse_bool(cell).map(Value::Bool).unwrap_or(Value::Null),
            CellKind::Text => Value::Text(cell.to_string()),
        }
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn infer_kind<'a>(cells: impl Iterator<Item = &'a str>) -> CellKind {
    let mut int = true;
    let mut float = true;
    let mut boolean = true;
    let mut seen = false;
    for cell in cells.filter(|c| !c.is_empty()) {
        seen = true;
        if zero_padded(cell) {
            return CellKind::Text;
        }
        int &= cell.parse::<i64>().is_ok();
        float &= cell.parse::<f64>().is_ok_and(f64::is_finite);
        boolean &= parse_bool(cell).is_some();
        if !(int || float || boolean) {
            return CellKind::Text;
        }
    }
    match (seen, int, float, boolean) {
        (false, ..) => CellKind::Text,
        (_, true, ..) => CellKind::Int,
        (_, _, true, _) => CellKind::Float,
        (_, _, _, true) => CellKind::Bool,
        _ => CellKind::Text,
    }
}

/// `"007"` or `"-01"`, but not `"0"` or `"0.5"`.
fn zero_padded(cell: &str) -> bool {
    let digits = cell.strip_prefix(['-', '+']).unwrap_or(cell).as_bytes();
    digits.first() == Some(&b'0') && digits.get(1).is_some_and(u8::is_ascii_digit)
}
