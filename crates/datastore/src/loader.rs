use crate::error::LoaderError;
use core_types::{DataSystem, Table};
use std::collections::HashMap;

/// Supplies table snapshots by `(system, name)`.
///
/// Implementations must be callable from several report threads at once and
/// return the same data for a name for the duration of a report. Any caching
/// or de-duplication of concurrent fetches is the implementation's business.
pub trait TableLoader: Send + Sync {
    fn get_table(&self, system: DataSystem, name: &str) -> Result<Table, LoaderError>;
}

/// Serves tables that were built in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableLoader {
    tables: HashMap<(DataSystem, String), Table>,
}

impl MemoryTableLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `table` under its own name.
    pub fn with_table(mut self, system: DataSystem, table: Table) -> Self {
        self.insert(system, table);
        self
    }

    pub fn insert(&mut self, system: DataSystem, table: Table) {
        self.tables.insert((system, table.name().to_string()), table);
    }
}

impl TableLoader for MemoryTableLoader {
    fn get_table(&self, system: DataSystem, name: &str) -> Result<Table, LoaderError> {
        self.tables
            .get(&(system, name.to_string()))
            .cloned()
            .ok_or_else(|| LoaderError::NotFound {
                system,
                table: name.to_string(),
            })
    }
}
