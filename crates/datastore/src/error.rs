use core_types::DataSystem;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Table '{table}' does not exist in {system}")]
    NotFound { system: DataSystem, table: String },

    #[error("Table '{table}' from {system} could not be parsed: {reason}")]
    MalformedData {
        system: DataSystem,
        table: String,
        reason: String,
    },

    #[error("I/O error while reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
