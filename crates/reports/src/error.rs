use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to load source data: {0}")]
    Load(#[from] datastore::LoaderError),

    #[error("Calculation failed: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error(transparent)]
    Core(#[from] core_types::CoreError),

    #[error("Table '{table}' has no '{column}' column, which this report requires")]
    RequiredColumn { table: String, column: String },

    #[error("Unknown report: '{0}'")]
    UnknownReport(String),
}
