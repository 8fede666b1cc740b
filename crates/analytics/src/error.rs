use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Invalid bucket definition: {0}")]
    InvalidBuckets(String),
}
