use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The record system a dataset was exported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSystem {
    /// Users, clients, agents and beneficiaries.
    Mysql,
    /// Products, policies and coverage.
    Postgresql,
    /// Claims, payments and the transaction audit trail.
    Cassandra,
}

impl DataSystem {
    pub const ALL: [DataSystem; 3] = [DataSystem::Mysql, DataSystem::Postgresql, DataSystem::Cassandra];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSystem::Mysql => "mysql",
            DataSystem::Postgresql => "postgresql",
            DataSystem::Cassandra => "cassandra",
        }
    }
}

impl fmt::Display for DataSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSystem {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(DataSystem::Mysql),
            "postgresql" | "postgres" => Ok(DataSystem::Postgresql),
            "cassandra" => Ok(DataSystem::Cassandra),
            other => Err(CoreError::InvalidInput("data system".to_string(), other.to_string())),
        }
    }
}
