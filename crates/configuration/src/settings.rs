use core_types::DataSystem;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// The default export layout: `(system, table, path relative to the data root)`.
pub const DEFAULT_LAYOUT: &[(DataSystem, &str, &str)] = &[
    (DataSystem::Mysql, "users", "mysql/users/users.csv"),
    (DataSystem::Mysql, "clients", "mysql/clients/clients.csv"),
    (DataSystem::Mysql, "agents", "mysql/agents/agents.csv"),
    (DataSystem::Mysql, "beneficiaries", "mysql/beneficiaries/beneficiaries.csv"),
    (DataSystem::Postgresql, "products", "postgresql/products/products.csv"),
    (DataSystem::Postgresql, "policies", "postgresql/policies/policies.csv"),
    (DataSystem::Postgresql, "policy_coverage", "postgresql/policy_coverage/policy_coverage.csv"),
    (DataSystem::Postgresql, "policy_beneficiaries", "postgresql/beneficiaries/beneficiaries.csv"),
    (DataSystem::Cassandra, "reclamos", "cassandra/reclamos/reclamos.csv"),
    (DataSystem::Cassandra, "pagos", "cassandra/pagos/pagos.csv"),
    (DataSystem::Cassandra, "transaction_audit", "cassandra/transaction_audit/transaction_audit.csv"),
];

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub analysis: AnalysisSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Checks the invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), crate::ConfigError> {
        let invalid = |msg: &str| Err(crate::ConfigError::ValidationError(msg.to_string()));
        if self.analysis.top_n == 0 {
            return invalid("analysis.top_n must be at least 1");
        }
        if self.analysis.trailing_periods == 0 {
            return invalid("analysis.trailing_periods must be at least 1");
        }
        if self.analysis.recent_window.is_zero() {
            return invalid("analysis.recent_window must be longer than zero");
        }
        Ok(())
    }
}

/// Where the exported snapshots live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Directory that the layout paths are relative to.
    pub root: PathBuf,
    /// `system -> table -> relative path`.
    pub layout: BTreeMap<String, BTreeMap<String, PathBuf>>,
}

impl DataSettings {
    /// The absolute location of a logical table, if it is part of the layout.
    pub fn path_for(&self, system: DataSystem, table: &str) -> Option<PathBuf> {
        self.layout
            .get(system.as_str())
            .and_then(|tables| tables.get(table))
            .map(|relative| self.root.join(relative))
    }

    /// Every configured table name for a system, in name order.
    pub fn tables_for(&self, system: DataSystem) -> Vec<String> {
        self.layout
            .get(system.as_str())
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for DataSettings {
    fn default() -> Self {
        let mut layout: BTreeMap<String, BTreeMap<String, PathBuf>> = BTreeMap::new();
        for (system, table, path) in DEFAULT_LAYOUT {
            layout
                .entry(system.as_str().to_string())
                .or_default()
                .insert(table.to_string(), PathBuf::from(path));
        }
        Self {
            root: PathBuf::from("data"),
            layout,
        }
    }
}

/// Knobs shared by the reports.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// What "recent" means for claim and registration counters.
    #[serde(with = "humantime_serde")]
    pub recent_window: Duration,
    /// Length of every "top N" ranking.
    pub top_n: usize,
    /// Default lookback of the user-growth report, in months.
    pub default_growth_months: u32,
    /// Default lookback of the activity-patterns report, in hours.
    pub default_activity_hours: u32,
    /// How many of the latest monthly periods a time series keeps.
    pub trailing_periods: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            recent_window: Duration::from_secs(30 * 24 * 60 * 60),
            top_n: 10,
            default_growth_months: 12,
            default_activity_hours: 168,
            trailing_periods: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    /// When set, logs also go to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            directory: None,
            file_prefix: "crossview.log".to_string(),
        }
    }
}
