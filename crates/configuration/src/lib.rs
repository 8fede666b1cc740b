use crate::error::ConfigError;
use crate::settings::DEFAULT_LAYOUT;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{AnalysisSettings, DataSettings, LogLevel, LoggingSettings, Settings};

/// Loads the application configuration.
///
/// Sources are layered: built-in defaults, then the toml file at `path` (if it
/// exists), then `CROSSVIEW__*` environment variables such as
/// `CROSSVIEW__DATA__ROOT=/srv/exports`.
pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();

    // Layout defaults are set key by key so a file can override one path
    // without having to restate the whole layout.
    for (system, table, relative) in DEFAULT_LAYOUT {
        builder = builder.set_default(format!("data.layout.{system}.{table}"), *relative)?;
    }

    let config = builder
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("CROSSVIEW")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let settings = config.try_deserialize::<Settings>()?;
    settings.validate()?;

    Ok(settings)
}
