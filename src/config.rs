// ABOUTME: Export selection and run configuration loaded from TOML
// ABOUTME: Holds category toggles, the data ignore-list, and the failure policy

use crate::error::{Error, FailurePolicy, Result};
use serde::Deserialize;
use std::path::Path;

/// Which object categories to script and which tables to leave out of data export.
///
/// The ignore-list only affects data: ignored tables still appear in `schema.sql`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportSelection {
    pub ignore_tables: Vec<String>,
    pub schemas: bool,
    pub tables: bool,
    pub indexes: bool,
    pub foreign_keys: bool,
    pub procedures: bool,
    pub functions: bool,
    pub views: bool,
    pub triggers: bool,
    pub users: bool,
    pub user_defined_types: bool,
    pub statistics: bool,
}

impl Default for ExportSelection {
    fn default() -> Self {
        Self {
            ignore_tables: Vec::new(),
            schemas: true,
            tables: true,
            indexes: true,
            foreign_keys: true,
            procedures: true,
            functions: true,
            views: true,
            triggers: true,
            users: false,
            user_defined_types: true,
            statistics: false,
        }
    }
}

impl ExportSelection {
    pub fn with_ignore_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_tables.extend(tables.into_iter().map(Into::into));
        self
    }

    /// Case-insensitive exact match against the ignore-list
    pub fn is_ignored(&self, table: &str) -> bool {
        let table = table.to_lowercase();
        self.ignore_tables
            .iter()
            .any(|ignored| ignored.to_lowercase() == table)
    }
}

/// Contents of a `--config` file.
///
/// ```toml
/// failure_policy = "strict"
///
/// [export]
/// ignore_tables = ["audit_log"]
/// users = true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackagerConfig {
    pub failure_policy: FailurePolicy,
    pub export: ExportSelection,
}

impl PackagerConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Load a configuration file
pub fn load_config_from_file(path: impl AsRef<Path>) -> Result<PackagerConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read config file {}: {}", path.display(), e))
    })?;
    tracing::debug!("Loaded configuration from {}", path.display());
    PackagerConfig::from_toml(&content)
}
