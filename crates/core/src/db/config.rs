use serde::{Deserialize, Serialize};

use crate::recovery::RecoveryConfig;

/// Format version written into new project configs.
pub const CONFIG_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Relative paths are resolved against the project root.
    pub path: String,
}

impl DbConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Contents of `.slicer/project.json`.
///
/// `recovery` holds the defaults every `recover` run starts from; configs
/// written before it existed load with [`RecoveryConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub description: Option<String>,
    pub config_version: String,
    pub db: DbConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>, db_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            config_version: CONFIG_VERSION.to_string(),
            db: DbConfig::new(db_path),
            recovery: RecoveryConfig::default(),
        }
    }
}
