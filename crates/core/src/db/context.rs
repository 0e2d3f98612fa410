use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::db::{open_project_db, ProjectConfig, ProjectDb, ProjectLayout};

/// An opened recovery project: where it lives, its settings and its run history.
#[derive(Debug)]
pub struct ProjectContext {
    pub layout: ProjectLayout,
    pub config: ProjectConfig,
    /// Resolved database path (the config may hold it relative to the root).
    pub db_path: PathBuf,
    pub db: ProjectDb,
}

impl ProjectContext {
    /// Open the project rooted at `root`, migrating its database if needed.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let layout = ProjectLayout::new(root);
        let (config, db_path, db) = open_project_db(&layout)?;
        Ok(Self { layout, config, db_path, db })
    }
}
