use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use log::info;

use crate::db::{ProjectConfig, ProjectDb, ProjectLayout};

/// Load the project config JSON from disk for a given layout.
pub fn load_project_config(layout: &ProjectLayout) -> Result<ProjectConfig> {
    let config_json = std::fs::read_to_string(&layout.project_config_path).with_context(|| {
        format!("Failed to read project config at {}", layout.project_config_path.display())
    })?;
    let config: ProjectConfig =
        serde_json::from_str(&config_json).context("Failed to parse project config JSON")?;
    Ok(config)
}

/// Resolve the DB path (respecting relative/absolute config) and open a ProjectDb.
pub fn open_project_db(layout: &ProjectLayout) -> Result<(ProjectConfig, PathBuf, ProjectDb)> {
    let config = load_project_config(layout)?;
    let config_db_path = std::path::Path::new(&config.db.path);
    let db_path = if config_db_path.is_absolute() {
        config_db_path.to_path_buf()
    } else {
        layout.root.join(config_db_path)
    };
    let db = ProjectDb::open(&db_path)
        .with_context(|| format!("Failed to open project database at {}", db_path.display()))?;
    Ok((config, db_path, db))
}

/// Create the on-disk project: metadata dir, reports dir, config file and database.
///
/// Refuses to overwrite an existing config unless `force` is set.
pub fn init_project(layout: &ProjectLayout, config: &ProjectConfig, force: bool) -> Result<()> {
    if layout.project_config_path.exists() && !force {
        bail!(
            "Project already initialized at {} (use --force to overwrite)",
            layout.project_config_path.display()
        );
    }

    std::fs::create_dir_all(&layout.meta_dir).with_context(|| {
        format!("Failed to create metadata directory {}", layout.meta_dir.display())
    })?;
    std::fs::create_dir_all(&layout.reports_dir).with_context(|| {
        format!("Failed to create reports directory {}", layout.reports_dir.display())
    })?;

    let json = serde_json::to_string_pretty(config).context("Failed to serialize project config")?;
    std::fs::write(&layout.project_config_path, json).with_context(|| {
        format!("Failed to write project config to {}", layout.project_config_path.display())
    })?;

    let (_, db_path, _) = open_project_db(layout)?;
    info!("Initialized project '{}' with database {}", config.name, db_path.display());
    Ok(())
}
