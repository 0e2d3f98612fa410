use anyhow::Result;
use serde::Serialize;
use slicer_core::db::{ProjectConfig, ProjectContext, ProjectLayout, RecoveryRunRecord};
use slicer_core::recovery::RecoveryConfig;

use crate::commands::{print_dir_status, print_json};
use crate::{canonicalize_or_current, infer_project_name};

#[derive(Serialize)]
pub struct ProjectInfoSnapshot {
    pub name: String,
    pub description: Option<String>,
    pub root: String,
    pub config_file: String,
    pub config_version: String,
    pub db_path: String,
    pub schema_version: i32,
    pub recovery: RecoveryConfig,
    pub layout: ProjectInfoLayout,
    pub recovery_runs: Vec<RecoveryRunRecord>,
}

#[derive(Serialize)]
pub struct ProjectInfoLayout {
    pub meta_dir: String,
    pub reports_dir: String,
}

/// Initialize a new project at `root`.
pub fn init_project_command(root: &str, name: Option<String>, force: bool) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = ProjectLayout::new(&root_path);

    // Derive project name if not provided.
    let project_name = match name {
        Some(n) => n,
        None => infer_project_name(&root_path),
    };

    let config = ProjectConfig::new(&project_name, layout.db_path_relative_string());
    slicer_core::db::init_project(&layout, &config, force)?;

    println!("Initialized string-slicer project:");
    println!("  Name: {}", project_name);
    println!("  Root: {}", layout.root.display());
    println!("  Config: {}", layout.project_config_path.display());
    println!("  DB path (relative): {}", config.db.path);
    println!("  Reports dir: {}", layout.reports_dir.display());

    Ok(())
}

/// Show basic information about an existing project.
pub fn project_info_command(root: &str, json: bool) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let ctx = ProjectContext::from_root(&root_path)?;
    let layout = &ctx.layout;
    let config = &ctx.config;
    let schema_version = ctx.db.schema_version()?;
    let runs = ctx.db.list_recovery_runs(None)?;

    if json {
        return print_json(&ProjectInfoSnapshot {
            name: config.name.clone(),
            description: config.description.clone(),
            root: layout.root.display().to_string(),
            config_file: layout.project_config_path.display().to_string(),
            config_version: config.config_version.clone(),
            db_path: config.db.path.clone(),
            schema_version,
            recovery: config.recovery.clone(),
            layout: ProjectInfoLayout {
                meta_dir: layout.meta_dir.display().to_string(),
                reports_dir: layout.reports_dir.display().to_string(),
            },
            recovery_runs: runs,
        });
    }

    println!("string-slicer Project Info");
    println!("==========================");
    println!("Name: {}", config.name);
    if let Some(description) = &config.description {
        println!("Description: {}", description);
    }
    println!("Root: {}", layout.root.display());
    println!("Config file: {}", layout.project_config_path.display());
    println!("Config version: {}", config.config_version);
    println!("DB path (config): {}", config.db.path);
    println!("Schema version: {}", schema_version);
    println!();

    println!("Recovery defaults:");
    println!("- Max length: 0x{:X}", config.recovery.max_length);
    println!("- Slice type: {}", config.recovery.slice_type_name);
    println!("- Name prefix: {}", config.recovery.name_prefix);
    println!("- Request re-analysis: {}", config.recovery.request_reanalysis);
    println!();

    // Basic directory existence checks.
    println!("Directories:");
    print_dir_status("Meta dir (.slicer)", &layout.meta_dir);
    print_dir_status("Reports dir", &layout.reports_dir);
    println!();
    println!("Recovery runs: {}", runs.len());

    Ok(())
}
