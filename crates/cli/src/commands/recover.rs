use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use slicer_core::db::ProjectContext;
use slicer_core::host::{MemoryModel, SnapshotHost};
use slicer_core::recovery::{RecoveryConfig, RecoveryMode, RunResult};
use slicer_core::services::{RecoveryRunner, RunRequest};

use crate::commands::{print_json, resolve_against};
use crate::{canonicalize_or_current, infer_binary_name, sha256_file};

/// Arguments of the `recover` command.
#[derive(Debug, Clone, Default)]
pub struct RecoverArgs {
    pub root: String,
    pub snapshot: String,
    pub binary: Option<String>,
    pub name: Option<String>,
    pub profile: Option<String>,
    pub max_length: Option<u64>,
    pub output: Option<String>,
    pub json: bool,
}

/// Read a YAML recovery profile. Missing fields keep their defaults.
pub fn load_recovery_profile(path: &Path) -> Result<RecoveryConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read recovery profile {}", path.display()))?;
    let config: RecoveryConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse recovery profile {}", path.display()))?;
    Ok(config)
}

/// Effective configuration: project defaults, then the profile, then `--max-length`.
pub fn effective_config(
    project: &RecoveryConfig,
    profile: Option<RecoveryConfig>,
    max_length: Option<u64>,
) -> RecoveryConfig {
    let config = profile.unwrap_or_else(|| project.clone());
    match max_length {
        Some(limit) => config.with_max_length(limit),
        None => config,
    }
}

/// Run read-only-data recovery over a snapshot and record the run.
pub fn recover_command(args: &RecoverArgs) -> Result<()> {
    let root_path = canonicalize_or_current(&args.root)?;
    let ctx = ProjectContext::from_root(&root_path)?;

    let profile = match &args.profile {
        Some(profile) => Some(load_recovery_profile(&resolve_against(&root_path, profile))?),
        None => None,
    };
    let config = effective_config(&ctx.config.recovery, profile, args.max_length);

    let snapshot_path = resolve_against(&root_path, &args.snapshot);
    let mut host = SnapshotHost::from_path(&snapshot_path)
        .with_context(|| format!("Failed to load snapshot {}", snapshot_path.display()))?;

    let binary_path = args.binary.as_deref().map(|b| resolve_against(&root_path, b));
    let binary_hash = match &binary_path {
        Some(path) => {
            if host.segments().is_empty() {
                let image = slicer_core::host::object::load_object_file(path)
                    .with_context(|| format!("Failed to load object file {}", path.display()))?;
                info!("Using memory view of {}", path.display());
                host = host.with_image(image);
            }
            Some(sha256_file(path)?)
        }
        None => None,
    };
    let binary_name = args
        .name
        .clone()
        .unwrap_or_else(|| infer_binary_name(binary_path.as_deref(), &snapshot_path));

    let request = RunRequest::new(&binary_name, RecoveryMode::ReadOnlyData, config)
        .with_binary_hash(binary_hash);
    let outcome = RecoveryRunner::new(&ctx)
        .run(&mut host, &request)
        .with_context(|| format!("Recovery failed for {binary_name}"))?;

    if let Some(output) = &args.output {
        let output_path = resolve_against(&root_path, output);
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&host.annotations())
            .context("Failed to serialize annotations")?;
        fs::write(&output_path, json)
            .with_context(|| format!("Failed to write annotations to {}", output_path.display()))?;
        info!("Wrote annotations to {}", output_path.display());
    }

    if args.json {
        return print_json(&outcome.result);
    }
    print_run_summary(&binary_name, outcome.run_id, &outcome.result);
    Ok(())
}

fn print_run_summary(binary: &str, run_id: Option<i64>, result: &RunResult) {
    match run_id {
        Some(id) => println!("Recovery run {id} for {binary}: {:?}", result.status),
        None => println!("Recovery run for {binary} (not recorded): {:?}", result.status),
    }
    println!("Candidates examined: {}", result.candidates);
    println!("Recovered slices: {}", result.slices.len());
    for slice in &result.slices {
        println!(
            "- 0x{:X} -> 0x{:X} [0x{:X}] {:?}",
            slice.pointer_address, slice.data_address, slice.length, slice.text
        );
    }
    if !result.rejections.is_empty() {
        println!("Rejected candidates: {}", result.rejections.len());
        for rejection in &result.rejections {
            println!("- 0x{:X}: {}", rejection.address, rejection.reason);
        }
    }
    if result.slice_type_created {
        println!("Slice type created.");
    }
}
