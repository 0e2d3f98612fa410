use anyhow::{anyhow, Result};
use serde::Serialize;
use slicer_core::db::{ProjectContext, RecoveryRunRecord, StoredRejection};
use slicer_core::model::{ArrayResize, StringSliceRecord};

use crate::canonicalize_or_current;
use crate::commands::print_json;

/// A stored run with every detail row.
#[derive(Serialize)]
pub struct RunDetails {
    #[serde(flatten)]
    pub run: RecoveryRunRecord,
    pub slices: Vec<StringSliceRecord>,
    pub resized: Vec<ArrayResize>,
    pub rejections: Vec<StoredRejection>,
}

/// Load a run and its detail rows, if it exists.
pub fn load_run_details(ctx: &ProjectContext, run_id: i64) -> Result<Option<RunDetails>> {
    let Some(run) = ctx.db.get_recovery_run(run_id)? else {
        return Ok(None);
    };
    Ok(Some(RunDetails {
        run,
        slices: ctx.db.load_slices(run_id)?,
        resized: ctx.db.load_resized_arrays(run_id)?,
        rejections: ctx.db.load_rejections(run_id)?,
    }))
}

/// List recorded recovery runs, optionally for one binary.
pub fn list_runs_command(root: &str, binary: Option<&str>, json: bool) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let ctx = ProjectContext::from_root(&root_path)?;
    let runs = ctx.db.list_recovery_runs(binary)?;

    if json {
        return print_json(&runs);
    }

    if runs.is_empty() {
        println!("No recovery runs recorded.");
        return Ok(());
    }
    println!("Recovery runs:");
    for run in &runs {
        println!(
            "- #{} {} [{}] {} accepted: {}, rejected: {} (finished {})",
            run.id.unwrap_or_default(),
            run.binary,
            run.mode.as_str(),
            run.status.as_str(),
            run.accepted,
            run.rejected,
            run.finished_at,
        );
    }
    Ok(())
}

/// Show one recorded run with its slices, resized arrays and rejections.
pub fn show_run_command(root: &str, id: i64, json: bool) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let ctx = ProjectContext::from_root(&root_path)?;
    let details = load_run_details(&ctx, id)?.ok_or_else(|| anyhow!("No recovery run with id {id}"))?;

    if json {
        return print_json(&details);
    }

    let run = &details.run;
    println!("Run #{id}");
    println!("Binary: {}", run.binary);
    if let Some(hash) = &run.binary_hash {
        println!("Binary hash: {hash}");
    }
    println!("Mode: {}", run.mode.as_str());
    println!("Status: {}", run.status.as_str());
    if let Some(error) = &run.error {
        println!("Error: {error}");
    }
    println!("Started: {}", run.started_at);
    println!("Finished: {}", run.finished_at);

    if !details.slices.is_empty() {
        println!("\nSlices:");
        for slice in &details.slices {
            println!(
                "- 0x{:X} -> 0x{:X} [0x{:X}] {:?}",
                slice.pointer_address, slice.data_address, slice.length, slice.text
            );
        }
    }
    if !details.resized.is_empty() {
        println!("\nResized arrays:");
        for resize in &details.resized {
            println!(
                "- 0x{:X} -> 0x{:X} byte(s) (from code at 0x{:X})",
                resize.address, resize.length, resize.code_address
            );
        }
    }
    if !details.rejections.is_empty() {
        println!("\nRejections:");
        for rejection in &details.rejections {
            println!("- 0x{:X} {}: {}", rejection.address, rejection.reason, rejection.detail);
        }
    }
    Ok(())
}
