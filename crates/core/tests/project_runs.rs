mod common;

use common::*;
use slicer_core::db::{
    init_project, ProjectConfig, ProjectContext, ProjectLayout, RunRecordStatus,
};
use slicer_core::host::SnapshotHost;
use slicer_core::recovery::{CancellationToken, RecoveryConfig, RecoveryError, RecoveryMode};
use slicer_core::services::{RecoveryRunner, RunRequest};

fn project(root: &std::path::Path) -> ProjectContext {
    let layout = ProjectLayout::new(root);
    let config = ProjectConfig::new("RunsProject", layout.db_path_relative_string());
    init_project(&layout, &config, false).expect("init project");
    ProjectContext::from_root(root).expect("context")
}

#[test]
fn layout_paths_live_under_root() {
    let root = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(root.path());
    assert!(layout.db_path_relative_string().starts_with(".slicer"));
    assert!(layout.project_config_path.ends_with(".slicer/project.json"));
    assert!(layout.annotations_path("libgame.so").ends_with("reports/libgame.so.annotations.json"));
}

#[test]
fn init_project_creates_layout_and_refuses_overwrite() {
    let root = tempfile::tempdir().unwrap();
    let ctx = project(root.path());

    assert_eq!(ctx.config.name, "RunsProject");
    assert!(ctx.layout.meta_dir.is_dir());
    assert!(ctx.layout.reports_dir.is_dir());
    assert!(ctx.db_path.is_file());
    assert_eq!(ctx.config.recovery, RecoveryConfig::default());

    let err = init_project(&ctx.layout, &ctx.config, false).expect_err("already initialized");
    assert!(err.to_string().contains("already initialized"));
    init_project(&ctx.layout, &ctx.config, true).expect("forced re-init");
}

#[test]
fn config_without_recovery_section_uses_defaults() {
    let minimal = r#"{ "name": "proj", "description": null, "config_version": "0.1.0", "db": { "path": "db.sqlite" } }"#;
    let config: ProjectConfig = serde_json::from_str(minimal).expect("parse");
    assert_eq!(config.recovery.max_length, 0x1000);
    assert_eq!(config.recovery.slice_type_name, "RustStringSlice");
}

#[test]
fn missing_config_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let err = ProjectContext::from_root(root.path()).expect_err("no project");
    assert!(err.to_string().contains("Failed to read project config"));
}

#[test]
fn runner_records_successful_run_with_details() {
    let root = tempfile::tempdir().unwrap();
    let ctx = project(root.path());
    let mut host = host_with_pairs(x86_64(), &[(0, HELLO, 5), (0x10, HELLO, 0)]);

    let request = RunRequest::new("libgame.so", RecoveryMode::ReadOnlyData, RecoveryConfig::default())
        .with_binary_hash(Some("abc123".into()));
    let outcome = RecoveryRunner::new(&ctx).run(&mut host, &request).expect("run");

    assert_eq!(outcome.result.slices.len(), 1);
    let run_id = outcome.run_id.expect("recorded");

    let run = ctx.db.get_recovery_run(run_id).expect("get").expect("exists");
    assert_eq!(run.binary, "libgame.so");
    assert_eq!(run.binary_hash.as_deref(), Some("abc123"));
    assert_eq!(run.status, RunRecordStatus::Succeeded);
    assert_eq!(run.accepted, 1);
    assert_eq!(run.rejected, 1);
    assert!(!run.started_at.is_empty());

    assert_eq!(ctx.db.load_slices(run_id).expect("slices")[0].text, "hello");
    assert_eq!(ctx.db.load_rejections(run_id).expect("rejections")[0].reason, "zero_length");
}

#[test]
fn runner_records_failed_run_and_returns_error() {
    let root = tempfile::tempdir().unwrap();
    let ctx = project(root.path());
    let mut host = SnapshotHost::new(None);

    let request = RunRequest::new("stripped", RecoveryMode::ReadOnlyData, RecoveryConfig::default());
    let err = RecoveryRunner::new(&ctx).run(&mut host, &request).expect_err("no arch");
    assert!(matches!(err, RecoveryError::Configuration));

    let runs = ctx.db.list_recovery_runs(Some("stripped")).expect("list");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunRecordStatus::Failed);
    assert!(runs[0].error.as_deref().unwrap_or_default().contains("architecture"));
}

#[test]
fn runner_drives_the_code_path() {
    let root = tempfile::tempdir().unwrap();
    let ctx = project(root.path());
    let mut host = SnapshotHost::new(Some(x86_64()));
    host.add_segment(readonly_segment(), rodata_bytes());
    host.add_data_var(PANIC, slicer_core::model::DataType::char_array(1), None);
    host.add_code_ref(0x40_1000, PANIC);
    host.add_block(load_then_constant(0x40_1000, 5));

    let request = RunRequest::new("libgame.so", RecoveryMode::Code, RecoveryConfig::default());
    let outcome = RecoveryRunner::new(&ctx).run(&mut host, &request).expect("run");

    let run_id = outcome.run_id.expect("recorded");
    let resized = ctx.db.load_resized_arrays(run_id).expect("resized");
    assert_eq!(resized.len(), 1);
    assert_eq!(resized[0].length, 5);
    assert_eq!(ctx.db.latest_run_id("libgame.so", RecoveryMode::Code).expect("latest"), Some(run_id));
}

#[test]
fn runner_records_cancelled_run() {
    let root = tempfile::tempdir().unwrap();
    let ctx = project(root.path());
    let mut host = host_with_pairs(x86_64(), &[(0, HELLO, 5)]);
    let token = CancellationToken::new();
    token.cancel();

    let request = RunRequest::new("libgame.so", RecoveryMode::ReadOnlyData, RecoveryConfig::default())
        .with_cancellation(token);
    let outcome = RecoveryRunner::new(&ctx).run(&mut host, &request).expect("run");

    assert!(outcome.result.is_cancelled());
    let run = ctx.db.get_recovery_run(outcome.run_id.expect("id")).expect("get").expect("exists");
    assert_eq!(run.status, RunRecordStatus::Canceled);
}
