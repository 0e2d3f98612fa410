use std::fs;

use slicer_core::recovery::RecoveryConfig;
use string_slicer::commands::{
    effective_config, init_project_command, list_runs_command, load_recovery_profile,
    project_info_command, resolve_against, show_run_command,
};
use tempfile::tempdir;

#[test]
fn effective_config_layers_profile_and_flag() {
    let project = RecoveryConfig { name_prefix: "proj_".into(), ..RecoveryConfig::default() };

    let plain = effective_config(&project, None, None);
    assert_eq!(plain, project);

    let profile = RecoveryConfig { max_length: 0x40, ..RecoveryConfig::default() };
    let layered = effective_config(&project, Some(profile), Some(0x20));
    assert_eq!(layered.max_length, 0x20);
    assert_eq!(layered.name_prefix, "str_", "a profile replaces the project settings");
}

#[test]
fn recovery_profile_fills_missing_fields() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("profile.yaml");
    fs::write(&path, "max_length: 256\nrequest_reanalysis: false\n").expect("write");

    let config = load_recovery_profile(&path).expect("profile");
    assert_eq!(config.max_length, 256);
    assert!(!config.request_reanalysis);
    assert_eq!(config.slice_type_name, "RustStringSlice");
}

#[test]
fn recovery_profile_errors_are_contextual() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("broken.yaml");
    fs::write(&path, "max_length: [not, a, number]\n").expect("write");

    let err = load_recovery_profile(&path).expect_err("invalid profile");
    assert!(err.to_string().contains("Failed to parse recovery profile"));
    assert!(load_recovery_profile(&tmp.path().join("missing.yaml")).is_err());
}

#[test]
fn resolve_against_keeps_absolute_paths() {
    let tmp = tempdir().expect("tempdir");
    let absolute = tmp.path().join("snap.json");
    assert_eq!(resolve_against(tmp.path(), absolute.to_str().unwrap()), absolute);
    assert_eq!(resolve_against(tmp.path(), "snap.json"), absolute);
}

#[test]
fn project_commands_run_in_process() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().to_str().expect("utf8 root").to_string();

    init_project_command(&root, Some("UnitProject".into()), false).expect("init");
    project_info_command(&root, false).expect("info");
    project_info_command(&root, true).expect("info json");
    list_runs_command(&root, None, false).expect("list runs");
    list_runs_command(&root, Some("libgame.so"), true).expect("list runs json");

    let err = show_run_command(&root, 7, false).expect_err("no such run");
    assert!(err.to_string().contains("No recovery run with id 7"));
}
