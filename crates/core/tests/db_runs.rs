use rusqlite::Connection;
use tempfile::tempdir;

use slicer_core::db::{
    DbError, ProjectDb, RecoveryRunRecord, RunRecordStatus, CURRENT_SCHEMA_VERSION,
};
use slicer_core::model::{ArrayResize, StringSliceRecord};
use slicer_core::recovery::{RecoveryMode, RejectReason, Rejection, RunResult, RunStatus};

fn run_record(binary: &str, mode: RecoveryMode, status: RunRecordStatus) -> RecoveryRunRecord {
    RecoveryRunRecord {
        id: None,
        binary: binary.into(),
        mode,
        binary_hash: Some(format!("{binary}-hash")),
        status,
        accepted: 0,
        rejected: 0,
        error: None,
        started_at: "t0".into(),
        finished_at: "t1".into(),
    }
}

fn sample_result() -> RunResult {
    RunResult {
        mode: RecoveryMode::ReadOnlyData,
        status: RunStatus::Completed,
        candidates: 3,
        slices: vec![StringSliceRecord {
            pointer_address: 0x3000,
            data_address: 0x1000,
            length: 5,
            bytes: b"hello".to_vec(),
            text: "hello".into(),
        }],
        resized: vec![],
        rejections: vec![
            Rejection { address: 0x3010, reason: RejectReason::ZeroLength },
            Rejection {
                address: 0x3020,
                reason: RejectReason::TooLong { length: 0x2000, limit: 0x1000 },
            },
        ],
        slice_type_created: true,
    }
}

#[test]
fn recovery_runs_insert_and_list_round_trip() {
    let dir = tempdir().expect("tempdir");
    let db = ProjectDb::open(&dir.path().join("project.db")).expect("open db");

    let id_a = db
        .insert_recovery_run(&run_record("BinA", RecoveryMode::ReadOnlyData, RunRecordStatus::Succeeded))
        .expect("insert run a");
    db.insert_recovery_run(&run_record("BinB", RecoveryMode::Code, RunRecordStatus::Canceled))
        .expect("insert run b");

    let all = db.list_recovery_runs(None).expect("list runs");
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].mode, RecoveryMode::Code);
    assert_eq!(all[1].status, RunRecordStatus::Canceled);

    let only_a = db.list_recovery_runs(Some("BinA")).expect("filter runs");
    assert_eq!(only_a.len(), 1);
    assert_eq!(only_a[0].id, Some(id_a));
    assert_eq!(only_a[0].binary_hash.as_deref(), Some("BinA-hash"));

    assert!(db.list_recovery_runs(Some("Missing")).expect("filter").is_empty());
}

#[test]
fn run_details_round_trip() {
    let dir = tempdir().expect("tempdir");
    let db = ProjectDb::open(&dir.path().join("project.db")).expect("open db");
    let result = sample_result();

    let record = RecoveryRunRecord::from_result("Bin", None, &result, "t0", "t1");
    assert_eq!(record.accepted, 1);
    assert_eq!(record.rejected, 2);
    assert_eq!(record.status, RunRecordStatus::Succeeded);

    let run_id = db.insert_recovery_run(&record).expect("insert run");
    db.insert_run_result(run_id, &result).expect("insert details");

    let stored = db.get_recovery_run(run_id).expect("get").expect("run exists");
    assert_eq!(stored.accepted, 1);
    assert_eq!(stored.rejected, 2);

    assert_eq!(db.load_slices(run_id).expect("slices"), result.slices);

    let rejections = db.load_rejections(run_id).expect("rejections");
    let reasons: Vec<&str> = rejections.iter().map(|r| r.reason.as_str()).collect();
    assert_eq!(reasons, ["zero_length", "too_long"]);
    assert_eq!(rejections[1].address, 0x3020);
    assert!(rejections[1].detail.contains("0x2000"));

    assert!(db.load_resized_arrays(run_id).expect("resized").is_empty());
    assert_eq!(db.latest_run_id("Bin", RecoveryMode::ReadOnlyData).expect("latest"), Some(run_id));
    assert_eq!(db.latest_run_id("Bin", RecoveryMode::Code).expect("latest"), None);
    assert!(db.get_recovery_run(run_id + 100).expect("get").is_none());
}

#[test]
fn resized_arrays_round_trip() {
    let dir = tempdir().expect("tempdir");
    let db = ProjectDb::open(&dir.path().join("project.db")).expect("open db");
    let result = RunResult {
        mode: RecoveryMode::Code,
        status: RunStatus::Cancelled,
        candidates: 2,
        slices: vec![],
        resized: vec![ArrayResize {
            address: 0x1100,
            code_address: 0x40_1000,
            previous_length: None,
            length: 5,
        }],
        rejections: vec![],
        slice_type_created: false,
    };

    let record = RecoveryRunRecord::from_result("Bin", None, &result, "t0", "t1");
    assert_eq!(record.status, RunRecordStatus::Canceled);
    assert_eq!(record.accepted, 1);
    let run_id = db.insert_recovery_run(&record).expect("insert");
    db.insert_run_result(run_id, &result).expect("details");

    assert_eq!(db.load_resized_arrays(run_id).expect("resized"), result.resized);
}

#[test]
fn high_addresses_survive_storage() {
    let dir = tempdir().expect("tempdir");
    let db = ProjectDb::open(&dir.path().join("project.db")).expect("open db");
    let mut result = sample_result();
    result.slices[0].pointer_address = 0xFFFF_8000_0000_1000;
    result.rejections.clear();

    let run_id = db
        .insert_recovery_run(&RecoveryRunRecord::from_result("Kernel", None, &result, "t0", "t1"))
        .expect("insert");
    db.insert_run_result(run_id, &result).expect("details");
    assert_eq!(db.load_slices(run_id).expect("slices")[0].pointer_address, 0xFFFF_8000_0000_1000);
}

#[test]
fn fresh_database_is_at_current_version() {
    let dir = tempdir().expect("tempdir");
    let db = ProjectDb::open(&dir.path().join("project.db")).expect("open db");
    assert_eq!(db.schema_version().expect("version"), CURRENT_SCHEMA_VERSION);
}

#[test]
fn existing_v1_schema_is_migrated() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("project.db");

    // Create a v1 schema manually, with one run already recorded.
    {
        let conn = Connection::open(&db_path).expect("open sqlite");
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE recovery_runs (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                binary       TEXT NOT NULL,
                mode         TEXT NOT NULL,
                binary_hash  TEXT,
                status       TEXT NOT NULL,
                accepted     INTEGER NOT NULL DEFAULT 0,
                rejected     INTEGER NOT NULL DEFAULT 0,
                started_at   TEXT NOT NULL,
                finished_at  TEXT NOT NULL
            );
            INSERT INTO recovery_runs (binary, mode, status, started_at, finished_at)
            VALUES ('Old', 'readonly_data', 'succeeded', 't', 't');
            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )
        .expect("create v1 schema");
    }

    let db = ProjectDb::open(&db_path).expect("open and migrate");
    assert_eq!(db.schema_version().expect("version"), 3);

    let runs = db.list_recovery_runs(None).expect("list runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].binary, "Old");
    assert_eq!(runs[0].error, None);

    let run_id = runs[0].id.expect("id");
    db.insert_run_result(run_id, &sample_result()).expect("detail tables exist");
}

#[test]
fn unsupported_schema_version_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("project.db");
    {
        let conn = Connection::open(&db_path).expect("open raw sqlite db");
        conn.pragma_update(None, "user_version", 99_i32).expect("set user_version pragma");
    }

    match ProjectDb::open(&db_path) {
        Err(DbError::UnsupportedSchemaVersion { found, min_supported, max_supported }) => {
            assert_eq!(found, 99);
            assert_eq!(min_supported, 0);
            assert_eq!(max_supported, CURRENT_SCHEMA_VERSION);
        }
        Err(err) => panic!("expected UnsupportedSchemaVersion error, got {err}"),
        Ok(_) => panic!("expected UnsupportedSchemaVersion error, got Ok(_)"),
    }
}

#[test]
fn unknown_status_in_database_is_an_error() {
    let dir = tempdir().expect("tempdir");
    let db = ProjectDb::open(&dir.path().join("project.db")).expect("open db");
    db.connection()
        .execute(
            "INSERT INTO recovery_runs (binary, mode, status, started_at, finished_at)
             VALUES ('Bin', 'readonly_data', 'exploded', 't', 't')",
            [],
        )
        .expect("raw insert");

    assert!(db.list_recovery_runs(None).is_err());
}

#[test]
fn status_strings_parse() {
    for s in ["succeeded", "canceled", "failed"] {
        let parsed: RunRecordStatus = s.parse().expect("should parse");
        assert_eq!(parsed.as_str(), s);
    }
    assert_eq!("cancelled".parse::<RunRecordStatus>(), Ok(RunRecordStatus::Canceled));
    assert!("bogus".parse::<RunRecordStatus>().is_err());
}
