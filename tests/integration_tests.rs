//! Integration tests: CLI smoke tests against a saved cluster snapshot, and
//! full-pipeline reclamation scenarios against the in-memory inventory.

mod common;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone, Utc};
use serde_json::Value;
use storage_reclaimer::classify::references::is_claim_referenced;
use storage_reclaimer::classify::storage_class::unused_storage_classes;
use storage_reclaimer::classify::volume::{Disposition, ReclaimReason, RetainReason, classify};
use storage_reclaimer::core::cancel::CancelToken;
use storage_reclaimer::core::config::Config;
use storage_reclaimer::core::context::RunContext;
use storage_reclaimer::core::errors::ReclaimError;
use storage_reclaimer::inventory::memory::{DeletedObject, StaticInventory};
use storage_reclaimer::inventory::model::{
    Job, ObjectMeta, ObjectReference, PersistentVolume, PersistentVolumeClaim, PodTemplateSpec,
    StorageClass, Volume,
};
use storage_reclaimer::inventory::snapshot::{InventorySnapshot, WorkloadSnapshot};
use storage_reclaimer::logger::activity::ActivityLogger;
use storage_reclaimer::logger::audit::AuditLog;
use storage_reclaimer::reclaim::orchestrator::{Action, ReclaimOptions, Reclaimer, RunReport};

// ──────────────────── CLI smoke ────────────────────

/// Config file pinning the backup root inside `dir`.
fn write_config(dir: &Path) -> PathBuf {
    let root = dir.join("storage-clean");
    let path = dir.join("config.toml");
    fs::write(
        &path,
        format!("[paths]\nroot = \"{}\"\n", root.display()),
    )
    .expect("write config fixture");
    path
}

fn parse_json(stdout: &str, log: &Path) -> Value {
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("stdout is not JSON ({e}); log: {}", log.display()))
}

#[test]
fn help_command_prints_usage() {
    let result = common::run_cli_case("help_command_prints_usage", &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: sreclaim [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn version_command_prints_version() {
    let result = common::run_cli_case("version_command_prints_version", &["version", "--json"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    let payload = parse_json(&result.stdout, &result.log_path);
    assert_eq!(payload["binary"], "sreclaim");
    assert_eq!(payload["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn subcommand_help_flags_work() {
    for sub in ["clean", "list-sc", "list-pv", "config", "completions"] {
        let result = common::run_cli_case(&format!("help_{sub}"), &[sub, "--help"]);
        assert!(
            result.status.success(),
            "`{sub} --help` failed; log: {}",
            result.log_path.display()
        );
    }
}

#[test]
fn completions_command_generates_shell_script() {
    let result = common::run_cli_case("completions_bash", &["completions", "bash"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("sreclaim"),
        "completion script should mention the binary; log: {}",
        result.log_path.display()
    );
}

#[test]
fn config_validate_accepts_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let config_arg = config.to_string_lossy().to_string();

    let result = common::run_cli_case(
        "config_validate_accepts_partial_file",
        &["--config", &config_arg, "--json", "config", "validate"],
    );
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    let payload = parse_json(&result.stdout, &result.log_path);
    assert_eq!(payload["valid"], true);
    assert_eq!(payload["hash"].as_str().map(str::len), Some(16));
}

#[test]
fn config_validate_rejects_bad_file_with_user_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[cluster]\nrequest_timeout_secs = 0\n").unwrap();
    let config_arg = path.to_string_lossy().to_string();

    let result = common::run_cli_case(
        "config_validate_rejects_bad_file",
        &["--config", &config_arg, "--json", "config", "validate"],
    );
    assert_eq!(
        result.status.code(),
        Some(1),
        "expected user error; log: {}",
        result.log_path.display()
    );
    let payload = parse_json(&result.stdout, &result.log_path);
    assert_eq!(payload["valid"], false);
    assert_eq!(payload["error_code"], "SR-1001");
}

#[test]
fn missing_explicit_config_is_a_user_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let config_arg = missing.to_string_lossy().to_string();

    let result = common::run_cli_case(
        "missing_explicit_config",
        &["--config", &config_arg, "list-sc", "--snapshot", "/nonexistent"],
    );
    assert_eq!(
        result.status.code(),
        Some(1),
        "log: {}",
        result.log_path.display()
    );
    assert!(result.stderr.contains("SR-1002"));
}

#[test]
fn list_sc_reports_namespace_bindings_from_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let snapshot = common::write_cluster_snapshot(dir.path());
    let (config_arg, snapshot_arg) = (
        config.to_string_lossy().to_string(),
        snapshot.to_string_lossy().to_string(),
    );

    let result = common::run_cli_case(
        "list_sc_from_snapshot",
        &["--config", &config_arg, "--json", "list-sc", "--snapshot", &snapshot_arg],
    );
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    let payload = parse_json(&result.stdout, &result.log_path);
    let rows = payload["storage_classes"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "gold");
    assert_eq!(rows[0]["reclaim_policy"], "Retain");
    assert_eq!(rows[0]["namespaces_bound"][0], "apps");
    assert_eq!(rows[1]["reclaim_policy"], "Delete");
}

#[test]
fn list_pv_reports_claim_state_from_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let snapshot = common::write_cluster_snapshot(dir.path());
    let (config_arg, snapshot_arg) = (
        config.to_string_lossy().to_string(),
        snapshot.to_string_lossy().to_string(),
    );

    let result = common::run_cli_case(
        "list_pv_from_snapshot",
        &["--config", &config_arg, "--json", "list-pv", "--snapshot", &snapshot_arg],
    );
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    let payload = parse_json(&result.stdout, &result.log_path);
    let rows = payload["persistent_volumes"].as_array().expect("rows");
    assert_eq!(rows.len(), 4);

    let bound = &rows[0];
    assert_eq!(bound["name"], "pv-bound");
    assert_eq!(bound["volume_type"], "nfs");
    assert_eq!(bound["location"], "10.0.0.5:/exports/a");
    assert_eq!(bound["bound_claim_exists"], true);

    let gone = rows.iter().find(|r| r["name"] == "pv-gone").expect("pv-gone");
    assert_eq!(gone["bound_claim_exists"], false);
}

#[test]
fn clean_with_snapshot_is_a_dry_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let snapshot = common::write_cluster_snapshot(dir.path());
    let (config_arg, snapshot_arg) = (
        config.to_string_lossy().to_string(),
        snapshot.to_string_lossy().to_string(),
    );

    let result = common::run_cli_case(
        "clean_with_snapshot",
        &["--config", &config_arg, "--json", "clean", "--snapshot", &snapshot_arg],
    );
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    let payload = parse_json(&result.stdout, &result.log_path);
    let report = &payload["report"];
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["storage_classes"]["flagged"], 1);
    assert_eq!(report["storage_classes"]["deleted"], 0);
    assert_eq!(report["persistent_volumes"]["flagged"], 2);
    assert_eq!(report["persistent_volumes"]["retained"], 2);

    let root = dir.path().join("storage-clean");
    let audit = fs::read_to_string(root.join("clean.log")).expect("audit log written");
    assert!(audit.contains("(dry run, nothing changed)"));
    let backups: Vec<_> = fs::read_dir(&root)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .collect();
    assert!(backups.is_empty(), "dry run must not create backup directories");
}

#[test]
fn clean_with_both_passes_skipped_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let snapshot = common::write_cluster_snapshot(dir.path());
    let (config_arg, snapshot_arg) = (
        config.to_string_lossy().to_string(),
        snapshot.to_string_lossy().to_string(),
    );

    let result = common::run_cli_case(
        "clean_both_skipped",
        &[
            "--config",
            &config_arg,
            "clean",
            "--snapshot",
            &snapshot_arg,
            "--skip-storage-classes",
            "--skip-volumes",
        ],
    );
    assert_eq!(
        result.status.code(),
        Some(1),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn env_override_redirects_backup_root() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let snapshot = common::write_cluster_snapshot(dir.path());
    let elsewhere = dir.path().join("elsewhere");
    let (config_arg, snapshot_arg, root_env) = (
        config.to_string_lossy().to_string(),
        snapshot.to_string_lossy().to_string(),
        elsewhere.to_string_lossy().to_string(),
    );

    let result = common::run_cli_case_with_env(
        "env_override_redirects_backup_root",
        &["--config", &config_arg, "--json", "clean", "--snapshot", &snapshot_arg],
        &[("SR_PATHS_ROOT", &root_env)],
    );
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(elsewhere.join("clean.log").is_file());
}

// ──────────────────── classification scenarios ────────────────────

fn pv(name: &str, phase: &str, class: &str, claim: Option<(&str, &str, &str)>) -> PersistentVolume {
    let mut pv = PersistentVolume::new(name, phase);
    pv.spec.storage_class_name = class.to_string();
    pv.spec.claim_ref = claim.map(|(ns, n, uid)| ObjectReference {
        namespace: ns.to_string(),
        name: n.to_string(),
        uid: uid.to_string(),
        ..ObjectReference::default()
    });
    pv
}

fn job(namespace: &str, name: &str, claim: &str) -> Job {
    let mut job = Job {
        metadata: ObjectMeta::namespaced(namespace, name),
        ..Job::default()
    };
    job.spec.template = PodTemplateSpec::with_volumes(vec![Volume::claim("data", claim)]);
    job
}

#[test]
fn unused_storage_class_is_the_one_without_volumes() {
    let classes = vec![
        StorageClass::new("gold", "csi.example.com"),
        StorageClass::new("silver", "csi.example.com"),
    ];
    let volumes = vec![pv("pv1", "Bound", "gold", None)];

    let unused: Vec<&str> = unused_storage_classes(&classes, &volumes)
        .into_iter()
        .map(|sc| sc.metadata.name.as_str())
        .collect();
    assert_eq!(unused, vec!["silver"]);
}

#[test]
fn released_volume_follows_its_claim_uid() {
    let volume = pv("pv1", "Released", "gold", Some(("default", "c1", "u1")));

    let live = StaticInventory::new(InventorySnapshot {
        persistent_volume_claims: vec![PersistentVolumeClaim::new("default", "c1", "u1")],
        ..InventorySnapshot::default()
    });
    assert!(matches!(
        classify(&volume, &live, None).unwrap(),
        Disposition::Retain(RetainReason::ClaimBound { .. })
    ));

    let recreated = StaticInventory::new(InventorySnapshot {
        persistent_volume_claims: vec![PersistentVolumeClaim::new("default", "c1", "u2")],
        ..InventorySnapshot::default()
    });
    assert_eq!(
        classify(&volume, &recreated, None).unwrap(),
        Disposition::Reclaim(ReclaimReason::ClaimUidMismatch)
    );
}

#[test]
fn available_volume_is_reclaimed_whatever_its_claim_ref() {
    let volume = pv("pv2", "Available", "gold", Some(("default", "c1", "u1")));
    let live = StaticInventory::new(InventorySnapshot {
        persistent_volume_claims: vec![PersistentVolumeClaim::new("default", "c1", "u1")],
        ..InventorySnapshot::default()
    });
    assert_eq!(
        classify(&volume, &live, None).unwrap(),
        Disposition::Reclaim(ReclaimReason::Available)
    );
}

#[test]
fn completed_job_stops_referencing_its_claim() {
    let mut workloads = WorkloadSnapshot {
        jobs: vec![job("default", "j1", "c2")],
        ..WorkloadSnapshot::default()
    };
    assert!(is_claim_referenced("default", "c2", &workloads));

    workloads.jobs[0].status.completion_time = Some(Utc::now());
    assert!(!is_claim_referenced("default", "c2", &workloads));
}

#[test]
fn lookup_failure_is_inconclusive() {
    let volume = pv("pv1", "Released", "gold", Some(("default", "c1", "u1")));
    let broken = StaticInventory::default().failing_lookup("default", "c1");
    assert!(matches!(
        classify(&volume, &broken, None),
        Err(ReclaimError::Lookup { .. })
    ));
}

// ──────────────────── full pipeline ────────────────────

struct Harness {
    _dir: tempfile::TempDir,
    context: RunContext,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.root = dir.path().join("storage-clean");
        let started = Local.with_ymd_and_hms(2025, 6, 2, 8, 30, 0).unwrap();
        Self {
            context: RunContext::at(&config, started),
            _dir: dir,
        }
    }

    fn run(&self, client: &StaticInventory, options: ReclaimOptions) -> RunReport {
        let mut logger =
            ActivityLogger::new(AuditLog::new(&self.context.layout.audit_log), None);
        Reclaimer::new(client, &self.context, &mut logger, options, CancelToken::new())
            .run("feedface")
            .expect("run succeeds")
    }

    fn audit(&self) -> String {
        fs::read_to_string(&self.context.layout.audit_log).unwrap_or_default()
    }
}

fn cluster() -> InventorySnapshot {
    InventorySnapshot {
        storage_classes: vec![
            StorageClass::new("gold", "csi.example.com"),
            StorageClass::new("silver", "csi.example.com"),
            StorageClass::new("bronze", "kubernetes.io/no-provisioner"),
        ],
        persistent_volumes: vec![
            pv("pv-bound", "Bound", "gold", Some(("apps", "data", "u1"))),
            pv("pv-avail", "Available", "gold", None),
            pv("pv-live", "Released", "gold", Some(("apps", "data", "u1"))),
            pv("pv-stale", "Released", "gold", Some(("apps", "data", "u0"))),
            pv("pv-orphan", "Released", "gold", Some(("apps", "gone", "u7"))),
        ],
        persistent_volume_claims: vec![PersistentVolumeClaim::new("apps", "data", "u1")],
        workloads: WorkloadSnapshot {
            jobs: vec![job("apps", "migrate", "data")],
            ..WorkloadSnapshot::default()
        },
        ..InventorySnapshot::default()
    }
}

#[test]
fn pipeline_backs_up_before_deleting_every_flagged_resource() {
    let harness = Harness::new();
    let client = StaticInventory::new(cluster());

    let report = harness.run(&client, ReclaimOptions::default());

    assert_eq!(
        client.deleted(),
        vec![
            DeletedObject::StorageClass("silver".to_string()),
            DeletedObject::StorageClass("bronze".to_string()),
            DeletedObject::PersistentVolume("pv-avail".to_string()),
            DeletedObject::PersistentVolume("pv-stale".to_string()),
            DeletedObject::PersistentVolume("pv-orphan".to_string()),
        ]
    );
    assert_eq!(report.reclaimed(), 5);
    assert!(!report.is_partial());

    let layout = &harness.context.layout;
    for name in ["silver", "bronze"] {
        let backup = layout.sc_backup_dir.join(format!("StorageClass-{name}.yaml"));
        let yaml = fs::read_to_string(&backup).expect("storage class backup");
        assert!(yaml.contains("kind: StorageClass"));
        assert!(yaml.contains(&format!("name: {name}")));
    }
    for name in ["pv-avail", "pv-stale", "pv-orphan"] {
        let backup = layout.pv_backup_dir.join(format!("PersistentVolume-{name}.yaml"));
        assert!(backup.is_file(), "missing backup for {name}");
    }

    let audit = harness.audit();
    assert!(audit.contains("deleted and backed up PV: pv-orphan"));
    assert!(audit.contains("used by Job apps/migrate"));
}

#[test]
fn pipeline_dry_run_leaves_cluster_and_disk_untouched() {
    let harness = Harness::new();
    let client = StaticInventory::new(cluster());
    let options = ReclaimOptions {
        dry_run: true,
        ..ReclaimOptions::default()
    };

    let report = harness.run(&client, options);

    assert!(client.deleted().is_empty());
    assert_eq!(report.reclaimed(), 5);
    assert!(!harness.context.layout.sc_backup_dir.exists());
    assert!(!harness.context.layout.pv_backup_dir.exists());
    let pvs = report.persistent_volumes.as_ref().unwrap();
    assert!(pvs.outcomes.iter().all(|o| o.action != Action::Deleted));
}

#[test]
fn second_run_finds_nothing_left_to_reclaim() {
    let harness = Harness::new();
    let client = StaticInventory::new(cluster());

    harness.run(&client, ReclaimOptions::default());
    let again = harness.run(&client, ReclaimOptions::default());

    assert_eq!(again.reclaimed(), 0);
    assert_eq!(client.deleted().len(), 5);
}

#[test]
fn failed_delete_is_reported_and_run_continues() {
    let harness = Harness::new();
    let client = StaticInventory::new(cluster()).failing_delete("pv-stale");

    let report = harness.run(&client, ReclaimOptions::default());

    let pvs = report.persistent_volumes.as_ref().unwrap();
    assert_eq!(pvs.delete_failures, 1);
    assert_eq!(pvs.deleted, 2);
    assert!(report.is_partial());
    assert!(client
        .deleted()
        .contains(&DeletedObject::PersistentVolume("pv-orphan".to_string())));
}

#[test]
fn storage_class_listing_failure_stops_the_run() {
    let harness = Harness::new();
    let client = StaticInventory::new(cluster()).failing_list("storageclasses");
    let mut logger = ActivityLogger::new(AuditLog::new(&harness.context.layout.audit_log), None);

    let err = Reclaimer::new(
        &client,
        &harness.context,
        &mut logger,
        ReclaimOptions::default(),
        CancelToken::new(),
    )
    .run("feedface")
    .unwrap_err();

    assert_eq!(err.code(), "SR-2001");
    assert!(client.deleted().is_empty());
}

#[test]
fn cancelled_run_returns_partial_report_without_deleting() {
    let harness = Harness::new();
    let client = StaticInventory::new(cluster());
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut logger = ActivityLogger::new(AuditLog::new(&harness.context.layout.audit_log), None);

    let report = Reclaimer::new(
        &client,
        &harness.context,
        &mut logger,
        ReclaimOptions::default(),
        cancel,
    )
    .run("feedface")
    .expect("cancellation is not an error");

    assert!(report.cancelled_during.is_some());
    assert!(report.is_partial());
    assert!(client.deleted().is_empty());
}
