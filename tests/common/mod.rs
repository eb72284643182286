#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_sreclaim") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) {
        "sreclaim.exe"
    } else {
        "sreclaim"
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve sreclaim binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, args, &[])
}

/// Run the binary with extra environment. `SR_*` variables inherited from the
/// caller are cleared first so a developer's shell cannot leak into a case.
pub fn run_cli_case_with_env(case_name: &str, args: &[&str], env: &[(&str, &str)]) -> CmdResult {
    let root = std::env::temp_dir().join("sreclaim-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command.args(args).env("RUST_BACKTRACE", "1");
    for (key, _) in std::env::vars() {
        if key.starts_with("SR_") {
            command.env_remove(key);
        }
    }
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command.output().expect("execute sreclaim command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("env={env:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// A `kind: List` snapshot covering both passes:
/// - `gold` is used by volumes, `silver` is not.
/// - `pv-bound` is Bound, `pv-free` is Available.
/// - `pv-kept` is Released with a live claim; `pv-gone`'s claim was deleted.
pub const CLUSTER_SNAPSHOT: &str = r#"{
    "apiVersion": "v1",
    "kind": "List",
    "items": [
        {"apiVersion": "storage.k8s.io/v1", "kind": "StorageClass",
         "metadata": {"name": "gold"}, "provisioner": "csi.example.com",
         "reclaimPolicy": "Retain"},
        {"apiVersion": "storage.k8s.io/v1", "kind": "StorageClass",
         "metadata": {"name": "silver"}, "provisioner": "csi.example.com"},
        {"apiVersion": "v1", "kind": "Namespace",
         "metadata": {"name": "apps", "annotations": {"dophin/storage": "gold, silver"}}},
        {"apiVersion": "v1", "kind": "Node", "metadata": {"name": "node-a"}},
        {"apiVersion": "v1", "kind": "PersistentVolume",
         "metadata": {"name": "pv-bound", "creationTimestamp": "2025-03-01T10:00:00Z"},
         "spec": {"storageClassName": "gold", "capacity": {"storage": "10Gi"},
                  "accessModes": ["ReadWriteOnce"],
                  "nfs": {"server": "10.0.0.5", "path": "/exports/a"},
                  "claimRef": {"namespace": "apps", "name": "data", "uid": "u1"}},
         "status": {"phase": "Bound"}},
        {"apiVersion": "v1", "kind": "PersistentVolume",
         "metadata": {"name": "pv-free"},
         "spec": {"storageClassName": "gold", "hostPath": {"path": "/mnt/free"}},
         "status": {"phase": "Available"}},
        {"apiVersion": "v1", "kind": "PersistentVolume",
         "metadata": {"name": "pv-kept"},
         "spec": {"storageClassName": "gold",
                  "claimRef": {"namespace": "apps", "name": "data", "uid": "u1"}},
         "status": {"phase": "Released"}},
        {"apiVersion": "v1", "kind": "PersistentVolume",
         "metadata": {"name": "pv-gone"},
         "spec": {"storageClassName": "gold",
                  "claimRef": {"namespace": "apps", "name": "old", "uid": "u9"}},
         "status": {"phase": "Released"}},
        {"apiVersion": "v1", "kind": "PersistentVolumeClaim",
         "metadata": {"name": "data", "namespace": "apps", "uid": "u1"}}
    ]
}"#;

/// Write [`CLUSTER_SNAPSHOT`] into `dir` and return its path.
pub fn write_cluster_snapshot(dir: &Path) -> PathBuf {
    let path = dir.join("cluster.json");
    fs::write(&path, CLUSTER_SNAPSHOT).expect("write snapshot fixture");
    path
}
