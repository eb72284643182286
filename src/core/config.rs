//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{ReclaimError, Result};

/// Full reclaimer configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub cluster: ClusterConfig,
    pub reclaim: ReclaimConfig,
    pub report: ReportConfig,
}

/// Where backups and audit logs are written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// Root for backup directories and the text audit log.
    pub root: PathBuf,
    /// File name of the text audit log under `root`.
    pub audit_log: String,
    /// Optional structured JSONL log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsonl_log: Option<PathBuf>,
}

/// How the cluster inventory is reached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterConfig {
    pub kubectl: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub request_timeout_secs: u64,
}

/// Which passes run and whether anything is actually deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReclaimConfig {
    pub dry_run: bool,
    pub storage_classes: bool,
    pub persistent_volumes: bool,
    /// Resolve workload usage of retained claims for audit lines and reports.
    pub report_claim_usage: bool,
}

/// Labels and annotations the inventory reports read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportConfig {
    /// Namespace annotation holding a comma list of bound StorageClasses.
    pub namespace_binding_annotation: String,
    pub shard_local_label_key: String,
    pub shard_local_label_value: String,
    /// Node-affinity key naming the node a local volume lives on.
    pub hostname_key: String,
}

pub const DEFAULT_ROOT: &str = "/data/storage-clean";
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3_600;

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[SR-CONFIG] WARNING: HOME not set, falling back to /tmp for config path");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir
                .join(".config")
                .join("storage-reclaimer")
                .join("config.toml"),
            root: PathBuf::from(DEFAULT_ROOT),
            audit_log: "clean.log".to_string(),
            jsonl_log: None,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubectl: PathBuf::from("kubectl"),
            kubeconfig: None,
            context: None,
            request_timeout_secs: 60,
        }
    }
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            storage_classes: true,
            persistent_volumes: true,
            report_claim_usage: true,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            namespace_binding_annotation: "dophin/storage".to_string(),
            shard_local_label_key: "dolphin.storage/sc-type".to_string(),
            shard_local_label_value: "sig-local".to_string(),
            hostname_key: "kubernetes.io/hostname".to_string(),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf)
                .map_err(|source| ReclaimError::io(&path_buf, source))?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(ReclaimError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the audit trail.
    ///
    /// FNV-1a, so the value is stable across processes and toolchains.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Full path of the text audit log.
    #[must_use]
    pub fn audit_log_path(&self) -> PathBuf {
        self.paths.root.join(&self.paths.audit_log)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // paths
        if let Some(raw) = lookup("SR_PATHS_ROOT") {
            self.paths.root = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SR_PATHS_AUDIT_LOG") {
            self.paths.audit_log = raw;
        }
        if let Some(raw) = lookup("SR_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = Some(PathBuf::from(raw));
        }

        // cluster
        if let Some(raw) = lookup("SR_CLUSTER_KUBECTL") {
            self.cluster.kubectl = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SR_CLUSTER_KUBECONFIG") {
            self.cluster.kubeconfig = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("SR_CLUSTER_CONTEXT") {
            self.cluster.context = Some(raw);
        }
        if let Some(raw) = lookup("SR_CLUSTER_REQUEST_TIMEOUT_SECS") {
            self.cluster.request_timeout_secs =
                parse_env_u64("SR_CLUSTER_REQUEST_TIMEOUT_SECS", &raw)?;
        }

        // reclaim
        for (name, slot) in [
            ("SR_RECLAIM_DRY_RUN", &mut self.reclaim.dry_run),
            ("SR_RECLAIM_STORAGE_CLASSES", &mut self.reclaim.storage_classes),
            (
                "SR_RECLAIM_PERSISTENT_VOLUMES",
                &mut self.reclaim.persistent_volumes,
            ),
            (
                "SR_RECLAIM_REPORT_CLAIM_USAGE",
                &mut self.reclaim.report_claim_usage,
            ),
        ] {
            if let Some(raw) = lookup(name) {
                *slot = parse_env_bool(name, &raw)?;
            }
        }

        Ok(())
    }

    fn normalize_paths(&mut self) {
        let s = self.paths.root.to_string_lossy();
        if s.len() > 1
            && let Some(stripped) = s.strip_suffix('/')
        {
            self.paths.root = PathBuf::from(stripped);
        }
    }

    /// Reject configurations the reclaimer cannot act on.
    pub fn validate(&self) -> Result<()> {
        if self.paths.root.as_os_str().is_empty() {
            return Err(ReclaimError::InvalidConfig {
                details: "paths.root must not be empty".to_string(),
            });
        }

        let audit = &self.paths.audit_log;
        if audit.is_empty() || audit.contains('/') || audit == "." || audit == ".." {
            return Err(ReclaimError::InvalidConfig {
                details: format!("paths.audit_log must be a plain file name, got {audit:?}"),
            });
        }

        if self.cluster.kubectl.as_os_str().is_empty() {
            return Err(ReclaimError::InvalidConfig {
                details: "cluster.kubectl must not be empty".to_string(),
            });
        }

        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.cluster.request_timeout_secs) {
            return Err(ReclaimError::InvalidConfig {
                details: format!(
                    "cluster.request_timeout_secs must be in [1, {MAX_REQUEST_TIMEOUT_SECS}], got {}",
                    self.cluster.request_timeout_secs
                ),
            });
        }

        if !self.reclaim.storage_classes && !self.reclaim.persistent_volumes {
            return Err(ReclaimError::InvalidConfig {
                details: "reclaim.storage_classes and reclaim.persistent_volumes are both disabled"
                    .to_string(),
            });
        }

        for (name, value) in [
            (
                "report.namespace_binding_annotation",
                &self.report.namespace_binding_annotation,
            ),
            ("report.shard_local_label_key", &self.report.shard_local_label_key),
            ("report.hostname_key", &self.report.hostname_key),
        ] {
            if value.trim().is_empty() {
                return Err(ReclaimError::InvalidConfig {
                    details: format!("{name} must not be empty"),
                });
            }
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|error| ReclaimError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.parse::<bool>().map_err(|error| ReclaimError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
