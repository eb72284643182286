//! On-disk layout of one reclamation run.

use std::env;
use std::path::{Component, Path, PathBuf};

use crate::core::config::Config;

/// Directories and files a run writes to.
///
/// ```text
/// <root>/sc<RUN_TIMESTAMP>/<Kind>-<Name>.yaml
/// <root>/pv<RUN_TIMESTAMP>/<Kind>-<Name>.yaml
/// <root>/clean.log
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    /// Absolute root every other entry lives under, except the JSONL log.
    pub root: PathBuf,
    /// StorageClass backups of this run.
    pub sc_backup_dir: PathBuf,
    /// PersistentVolume backups of this run.
    pub pv_backup_dir: PathBuf,
    /// Text audit log, shared by every run under `root`.
    pub audit_log: PathBuf,
    /// Structured JSONL log, when configured.
    pub jsonl_log: Option<PathBuf>,
}

impl RunLayout {
    /// Layout for the run stamped `run_timestamp`. Nothing is created on disk.
    #[must_use]
    pub fn new(config: &Config, run_timestamp: &str) -> Self {
        let root = resolve_absolute_path(&config.paths.root);
        Self {
            sc_backup_dir: root.join(format!("sc{run_timestamp}")),
            pv_backup_dir: root.join(format!("pv{run_timestamp}")),
            audit_log: root.join(&config.paths.audit_log),
            jsonl_log: config.paths.jsonl_log.as_deref().map(resolve_absolute_path),
            root,
        }
    }
}

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks.
/// Otherwise the path is made absolute relative to CWD and `..`/`.` components
/// are resolved syntactically; the root usually does not exist before the
/// first run.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
