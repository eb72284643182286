//! Point-in-time YAML backups of resources about to be deleted.
//!
//! Each backup is written to a temporary sibling, fsynced, then renamed to
//! `<Kind>-<Name>.yaml`, so a crash never leaves a truncated document under the
//! final name. Nothing here retries; the caller logs the failure and goes on
//! to attempt the delete.

#![allow(missing_docs)]

use std::any::TypeId;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::inventory::model::{ApiObject, PersistentVolume, PersistentVolumeClaim, StorageClass};

/// Why a backup could not be written.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("cannot determine the kind of {name}")]
    KindResolution { name: String },

    #[error("{name:?} is not usable as a backup file name")]
    InvalidName { name: String },

    #[error("cannot create backup directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot serialize {kind} {name}: {source}")]
    Serialize {
        kind: String,
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot write backup {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BackupError {
    /// Filesystem failures, as opposed to problems with the object itself.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::CreateDir { .. } | Self::Write { .. })
    }
}

/// One backup written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub kind: String,
    pub name: String,
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
}

// ──────────────────── type registry ────────────────────

/// Explicit `(apiVersion, kind)` for Rust types whose decoded objects may lack
/// type metadata (list items often arrive without it).
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    entries: HashMap<TypeId, (&'static str, &'static str)>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry covering every kind the reclaimer backs up.
    #[must_use]
    pub fn with_storage_types() -> Self {
        let mut registry = Self::new();
        registry.register::<StorageClass>("storage.k8s.io/v1", "StorageClass");
        registry.register::<PersistentVolume>("v1", "PersistentVolume");
        registry.register::<PersistentVolumeClaim>("v1", "PersistentVolumeClaim");
        registry
    }

    pub fn register<T: 'static>(&mut self, api_version: &'static str, kind: &'static str) {
        self.entries.insert(TypeId::of::<T>(), (api_version, kind));
    }

    #[must_use]
    pub fn lookup<T: 'static>(&self) -> Option<(&'static str, &'static str)> {
        self.entries.get(&TypeId::of::<T>()).copied()
    }

    /// `(apiVersion, kind)` for `object`: its own type metadata first, the
    /// registry for whatever it lacks.
    pub fn resolve<T: ApiObject + 'static>(
        &self,
        object: &T,
    ) -> Result<(String, String), BackupError> {
        let (api_version, kind) = object.type_meta();
        let registered = self.lookup::<T>();

        let kind = if kind.is_empty() {
            registered.map(|(_, k)| k.to_string())
        } else {
            Some(kind.to_string())
        };
        let api_version = if api_version.is_empty() {
            registered.map(|(v, _)| v.to_string())
        } else {
            Some(api_version.to_string())
        };

        match (api_version, kind) {
            (Some(api_version), Some(kind)) => Ok((api_version, kind)),
            _ => Err(BackupError::KindResolution {
                name: object.name().to_string(),
            }),
        }
    }
}

// ──────────────────── writer ────────────────────

/// Serialize `object` as YAML into `destination_dir/<Kind>-<Name>.yaml`.
///
/// The directory is created if absent. The written document always carries
/// `apiVersion` and `kind`, even when the inventory omitted them.
pub fn backup<T>(
    object: &T,
    destination_dir: &Path,
    registry: &TypeRegistry,
) -> Result<BackupRecord, BackupError>
where
    T: ApiObject + Serialize + Clone + 'static,
{
    let name = object.name();
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(BackupError::InvalidName {
            name: name.to_string(),
        });
    }

    let (api_version, kind) = registry.resolve(object)?;
    let mut document = object.clone();
    document.set_type_meta(&api_version, &kind);

    let yaml = serde_yaml::to_string(&document).map_err(|source| BackupError::Serialize {
        kind: kind.clone(),
        name: name.to_string(),
        source,
    })?;

    fs::create_dir_all(destination_dir).map_err(|source| BackupError::CreateDir {
        path: destination_dir.to_path_buf(),
        source,
    })?;

    let path = destination_dir.join(format!("{kind}-{name}.yaml"));
    write_atomic(&path, yaml.as_bytes()).map_err(|source| BackupError::Write {
        path: path.clone(),
        source,
    })?;

    Ok(BackupRecord {
        kind,
        name: name.to_string(),
        path,
        sha256: format!("{:x}", Sha256::digest(yaml.as_bytes())),
        bytes: yaml.len() as u64,
    })
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| -> io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
