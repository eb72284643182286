//! SR-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::inventory::client::InventoryError;
use crate::reclaim::backup::BackupError;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ReclaimError>;

/// Top-level error type for the storage reclaimer.
#[derive(Debug, Error)]
pub enum ReclaimError {
    #[error("[SR-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SR-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SR-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SR-2001] failed to list {resource}: {source}")]
    List {
        resource: &'static str,
        #[source]
        source: InventoryError,
    },

    #[error("[SR-2002] failed to look up PersistentVolumeClaim {namespace}/{name}: {source}")]
    Lookup {
        namespace: String,
        name: String,
        #[source]
        source: InventoryError,
    },

    #[error("[SR-2003] failed to delete {resource} {name}: {source}")]
    Delete {
        resource: &'static str,
        name: String,
        #[source]
        source: InventoryError,
    },

    #[error("[SR-2101] backup failed: {0}")]
    Backup(#[from] BackupError),

    #[error("[SR-2102] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SR-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SR-3003] audit log write failed at {path}: {source}")]
    AuditLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SR-3004] run cancelled during {stage}")]
    Cancelled { stage: &'static str },

    #[error("[SR-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl ReclaimError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SR-1001",
            Self::MissingConfig { .. } => "SR-1002",
            Self::ConfigParse { .. } => "SR-1003",
            Self::List { .. } => "SR-2001",
            Self::Lookup { .. } => "SR-2002",
            Self::Delete { .. } => "SR-2003",
            Self::Backup(_) => "SR-2101",
            Self::Serialization { .. } => "SR-2102",
            Self::Io { .. } => "SR-3002",
            Self::AuditLog { .. } => "SR-3003",
            Self::Cancelled { .. } => "SR-3004",
            Self::Runtime { .. } => "SR-3900",
        }
    }

    /// Whether a later run might succeed where this one failed.
    ///
    /// Informational only: nothing in the reclaimer retries automatically.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::List { source, .. }
            | Self::Lookup { source, .. }
            | Self::Delete { source, .. } => source.is_transient(),
            Self::Io { .. } | Self::AuditLog { .. } | Self::Runtime { .. } => true,
            Self::Backup(err) => err.is_io(),
            _ => false,
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for ReclaimError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ReclaimError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Serialization {
            context: "serde_yaml",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for ReclaimError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
