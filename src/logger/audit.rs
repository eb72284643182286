//! Plain-text audit trail: `[YYYY-MM-DD HH:MM:SS] <message>` per line.
//!
//! The file is opened in append mode for every line, so concurrent runs and
//! external rotation never lose more than the line being written. A write
//! failure is reported on stderr and otherwise ignored.

#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::core::errors::{ReclaimError, Result};

pub const AUDIT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only text audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line stamped with the current local time. Never fails.
    pub fn log(&self, message: &str) {
        if let Err(e) = self.try_log_at(Local::now(), message) {
            eprintln!("{e}");
        }
    }

    /// Append one line stamped with `at`.
    pub fn try_log_at(&self, at: DateTime<Local>, message: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ReclaimError::AuditLog {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let line = format_line(at, message);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|source| ReclaimError::AuditLog {
                path: self.path.clone(),
                source,
            })
    }
}

/// One audit line, newline-terminated. Embedded newlines are flattened so each
/// entry stays on one line.
#[must_use]
pub fn format_line(at: DateTime<Local>, message: &str) -> String {
    let flat = message.trim_end().replace(['\r', '\n'], " ");
    format!("[{}] {flat}\n", at.format(AUDIT_TIMESTAMP_FORMAT))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn lines_are_timestamped_and_appended() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("storage-clean").join("clean.log"));
        let at = Local.with_ymd_and_hms(2025, 3, 1, 10, 0, 5).unwrap();

        log.try_log_at(at, "starting storage reclamation run").unwrap();
        log.try_log_at(at, "storage reclamation complete").unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            contents,
            "[2025-03-01 10:00:05] starting storage reclamation run\n\
             [2025-03-01 10:00:05] storage reclamation complete\n"
        );
    }

    #[test]
    fn multiline_messages_stay_on_one_line() {
        let at = Local.with_ymd_and_hms(2025, 3, 1, 10, 0, 5).unwrap();
        assert_eq!(
            format_line(at, "failed: line one\nline two\n"),
            "[2025-03-01 10:00:05] failed: line one line two\n"
        );
    }

    #[test]
    fn unwritable_path_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file").unwrap();

        let log = AuditLog::new(blocker.join("clean.log"));
        let err = log.try_log_at(Local::now(), "x").unwrap_err();
        assert_eq!(err.code(), "SR-3003");

        // The infallible entry point swallows the same failure.
        log.log("x");
    }
}
