//! Per-run state captured once at startup and passed explicitly.

#![allow(missing_docs)]

use chrono::{DateTime, Local};

use crate::core::config::Config;
use crate::core::paths::RunLayout;
use crate::reclaim::backup::TypeRegistry;

/// Format of the run timestamp embedded in backup directory names.
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

/// Everything a run shares: its timestamp, output layout and type registry.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub started_at: DateTime<Local>,
    pub run_timestamp: String,
    pub layout: RunLayout,
    pub registry: TypeRegistry,
}

impl RunContext {
    /// Context stamped with the current local time.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::at(config, Local::now())
    }

    #[must_use]
    pub fn at(config: &Config, started_at: DateTime<Local>) -> Self {
        let run_timestamp = started_at.format(RUN_TIMESTAMP_FORMAT).to_string();
        Self {
            layout: RunLayout::new(config, &run_timestamp),
            registry: TypeRegistry::with_storage_types(),
            started_at,
            run_timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn timestamp_drives_backup_directory_names() {
        let mut config = Config::default();
        config.paths.root = "/nonexistent/sr".into();
        let started = Local.with_ymd_and_hms(2025, 3, 1, 9, 5, 7).unwrap();

        let ctx = RunContext::at(&config, started);
        assert_eq!(ctx.run_timestamp, "2025-03-01-09:05:07");
        assert!(ctx.layout.sc_backup_dir.ends_with("sc2025-03-01-09:05:07"));
        assert!(ctx.layout.pv_backup_dir.ends_with("pv2025-03-01-09:05:07"));
        assert!(ctx.registry.lookup::<crate::inventory::model::StorageClass>().is_some());
    }
}
