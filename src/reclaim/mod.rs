//! Backup and deletion of orphaned storage resources.

pub mod backup;
pub mod orchestrator;
