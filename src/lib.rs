#![forbid(unsafe_code)]

//! Storage Reclaimer: finds StorageClasses no PersistentVolume uses and
//! PersistentVolumes whose claim is gone, backs each one up as YAML and
//! deletes it.
//!
//! A run has two passes:
//! 1. **StorageClasses** with no volume referencing them are reclaimed.
//! 2. **PersistentVolumes** are reclaimed when their phase is Available, or
//!    when they are Released and their claimRef is absent, names a claim that
//!    no longer exists, or names a claim recreated under a new UID. A Released
//!    volume whose claim still exists with the recorded UID is kept, as is a
//!    volume in any other phase. Workload usage of a kept claim is reported in
//!    the audit trail but never changes the decision.
//!
//! Every deletion is preceded by a backup under the run's timestamped
//! directory and recorded in the audit log.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use storage_reclaimer::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use storage_reclaimer::core::config::Config;
//! use storage_reclaimer::inventory::memory::StaticInventory;
//! ```

pub mod prelude;

pub mod classify;
pub mod core;
pub mod inventory;
pub mod logger;
pub mod reclaim;
pub mod report;
