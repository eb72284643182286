//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use storage_reclaimer::prelude::*;
//! ```

// Core
pub use crate::core::cancel::CancelToken;
pub use crate::core::config::Config;
pub use crate::core::context::RunContext;
pub use crate::core::errors::{ReclaimError, Result};

// Inventory
pub use crate::inventory::client::{InventoryClient, InventoryError};
pub use crate::inventory::kubectl::KubectlInventory;
pub use crate::inventory::memory::StaticInventory;
pub use crate::inventory::snapshot::InventorySnapshot;

// Classification
pub use crate::classify::references::{WorkloadRef, find_referencer, is_claim_referenced};
pub use crate::classify::storage_class::unused_storage_classes;
pub use crate::classify::volume::{Disposition, ReclaimReason, RetainReason, classify};

// Reclamation
pub use crate::reclaim::orchestrator::{ReclaimOptions, Reclaimer, RunReport};

// Logging
pub use crate::logger::activity::ActivityLogger;
pub use crate::logger::audit::AuditLog;
