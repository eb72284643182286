//! Inventory reports: one row per StorageClass or PersistentVolume, rendered as
//! an aligned table or serialized as JSON.

pub mod inventory;
pub mod table;
