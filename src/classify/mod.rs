//! Pure classifiers: which StorageClasses and PersistentVolumes are orphaned,
//! and which workloads still hold a claim.

pub mod references;
pub mod storage_class;
pub mod volume;
