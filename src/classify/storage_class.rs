//! StorageClass usage classification.

#![allow(missing_docs)]

use std::collections::HashSet;

use crate::inventory::model::{PersistentVolume, StorageClass};

/// Names of StorageClasses referenced by at least one PersistentVolume.
#[must_use]
pub fn used_storage_class_names(volumes: &[PersistentVolume]) -> HashSet<&str> {
    volumes
        .iter()
        .map(PersistentVolume::storage_class_name)
        .filter(|name| !name.is_empty())
        .collect()
}

/// StorageClasses no PersistentVolume refers to, in list order.
///
/// Only PersistentVolumes count. A class that a provisioner or a pending claim
/// is about to use is still reported as unused.
#[must_use]
pub fn unused_storage_classes<'a>(
    classes: &'a [StorageClass],
    volumes: &[PersistentVolume],
) -> Vec<&'a StorageClass> {
    let used = used_storage_class_names(volumes);
    classes
        .iter()
        .filter(|sc| !used.contains(sc.metadata.name.as_str()))
        .collect()
}
