//! Point-in-time inventory snapshots.
//!
//! An [`InventorySnapshot`] can be decoded from the `kind: List` document that
//! `kubectl get storageclasses,persistentvolumes,... -A -o json` prints, which
//! makes offline planning against a captured cluster state possible.

#![allow(missing_docs)]

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::errors::{ReclaimError, Result};
use crate::inventory::model::{
    CronJob, DaemonSet, Deployment, Job, Namespace, Node, PersistentVolume, PersistentVolumeClaim,
    Pod, StatefulSet, StorageClass,
};

/// Every workload kind that can hold a claim, as listed at one moment.
#[derive(Debug, Clone, Default)]
pub struct WorkloadSnapshot {
    pub pods: Vec<Pod>,
    pub deployments: Vec<Deployment>,
    pub daemon_sets: Vec<DaemonSet>,
    pub stateful_sets: Vec<StatefulSet>,
    pub jobs: Vec<Job>,
    pub cron_jobs: Vec<CronJob>,
}

impl WorkloadSnapshot {
    /// Total number of workloads across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pods.len()
            + self.deployments.len()
            + self.daemon_sets.len()
            + self.stateful_sets.len()
            + self.jobs.len()
            + self.cron_jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Full inventory as seen at one moment.
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    pub storage_classes: Vec<StorageClass>,
    pub persistent_volumes: Vec<PersistentVolume>,
    pub persistent_volume_claims: Vec<PersistentVolumeClaim>,
    pub workloads: WorkloadSnapshot,
    pub nodes: Vec<Node>,
    pub namespaces: Vec<Namespace>,
}

#[derive(Deserialize)]
struct RawList {
    #[serde(default)]
    items: Vec<Value>,
}

impl InventorySnapshot {
    /// Load a snapshot from a JSON list file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ReclaimError::io(path, source))?;
        Self::from_list_json(&raw)
    }

    /// Decode a `kind: List` document whose items may be of mixed kinds.
    ///
    /// Items of kinds the reclaimer does not use are ignored. An item without a
    /// `kind` field is rejected, since it cannot be routed.
    pub fn from_list_json(raw: &str) -> Result<Self> {
        let list: RawList = serde_json::from_str(raw)?;
        let mut snapshot = Self::default();

        for (index, item) in list.items.into_iter().enumerate() {
            let kind = item
                .get("kind")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ReclaimError::Serialization {
                    context: "snapshot",
                    details: format!("item {index} has no kind"),
                })?;

            match kind.as_str() {
                "StorageClass" => snapshot.storage_classes.push(decode(item)?),
                "PersistentVolume" => snapshot.persistent_volumes.push(decode(item)?),
                "PersistentVolumeClaim" => snapshot.persistent_volume_claims.push(decode(item)?),
                "Pod" => snapshot.workloads.pods.push(decode(item)?),
                "Deployment" => snapshot.workloads.deployments.push(decode(item)?),
                "DaemonSet" => snapshot.workloads.daemon_sets.push(decode(item)?),
                "StatefulSet" => snapshot.workloads.stateful_sets.push(decode(item)?),
                "Job" => snapshot.workloads.jobs.push(decode(item)?),
                "CronJob" => snapshot.workloads.cron_jobs.push(decode(item)?),
                "Node" => snapshot.nodes.push(decode(item)?),
                "Namespace" => snapshot.namespaces.push(decode(item)?),
                _ => {}
            }
        }

        Ok(snapshot)
    }
}

fn decode<T: DeserializeOwned>(item: Value) -> Result<T> {
    Ok(serde_json::from_value(item)?)
}
