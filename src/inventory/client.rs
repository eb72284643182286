//! The inventory seam: everything the reclaimer needs from a cluster.
//!
//! Listing, claim lookup and deletion go through [`InventoryClient`]. The
//! classifiers never talk to a cluster themselves; they are pure functions of
//! what an implementation returns.

#![allow(missing_docs)]

use std::time::Duration;

use thiserror::Error;

use crate::core::errors::{ReclaimError, Result};
use crate::inventory::model::{
    CronJob, DaemonSet, Deployment, Job, Namespace, Node, PersistentVolume, PersistentVolumeClaim,
    Pod, StatefulSet, StorageClass,
};
use crate::inventory::snapshot::WorkloadSnapshot;

/// Failure talking to the inventory source.
///
/// "Not found" is deliberately absent: a missing claim is an answer
/// (`Ok(None)` from [`ClaimLookup::find_claim`]), not an error.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` did not finish within {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("request cancelled")]
    Cancelled,

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("could not decode output of `{command}`: {details}")]
    Decode { command: String, details: String },

    #[error("inventory unavailable: {details}")]
    Unavailable { details: String },
}

impl InventoryError {
    /// Whether the same request could plausibly succeed on a later run.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::CommandFailed { .. } | Self::Unavailable { .. }
        )
    }
}

/// A source of cluster inventory that can also delete reclaimable objects.
///
/// `namespace: None` means all namespaces.
pub trait InventoryClient {
    fn list_storage_classes(&self) -> std::result::Result<Vec<StorageClass>, InventoryError>;
    fn list_persistent_volumes(
        &self,
    ) -> std::result::Result<Vec<PersistentVolume>, InventoryError>;
    fn list_persistent_volume_claims(
        &self,
        namespace: Option<&str>,
    ) -> std::result::Result<Vec<PersistentVolumeClaim>, InventoryError>;
    fn list_pods(&self, namespace: Option<&str>)
    -> std::result::Result<Vec<Pod>, InventoryError>;
    fn list_deployments(
        &self,
        namespace: Option<&str>,
    ) -> std::result::Result<Vec<Deployment>, InventoryError>;
    fn list_daemon_sets(
        &self,
        namespace: Option<&str>,
    ) -> std::result::Result<Vec<DaemonSet>, InventoryError>;
    fn list_stateful_sets(
        &self,
        namespace: Option<&str>,
    ) -> std::result::Result<Vec<StatefulSet>, InventoryError>;
    fn list_jobs(&self, namespace: Option<&str>)
    -> std::result::Result<Vec<Job>, InventoryError>;
    fn list_cron_jobs(
        &self,
        namespace: Option<&str>,
    ) -> std::result::Result<Vec<CronJob>, InventoryError>;
    fn list_nodes(&self) -> std::result::Result<Vec<Node>, InventoryError>;
    fn list_namespaces(&self) -> std::result::Result<Vec<Namespace>, InventoryError>;

    /// Fetch one claim. `Ok(None)` when the claim does not exist.
    fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<Option<PersistentVolumeClaim>, InventoryError>;

    fn delete_storage_class(&self, name: &str) -> std::result::Result<(), InventoryError>;
    fn delete_persistent_volume(&self, name: &str) -> std::result::Result<(), InventoryError>;

    /// List all six workload kinds cluster-wide.
    fn workload_snapshot(&self) -> Result<WorkloadSnapshot> {
        Ok(WorkloadSnapshot {
            pods: self.list_pods(None).map_err(list_error("pods"))?,
            deployments: self.list_deployments(None).map_err(list_error("deployments"))?,
            daemon_sets: self.list_daemon_sets(None).map_err(list_error("daemonsets"))?,
            stateful_sets: self
                .list_stateful_sets(None)
                .map_err(list_error("statefulsets"))?,
            jobs: self.list_jobs(None).map_err(list_error("jobs"))?,
            cron_jobs: self.list_cron_jobs(None).map_err(list_error("cronjobs"))?,
        })
    }
}

/// Wrap an inventory failure as a listing error for `resource`.
pub fn list_error(resource: &'static str) -> impl Fn(InventoryError) -> ReclaimError {
    move |source| ReclaimError::List { resource, source }
}

/// Claim lookup by `(namespace, name)`, the only query the volume classifier makes.
pub trait ClaimLookup {
    fn find_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<Option<PersistentVolumeClaim>, InventoryError>;
}

impl<C: InventoryClient + ?Sized> ClaimLookup for C {
    fn find_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<Option<PersistentVolumeClaim>, InventoryError> {
        self.get_persistent_volume_claim(namespace, name)
    }
}
