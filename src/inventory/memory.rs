//! In-memory inventory backed by an [`InventorySnapshot`].
//!
//! Used for offline planning (`--snapshot`) and for tests. Deletes remove the
//! object from the snapshot, so a second pass over the same inventory sees the
//! effect of the first. Failures can be injected per resource, per claim and
//! per deleted object.

#![allow(missing_docs)]

use std::cell::RefCell;
use std::collections::BTreeSet;

use crate::inventory::client::{InventoryClient, InventoryError};
use crate::inventory::model::{
    CronJob, DaemonSet, Deployment, Job, Namespace, Node, PersistentVolume, PersistentVolumeClaim,
    Pod, StatefulSet, StorageClass,
};
use crate::inventory::snapshot::InventorySnapshot;

type InventoryResult<T> = std::result::Result<T, InventoryError>;

/// Deletion issued against a [`StaticInventory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletedObject {
    StorageClass(String),
    PersistentVolume(String),
}

#[derive(Debug, Default)]
struct Faults {
    lists: BTreeSet<&'static str>,
    lookups: BTreeSet<(String, String)>,
    deletes: BTreeSet<String>,
}

/// Snapshot-backed [`InventoryClient`].
#[derive(Debug, Default)]
pub struct StaticInventory {
    snapshot: RefCell<InventorySnapshot>,
    faults: Faults,
    deleted: RefCell<Vec<DeletedObject>>,
}

impl StaticInventory {
    #[must_use]
    pub fn new(snapshot: InventorySnapshot) -> Self {
        Self {
            snapshot: RefCell::new(snapshot),
            ..Self::default()
        }
    }

    /// Make every listing of `resource` fail (`"storageclasses"`, `"pods"`, ...).
    #[must_use]
    pub fn failing_list(mut self, resource: &'static str) -> Self {
        self.faults.lists.insert(resource);
        self
    }

    /// Make the lookup of one claim fail with a non-NotFound error.
    #[must_use]
    pub fn failing_lookup(mut self, namespace: &str, name: &str) -> Self {
        self.faults
            .lookups
            .insert((namespace.to_string(), name.to_string()));
        self
    }

    /// Make deleting the named StorageClass or PersistentVolume fail.
    #[must_use]
    pub fn failing_delete(mut self, name: &str) -> Self {
        self.faults.deletes.insert(name.to_string());
        self
    }

    /// Deletions performed so far, in order.
    #[must_use]
    pub fn deleted(&self) -> Vec<DeletedObject> {
        self.deleted.borrow().clone()
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> InventorySnapshot {
        self.snapshot.borrow().clone()
    }

    fn guard(&self, resource: &'static str) -> InventoryResult<()> {
        if self.faults.lists.contains(resource) {
            return Err(InventoryError::Unavailable {
                details: format!("injected failure listing {resource}"),
            });
        }
        Ok(())
    }

    fn list<T: Clone>(
        &self,
        resource: &'static str,
        select: impl Fn(&InventorySnapshot) -> &Vec<T>,
    ) -> InventoryResult<Vec<T>> {
        self.guard(resource)?;
        Ok(select(&self.snapshot.borrow()).clone())
    }

    fn list_in<T: Clone>(
        &self,
        resource: &'static str,
        namespace: Option<&str>,
        select: impl Fn(&InventorySnapshot) -> &Vec<T>,
        namespace_of: impl Fn(&T) -> &str,
    ) -> InventoryResult<Vec<T>> {
        let items = self.list(resource, select)?;
        Ok(match namespace {
            Some(ns) => items.into_iter().filter(|it| namespace_of(it) == ns).collect(),
            None => items,
        })
    }

    fn check_delete(&self, name: &str) -> InventoryResult<()> {
        if self.faults.deletes.contains(name) {
            return Err(InventoryError::CommandFailed {
                command: format!("delete {name}"),
                status: "injected".to_string(),
                stderr: "forbidden".to_string(),
            });
        }
        Ok(())
    }
}

impl InventoryClient for StaticInventory {
    fn list_storage_classes(&self) -> InventoryResult<Vec<StorageClass>> {
        self.list("storageclasses", |s| &s.storage_classes)
    }

    fn list_persistent_volumes(&self) -> InventoryResult<Vec<PersistentVolume>> {
        self.list("persistentvolumes", |s| &s.persistent_volumes)
    }

    fn list_persistent_volume_claims(
        &self,
        namespace: Option<&str>,
    ) -> InventoryResult<Vec<PersistentVolumeClaim>> {
        self.list_in(
            "persistentvolumeclaims",
            namespace,
            |s| &s.persistent_volume_claims,
            |c| c.metadata.namespace_str(),
        )
    }

    fn list_pods(&self, namespace: Option<&str>) -> InventoryResult<Vec<Pod>> {
        self.list_in("pods", namespace, |s| &s.workloads.pods, |w| {
            w.metadata.namespace_str()
        })
    }

    fn list_deployments(&self, namespace: Option<&str>) -> InventoryResult<Vec<Deployment>> {
        self.list_in("deployments", namespace, |s| &s.workloads.deployments, |w| {
            w.metadata.namespace_str()
        })
    }

    fn list_daemon_sets(&self, namespace: Option<&str>) -> InventoryResult<Vec<DaemonSet>> {
        self.list_in("daemonsets", namespace, |s| &s.workloads.daemon_sets, |w| {
            w.metadata.namespace_str()
        })
    }

    fn list_stateful_sets(&self, namespace: Option<&str>) -> InventoryResult<Vec<StatefulSet>> {
        self.list_in(
            "statefulsets",
            namespace,
            |s| &s.workloads.stateful_sets,
            |w| w.metadata.namespace_str(),
        )
    }

    fn list_jobs(&self, namespace: Option<&str>) -> InventoryResult<Vec<Job>> {
        self.list_in("jobs", namespace, |s| &s.workloads.jobs, |w| {
            w.metadata.namespace_str()
        })
    }

    fn list_cron_jobs(&self, namespace: Option<&str>) -> InventoryResult<Vec<CronJob>> {
        self.list_in("cronjobs", namespace, |s| &s.workloads.cron_jobs, |w| {
            w.metadata.namespace_str()
        })
    }

    fn list_nodes(&self) -> InventoryResult<Vec<Node>> {
        self.list("nodes", |s| &s.nodes)
    }

    fn list_namespaces(&self) -> InventoryResult<Vec<Namespace>> {
        self.list("namespaces", |s| &s.namespaces)
    }

    fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> InventoryResult<Option<PersistentVolumeClaim>> {
        if self
            .faults
            .lookups
            .contains(&(namespace.to_string(), name.to_string()))
        {
            return Err(InventoryError::Unavailable {
                details: format!("injected failure reading claim {namespace}/{name}"),
            });
        }
        Ok(self
            .snapshot
            .borrow()
            .persistent_volume_claims
            .iter()
            .find(|c| c.metadata.namespace_str() == namespace && c.metadata.name == name)
            .cloned())
    }

    fn delete_storage_class(&self, name: &str) -> InventoryResult<()> {
        self.check_delete(name)?;
        self.snapshot
            .borrow_mut()
            .storage_classes
            .retain(|sc| sc.metadata.name != name);
        self.deleted
            .borrow_mut()
            .push(DeletedObject::StorageClass(name.to_string()));
        Ok(())
    }

    fn delete_persistent_volume(&self, name: &str) -> InventoryResult<()> {
        self.check_delete(name)?;
        self.snapshot
            .borrow_mut()
            .persistent_volumes
            .retain(|pv| pv.metadata.name != name);
        self.deleted
            .borrow_mut()
            .push(DeletedObject::PersistentVolume(name.to_string()));
        Ok(())
    }
}
