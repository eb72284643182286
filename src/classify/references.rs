//! Workload-to-claim reference resolution.
//!
//! Answers one question: does any workload still mount a given claim? Each
//! workload kind states which claims it names through [`VolumeReferences`];
//! the resolver walks a fixed `(kind, check)` table in order and stops at the
//! first match.

#![allow(missing_docs)]

use std::fmt;

use serde::Serialize;

use crate::inventory::model::{
    CronJob, DaemonSet, Deployment, Job, ObjectMeta, Pod, PodSpec, StatefulSet, Volume,
};
use crate::inventory::snapshot::WorkloadSnapshot;

/// Workload kinds that can hold a claim, in resolver order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WorkloadKind {
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
}

impl WorkloadKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::Job => "Job",
            Self::CronJob => "CronJob",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the workload found referencing a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadRef {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

// ──────────────────── per-kind capability ────────────────────

/// What a workload says about the claims it mounts.
pub trait VolumeReferences {
    fn metadata(&self) -> &ObjectMeta;

    /// Claim names listed directly in the workload's pod volumes.
    fn claim_names(&self) -> Vec<&str>;

    /// Whether this workload references `claim` in `namespace`.
    ///
    /// Default: same namespace and the claim is listed by name.
    fn references_claim(&self, namespace: &str, claim: &str) -> bool {
        self.metadata().namespace_str() == namespace && self.claim_names().contains(&claim)
    }
}

fn claims_in(volumes: &[Volume]) -> Vec<&str> {
    volumes
        .iter()
        .filter_map(|v| v.persistent_volume_claim.as_ref())
        .map(|c| c.claim_name.as_str())
        .collect()
}

fn pod_claims(spec: &PodSpec) -> Vec<&str> {
    claims_in(&spec.volumes)
}

impl VolumeReferences for Pod {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn claim_names(&self) -> Vec<&str> {
        pod_claims(&self.spec)
    }
}

impl VolumeReferences for Deployment {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn claim_names(&self) -> Vec<&str> {
        pod_claims(&self.spec.template.spec)
    }
}

impl VolumeReferences for DaemonSet {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn claim_names(&self) -> Vec<&str> {
        pod_claims(&self.spec.template.spec)
    }
}

impl VolumeReferences for CronJob {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn claim_names(&self) -> Vec<&str> {
        pod_claims(&self.spec.job_template.spec.template.spec)
    }
}

impl VolumeReferences for Job {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn claim_names(&self) -> Vec<&str> {
        pod_claims(&self.spec.template.spec)
    }

    /// A completed Job has released its claims. Running Jobs match in any
    /// namespace.
    fn references_claim(&self, _namespace: &str, claim: &str) -> bool {
        self.status.completion_time.is_none() && self.claim_names().contains(&claim)
    }
}

impl VolumeReferences for StatefulSet {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    /// Claims created from `volumeClaimTemplates` are never listed in the pod
    /// template, so only template names are reported here.
    fn claim_names(&self) -> Vec<&str> {
        self.spec
            .volume_claim_templates
            .iter()
            .map(|t| t.metadata.name.as_str())
            .collect()
    }

    /// Matches claims named `<template>-<statefulset>-<ordinal>` in any
    /// namespace. The ordinal itself is not validated.
    fn references_claim(&self, _namespace: &str, claim: &str) -> bool {
        let Some((base, _ordinal)) = claim.rsplit_once('-') else {
            return false;
        };
        let sts = &self.metadata.name;
        self.claim_names()
            .iter()
            .any(|template| base == format!("{template}-{sts}"))
    }
}

// ──────────────────── ordered resolver ────────────────────

type Check = fn(&WorkloadSnapshot, &str, &str) -> Option<WorkloadRef>;

fn first_match<W: VolumeReferences>(
    kind: WorkloadKind,
    items: &[W],
    namespace: &str,
    claim: &str,
) -> Option<WorkloadRef> {
    items
        .iter()
        .find(|w| w.references_claim(namespace, claim))
        .map(|w| WorkloadRef {
            kind,
            namespace: w.metadata().namespace_str().to_string(),
            name: w.metadata().name.clone(),
        })
}

/// The resolver's check order: Pod, Deployment, StatefulSet, DaemonSet, Job, CronJob.
#[must_use]
pub fn check_order() -> [(WorkloadKind, Check); 6] {
    [
        (WorkloadKind::Pod, |w, ns, c| {
            first_match(WorkloadKind::Pod, &w.pods, ns, c)
        }),
        (WorkloadKind::Deployment, |w, ns, c| {
            first_match(WorkloadKind::Deployment, &w.deployments, ns, c)
        }),
        (WorkloadKind::StatefulSet, |w, ns, c| {
            first_match(WorkloadKind::StatefulSet, &w.stateful_sets, ns, c)
        }),
        (WorkloadKind::DaemonSet, |w, ns, c| {
            first_match(WorkloadKind::DaemonSet, &w.daemon_sets, ns, c)
        }),
        (WorkloadKind::Job, |w, ns, c| {
            first_match(WorkloadKind::Job, &w.jobs, ns, c)
        }),
        (WorkloadKind::CronJob, |w, ns, c| {
            first_match(WorkloadKind::CronJob, &w.cron_jobs, ns, c)
        }),
    ]
}

/// First workload, in check order, that references `namespace/claim`.
#[must_use]
pub fn find_referencer(
    namespace: &str,
    claim: &str,
    workloads: &WorkloadSnapshot,
) -> Option<WorkloadRef> {
    check_order()
        .into_iter()
        .find_map(|(_, check)| check(workloads, namespace, claim))
}

/// Whether any workload references `namespace/claim`.
#[must_use]
pub fn is_claim_referenced(namespace: &str, claim: &str, workloads: &WorkloadSnapshot) -> bool {
    find_referencer(namespace, claim, workloads).is_some()
}
