//! Reclamation orchestrator: list, classify, back up, delete, log.
//!
//! Pipeline per pass: fresh inventory listing -> classification -> for each
//! flagged resource: intent line -> backup (failure logged, delete still
//! attempted) -> delete (failure logged, next resource) -> outcome.
//!
//! The StorageClass pass runs first. A listing failure ends the run; every
//! other failure is recorded against its resource and the run continues. The
//! cancel token is checked before each listing and before each resource, so
//! backup plus delete of one resource is never interrupted halfway.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use crate::classify::storage_class::unused_storage_classes;
use crate::classify::volume::{Disposition, classify};
use crate::core::cancel::CancelToken;
use crate::core::config::ReclaimConfig;
use crate::core::context::RunContext;
use crate::core::errors::{ReclaimError, Result};
use crate::inventory::client::{InventoryClient, InventoryError, list_error};
use crate::inventory::model::{ApiObject, PersistentVolume, VolumePhase};
use crate::inventory::snapshot::WorkloadSnapshot;
use crate::logger::activity::{ActivityEvent, ActivityLogger};
use crate::reclaim::backup::{BackupRecord, backup};

pub const KIND_STORAGE_CLASS: &str = "StorageClass";
pub const KIND_PERSISTENT_VOLUME: &str = "PersistentVolume";

/// `(kind, name)` pairs an operator approved for deletion.
pub type ConfirmedSet = BTreeSet<(&'static str, String)>;

// ──────────────────── options ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimOptions {
    /// Classify and log only; nothing is backed up or deleted.
    pub dry_run: bool,
    pub storage_classes: bool,
    pub persistent_volumes: bool,
    /// List workloads once per PV pass to report who still uses a claim.
    pub report_claim_usage: bool,
}

impl Default for ReclaimOptions {
    fn default() -> Self {
        Self::from(&ReclaimConfig::default())
    }
}

impl From<&ReclaimConfig> for ReclaimOptions {
    fn from(config: &ReclaimConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            storage_classes: config.storage_classes,
            persistent_volumes: config.persistent_volumes,
            report_claim_usage: config.report_claim_usage,
        }
    }
}

// ──────────────────── report types ────────────────────

/// Step of the per-resource pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Lookup,
    Backup,
    Delete,
    Usage,
}

/// A single failure record.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub stage: FailureStage,
    pub error_code: String,
    pub error: String,
    pub recoverable: bool,
}

impl FailureRecord {
    fn new(stage: FailureStage, err: &ReclaimError) -> Self {
        Self {
            stage,
            error_code: err.code().to_string(),
            error: err.to_string(),
            recoverable: err.is_retryable(),
        }
    }
}

/// What happened to one classified resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Flagged during a dry run.
    Planned,
    Deleted,
    DeleteFailed,
    Retained,
    /// Classification was inconclusive.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceOutcome {
    pub kind: &'static str,
    pub name: String,
    /// `namespace/name` of the claim recorded on a volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureRecord>,
}

impl ResourceOutcome {
    fn new(kind: &'static str, name: &str, action: Action) -> Self {
        Self {
            kind,
            name: name.to_string(),
            claim: None,
            disposition: None,
            action,
            backup: None,
            failures: Vec::new(),
        }
    }
}

/// Summary of one pass over a resource class.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub kind: &'static str,
    pub inspected: usize,
    pub flagged: usize,
    pub deleted: usize,
    pub delete_failures: usize,
    pub backup_failures: usize,
    pub retained: usize,
    pub skipped: usize,
    /// Workload listing failure; usage was reported as unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_error: Option<FailureRecord>,
    pub cancelled: bool,
    pub outcomes: Vec<ResourceOutcome>,
}

impl PassReport {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inspected: 0,
            flagged: 0,
            deleted: 0,
            delete_failures: 0,
            backup_failures: 0,
            retained: 0,
            skipped: 0,
            usage_error: None,
            cancelled: false,
            outcomes: Vec::new(),
        }
    }

    fn push(&mut self, outcome: ResourceOutcome) {
        match outcome.action {
            Action::Planned => self.flagged += 1,
            Action::Deleted => {
                self.flagged += 1;
                self.deleted += 1;
            }
            Action::DeleteFailed => {
                self.flagged += 1;
                self.delete_failures += 1;
            }
            Action::Retained => self.retained += 1,
            Action::Skipped => self.skipped += 1,
        }
        self.backup_failures += outcome
            .failures
            .iter()
            .filter(|f| f.stage == FailureStage::Backup)
            .count();
        self.outcomes.push(outcome);
    }

    /// Failure records across all outcomes of this pass.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.failures.len()).sum::<usize>()
            + usize::from(self.usage_error.is_some())
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_timestamp: String,
    pub root: String,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_classes: Option<PassReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_volumes: Option<PassReport>,
    /// Stage at which a cancellation stopped the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_during: Option<String>,
    pub duration_ms: u64,
}

impl RunReport {
    fn passes(&self) -> impl Iterator<Item = &PassReport> {
        self.storage_classes
            .iter()
            .chain(self.persistent_volumes.iter())
    }

    /// Resources deleted, or flagged during a dry run.
    #[must_use]
    pub fn reclaimed(&self) -> usize {
        self.passes()
            .map(|p| if self.dry_run { p.flagged } else { p.deleted })
            .sum()
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.passes().map(PassReport::failure_count).sum()
    }

    /// `(kind, name)` of every resource flagged during a dry run.
    #[must_use]
    pub fn planned(&self) -> ConfirmedSet {
        self.passes()
            .flat_map(|p| &p.outcomes)
            .filter(|o| o.action == Action::Planned)
            .map(|o| (o.kind, o.name.clone()))
            .collect()
    }

    /// Some resource was skipped or failed, or the run was cancelled.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.cancelled_during.is_some() || self.passes().any(|p| p.failure_count() > 0)
    }
}

// ──────────────────── orchestrator ────────────────────

/// Drives both reclamation passes against one inventory.
pub struct Reclaimer<'a, C: InventoryClient + ?Sized> {
    client: &'a C,
    context: &'a RunContext,
    logger: &'a mut ActivityLogger,
    options: ReclaimOptions,
    cancel: CancelToken,
    confirmed: Option<ConfirmedSet>,
}

impl<'a, C: InventoryClient + ?Sized> Reclaimer<'a, C> {
    pub fn new(
        client: &'a C,
        context: &'a RunContext,
        logger: &'a mut ActivityLogger,
        options: ReclaimOptions,
        cancel: CancelToken,
    ) -> Self {
        Self {
            client,
            context,
            logger,
            options,
            cancel,
            confirmed: None,
        }
    }

    /// Restrict deletion to resources the operator confirmed. Anything the
    /// fresh listing flags beyond that set is skipped and logged.
    #[must_use]
    pub fn with_confirmed(mut self, confirmed: ConfirmedSet) -> Self {
        self.confirmed = Some(confirmed);
        self
    }

    /// Run the enabled passes.
    ///
    /// Returns `Err` only when the root directory cannot be created or a
    /// listing fails. Cancellation ends the run early with a partial report.
    pub fn run(&mut self, config_hash: &str) -> Result<RunReport> {
        let start = Instant::now();
        let context = self.context;
        let root = &context.layout.root;
        fs::create_dir_all(root).map_err(|e| ReclaimError::io(root, e))?;

        self.logger.record(&ActivityEvent::RunStarted {
            run_timestamp: context.run_timestamp.clone(),
            config_hash: config_hash.to_string(),
            dry_run: self.options.dry_run,
        });

        let mut report = RunReport {
            run_timestamp: context.run_timestamp.clone(),
            root: root.display().to_string(),
            dry_run: self.options.dry_run,
            storage_classes: None,
            persistent_volumes: None,
            cancelled_during: None,
            duration_ms: 0,
        };

        if self.options.storage_classes {
            let pass = self.guarded_pass(KIND_STORAGE_CLASS, Self::reclaim_storage_classes);
            match pass {
                Ok(pass) => {
                    let cancelled = pass.cancelled;
                    report.storage_classes = Some(pass);
                    if cancelled {
                        return Ok(self.finish_cancelled(report, "storage class reclamation", start));
                    }
                }
                Err(PassError::Cancelled(stage)) => {
                    return Ok(self.finish_cancelled(report, stage, start));
                }
                Err(PassError::Failed(err)) => return Err(err),
            }
        }

        if self.options.persistent_volumes {
            let pass = self.guarded_pass(KIND_PERSISTENT_VOLUME, Self::reclaim_persistent_volumes);
            match pass {
                Ok(pass) => {
                    let cancelled = pass.cancelled;
                    report.persistent_volumes = Some(pass);
                    if cancelled {
                        return Ok(self.finish_cancelled(
                            report,
                            "persistent volume reclamation",
                            start,
                        ));
                    }
                }
                Err(PassError::Cancelled(stage)) => {
                    return Ok(self.finish_cancelled(report, stage, start));
                }
                Err(PassError::Failed(err)) => return Err(err),
            }
        }

        report.duration_ms = elapsed_ms(start);
        self.logger.record(&ActivityEvent::RunCompleted {
            reclaimed: report.reclaimed(),
            failures: report.failure_count(),
            dry_run: self.options.dry_run,
        });
        self.logger.flush();
        Ok(report)
    }

    /// StorageClasses that no PersistentVolume names are backed up into the
    /// run's `sc<timestamp>` directory and deleted.
    pub fn reclaim_storage_classes(&mut self) -> Result<PassReport> {
        self.cancel.check("storage class listing")?;
        let classes = self
            .client
            .list_storage_classes()
            .map_err(list_error("storageclasses"))?;
        self.cancel.check("storage class listing")?;
        let volumes = self
            .client
            .list_persistent_volumes()
            .map_err(list_error("persistentvolumes"))?;

        let mut pass = PassReport::new(KIND_STORAGE_CLASS);
        pass.inspected = classes.len();
        let dir = self.context.layout.sc_backup_dir.clone();

        for sc in unused_storage_classes(&classes, &volumes) {
            if self.cancel.is_cancelled() {
                pass.cancelled = true;
                break;
            }
            self.logger.record(&ActivityEvent::StorageClassUnused {
                name: sc.metadata.name.clone(),
                dry_run: self.options.dry_run,
            });
            let outcome = self.reclaim_one(sc, KIND_STORAGE_CLASS, &dir, |client, name| {
                client.delete_storage_class(name)
            });
            pass.push(outcome);
        }
        Ok(pass)
    }

    /// Volumes whose claim is gone, replaced, or never recorded are backed up
    /// into the run's `pv<timestamp>` directory and deleted.
    pub fn reclaim_persistent_volumes(&mut self) -> Result<PassReport> {
        self.cancel.check("persistent volume listing")?;
        let volumes = self
            .client
            .list_persistent_volumes()
            .map_err(list_error("persistentvolumes"))?;

        let mut pass = PassReport::new(KIND_PERSISTENT_VOLUME);
        pass.inspected = volumes.len();
        let workloads = self.workloads_for(&volumes, &mut pass)?;
        let dir = self.context.layout.pv_backup_dir.clone();

        for pv in &volumes {
            if self.cancel.is_cancelled() {
                pass.cancelled = true;
                break;
            }
            let outcome = self.reclaim_volume(pv, workloads.as_ref(), &dir);
            pass.push(outcome);
        }
        Ok(pass)
    }

    // ──────────────────── per-resource pipeline ────────────────────

    fn reclaim_volume(
        &mut self,
        pv: &PersistentVolume,
        workloads: Option<&WorkloadSnapshot>,
        dir: &Path,
    ) -> ResourceOutcome {
        let name = pv.metadata.name.as_str();
        let claim = pv
            .claim_ref()
            .map(|r| format!("{}/{}", r.namespace, r.name));

        let disposition = match classify(pv, self.client, workloads) {
            Ok(disposition) => disposition,
            Err(err) => {
                self.logger.record(&ActivityEvent::LookupFailed {
                    volume: name.to_string(),
                    claim: claim.clone().unwrap_or_default(),
                    code: err.code().to_string(),
                    message: lookup_message(&err),
                });
                let mut outcome = ResourceOutcome::new(KIND_PERSISTENT_VOLUME, name, Action::Skipped);
                outcome.claim = claim;
                outcome.failures.push(FailureRecord::new(FailureStage::Lookup, &err));
                return outcome;
            }
        };

        let mut outcome = match &disposition {
            Disposition::Reclaim(reason) => {
                self.logger.record(&ActivityEvent::VolumeFlagged {
                    name: name.to_string(),
                    reason: *reason,
                    claim: claim.clone(),
                    dry_run: self.options.dry_run,
                });
                self.reclaim_one(pv, KIND_PERSISTENT_VOLUME, dir, |client, name| {
                    client.delete_persistent_volume(name)
                })
            }
            Disposition::Retain(reason) => {
                self.logger.record(&ActivityEvent::VolumeRetained {
                    name: name.to_string(),
                    reason: reason.clone(),
                });
                ResourceOutcome::new(KIND_PERSISTENT_VOLUME, name, Action::Retained)
            }
        };
        outcome.claim = claim;
        outcome.disposition = Some(disposition);
        outcome
    }

    /// Backup, then delete. Neither failure stops the other step or the pass.
    fn reclaim_one<T>(
        &mut self,
        object: &T,
        kind: &'static str,
        dir: &Path,
        delete: impl Fn(&C, &str) -> std::result::Result<(), InventoryError>,
    ) -> ResourceOutcome
    where
        T: ApiObject + Serialize + Clone + 'static,
    {
        let name = object.name();
        let unconfirmed = self
            .confirmed
            .as_ref()
            .is_some_and(|set| !set.contains(&(kind, name.to_string())));
        if unconfirmed {
            self.logger.record(&ActivityEvent::Unconfirmed {
                kind,
                name: name.to_string(),
            });
            return ResourceOutcome::new(kind, name, Action::Skipped);
        }
        if self.options.dry_run {
            return ResourceOutcome::new(kind, name, Action::Planned);
        }

        let mut outcome = ResourceOutcome::new(kind, name, Action::Deleted);
        match backup(object, dir, &self.context.registry) {
            Ok(record) => {
                self.logger.record(&ActivityEvent::BackupWritten {
                    record: record.clone(),
                });
                outcome.backup = Some(record);
            }
            Err(source) => {
                let message = source.to_string();
                let err = ReclaimError::from(source);
                self.logger.record(&ActivityEvent::BackupFailed {
                    kind,
                    name: name.to_string(),
                    code: err.code().to_string(),
                    message,
                });
                outcome.failures.push(FailureRecord::new(FailureStage::Backup, &err));
            }
        }

        match delete(self.client, name) {
            Ok(()) => {
                self.logger.record(&ActivityEvent::Deleted {
                    kind,
                    name: name.to_string(),
                    backed_up: outcome.backup.is_some(),
                });
            }
            Err(source) => {
                let message = source.to_string();
                let err = ReclaimError::Delete {
                    resource: kind,
                    name: name.to_string(),
                    source,
                };
                self.logger.record(&ActivityEvent::DeleteFailed {
                    kind,
                    name: name.to_string(),
                    code: err.code().to_string(),
                    message,
                });
                outcome.action = Action::DeleteFailed;
                outcome.failures.push(FailureRecord::new(FailureStage::Delete, &err));
            }
        }
        outcome
    }

    // ──────────────────── helpers ────────────────────

    /// Workloads are listed only when some volume may need a usage verdict,
    /// and only when usage reporting is on. A listing failure is recorded and
    /// the pass goes on without usage information.
    fn workloads_for(
        &mut self,
        volumes: &[PersistentVolume],
        pass: &mut PassReport,
    ) -> Result<Option<WorkloadSnapshot>> {
        let needed = self.options.report_claim_usage
            && volumes
                .iter()
                .any(|pv| pv.phase() == VolumePhase::Released && pv.claim_ref().is_some());
        if !needed {
            return Ok(None);
        }

        self.cancel.check("workload listing")?;
        match self.client.workload_snapshot() {
            Ok(workloads) => Ok(Some(workloads)),
            Err(err) if is_cancellation(&err) => Err(ReclaimError::Cancelled {
                stage: "workload listing",
            }),
            Err(err) => {
                self.logger.record(&ActivityEvent::UsageUnavailable {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                pass.usage_error = Some(FailureRecord::new(FailureStage::Usage, &err));
                Ok(None)
            }
        }
    }

    fn guarded_pass(
        &mut self,
        kind: &'static str,
        pass: fn(&mut Self) -> Result<PassReport>,
    ) -> std::result::Result<PassReport, PassError> {
        match pass(self) {
            Ok(report) => Ok(report),
            Err(ReclaimError::Cancelled { stage }) => Err(PassError::Cancelled(stage)),
            Err(err) if is_cancellation(&err) => Err(PassError::Cancelled(match kind {
                KIND_STORAGE_CLASS => "storage class listing",
                _ => "persistent volume listing",
            })),
            Err(err) => {
                self.logger.record(&ActivityEvent::PassFailed {
                    kind,
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                self.logger.flush();
                Err(PassError::Failed(err))
            }
        }
    }

    fn finish_cancelled(&mut self, mut report: RunReport, stage: &str, start: Instant) -> RunReport {
        self.logger.record(&ActivityEvent::RunCancelled {
            stage: stage.to_string(),
        });
        self.logger.flush();
        report.cancelled_during = Some(stage.to_string());
        report.duration_ms = elapsed_ms(start);
        report
    }
}

enum PassError {
    Cancelled(&'static str),
    Failed(ReclaimError),
}

fn is_cancellation(err: &ReclaimError) -> bool {
    matches!(
        err,
        ReclaimError::Cancelled { .. }
            | ReclaimError::List {
                source: InventoryError::Cancelled,
                ..
            }
    )
}

/// The lookup error without the claim identity the audit line already names.
fn lookup_message(err: &ReclaimError) -> String {
    match err {
        ReclaimError::Lookup { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ──────────────────── tests ────────────────────
