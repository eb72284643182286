//! Activity events and their fan-out to the audit sinks.
//!
//! Every decision and outcome of a run is one [`ActivityEvent`]. The logger
//! renders it as a text audit line (when the event has one) and as a JSONL
//! entry (when a JSONL sink is configured).

#![allow(missing_docs)]

use crate::classify::volume::{ClaimUsage, ReclaimReason, RetainReason};
use crate::logger::audit::AuditLog;
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use crate::reclaim::backup::BackupRecord;

// ──────────────────── public event type ────────────────────

/// Events recorded during a reclamation run.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    RunStarted {
        run_timestamp: String,
        config_hash: String,
        dry_run: bool,
    },
    RunCompleted {
        reclaimed: usize,
        failures: usize,
        dry_run: bool,
    },
    /// A pass stopped because its inventory could not be listed.
    PassFailed {
        kind: &'static str,
        code: String,
        message: String,
    },
    RunCancelled {
        stage: String,
    },
    StorageClassUnused {
        name: String,
        dry_run: bool,
    },
    VolumeFlagged {
        name: String,
        reason: ReclaimReason,
        /// `namespace/name` of the recorded claim.
        claim: Option<String>,
        dry_run: bool,
    },
    BackupWritten {
        record: BackupRecord,
    },
    BackupFailed {
        kind: &'static str,
        name: String,
        code: String,
        message: String,
    },
    Deleted {
        kind: &'static str,
        name: String,
        backed_up: bool,
    },
    DeleteFailed {
        kind: &'static str,
        name: String,
        code: String,
        message: String,
    },
    VolumeRetained {
        name: String,
        reason: RetainReason,
    },
    /// Flagged now, but absent from the plan the operator confirmed.
    Unconfirmed {
        kind: &'static str,
        name: String,
    },
    LookupFailed {
        volume: String,
        claim: String,
        code: String,
        message: String,
    },
    /// Workloads could not be listed; claim usage is reported as unknown.
    UsageUnavailable {
        code: String,
        message: String,
    },
}

impl ActivityEvent {
    /// Text rendered into the audit log, if the event has one.
    #[must_use]
    pub fn audit_line(&self) -> Option<String> {
        let line = match self {
            Self::RunStarted { dry_run, .. } => {
                if *dry_run {
                    "starting storage reclamation run (dry run)".to_string()
                } else {
                    "starting storage reclamation run".to_string()
                }
            }
            Self::RunCompleted { .. } => "storage reclamation complete".to_string(),
            Self::PassFailed { kind, message, .. } => {
                format!("{kind} cleanup failed: {message}")
            }
            Self::RunCancelled { stage } => format!("run cancelled during {stage}"),
            Self::StorageClassUnused { name, dry_run } => {
                let line = format!("preparing to delete unused StorageClass: {name}");
                with_dry_run(line, *dry_run)
            }
            Self::VolumeFlagged {
                name,
                reason,
                claim,
                dry_run,
            } => {
                let claim = claim.as_deref().unwrap_or("");
                let line = match reason {
                    ReclaimReason::Available => {
                        format!("PV {name} phase is Available, preparing to delete and back up")
                    }
                    ReclaimReason::ReleasedWithoutClaimRef => {
                        format!("PV {name} phase is Released but has no claimRef, deleting directly")
                    }
                    ReclaimReason::ClaimMissing => {
                        format!("PVC {claim} not found, preparing to delete PV {name}")
                    }
                    ReclaimReason::ClaimUidMismatch => format!(
                        "PVC {claim} exists but its UID does not match, preparing to delete PV {name}"
                    ),
                };
                with_dry_run(line, *dry_run)
            }
            Self::BackupWritten { .. } => return None,
            Self::BackupFailed {
                kind,
                name,
                message,
                ..
            } => format!("failed to back up {} {name}: {message}", kind_label(kind)),
            Self::Deleted {
                kind,
                name,
                backed_up,
            } => {
                if *backed_up {
                    format!("deleted and backed up {}: {name}", kind_label(kind))
                } else {
                    format!("deleted {} without backup: {name}", kind_label(kind))
                }
            }
            Self::DeleteFailed {
                kind,
                name,
                message,
                ..
            } => format!("failed to delete {} {name}: {message}", kind_label(kind)),
            Self::VolumeRetained { name, reason } => match reason {
                RetainReason::ClaimBound { usage } => {
                    let base = format!("PV {name} is in use by PVC, skipping deletion");
                    match usage {
                        ClaimUsage::Unknown => base,
                        ClaimUsage::Unreferenced => {
                            format!("{base} (no workload references the claim)")
                        }
                        ClaimUsage::ReferencedBy(w) => format!("{base} (used by {w})"),
                    }
                }
                RetainReason::Phase { phase } => {
                    format!("PV {name} phase is {phase}, skipping deletion")
                }
            },
            Self::Unconfirmed { kind, name } => format!(
                "{} {name} was not in the confirmed plan, skipping deletion",
                kind_label(kind)
            ),
            Self::LookupFailed {
                volume,
                claim,
                message,
                ..
            } => format!("failed to get PVC {claim}: {message}; skipping PV {volume}"),
            Self::UsageUnavailable { message, .. } => {
                format!("workload listing failed, continuing without claim usage: {message}")
            }
        };
        Some(line)
    }
}

/// Short label used in audit lines.
fn kind_label(kind: &str) -> &str {
    match kind {
        "PersistentVolume" => "PV",
        other => other,
    }
}

fn with_dry_run(line: String, dry_run: bool) -> String {
    if dry_run {
        format!("{line} (dry run, nothing changed)")
    } else {
        line
    }
}

// ──────────────────── logger ────────────────────

/// Fans events out to the text audit log and the optional JSONL sink.
pub struct ActivityLogger {
    audit: Option<AuditLog>,
    jsonl: Option<JsonlWriter>,
    echo: bool,
}

impl ActivityLogger {
    #[must_use]
    pub fn new(audit: AuditLog, jsonl: Option<JsonlConfig>) -> Self {
        Self {
            audit: Some(audit),
            jsonl: jsonl.map(JsonlWriter::open),
            echo: false,
        }
    }

    /// Logger that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            audit: None,
            jsonl: None,
            echo: false,
        }
    }

    /// Also print each audit line to stderr.
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn record(&mut self, event: &ActivityEvent) {
        if let Some(line) = event.audit_line() {
            if let Some(audit) = &self.audit {
                audit.log(&line);
            }
            if self.echo {
                eprintln!("{line}");
            }
        }
        if let Some(jsonl) = self.jsonl.as_mut() {
            jsonl.write_entry(&event_to_log_entry(event));
        }
    }

    pub fn flush(&mut self) {
        if let Some(jsonl) = self.jsonl.as_mut() {
            jsonl.flush();
        }
    }
}

// ──────────────────── event conversion ────────────────────

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::RunStarted {
            run_timestamp,
            config_hash,
            dry_run,
        } => {
            let mut e = LogEntry::new(EventType::RunStart, Severity::Info);
            e.details = Some(format!(
                "run_timestamp={run_timestamp} config_hash={config_hash}"
            ));
            e.dry_run = Some(*dry_run);
            e
        }
        ActivityEvent::RunCompleted {
            reclaimed,
            failures,
            dry_run,
        } => {
            let mut e = LogEntry::new(EventType::RunComplete, Severity::Info);
            e.details = Some(format!("reclaimed={reclaimed} failures={failures}"));
            e.dry_run = Some(*dry_run);
            e.ok = Some(*failures == 0);
            e
        }
        ActivityEvent::PassFailed {
            kind,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::RunFailed, Severity::Critical).failure(code, message);
            e.kind = Some((*kind).to_string());
            e
        }
        ActivityEvent::RunCancelled { stage } => {
            let mut e = LogEntry::new(EventType::RunCancelled, Severity::Warning);
            e.details = Some(format!("stage={stage}"));
            e
        }
        ActivityEvent::StorageClassUnused { name, dry_run } => {
            let mut e = LogEntry::new(EventType::ReclaimPlanned, Severity::Info)
                .resource("StorageClass", name);
            e.reason = Some("unused".to_string());
            e.dry_run = Some(*dry_run);
            e
        }
        ActivityEvent::VolumeFlagged {
            name,
            reason,
            claim,
            dry_run,
        } => {
            let mut e = LogEntry::new(EventType::ReclaimPlanned, Severity::Info)
                .resource("PersistentVolume", name);
            e.reason = Some(reason_code(reason));
            e.claim = claim.clone();
            e.dry_run = Some(*dry_run);
            e
        }
        ActivityEvent::BackupWritten { record } => {
            let mut e = LogEntry::new(EventType::BackupWritten, Severity::Info)
                .resource(&record.kind, &record.name);
            e.path = Some(record.path.display().to_string());
            e.sha256 = Some(record.sha256.clone());
            e.ok = Some(true);
            e
        }
        ActivityEvent::BackupFailed {
            kind,
            name,
            code,
            message,
        } => LogEntry::new(EventType::BackupFailed, Severity::Warning)
            .resource(kind, name)
            .failure(code, message),
        ActivityEvent::Deleted {
            kind,
            name,
            backed_up,
        } => {
            let mut e = LogEntry::new(EventType::ResourceDeleted, Severity::Info).resource(kind, name);
            e.ok = Some(true);
            e.details = Some(format!("backed_up={backed_up}"));
            e
        }
        ActivityEvent::DeleteFailed {
            kind,
            name,
            code,
            message,
        } => LogEntry::new(EventType::DeleteFailed, Severity::Warning)
            .resource(kind, name)
            .failure(code, message),
        ActivityEvent::VolumeRetained { name, reason } => {
            let mut e = LogEntry::new(EventType::ResourceRetained, Severity::Info)
                .resource("PersistentVolume", name);
            e.reason = Some(match reason {
                RetainReason::ClaimBound { .. } => "claim_bound".to_string(),
                RetainReason::Phase { .. } => "phase".to_string(),
            });
            e.details = Some(reason.to_string());
            e
        }
        ActivityEvent::Unconfirmed { kind, name } => {
            let mut e = LogEntry::new(EventType::ResourceSkipped, Severity::Warning)
                .resource(kind, name);
            e.reason = Some("unconfirmed".to_string());
            e
        }
        ActivityEvent::LookupFailed {
            volume,
            claim,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::LookupFailed, Severity::Warning)
                .resource("PersistentVolume", volume)
                .failure(code, message);
            e.claim = Some(claim.clone());
            e
        }
        ActivityEvent::UsageUnavailable { code, message } => {
            LogEntry::new(EventType::UsageUnavailable, Severity::Warning).failure(code, message)
        }
    }
}

fn reason_code(reason: &ReclaimReason) -> String {
    serde_json::to_value(reason)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| reason.to_string())
}
