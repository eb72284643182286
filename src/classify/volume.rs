//! PersistentVolume disposition.
//!
//! | Phase      | claimRef | Claim lookup        | Decision |
//! |------------|----------|---------------------|----------|
//! | Available  | any      | not consulted       | Reclaim  |
//! | Released   | absent   | not consulted       | Reclaim  |
//! | Released   | present  | not found           | Reclaim  |
//! | Released   | present  | found, uid differs  | Reclaim  |
//! | Released   | present  | found, uid matches  | Retain   |
//! | any other  | any      | not consulted       | Retain   |
//!
//! The workload snapshot never changes a decision. It is only consulted for a
//! retained, still-bound claim so the audit trail can say who uses it.

#![allow(missing_docs)]

use std::fmt;

use serde::Serialize;

use crate::classify::references::{WorkloadRef, find_referencer};
use crate::core::errors::{ReclaimError, Result};
use crate::inventory::client::ClaimLookup;
use crate::inventory::model::{PersistentVolume, VolumePhase};
use crate::inventory::snapshot::WorkloadSnapshot;

/// Why a volume is flagged for reclaim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimReason {
    Available,
    ReleasedWithoutClaimRef,
    ClaimMissing,
    ClaimUidMismatch,
}

/// Workload usage of a retained claim, as far as it is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClaimUsage {
    /// No workload snapshot was available.
    Unknown,
    Unreferenced,
    ReferencedBy(WorkloadRef),
}

/// Why a volume is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RetainReason {
    /// Released, but its claim still exists with the recorded uid.
    ClaimBound { usage: ClaimUsage },
    /// Any phase other than Available or Released.
    Phase { phase: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "detail", rename_all = "snake_case")]
pub enum Disposition {
    Reclaim(ReclaimReason),
    Retain(RetainReason),
}

impl Disposition {
    #[must_use]
    pub const fn is_reclaim(&self) -> bool {
        matches!(self, Self::Reclaim(_))
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reclaim(reason) => fmt::Display::fmt(reason, f),
            Self::Retain(reason) => fmt::Display::fmt(reason, f),
        }
    }
}

impl fmt::Display for ReclaimReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Available => "phase is Available",
            Self::ReleasedWithoutClaimRef => "Released without claimRef",
            Self::ClaimMissing => "claim not found",
            Self::ClaimUidMismatch => "claim uid mismatch",
        })
    }
}

impl fmt::Display for RetainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClaimBound { usage } => match usage {
                ClaimUsage::Unknown => f.write_str("claim still bound"),
                ClaimUsage::Unreferenced => {
                    f.write_str("claim still bound, no workload references it")
                }
                ClaimUsage::ReferencedBy(workload) => {
                    write!(f, "claim still bound, used by {workload}")
                }
            },
            Self::Phase { phase } => write!(f, "phase is {phase}"),
        }
    }
}

/// Decide whether `pv` should be reclaimed.
///
/// The claim is looked up only for a Released volume with a claimRef. A
/// lookup failure other than "not found" is inconclusive and returned as
/// [`ReclaimError::Lookup`]; the caller must skip the volume.
///
/// An empty `claimRef.uid` records no identity and never counts as a mismatch.
pub fn classify<L: ClaimLookup + ?Sized>(
    pv: &PersistentVolume,
    claims: &L,
    workloads: Option<&WorkloadSnapshot>,
) -> Result<Disposition> {
    match pv.phase() {
        VolumePhase::Available => Ok(Disposition::Reclaim(ReclaimReason::Available)),
        VolumePhase::Released => {
            let Some(claim_ref) = pv.claim_ref() else {
                return Ok(Disposition::Reclaim(ReclaimReason::ReleasedWithoutClaimRef));
            };

            let found = claims
                .find_claim(&claim_ref.namespace, &claim_ref.name)
                .map_err(|source| ReclaimError::Lookup {
                    namespace: claim_ref.namespace.clone(),
                    name: claim_ref.name.clone(),
                    source,
                })?;

            let Some(claim) = found else {
                return Ok(Disposition::Reclaim(ReclaimReason::ClaimMissing));
            };

            if !claim_ref.uid.is_empty() && claim_ref.uid != claim.metadata.uid {
                return Ok(Disposition::Reclaim(ReclaimReason::ClaimUidMismatch));
            }

            let usage = workloads.map_or(ClaimUsage::Unknown, |w| {
                find_referencer(&claim_ref.namespace, &claim_ref.name, w)
                    .map_or(ClaimUsage::Unreferenced, ClaimUsage::ReferencedBy)
            });
            Ok(Disposition::Retain(RetainReason::ClaimBound { usage }))
        }
        other => Ok(Disposition::Retain(RetainReason::Phase {
            phase: other.to_string(),
        })),
    }
}
