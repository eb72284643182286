//! StorageClass and PersistentVolume inventory reports.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::references::{WorkloadRef, find_referencer};
use crate::core::config::ReportConfig;
use crate::core::errors::Result;
use crate::inventory::client::{InventoryClient, list_error};
use crate::inventory::model::{Namespace, PersistentVolume, StorageClass};
use crate::inventory::snapshot::InventorySnapshot;
use crate::report::table::Table;

// ──────────────────── collection ────────────────────

/// StorageClasses and namespaces, as the StorageClass report needs them.
pub fn collect_storage_class_inventory<C: InventoryClient + ?Sized>(
    client: &C,
) -> Result<InventorySnapshot> {
    Ok(InventorySnapshot {
        storage_classes: client
            .list_storage_classes()
            .map_err(list_error("storageclasses"))?,
        namespaces: client.list_namespaces().map_err(list_error("namespaces"))?,
        ..InventorySnapshot::default()
    })
}

/// Volumes, nodes, workloads and claims, as the volume report needs them.
pub fn collect_volume_inventory<C: InventoryClient + ?Sized>(
    client: &C,
) -> Result<InventorySnapshot> {
    Ok(InventorySnapshot {
        persistent_volumes: client
            .list_persistent_volumes()
            .map_err(list_error("persistentvolumes"))?,
        nodes: client.list_nodes().map_err(list_error("nodes"))?,
        workloads: client.workload_snapshot()?,
        persistent_volume_claims: client
            .list_persistent_volume_claims(None)
            .map_err(list_error("persistentvolumeclaims"))?,
        ..InventorySnapshot::default()
    })
}

// ──────────────────── storage classes ────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageClassRow {
    pub name: String,
    pub provisioner: String,
    pub reclaim_policy: String,
    /// Namespaces whose binding annotation lists this class.
    pub namespaces_bound: Vec<String>,
}

#[must_use]
pub fn storage_class_rows(
    classes: &[StorageClass],
    namespaces: &[Namespace],
    config: &ReportConfig,
) -> Vec<StorageClassRow> {
    classes
        .iter()
        .map(|sc| StorageClassRow {
            name: sc.metadata.name.clone(),
            provisioner: sc.provisioner.clone(),
            reclaim_policy: sc.effective_reclaim_policy().to_string(),
            namespaces_bound: namespaces
                .iter()
                .filter(|ns| binds(ns, &config.namespace_binding_annotation, &sc.metadata.name))
                .map(|ns| ns.metadata.name.clone())
                .collect(),
        })
        .collect()
}

fn binds(namespace: &Namespace, annotation: &str, class: &str) -> bool {
    namespace
        .metadata
        .annotations
        .get(annotation)
        .is_some_and(|list| list.split(',').any(|entry| entry.trim() == class))
}

#[must_use]
pub fn storage_class_table(rows: &[StorageClassRow]) -> Table {
    let mut table = Table::new(vec!["NAME", "PROVISIONER", "RECLAIM POLICY", "NAMESPACE BOUND"]);
    for row in rows {
        table.push(vec![
            row.name.clone(),
            row.provisioner.clone(),
            row.reclaim_policy.clone(),
            row.namespaces_bound.join(","),
        ]);
    }
    table
}

// ──────────────────── persistent volumes ────────────────────

/// Backing storage of a volume, from its source descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeType {
    Local,
    /// Local volume labelled as a shard-local disk.
    ShardLocal,
    Ceph,
    Nfs,
    HostPath,
    Unknown,
}

impl VolumeType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::ShardLocal => "shard_local",
            Self::Ceph => "ceph",
            Self::Nfs => "nfs",
            Self::HostPath => "hostpath",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistentVolumeRow {
    pub name: String,
    pub capacity: String,
    pub access_modes: Vec<String>,
    pub reclaim_policy: String,
    pub status: String,
    /// `Kind/namespace/name` of the recorded claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<String>,
    pub storage_class: String,
    pub volume_type: VolumeType,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<u64>,
    /// Whether the node a local volume is pinned to still exists. `None` when
    /// the volume is not pinned by hostname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_exists: Option<bool>,
    /// A claim with the recorded namespace, name and uid exists.
    pub bound_claim_exists: bool,
    pub claim_in_use: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_by: Option<WorkloadRef>,
}

/// One row per volume in `inventory`, in list order.
#[must_use]
pub fn persistent_volume_rows(
    inventory: &InventorySnapshot,
    config: &ReportConfig,
    now: DateTime<Utc>,
) -> Vec<PersistentVolumeRow> {
    let nodes: HashSet<&str> = inventory
        .nodes
        .iter()
        .map(|n| n.metadata.name.as_str())
        .collect();

    inventory
        .persistent_volumes
        .iter()
        .map(|pv| {
            let (volume_type, location, node_exists) = describe_source(pv, config, &nodes);

            let mut claim = None;
            let mut bound_claim_exists = false;
            let mut used_by = None;
            if let Some(r) = pv.claim_ref() {
                let kind = if r.kind.is_empty() {
                    "PersistentVolumeClaim"
                } else {
                    r.kind.as_str()
                };
                claim = Some(format!("{kind}/{}/{}", r.namespace, r.name));
                bound_claim_exists = inventory.persistent_volume_claims.iter().any(|c| {
                    c.metadata.namespace_str() == r.namespace
                        && c.metadata.name == r.name
                        && c.metadata.uid == r.uid
                });
                if bound_claim_exists {
                    used_by = find_referencer(&r.namespace, &r.name, &inventory.workloads);
                }
            }

            PersistentVolumeRow {
                name: pv.metadata.name.clone(),
                capacity: pv.spec.capacity.get("storage").cloned().unwrap_or_default(),
                access_modes: pv.spec.access_modes.clone(),
                reclaim_policy: pv
                    .spec
                    .persistent_volume_reclaim_policy
                    .clone()
                    .unwrap_or_default(),
                status: pv.status.phase.clone(),
                claim,
                storage_class: pv.spec.storage_class_name.clone(),
                volume_type,
                location,
                age_seconds: pv
                    .metadata
                    .creation_timestamp
                    .and_then(|created| u64::try_from((now - created).num_seconds()).ok()),
                node_exists,
                bound_claim_exists,
                claim_in_use: used_by.is_some(),
                used_by,
            }
        })
        .collect()
}

/// Type, location, and (for hostname-pinned local volumes) node existence.
fn describe_source(
    pv: &PersistentVolume,
    config: &ReportConfig,
    nodes: &HashSet<&str>,
) -> (VolumeType, String, Option<bool>) {
    let spec = &pv.spec;
    if let Some(local) = &spec.local {
        let shard = pv
            .metadata
            .labels
            .get(&config.shard_local_label_key)
            .is_some_and(|v| *v == config.shard_local_label_value);
        let volume_type = if shard {
            VolumeType::ShardLocal
        } else {
            VolumeType::Local
        };

        // The last hostname requirement wins.
        let pinned = spec
            .node_affinity
            .as_ref()
            .and_then(|a| a.required.as_ref())
            .into_iter()
            .flat_map(|s| &s.node_selector_terms)
            .flat_map(|t| &t.match_expressions)
            .filter(|req| req.key == config.hostname_key && !req.values.is_empty())
            .last();

        return match pinned {
            Some(req) => (
                volume_type,
                format!("{}:{}", req.values.join(","), local.path),
                Some(req.values.iter().any(|v| nodes.contains(v.as_str()))),
            ),
            None => (volume_type, String::new(), None),
        };
    }
    if let Some(ceph) = &spec.cephfs {
        return (
            VolumeType::Ceph,
            format!("{}:{}", ceph.monitors.join(","), ceph.path),
            None,
        );
    }
    if let Some(nfs) = &spec.nfs {
        return (VolumeType::Nfs, format!("{}:{}", nfs.server, nfs.path), None);
    }
    if let Some(host_path) = &spec.host_path {
        return (VolumeType::HostPath, host_path.path.clone(), None);
    }
    (VolumeType::Unknown, String::new(), None)
}

#[must_use]
pub fn persistent_volume_table(rows: &[PersistentVolumeRow]) -> Table {
    let mut table = Table::new(vec![
        "NAME",
        "CAPACITY",
        "ACCESS MODES",
        "RECLAIM POLICY",
        "STATUS",
        "CLAIM",
        "STORAGECLASS",
        "TYPE",
        "LOCATION",
        "AGE",
        "NODE EXISTS",
        "BOUND PVC EXISTS",
        "PVC IN USE",
    ]);
    for row in rows {
        table.push(vec![
            row.name.clone(),
            row.capacity.clone(),
            row.access_modes.join(","),
            row.reclaim_policy.clone(),
            row.status.clone(),
            row.claim.clone().unwrap_or_default(),
            row.storage_class.clone(),
            row.volume_type.to_string(),
            row.location.clone(),
            row.age_seconds.map(format_age).unwrap_or_default(),
            match row.node_exists {
                Some(true) => "yes".to_string(),
                Some(false) => "no".to_string(),
                None => String::new(),
            },
            row.bound_claim_exists.to_string(),
            row.claim_in_use.to_string(),
        ]);
    }
    table
}

/// Compact age: `45s`, `12m`, `5h3m`, `17d4h`.
#[must_use]
pub fn format_age(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3_600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h{}m", secs / 3_600, (secs % 3_600) / 60)
    } else {
        format!("{}d{}h", secs / 86_400, (secs % 86_400) / 3_600)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::classify::references::WorkloadKind;
    use crate::inventory::memory::StaticInventory;
    use crate::inventory::model::{
        CephFsVolumeSource, HostPathVolumeSource, LocalVolumeSource, NfsVolumeSource, Node,
        NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, ObjectMeta, ObjectReference,
        PersistentVolumeClaim, Pod, PodSpec, Volume, VolumeNodeAffinity,
    };

    fn namespace(name: &str, bound: &str) -> Namespace {
        let mut metadata = ObjectMeta::named(name);
        metadata
            .annotations
            .insert("dophin/storage".to_string(), bound.to_string());
        Namespace { metadata }
    }

    fn local_pv(name: &str, host: &str) -> PersistentVolume {
        let mut pv = PersistentVolume::new(name, "Bound");
        pv.spec.local = Some(LocalVolumeSource {
            path: "/mnt/disks/ssd0".to_string(),
            ..LocalVolumeSource::default()
        });
        pv.spec.node_affinity = Some(VolumeNodeAffinity {
            required: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: vec![NodeSelectorRequirement {
                        key: "kubernetes.io/hostname".to_string(),
                        operator: "In".to_string(),
                        values: vec![host.to_string()],
                    }],
                    ..NodeSelectorTerm::default()
                }],
                ..NodeSelector::default()
            }),
            ..VolumeNodeAffinity::default()
        });
        pv
    }

    #[test]
    fn storage_class_rows_list_bound_namespaces() {
        let mut gold = StorageClass::new("gold", "csi.example.com");
        gold.reclaim_policy = Some("Retain".to_string());
        let classes = vec![gold, StorageClass::new("silver", "csi.example.com")];
        let namespaces = vec![
            namespace("team-a", "gold,silver"),
            namespace("team-b", "gold"),
            Namespace {
                metadata: ObjectMeta::named("kube-system"),
            },
        ];

        let rows = storage_class_rows(&classes, &namespaces, &ReportConfig::default());
        assert_eq!(rows[0].reclaim_policy, "Retain");
        assert_eq!(rows[0].namespaces_bound, vec!["team-a", "team-b"]);
        assert_eq!(rows[1].reclaim_policy, "Delete");
        assert_eq!(rows[1].namespaces_bound, vec!["team-a"]);

        let rendered = storage_class_table(&rows).render();
        assert!(rendered.starts_with("NAME"));
        assert!(rendered.contains("team-a,team-b"));
    }

    #[test]
    fn volume_types_and_locations() {
        let mut shard = local_pv("pv-shard", "node-gone");
        shard
            .metadata
            .labels
            .insert("dolphin.storage/sc-type".to_string(), "sig-local".to_string());

        let mut ceph = PersistentVolume::new("pv-ceph", "Bound");
        ceph.spec.cephfs = Some(CephFsVolumeSource {
            monitors: vec!["10.0.0.1:6789".to_string(), "10.0.0.2:6789".to_string()],
            path: "/vol".to_string(),
            ..CephFsVolumeSource::default()
        });
        let mut nfs = PersistentVolume::new("pv-nfs", "Bound");
        nfs.spec.nfs = Some(NfsVolumeSource {
            server: "nas".to_string(),
            path: "/export".to_string(),
            ..NfsVolumeSource::default()
        });
        let mut host = PersistentVolume::new("pv-host", "Bound");
        host.spec.host_path = Some(HostPathVolumeSource {
            path: "/srv".to_string(),
            ..HostPathVolumeSource::default()
        });

        let inventory = InventorySnapshot {
            persistent_volumes: vec![
                local_pv("pv-local", "node-a"),
                shard,
                ceph,
                nfs,
                host,
                PersistentVolume::new("pv-csi", "Bound"),
            ],
            nodes: vec![Node {
                metadata: ObjectMeta::named("node-a"),
            }],
            ..InventorySnapshot::default()
        };

        let rows = persistent_volume_rows(&inventory, &ReportConfig::default(), Utc::now());
        let summary: Vec<(VolumeType, &str, Option<bool>)> = rows
            .iter()
            .map(|r| (r.volume_type, r.location.as_str(), r.node_exists))
            .collect();
        assert_eq!(
            summary,
            vec![
                (VolumeType::Local, "node-a:/mnt/disks/ssd0", Some(true)),
                (VolumeType::ShardLocal, "node-gone:/mnt/disks/ssd0", Some(false)),
                (VolumeType::Ceph, "10.0.0.1:6789,10.0.0.2:6789:/vol", None),
                (VolumeType::Nfs, "nas:/export", None),
                (VolumeType::HostPath, "/srv", None),
                (VolumeType::Unknown, "", None),
            ]
        );
    }

    #[test]
    fn claim_columns_require_matching_uid() {
        let mut pv = PersistentVolume::new("pv1", "Bound");
        pv.spec.capacity.insert("storage".to_string(), "10Gi".to_string());
        pv.spec.claim_ref = Some(ObjectReference {
            kind: "PersistentVolumeClaim".to_string(),
            namespace: "db".to_string(),
            name: "data".to_string(),
            uid: "u1".to_string(),
            ..ObjectReference::default()
        });
        let mut stale = pv.clone();
        stale.metadata.name = "pv2".to_string();
        if let Some(r) = stale.spec.claim_ref.as_mut() {
            r.uid = "u0".to_string();
        }

        let inventory = InventorySnapshot {
            persistent_volumes: vec![pv, stale],
            persistent_volume_claims: vec![PersistentVolumeClaim::new("db", "data", "u1")],
            workloads: crate::inventory::snapshot::WorkloadSnapshot {
                pods: vec![Pod {
                    metadata: ObjectMeta::namespaced("db", "pg-0"),
                    spec: PodSpec {
                        volumes: vec![Volume::claim("data", "data")],
                    },
                }],
                ..Default::default()
            },
            ..InventorySnapshot::default()
        };

        let rows = persistent_volume_rows(&inventory, &ReportConfig::default(), Utc::now());
        assert_eq!(rows[0].capacity, "10Gi");
        assert_eq!(rows[0].claim.as_deref(), Some("PersistentVolumeClaim/db/data"));
        assert!(rows[0].bound_claim_exists);
        assert!(rows[0].claim_in_use);
        assert_eq!(rows[0].used_by.as_ref().map(|w| w.kind), Some(WorkloadKind::Pod));
        assert!(!rows[1].bound_claim_exists);
        assert!(!rows[1].claim_in_use);
    }

    #[test]
    fn age_is_measured_from_creation() {
        let mut pv = PersistentVolume::new("pv1", "Available");
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        pv.metadata.creation_timestamp = Some(created);
        let inventory = InventorySnapshot {
            persistent_volumes: vec![pv],
            ..InventorySnapshot::default()
        };

        let now = Utc.with_ymd_and_hms(2025, 3, 3, 5, 0, 0).unwrap();
        let rows = persistent_volume_rows(&inventory, &ReportConfig::default(), now);
        assert_eq!(rows[0].age_seconds, Some(2 * 86_400 + 5 * 3_600));
        let rendered = persistent_volume_table(&rows).render();
        assert!(rendered.contains("2d5h"));
    }

    #[test]
    fn format_age_units() {
        assert_eq!(format_age(42), "42s");
        assert_eq!(format_age(600), "10m");
        assert_eq!(format_age(3_660), "1h1m");
    }

    #[test]
    fn collection_fails_on_listing_error() {
        let client = StaticInventory::new(InventorySnapshot::default()).failing_list("nodes");
        let err = collect_volume_inventory(&client).unwrap_err();
        assert_eq!(err.code(), "SR-2001");
        assert!(collect_storage_class_inventory(&client).is_ok());
    }
}
