//! `kubectl`-backed inventory client.
//!
//! Every call runs one `kubectl` child process with JSON output. The request
//! timeout is enforced here, not only passed through: once the deadline (the
//! request timeout plus a short grace period) passes, the child is killed and
//! the call fails with [`InventoryError::Timeout`]. Listings also abandon the
//! child when the [`CancelToken`] fires. Deletes are never abandoned midway.

#![allow(missing_docs)]

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;

use crate::core::cancel::CancelToken;
use crate::core::config::ClusterConfig;
use crate::inventory::client::{InventoryClient, InventoryError};
use crate::inventory::model::{
    CronJob, DaemonSet, Deployment, Job, Namespace, Node, ObjectList, PersistentVolume,
    PersistentVolumeClaim, Pod, StatefulSet, StorageClass,
};

type InventoryResult<T> = std::result::Result<T, InventoryError>;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Whether a running request may be abandoned on cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    OnCancel,
    Never,
}

/// Inventory client that shells out to `kubectl`.
#[derive(Debug, Clone)]
pub struct KubectlInventory {
    program: PathBuf,
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
    timeout: Duration,
    cancel: CancelToken,
}

impl KubectlInventory {
    #[must_use]
    pub fn new(config: &ClusterConfig, cancel: CancelToken) -> Self {
        Self {
            program: config.kubectl.clone(),
            kubeconfig: config.kubeconfig.clone(),
            context: config.context.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            cancel,
        }
    }

    /// Arguments shared by every invocation.
    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(6);
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push(format!("--kubeconfig={}", kubeconfig.display()));
        }
        if let Some(context) = &self.context {
            args.push(format!("--context={context}"));
        }
        args.push(format!("--request-timeout={}s", self.timeout.as_secs()));
        args
    }

    fn get_args(&self, resource: &str, namespace: Option<&str>, namespaced: bool) -> Vec<String> {
        let mut args = self.base_args();
        args.push("get".to_string());
        args.push(resource.to_string());
        if namespaced {
            match namespace {
                Some(ns) => {
                    args.push("-n".to_string());
                    args.push(ns.to_string());
                }
                None => args.push("--all-namespaces".to_string()),
            }
        }
        args.push("-o".to_string());
        args.push("json".to_string());
        args
    }

    fn list<T: DeserializeOwned>(
        &self,
        resource: &str,
        namespace: Option<&str>,
        namespaced: bool,
    ) -> InventoryResult<Vec<T>> {
        let args = self.get_args(resource, namespace, namespaced);
        let stdout = self.run(&args, Interrupt::OnCancel)?;
        let list: ObjectList<T> =
            serde_json::from_slice(&stdout).map_err(|e| InventoryError::Decode {
                command: self.describe(&args),
                details: e.to_string(),
            })?;
        Ok(list.items)
    }

    fn delete(&self, resource: &str, name: &str) -> InventoryResult<()> {
        let mut args = self.base_args();
        args.extend([
            "delete".to_string(),
            resource.to_string(),
            name.to_string(),
            "--wait=false".to_string(),
        ]);
        self.run(&args, Interrupt::Never)?;
        Ok(())
    }

    fn describe(&self, args: &[String]) -> String {
        format!("{} {}", self.program.display(), args.join(" "))
    }

    /// Run one `kubectl` invocation to completion and return its stdout.
    fn run(&self, args: &[String], interrupt: Interrupt) -> InventoryResult<Vec<u8>> {
        if interrupt == Interrupt::OnCancel && self.cancel.is_cancelled() {
            return Err(InventoryError::Cancelled);
        }

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| InventoryError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        // Pipes are drained on their own threads so a large listing cannot
        // fill the pipe buffer and stall the child while we poll.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout + KILL_GRACE;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(source) => {
                    kill(&mut child);
                    return Err(InventoryError::Spawn {
                        program: self.program.display().to_string(),
                        source,
                    });
                }
            }
            if interrupt == Interrupt::OnCancel && self.cancel.is_cancelled() {
                kill(&mut child);
                return Err(InventoryError::Cancelled);
            }
            if Instant::now() >= deadline {
                kill(&mut child);
                return Err(InventoryError::Timeout {
                    command: self.describe(args),
                    after: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if status.success() {
            Ok(stdout)
        } else {
            Err(InventoryError::CommandFailed {
                command: self.describe(args),
                status: status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| format!("exit {c}")),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            })
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl InventoryClient for KubectlInventory {
    fn list_storage_classes(&self) -> InventoryResult<Vec<StorageClass>> {
        self.list("storageclasses", None, false)
    }

    fn list_persistent_volumes(&self) -> InventoryResult<Vec<PersistentVolume>> {
        self.list("persistentvolumes", None, false)
    }

    fn list_persistent_volume_claims(
        &self,
        namespace: Option<&str>,
    ) -> InventoryResult<Vec<PersistentVolumeClaim>> {
        self.list("persistentvolumeclaims", namespace, true)
    }

    fn list_pods(&self, namespace: Option<&str>) -> InventoryResult<Vec<Pod>> {
        self.list("pods", namespace, true)
    }

    fn list_deployments(&self, namespace: Option<&str>) -> InventoryResult<Vec<Deployment>> {
        self.list("deployments", namespace, true)
    }

    fn list_daemon_sets(&self, namespace: Option<&str>) -> InventoryResult<Vec<DaemonSet>> {
        self.list("daemonsets", namespace, true)
    }

    fn list_stateful_sets(&self, namespace: Option<&str>) -> InventoryResult<Vec<StatefulSet>> {
        self.list("statefulsets", namespace, true)
    }

    fn list_jobs(&self, namespace: Option<&str>) -> InventoryResult<Vec<Job>> {
        self.list("jobs", namespace, true)
    }

    fn list_cron_jobs(&self, namespace: Option<&str>) -> InventoryResult<Vec<CronJob>> {
        self.list("cronjobs", namespace, true)
    }

    fn list_nodes(&self) -> InventoryResult<Vec<Node>> {
        self.list("nodes", None, false)
    }

    fn list_namespaces(&self) -> InventoryResult<Vec<Namespace>> {
        self.list("namespaces", None, false)
    }

    fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> InventoryResult<Option<PersistentVolumeClaim>> {
        let mut args = self.base_args();
        args.extend([
            "get".to_string(),
            "persistentvolumeclaim".to_string(),
            name.to_string(),
            "-n".to_string(),
            namespace.to_string(),
            "--ignore-not-found".to_string(),
            "-o".to_string(),
            "json".to_string(),
        ]);
        let stdout = self.run(&args, Interrupt::OnCancel)?;
        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&stdout)
            .map(Some)
            .map_err(|e| InventoryError::Decode {
                command: self.describe(&args),
                details: e.to_string(),
            })
    }

    fn delete_storage_class(&self, name: &str) -> InventoryResult<()> {
        self.delete("storageclass", name)
    }

    fn delete_persistent_volume(&self, name: &str) -> InventoryResult<()> {
        self.delete("persistentvolume", name)
    }
}
