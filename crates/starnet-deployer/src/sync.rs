//! Push artifacts to the fleet and build the node daemon on every host.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::DaemonSettings;
use crate::error::{Error, HostFailure, Result};
use crate::layout::ArtifactLayout;
use crate::node::NodeSet;
use crate::remote::{ExecutionReport, Executor, SessionError, Transport, join_hosts, shell_quote};

/// The clone, checkout and install command run on every host.
///
/// Git runs over the forwarded agent, so private repositories work without
/// any key on the host.
pub fn build_command(daemon: &DaemonSettings) -> String {
    format!(
        "GIT_SSH_COMMAND='ssh -o StrictHostKeyChecking=no -A -S none' git clone {} && cd {} && git checkout {} && make install",
        shell_quote(&daemon.repository),
        shell_quote(daemon.checkout_dir()),
        shell_quote(&daemon.branch),
    )
}

/// Per-host outcome of [`transfer_fleet`].
#[derive(Debug, Default)]
pub struct TransferReport {
    /// Hosts whose artifact directory arrived, in fleet order.
    pub completed: Vec<String>,
    pub failures: Vec<HostFailure>,
}

/// Copy each node's artifact directory to `remote_dir` on that node.
///
/// Transfers run concurrently, one task per node, and are not retried.
/// Dropping the returned future aborts transfers still in flight.
pub async fn transfer_fleet<T: Transport>(
    executor: &Executor<T>,
    layout: &ArtifactLayout,
    nodes: &NodeSet,
    remote_dir: &str,
) -> TransferReport {
    let mut work = Vec::with_capacity(nodes.len());
    for (role, index, node) in nodes.iter() {
        let transport = executor.transport().clone();
        let user = executor.username().to_string();
        let local: PathBuf = layout.node_dir(role, index);
        let host = node.ip.clone();
        let remote = remote_dir.to_string();
        info!(%role, index, %host, local = %local.display(), "transferring artifacts");
        work.push((node.ip.clone(), async move {
            transport.copy_dir(&local, &host, &user, &remote).await
        }));
    }

    let mut report = TransferReport::default();
    for (host, joined) in join_hosts(work).await {
        let outcome = joined.unwrap_or_else(|e| Err(SessionError::Aborted(e.to_string())));
        match outcome {
            Ok(()) => report.completed.push(host),
            Err(e) => {
                warn!(%host, error = %e, "artifact transfer failed");
                report.failures.push(HostFailure {
                    host,
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}

/// Combined result of transfers and the remote build.
#[derive(Debug)]
pub struct SyncReport {
    pub transfers: TransferReport,
    pub build: ExecutionReport,
}

impl SyncReport {
    /// Transfer failures first, then build failures.
    pub fn failures(&self) -> Vec<HostFailure> {
        let mut failures = self.transfers.failures.clone();
        failures.extend(self.build.failures());
        failures
    }

    pub fn into_result(self) -> Result<Self> {
        let failures = self.failures();
        if failures.is_empty() {
            Ok(self)
        } else {
            Err(Error::HostFailures {
                operation: "sync",
                failures,
            })
        }
    }
}

/// Transfer artifacts, then build on every host whose transfer completed.
pub async fn sync_fleet<T: Transport>(
    executor: &Executor<T>,
    layout: &ArtifactLayout,
    nodes: &NodeSet,
    remote_dir: &str,
    daemon: &DaemonSettings,
) -> SyncReport {
    let transfers = transfer_fleet(executor, layout, nodes, remote_dir).await;
    let build = build_fleet(executor, &transfers.completed, daemon).await;
    SyncReport { transfers, build }
}

/// Run [`build_command`] on `hosts`.
pub async fn build_fleet<T: Transport>(
    executor: &Executor<T>,
    hosts: &[String],
    daemon: &DaemonSettings,
) -> ExecutionReport {
    if hosts.is_empty() {
        return ExecutionReport::default();
    }
    info!(hosts = hosts.len(), branch = %daemon.branch, "building node daemon");
    executor.execute(hosts, &build_command(daemon)).await
}
