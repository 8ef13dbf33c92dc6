//! Node daemon lifecycle on running hosts.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, HostFailure, Result};
use crate::remote::{ExecutionReport, Executor, Transport, join_hosts, shell_quote};
use crate::store::Record;

/// Hosts to address for every record, in record order.
pub fn record_hosts(records: &[Record]) -> Vec<String> {
    records.iter().map(|record| record.ip.clone()).collect()
}

fn systemctl(action: &str, service: &str) -> String {
    format!("sudo systemctl {action} {}", shell_quote(service))
}

/// Restart `service` on every host.
pub async fn restart_services<T: Transport>(
    executor: &Executor<T>,
    hosts: &[String],
    service: &str,
) -> Result<ExecutionReport> {
    info!(hosts = hosts.len(), %service, "restarting service");
    executor
        .execute(hosts, &systemctl("restart", service))
        .await
        .into_result("service restart")
}

/// Replace the daemon's state directory on every host.
///
/// Per host: stop the service, copy `local_state` over `remote_state`, start
/// the service again. Hosts proceed independently; a host that fails to stop
/// is left untouched. Dropping the returned future aborts hosts still in
/// progress.
pub async fn push_state<T: Transport>(
    executor: &Executor<T>,
    hosts: &[String],
    local_state: &Path,
    remote_state: &str,
    service: &str,
) -> Result<()> {
    if !local_state.is_dir() {
        return Err(Error::Io {
            action: "find local state directory",
            path: local_state.to_path_buf(),
            source: std::io::ErrorKind::NotFound.into(),
        });
    }

    let mut work = Vec::with_capacity(hosts.len());
    for host in hosts {
        let transport = executor.transport().clone();
        let user = executor.username().to_string();
        let target = host.clone();
        let local: PathBuf = local_state.to_path_buf();
        let remote = remote_state.to_string();
        let service = service.to_string();
        work.push((host.clone(), async move {
            push_one(&*transport, &target, &user, &local, &remote, &service).await
        }));
    }

    let mut failures = Vec::new();
    for (host, joined) in join_hosts(work).await {
        let outcome = joined.unwrap_or_else(|e| Err(format!("session aborted: {e}")));
        match outcome {
            Ok(()) => info!(%host, "state pushed, service started"),
            Err(reason) => {
                warn!(%host, %reason, "state push failed");
                failures.push(HostFailure { host, reason });
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        failures.sort_by(|a, b| a.host.cmp(&b.host));
        Err(Error::HostFailures {
            operation: "state push",
            failures,
        })
    }
}

async fn push_one<T: Transport>(
    transport: &T,
    host: &str,
    user: &str,
    local: &Path,
    remote: &str,
    service: &str,
) -> std::result::Result<(), String> {
    run_checked(transport, host, user, &systemctl("stop", service)).await?;
    transport
        .copy_dir(local, host, user, remote)
        .await
        .map_err(|e| format!("copy state: {e}"))?;
    run_checked(transport, host, user, &systemctl("start", service)).await
}

async fn run_checked<T: Transport>(
    transport: &T,
    host: &str,
    user: &str,
    command: &str,
) -> std::result::Result<(), String> {
    let output = transport
        .execute(host, user, command)
        .await
        .map_err(|e| format!("{command}: {e}"))?;
    if output.exit_code != 0 {
        return Err(format!("{command}: exited with status {}", output.exit_code));
    }
    Ok(())
}
