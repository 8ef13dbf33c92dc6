//! Parallel command dispatch over SSH.
//!
//! [`Executor`] fans one shell command out to many hosts, one task per host.
//! Hosts never affect each other: a dial failure, a rejected key or a non-zero
//! exit on one host is recorded in that host's [`HostResult`] while the others
//! run to completion. The executor returns once the slowest host is done; it
//! does not impose a timeout of its own, but dropping its future aborts every
//! per-host task and kills the `ssh`/`rsync` children they own.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use crate::credential::KeyFile;
use crate::error::{Error, HostFailure, Result};

/// `ssh` reserves this exit status for its own connection and auth failures.
///
/// A remote command may exit 255 too. Such a status only counts as a dial
/// failure when the remote wrapper did not report one through [`EXIT_MARKER`].
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Prefix of the stderr line carrying the remote command's own exit status.
const EXIT_MARKER: &str = "starnet-exit-status:";

/// Options shared by every `ssh`/`rsync` invocation. Hosts are freshly
/// provisioned, so there is no known host key to check against.
const SSH_OPTIONS: &[&str] = &[
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "BatchMode=yes",
    "-o",
    "LogLevel=ERROR",
];

/// Captured output of a command that ran to completion on a host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// A structural per-host failure, as opposed to a command's non-zero exit.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session could not be established (network or authentication).
    #[error("failed to dial: {0}")]
    Dial(String),
    /// The local client process could not be started or was killed.
    #[error("failed to run command: {0}")]
    Run(String),
    /// A file transfer did not complete.
    #[error("transfer failed with status {code}: {stderr}")]
    Transfer { code: i32, stderr: String },
    /// The per-host task ended without producing a result.
    #[error("session aborted: {0}")]
    Aborted(String),
}

/// Remote session primitives used by the orchestration code.
pub trait Transport: Send + Sync + 'static {
    /// Run `command` on `host` as `user` through a login shell.
    fn execute(
        &self,
        host: &str,
        user: &str,
        command: &str,
    ) -> impl Future<Output = Result<CommandOutput, SessionError>> + Send;

    /// Recursively copy the contents of `local` into `remote` on `host`.
    fn copy_dir(
        &self,
        local: &Path,
        host: &str,
        user: &str,
        remote: &str,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// The outcome of running a command on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostResult {
    pub host: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub error: Option<SessionError>,
}

impl HostResult {
    fn new(host: String, outcome: Result<CommandOutput, SessionError>) -> Self {
        match outcome {
            Ok(output) => Self {
                host,
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.exit_code,
                error: None,
            },
            Err(error) => Self {
                host,
                stdout: String::new(),
                stderr: String::new(),
                exit_code: -1,
                error: Some(error),
            },
        }
    }

    /// Returns true if the session worked and the command exited with 0.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }

    /// Describe why this host failed, if it did.
    pub fn failure(&self) -> Option<HostFailure> {
        let reason = match &self.error {
            Some(error) => error.to_string(),
            None if self.exit_code != 0 => {
                let tail = last_line(&self.stderr);
                if tail.is_empty() {
                    format!("exited with status {}", self.exit_code)
                } else {
                    format!("exited with status {}: {tail}", self.exit_code)
                }
            }
            None => return None,
        };
        Some(HostFailure {
            host: self.host.clone(),
            reason,
        })
    }
}

/// Per-host results of one fan-out, keyed by host.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    results: HashMap<String, HostResult>,
}

impl ExecutionReport {
    pub fn get(&self, host: &str) -> Option<&HostResult> {
        self.results.get(host)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostResult> {
        self.results.values()
    }

    /// Every failed host, sorted by host for stable reporting.
    pub fn failures(&self) -> Vec<HostFailure> {
        let mut failures: Vec<_> = self
            .results
            .values()
            .filter_map(HostResult::failure)
            .collect();
        failures.sort_by(|a, b| a.host.cmp(&b.host));
        failures
    }

    /// Turn the report into an error naming every failed host, if any failed.
    pub fn into_result(self, operation: &'static str) -> Result<Self> {
        let failures = self.failures();
        if failures.is_empty() {
            Ok(self)
        } else {
            Err(Error::HostFailures {
                operation,
                failures,
            })
        }
    }
}

/// Runs one command across many hosts concurrently.
#[derive(Debug)]
pub struct Executor<T> {
    transport: Arc<T>,
    username: String,
}

impl<T> Clone for Executor<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            username: self.username.clone(),
        }
    }
}

impl<T: Transport> Executor<T> {
    pub fn new(transport: Arc<T>, username: impl Into<String>) -> Self {
        Self {
            transport,
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Run `command` on every host and wait for all of them.
    ///
    /// Duplicate hosts are run once. The report always has one entry per
    /// distinct host.
    pub async fn execute(&self, hosts: &[String], command: &str) -> ExecutionReport {
        let mut work = Vec::with_capacity(hosts.len());
        for host in hosts {
            if work.iter().any(|(h, _)| h == host) {
                continue;
            }
            let transport = self.transport.clone();
            let username = self.username.clone();
            let command = command.to_string();
            let target = host.clone();
            debug!(host = %target, "dispatching remote command");
            work.push((host.clone(), async move {
                transport.execute(&target, &username, &command).await
            }));
        }

        let mut results = HashMap::with_capacity(work.len());
        for (host, joined) in join_hosts(work).await {
            let outcome = joined.unwrap_or_else(|e| Err(SessionError::Aborted(e.to_string())));
            let result = HostResult::new(host.clone(), outcome);
            if let Some(failure) = result.failure() {
                warn!(host = %failure.host, reason = %failure.reason, "remote command failed");
            }
            results.insert(host, result);
        }
        ExecutionReport { results }
    }
}

/// Run each host's future on its own task and collect the outcomes in input
/// order.
///
/// The tasks live in a [`JoinSet`], so dropping the returned future aborts
/// every task still running.
pub(crate) async fn join_hosts<F>(
    work: Vec<(String, F)>,
) -> Vec<(String, std::result::Result<F::Output, JoinError>)>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut tasks = JoinSet::new();
    let mut positions = HashMap::with_capacity(work.len());
    let mut hosts = Vec::with_capacity(work.len());
    for (position, (host, future)) in work.into_iter().enumerate() {
        let handle = tasks.spawn(future);
        positions.insert(handle.id(), position);
        hosts.push(host);
    }

    let mut outcomes: Vec<Option<_>> = hosts.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next_with_id().await {
        let (id, outcome) = match joined {
            Ok((id, output)) => (id, Ok(output)),
            Err(e) => (e.id(), Err(e)),
        };
        if let Some(&position) = positions.get(&id) {
            outcomes[position] = Some(outcome);
        }
    }

    hosts
        .into_iter()
        .zip(outcomes)
        .filter_map(|(host, outcome)| outcome.map(|outcome| (host, outcome)))
        .collect()
}

/// [`Transport`] backed by the system OpenSSH client and rsync.
///
/// Authentication goes through the local SSH agent, which is also forwarded
/// to the remote session so that commands there (such as `git clone` over SSH)
/// can use the same keys.
#[derive(Debug, Clone)]
pub struct OpenSsh {
    agent_socket: PathBuf,
    identity: Option<PathBuf>,
    port: u16,
}

impl OpenSsh {
    /// Locate the SSH agent through `SSH_AUTH_SOCK` and check the client tools.
    pub fn from_env(identity: Option<&KeyFile>, port: u16) -> Result<Self> {
        let agent_socket = std::env::var_os("SSH_AUTH_SOCK")
            .map(PathBuf::from)
            .ok_or_else(|| Error::AgentUnavailable("SSH_AUTH_SOCK is not set".to_string()))?;
        if !agent_socket.exists() {
            return Err(Error::AgentUnavailable(format!(
                "agent socket {} does not exist",
                agent_socket.display()
            )));
        }

        let missing: Vec<_> = ["ssh", "rsync"]
            .into_iter()
            .filter(|tool| !check_binary_exists(tool))
            .collect();
        if !missing.is_empty() {
            return Err(Error::AgentUnavailable(format!(
                "required tools not found in PATH: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            agent_socket,
            identity: identity.map(|key| key.path().to_path_buf()),
            port,
        })
    }

    fn ssh_args(&self) -> Vec<String> {
        let mut args: Vec<String> = SSH_OPTIONS.iter().map(|s| s.to_string()).collect();
        args.push("-p".to_string());
        args.push(self.port.to_string());
        if let Some(identity) = &self.identity {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().into_owned());
        }
        args
    }
}

impl Transport for OpenSsh {
    async fn execute(
        &self,
        host: &str,
        user: &str,
        command: &str,
    ) -> Result<CommandOutput, SessionError> {
        let output = Command::new("ssh")
            .args(self.ssh_args())
            .arg("-A")
            .arg(format!("{user}@{host}"))
            .arg(remote_invocation(command))
            .env("SSH_AUTH_SOCK", &self.agent_socket)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SessionError::Run(format!("failed to start ssh: {e}")))?;

        ssh_outcome(output.status.code(), &output.stdout, &output.stderr)
    }

    async fn copy_dir(
        &self,
        local: &Path,
        host: &str,
        user: &str,
        remote: &str,
    ) -> Result<(), SessionError> {
        let shell = std::iter::once("ssh".to_string())
            .chain(self.ssh_args().iter().map(|arg| shell_quote(arg)))
            .collect::<Vec<_>>()
            .join(" ");
        // A trailing slash makes rsync copy the directory's contents.
        let source = format!("{}/", local.display());
        let output = Command::new("rsync")
            .arg("-az")
            .arg("-e")
            .arg(shell)
            .arg(source)
            .arg(format!("{user}@{host}:{remote}/"))
            .env("SSH_AUTH_SOCK", &self.agent_socket)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SessionError::Run(format!("failed to start rsync: {e}")))?;

        rsync_outcome(output.status.code(), &output.stderr)
    }
}

/// The remote command line: `command` in a login shell, followed by a marker
/// line on stderr with its exit status.
fn remote_invocation(command: &str) -> String {
    format!(
        "bash -l -c {}; status=$?; printf '\\n{EXIT_MARKER}%d\\n' \"$status\" >&2; exit \"$status\"",
        shell_quote(command)
    )
}

/// Strip the exit marker from `stderr`, returning the rest and the reported status.
fn split_exit_marker(stderr: &str) -> (String, Option<i32>) {
    let Some(at) = stderr.rfind(EXIT_MARKER) else {
        return (stderr.to_string(), None);
    };
    let status = stderr[at + EXIT_MARKER.len()..].trim().parse().ok();
    let mut rest = stderr[..at].to_string();
    // Newline printed ahead of the marker.
    if rest.ends_with('\n') {
        rest.pop();
    }
    (rest, status)
}

/// Classify a finished `ssh` run of [`remote_invocation`].
///
/// `status` is `None` when ssh was killed by a signal.
fn ssh_outcome(
    status: Option<i32>,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<CommandOutput, SessionError> {
    let stdout = String::from_utf8_lossy(stdout).into_owned();
    let (stderr, reported) = split_exit_marker(&String::from_utf8_lossy(stderr));
    match (status, reported) {
        (None, _) => Err(SessionError::Run("ssh was terminated by a signal".to_string())),
        // The command ran to completion, whatever status it chose.
        (Some(_), Some(exit_code)) => Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        }),
        (Some(SSH_CONNECTION_FAILURE), None) => {
            Err(SessionError::Dial(last_line(&stderr).to_string()))
        }
        (Some(exit_code), None) => Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        }),
    }
}

/// Classify a finished `rsync` run.
fn rsync_outcome(status: Option<i32>, stderr: &[u8]) -> Result<(), SessionError> {
    let stderr = String::from_utf8_lossy(stderr);
    match status {
        Some(0) => Ok(()),
        None => Err(SessionError::Run("rsync was terminated by a signal".to_string())),
        Some(SSH_CONNECTION_FAILURE) => Err(SessionError::Dial(last_line(&stderr).to_string())),
        Some(code) => Err(SessionError::Transfer {
            code,
            stderr: last_line(&stderr).to_string(),
        }),
    }
}

fn last_line(text: &str) -> &str {
    text.trim_end().lines().last().unwrap_or_default().trim()
}

/// Check if a binary is in PATH using `which`.
fn check_binary_exists(bin: &str) -> bool {
    std::process::Command::new("which")
        .arg(bin)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Quote `s` as a single POSIX shell word.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./:=@,+".contains(&b))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}
