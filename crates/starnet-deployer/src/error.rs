//! Error types for starnet deployments.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::node::NodeRole;
use crate::pipeline::Stage;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A single host's failure inside a fleet-wide operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFailure {
    /// The host (IP or hostname) the operation targeted.
    pub host: String,
    /// Human readable cause, including exit status or transport error.
    pub reason: String,
}

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.host, self.reason)
    }
}

/// Errors that may occur while wiring up or syncing a node pool.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A hostname did not follow `starnet-<type>-<N>.<domain>`.
    #[error("failed to parse index from hostname {host}: expected starnet-{role}-<N>.{domain}")]
    MalformedHostname {
        role: NodeRole,
        host: String,
        domain: String,
    },
    /// A provisioning output did not belong to any known role.
    #[error("hostname {host} does not belong to any node role")]
    UnknownRole { host: String },
    /// The recovered indices have a gap.
    #[error("missing {role}-{index} in sequence (have {count} {role})")]
    MissingSequenceIndex {
        role: NodeRole,
        index: usize,
        count: usize,
    },
    /// Two hosts claim the same ordinal.
    #[error("duplicate {role}-{index} in sequence ({first} and {second})")]
    DuplicateSequenceIndex {
        role: NodeRole,
        index: usize,
        first: String,
        second: String,
    },
    /// The externally generated ID list does not cover the node pool exactly.
    #[error(
        "mismatch between node ids ({ids}) and nodes ({nodes}) for {role}. Node IDs: {id_list:?}, Nodes: {hosts:?}"
    )]
    IdCountMismatch {
        role: NodeRole,
        ids: usize,
        nodes: usize,
        id_list: Vec<String>,
        hosts: Vec<String>,
    },
    /// A peer was requested for a node that never received its network ID.
    #[error("node {host} has no network node id assigned")]
    MissingNodeId { host: String },
    /// A config file has no `persistent_peers` line to replace.
    #[error("persistent_peers line not found in config file {}", path.display())]
    PeerDirectiveNotFound { path: PathBuf },
    /// Pre-flight found build artifacts missing on local disk.
    #[error("missing build artifacts:\n  {}", join_paths(missing))]
    MissingArtifacts { missing: Vec<PathBuf> },
    /// A filesystem operation failed.
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A JSON document could not be read or written.
    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The deployment configuration file is not valid TOML for [`crate::DeployConfig`].
    #[error("failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// The deployment configuration parsed but is not usable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The local SSH agent or client tooling is not usable.
    #[error("ssh agent unavailable: {0}")]
    AgentUnavailable(String),
    /// One or more hosts failed a fleet-wide operation.
    #[error("{} host(s) failed during {operation}:\n  {}", failures.len(), join_failures(failures))]
    HostFailures {
        operation: &'static str,
        failures: Vec<HostFailure>,
    },
    /// The external provisioning engine reported a failure.
    #[error("provisioning engine failed: {0}")]
    Provision(String),
    /// A stage ran past the budget imposed by the caller.
    #[error("{stage} stage exceeded its {timeout:?} budget")]
    StageTimeout { stage: Stage, timeout: Duration },
    /// A pipeline stage failed.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
    /// Resources were destroyed after `original` aborted the run.
    #[error("rolled back due to error: {original}")]
    RolledBack {
        #[source]
        original: Box<Error>,
    },
    /// Destroying resources failed after `original` aborted the run.
    #[error("rollback failed: {destroy} (original error: {original})")]
    RollbackFailed {
        destroy: Box<Error>,
        #[source]
        original: Box<Error>,
    },
}

impl Error {
    /// Tag this error with the pipeline stage it aborted.
    pub fn at(self, stage: Stage) -> Self {
        Self::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The stage this error is tagged with, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } | Self::StageTimeout { stage, .. } => Some(*stage),
            Self::RolledBack { original } | Self::RollbackFailed { original, .. } => {
                original.stage()
            }
            _ => None,
        }
    }

    /// Returns the per-host failures if this is (or wraps) a fleet-wide failure.
    pub fn host_failures(&self) -> Option<&[HostFailure]> {
        match self {
            Self::HostFailures { failures, .. } => Some(failures),
            Self::Stage { source, .. } => source.host_failures(),
            _ => None,
        }
    }

    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>) -> impl FnOnce(serde_json::Error) -> Self {
        let path = path.into();
        move |source| Self::Json { path, source }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n  ")
}

fn join_failures(failures: &[HostFailure]) -> String {
    failures
        .iter()
        .map(HostFailure::to_string)
        .collect::<Vec<_>>()
        .join("\n  ")
}
