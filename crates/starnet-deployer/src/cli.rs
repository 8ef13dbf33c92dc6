//! CLI command definitions for starnet-deployer.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, ValueEnum};
use color_eyre::eyre::{Context, Result};
use tracing::info;

use starnet_deployer::config::DEFAULT_CONFIG_PATH;
use starnet_deployer::node::NodeRole;
use starnet_deployer::provision::read_outputs;
use starnet_deployer::{DeployConfig, KeyFile, NodeSet, OpenSsh};

mod configure;
mod destroy;
mod preview;
mod push_state;
mod records;
mod restart;
mod sync;
mod up;

/// CLI options for starnet-deployer.
#[derive(Parser)]
#[command(name = "starnet-deployer")]
#[command(about = "Provision, wire and sync validator/sentry node pools")]
pub enum Options {
    /// Provision the fleet, configure every node and build the daemon remotely.
    Up(up::Up),
    /// Show what provisioning would create, without creating anything.
    Preview(preview::Preview),
    /// Configure one role from an existing provisioning outputs file.
    Configure(configure::Configure),
    /// Transfer artifacts and build the daemon on an already configured fleet.
    Sync(sync::SyncFleet),
    /// Restart the node service across the fleet.
    Restart(restart::Restart),
    /// Replace the node state directory on every recorded validator.
    PushState(push_state::PushState),
    /// Destroy every provisioned resource.
    Destroy(destroy::Destroy),
    /// Inspect or clear the validator record store.
    #[command(subcommand)]
    Records(records::Records),
}

/// Trait for running CLI commands.
pub trait Run {
    fn run(self) -> impl Future<Output = color_eyre::Result<()>> + Send;
}

impl Run for Options {
    async fn run(self) -> color_eyre::Result<()> {
        match self {
            Self::Up(cmd) => cmd.run().await,
            Self::Preview(cmd) => cmd.run().await,
            Self::Configure(cmd) => cmd.run().await,
            Self::Sync(cmd) => cmd.run().await,
            Self::Restart(cmd) => cmd.run().await,
            Self::PushState(cmd) => cmd.run().await,
            Self::Destroy(cmd) => cmd.run().await,
            Self::Records(cmd) => cmd.run().await,
        }
    }
}

/// Config file selection and the overrides every command accepts.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Deployment config file. Defaults apply if it is absent.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Number of validator nodes.
    #[arg(long)]
    pub validators: Option<usize>,

    /// Number of sentry nodes.
    #[arg(long)]
    pub sentries: Option<usize>,

    /// Root of the local build artifact tree.
    #[arg(long)]
    pub artifacts_path: Option<PathBuf>,

    /// Branch of the daemon repository to build.
    #[arg(long)]
    pub build_branch: Option<String>,

    /// Validator record store file.
    #[arg(long)]
    pub storage: Option<PathBuf>,
}

impl ConfigArgs {
    /// Load the config file, apply overrides and validate the result.
    pub fn load(&self) -> Result<DeployConfig> {
        let mut config = match &self.config {
            Some(path) => DeployConfig::load(path)
                .wrap_err_with(|| format!("failed to load {}", path.display()))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                DeployConfig::load(DEFAULT_CONFIG_PATH)
                    .wrap_err_with(|| format!("failed to load {DEFAULT_CONFIG_PATH}"))?
            }
            None => {
                info!("no {DEFAULT_CONFIG_PATH} found, using defaults");
                DeployConfig::default()
            }
        };

        if let Some(validators) = self.validators {
            config.validators.size = validators;
        }
        if let Some(sentries) = self.sentries {
            config.sentries.size = sentries;
        }
        if let Some(root) = &self.artifacts_path {
            config.artifacts.root = root.clone();
        }
        if let Some(branch) = &self.build_branch {
            config.daemon.branch = branch.clone();
        }
        if let Some(storage) = &self.storage {
            config.store_path = storage.clone();
        }
        config.validate().wrap_err("invalid deployment configuration")?;
        Ok(config)
    }
}

/// Role names as accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliRole {
    Validators,
    SentryNodes,
}

impl From<CliRole> for NodeRole {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Validators => NodeRole::Validator,
            CliRole::SentryNodes => NodeRole::Sentry,
        }
    }
}

/// Open an SSH transport for `config`.
///
/// The returned key file, if any, must be kept alive while the transport is
/// in use; it is removed when dropped.
pub fn connect(config: &DeployConfig) -> Result<(Option<KeyFile>, Arc<OpenSsh>)> {
    let key = match &config.remote.identity_env {
        Some(var) => KeyFile::from_env(var).wrap_err("failed to write ssh identity")?,
        None => None,
    };
    let transport = OpenSsh::from_env(key.as_ref(), config.remote.ssh_port)
        .wrap_err("cannot open ssh sessions")?;
    Ok((key, Arc::new(transport)))
}

/// Read provisioning outputs from `path`, or from the configured outputs file.
pub fn load_outputs(config: &DeployConfig, path: Option<&Path>) -> Result<NodeSet> {
    let path = path.unwrap_or(config.provisioner.outputs_path.as_path());
    read_outputs(path).wrap_err_with(|| format!("failed to read outputs from {}", path.display()))
}
