//! Configure one role from an existing outputs file.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Context;
use tracing::info;

use starnet_deployer::FileStore;
use starnet_deployer::node::NodeRole;
use starnet_deployer::pipeline::configure_roles;

use super::{CliRole, ConfigArgs, Run, load_outputs};

/// Configure one role from an existing provisioning outputs file.
///
/// Running `validators` records their identities; a later `sentry-nodes` run
/// (possibly on another machine sharing the record store) peers sentries with
/// them.
#[derive(Parser)]
pub struct Configure {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Role to configure.
    #[arg(long, value_enum)]
    pub role: CliRole,

    /// Provisioning outputs file (`{"<hostname>": "<ip>"}`).
    #[arg(long)]
    pub outputs: Option<PathBuf>,
}

impl Run for Configure {
    async fn run(self) -> color_eyre::Result<()> {
        let config = self.config.load()?;
        let role = NodeRole::from(self.role);
        let mut nodes = load_outputs(&config, self.outputs.as_deref())?;
        let store = FileStore::new(&config.store_path);
        let layout = config.layout();

        let peers = configure_roles(&config, &layout, &store, &mut nodes, &[role], |stage| {
            info!(%stage, "stage complete")
        })
        .wrap_err_with(|| format!("failed to configure {role}"))?;

        for (role, peers) in &peers {
            info!(
                "Configured {} {role} with persistent_peers = \"{peers}\"",
                nodes.nodes(*role).len()
            );
        }
        Ok(())
    }
}
