//! Transfer artifacts and build on an already configured fleet.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Context;
use tracing::info;

use starnet_deployer::indexer::index_nodes;
use starnet_deployer::node::NodeRole;
use starnet_deployer::{CommandProvisioner, FileStore, Pipeline};

use super::{ConfigArgs, Run, connect, load_outputs};

/// Transfer artifacts and build the daemon on an already configured fleet.
#[derive(Parser)]
pub struct SyncFleet {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Provisioning outputs file (`{"<hostname>": "<ip>"}`).
    #[arg(long)]
    pub outputs: Option<PathBuf>,
}

impl Run for SyncFleet {
    async fn run(self) -> color_eyre::Result<()> {
        let config = self.config.load()?;
        let mut nodes = load_outputs(&config, self.outputs.as_deref())?;
        // Artifact directories are addressed by ordinal.
        for role in NodeRole::ALL {
            index_nodes(role, &config.network.domain, nodes.nodes_mut(role))?;
        }

        let (_key, transport) = connect(&config)?;
        let provisioner = CommandProvisioner::from_config(&config);
        let store = FileStore::new(&config.store_path);
        let mut pipeline = Pipeline::new(config, provisioner, transport, store);

        let report = pipeline.sync(&nodes).await.wrap_err("sync failed")?;
        info!(
            transferred = report.transfers.completed.len(),
            built = report.build.len(),
            "Sync complete!"
        );
        Ok(())
    }
}
