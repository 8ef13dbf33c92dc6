//! Full deployment: provision, configure, sync.

use clap::Parser;
use color_eyre::eyre::Context;
use tracing::info;

use starnet_deployer::{CommandProvisioner, FileStore, Pipeline};

use super::{ConfigArgs, Run, connect};

/// Provision the fleet, configure every node and build the daemon remotely.
#[derive(Parser)]
pub struct Up {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl Run for Up {
    async fn run(self) -> color_eyre::Result<()> {
        let config = self.config.load()?;
        info!(
            validators = config.validators.size,
            sentries = config.sentries.size,
            branch = %config.daemon.branch,
            "starting deployment"
        );

        // Held until the run ends so `ssh -i` can read it.
        let (_key, transport) = connect(&config)?;
        let provisioner = CommandProvisioner::from_config(&config);
        let store = FileStore::new(&config.store_path);
        let mut pipeline = Pipeline::new(config, provisioner, transport, store);

        let nodes = pipeline.up().await.wrap_err("deployment failed")?;

        info!("Deployment complete!");
        for (role, index, node) in nodes.iter() {
            info!(
                "  {role}-{index}: {} ({}) id={}",
                node.host,
                node.ip,
                node.network_node_id.as_deref().unwrap_or("unknown")
            );
        }
        Ok(())
    }
}
