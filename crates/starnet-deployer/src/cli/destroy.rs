//! Destroy command implementation.

use clap::Parser;
use color_eyre::eyre::Context;
use tracing::info;

use starnet_deployer::{CommandProvisioner, Provisioner};

use super::{ConfigArgs, Run};

/// Destroy every provisioned resource.
#[derive(Parser)]
pub struct Destroy {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl Run for Destroy {
    async fn run(self) -> color_eyre::Result<()> {
        let config = self.config.load()?;
        CommandProvisioner::from_config(&config)
            .destroy()
            .await
            .wrap_err("destroy failed")?;
        info!("All resources destroyed");
        Ok(())
    }
}
