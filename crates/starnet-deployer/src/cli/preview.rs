//! Provisioning dry run.

use clap::Parser;
use color_eyre::eyre::Context;
use tracing::info;

use starnet_deployer::CommandProvisioner;

use super::{ConfigArgs, Run};

/// Show what provisioning would create, without creating anything.
#[derive(Parser)]
pub struct Preview {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl Run for Preview {
    async fn run(self) -> color_eyre::Result<()> {
        let config = self.config.load()?;
        info!(
            validators = config.validators.size,
            sentries = config.sentries.size,
            branch = %config.daemon.branch,
            "previewing deployment"
        );
        CommandProvisioner::from_config(&config)
            .preview()
            .await
            .wrap_err("preview failed")
    }
}
