//! Replace the node state directory on every recorded validator.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Context;
use tracing::info;

use starnet_deployer::service::{push_state, record_hosts};
use starnet_deployer::{Executor, FileStore, RecordStore};

use super::{ConfigArgs, Run, connect};

/// Stop the service, copy local state over the remote state, start the service.
#[derive(Parser)]
pub struct PushState {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Local state directory to push.
    #[arg(long, default_value = ".injectived")]
    pub state_dir: PathBuf,
}

impl Run for PushState {
    async fn run(self) -> color_eyre::Result<()> {
        let config = self.config.load()?;
        let records = FileStore::new(&config.store_path)
            .get_all()
            .wrap_err("no validator records to push state to")?;
        let hosts = record_hosts(&records);

        let (_key, transport) = connect(&config)?;
        let executor = Executor::new(transport, config.remote.user.clone());
        push_state(
            &executor,
            &hosts,
            &self.state_dir,
            &config.remote.state_dir,
            &config.daemon.service,
        )
        .await
        .wrap_err("state push failed")?;
        info!(hosts = hosts.len(), "State pushed and services started");
        Ok(())
    }
}
