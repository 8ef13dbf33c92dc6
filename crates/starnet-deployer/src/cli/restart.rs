//! Restart the node service across the fleet.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Context;
use tracing::info;

use starnet_deployer::service::{record_hosts, restart_services};
use starnet_deployer::{Executor, FileStore, RecordStore};

use super::{ConfigArgs, Run, connect, load_outputs};

/// Restart the node service across the fleet.
#[derive(Parser)]
pub struct Restart {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Provisioning outputs file. Without it, the recorded validators are restarted.
    #[arg(long)]
    pub outputs: Option<PathBuf>,
}

impl Run for Restart {
    async fn run(self) -> color_eyre::Result<()> {
        let config = self.config.load()?;
        let hosts = match &self.outputs {
            Some(path) => load_outputs(&config, Some(path.as_path()))?.ips(),
            None => record_hosts(&FileStore::new(&config.store_path).get_all()?),
        };

        let (_key, transport) = connect(&config)?;
        let executor = Executor::new(transport, config.remote.user.clone());
        let report = restart_services(&executor, &hosts, &config.daemon.service)
            .await
            .wrap_err("restart failed")?;
        info!(hosts = report.len(), service = %config.daemon.service, "Service restarted");
        Ok(())
    }
}
