//! Bridge to the external provisioning engine.
//!
//! The engine itself (creating instances, DNS records and firewalls) lives
//! outside this crate. [`CommandProvisioner`] drives it through configured
//! shell commands (`up`, `preview` and `destroy`): before each one runs, the
//! typed node-pool description is written to a JSON request file whose path is
//! exported as [`REQUEST_ENV`]. Once `up` exits, the engine's outputs file
//! (`{"<hostname>": "<ip>", ...}`) is read back and split into fully resolved
//! nodes.

use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::{DeployConfig, NodePool};
use crate::error::{Error, Result};
use crate::node::{NodeRole, NodeSet};

/// Environment variable holding the path of the JSON provisioning request.
pub const REQUEST_ENV: &str = "STARNET_PROVISION_REQUEST";

/// Creates and destroys the fleet's cloud resources.
pub trait Provisioner: Send + Sync {
    /// Create every node and resolve its hostname and IP.
    fn up(&self) -> impl Future<Output = Result<NodeSet>> + Send;

    /// Tear down everything [`Provisioner::up`] created.
    fn destroy(&self) -> impl Future<Output = Result<()>> + Send;
}

/// The request handed to the provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub domain: String,
    pub ssh_user: String,
    /// Validators first, then sentries.
    pub node_pools: Vec<PoolRequest>,
    pub injective: DaemonSource,
}

/// One role's pool, in the engine's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRequest {
    pub node_type: NodeRole,
    pub node_pool_name: String,
    pub node_pool_size: usize,
    pub node_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_startup_script: Option<String>,
    pub node_machine_type: String,
    #[serde(rename = "nodeDiskSizeGB")]
    pub node_disk_size_gb: u32,
    pub node_disk_type: String,
    pub nodes_auto_delete: bool,
    pub node_preemptible: bool,
    pub node_pool_label: Vec<String>,
    pub node_regions: Vec<String>,
    pub node_zones_per_region: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_ports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonSource {
    pub repository: String,
    pub branch: String,
}

impl PoolRequest {
    fn new(role: NodeRole, pool: &NodePool) -> Self {
        Self {
            node_type: role,
            node_pool_name: pool.name.clone(),
            node_pool_size: pool.size,
            node_image: pool.image.clone(),
            node_startup_script: pool.startup_script.clone(),
            node_machine_type: pool.machine_type.clone(),
            node_disk_size_gb: pool.disk_size_gb,
            node_disk_type: pool.disk_type.clone(),
            nodes_auto_delete: pool.auto_delete,
            node_preemptible: pool.preemptible,
            node_pool_label: pool.labels.clone(),
            node_regions: pool.regions.clone(),
            node_zones_per_region: pool.zones_per_region,
            node_ports: pool.ports.clone(),
        }
    }
}

impl ProvisionRequest {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            domain: config.network.domain.clone(),
            ssh_user: config.remote.user.clone(),
            node_pools: NodeRole::ALL
                .into_iter()
                .map(|role| PoolRequest::new(role, config.pool(role)))
                .collect(),
            injective: DaemonSource {
                repository: config.daemon.repository.clone(),
                branch: config.daemon.branch.clone(),
            },
        }
    }
}

/// Read an engine outputs file and split it into roles.
pub fn read_outputs(path: &Path) -> Result<NodeSet> {
    let data = fs::read(path).map_err(Error::io("read provisioning outputs", path))?;
    let outputs: BTreeMap<String, String> =
        serde_json::from_slice(&data).map_err(Error::json(path))?;
    NodeSet::from_outputs(&outputs)
}

/// [`Provisioner`] that shells out to configured engine commands.
#[derive(Debug, Clone)]
pub struct CommandProvisioner {
    request: ProvisionRequest,
    up_command: String,
    preview_command: String,
    destroy_command: String,
    outputs_path: PathBuf,
}

impl CommandProvisioner {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            request: ProvisionRequest::from_config(config),
            up_command: config.provisioner.up_command.clone(),
            preview_command: config.provisioner.preview_command.clone(),
            destroy_command: config.provisioner.destroy_command.clone(),
            outputs_path: config.provisioner.outputs_path.clone(),
        }
    }

    pub fn request(&self) -> &ProvisionRequest {
        &self.request
    }

    /// Run the engine's dry run for the current request. Creates nothing.
    pub async fn preview(&self) -> Result<()> {
        let request = self.write_request()?;
        self.run("preview", &self.preview_command, request.path()).await
    }

    fn write_request(&self) -> Result<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("starnet_request_")
            .suffix(".json")
            .tempfile()
            .map_err(Error::io("create provisioning request", std::env::temp_dir()))?;
        let body = serde_json::to_vec_pretty(&self.request).map_err(Error::json(file.path()))?;
        file.write_all(&body)
            .and_then(|()| file.flush())
            .map_err(Error::io("write provisioning request", file.path()))?;
        Ok(file)
    }

    async fn run(&self, what: &str, command: &str, request: &Path) -> Result<()> {
        info!(%command, "running provisioning {what}");
        // Dropping the future (for example on rollback timeout) kills the engine.
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env(REQUEST_ENV, request)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::Provision(format!("failed to start {what} command: {e}")))?;
        if !status.success() {
            warn!(%status, "provisioning {what} failed");
            return Err(Error::Provision(format!("{what} command exited with {status}")));
        }
        Ok(())
    }
}

impl Provisioner for CommandProvisioner {
    async fn up(&self) -> Result<NodeSet> {
        let request = self.write_request()?;
        self.run("up", &self.up_command, request.path()).await?;
        let nodes = read_outputs(&self.outputs_path)?;
        info!(
            validators = nodes.validators.len(),
            sentries = nodes.sentries.len(),
            "provisioned node pools"
        );
        Ok(nodes)
    }

    async fn destroy(&self) -> Result<()> {
        let request = self.write_request()?;
        self.run("destroy", &self.destroy_command, request.path()).await
    }
}
