//! Deployment configuration.
//!
//! A deployment is described by one TOML file. Every section is optional and
//! falls back to the defaults below, so a minimal file only needs to set what
//! differs. The file is validated once at load; everything downstream works
//! with the typed value.
//!
//! ```toml
//! [validators]
//! size = 4
//!
//! [sentries]
//! size = 2
//! regions = ["europe-west1", "us-east1"]
//!
//! [daemon]
//! branch = "release/v1.14"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layout::{
    ArtifactLayout, DEFAULT_ARTIFACTS_ROOT, DEFAULT_BINARY_NAME, DEFAULT_LIBRARY_NAME,
};
use crate::node::{DEFAULT_DOMAIN, NodeRole};
use crate::peers::DEFAULT_P2P_PORT;
use crate::rollback::ROLLBACK_TIMEOUT;
use crate::store::DEFAULT_STORE_PATH;

/// Default config file looked up by the CLI.
pub const DEFAULT_CONFIG_PATH: &str = "starnet.toml";

/// Default environment variable holding an SSH private key.
pub const DEFAULT_IDENTITY_ENV: &str = "STARNET_SSH_KEY";

/// Full configuration of a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    pub network: NetworkSettings,
    pub validators: NodePool,
    pub sentries: NodePool,
    pub daemon: DaemonSettings,
    pub remote: RemoteSettings,
    pub artifacts: ArtifactSettings,
    pub provisioner: ProvisionerSettings,
    /// Path of the validator record store.
    pub store_path: PathBuf,
}

/// Naming and P2P settings shared by every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSettings {
    /// Domain hostnames are registered under.
    pub domain: String,
    /// Port written into every peer address.
    pub p2p_port: u16,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            p2p_port: DEFAULT_P2P_PORT,
        }
    }
}

/// Machine shape of one role's node pool, handed to the provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodePool {
    pub name: String,
    pub size: usize,
    pub machine_type: String,
    pub image: String,
    pub startup_script: Option<String>,
    pub disk_size_gb: u32,
    pub disk_type: String,
    pub auto_delete: bool,
    pub preemptible: bool,
    pub regions: Vec<String>,
    pub zones_per_region: u32,
    pub ports: Vec<String>,
    pub labels: Vec<String>,
}

impl NodePool {
    fn for_role(role: NodeRole) -> Self {
        Self {
            name: format!("starnet-{}", role.type_tag()),
            size: match role {
                NodeRole::Validator => 4,
                NodeRole::Sentry => 0,
            },
            ..Default::default()
        }
    }
}

impl Default for NodePool {
    fn default() -> Self {
        Self {
            name: String::new(),
            size: 0,
            machine_type: "n2-standard-8".to_string(),
            image: "ubuntu-os-cloud/ubuntu-2204-lts".to_string(),
            startup_script: None,
            disk_size_gb: 200,
            disk_type: "pd-ssd".to_string(),
            auto_delete: true,
            preemptible: false,
            regions: vec!["us-central1".to_string()],
            zones_per_region: 1,
            ports: vec!["22".to_string(), "26656".to_string(), "26657".to_string()],
            labels: Vec::new(),
        }
    }
}

/// Where the node daemon is built from and how it runs on the hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonSettings {
    pub repository: String,
    pub branch: String,
    /// systemd unit managed by `restart` and `push-state`.
    pub service: String,
}

impl DaemonSettings {
    /// The directory `git clone` creates for [`Self::repository`].
    pub fn checkout_dir(&self) -> &str {
        let name = self
            .repository
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()
            .unwrap_or_default();
        name.strip_suffix(".git").unwrap_or(name)
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            repository: "https://github.com/InjectiveLabs/injective-core".to_string(),
            branch: "master".to_string(),
            service: "injectived".to_string(),
        }
    }
}

/// Remote session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteSettings {
    /// Service user every session logs in as.
    pub user: String,
    /// Where each node's artifact directory is copied to.
    pub artifacts_dir: String,
    /// Where `push-state` copies the node state directory to.
    pub state_dir: String,
    pub ssh_port: u16,
    /// Environment variable that may hold a private key for `ssh -i`.
    pub identity_env: Option<String>,
    /// Overall budget for transfers plus remote build. Unbounded if unset.
    pub sync_timeout_secs: Option<u64>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            user: "injectived".to_string(),
            artifacts_dir: "/home/injectived/artifacts".to_string(),
            state_dir: "/home/injectived/.injectived".to_string(),
            ssh_port: 22,
            identity_env: Some(DEFAULT_IDENTITY_ENV.to_string()),
            sync_timeout_secs: None,
        }
    }
}

/// Local build artifact tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactSettings {
    pub root: PathBuf,
    pub binary: String,
    pub library: String,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ARTIFACTS_ROOT),
            binary: DEFAULT_BINARY_NAME.to_string(),
            library: DEFAULT_LIBRARY_NAME.to_string(),
        }
    }
}

/// Commands driving the external provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionerSettings {
    /// Creates the fleet and writes `outputs_path`.
    pub up_command: String,
    /// Shows what `up_command` would change without changing anything.
    pub preview_command: String,
    /// Destroys everything `up_command` created.
    pub destroy_command: String,
    /// JSON object of `hostname -> ip` written by `up_command`.
    pub outputs_path: PathBuf,
    pub rollback_timeout_secs: u64,
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self {
            up_command: "pulumi up --yes --skip-preview && pulumi stack output --json > starnet-outputs.json"
                .to_string(),
            preview_command: "pulumi preview".to_string(),
            destroy_command: "pulumi destroy --yes --skip-preview".to_string(),
            outputs_path: PathBuf::from("starnet-outputs.json"),
            rollback_timeout_secs: ROLLBACK_TIMEOUT.as_secs(),
        }
    }
}

impl DeployConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(Error::io("read config", path))?;
        let mut config: Self = toml::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        // A pool table without a name still gets the role's pool name.
        for role in NodeRole::ALL {
            let pool = config.pool_mut(role);
            if pool.name.is_empty() {
                pool.name = NodePool::for_role(role).name;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));

        if self.network.domain.is_empty() {
            return invalid("network.domain must not be empty");
        }
        if self.network.p2p_port == 0 {
            return invalid("network.p2p_port must not be 0");
        }
        if self.validators.size == 0 {
            return invalid("validators.size must be at least 1");
        }
        for (role, pool) in [("validators", &self.validators), ("sentries", &self.sentries)] {
            if pool.size > 0 && pool.regions.is_empty() {
                return Err(Error::InvalidConfig(format!("{role}.regions must not be empty")));
            }
            if pool.size > 0 && pool.zones_per_region == 0 {
                return Err(Error::InvalidConfig(format!(
                    "{role}.zones_per_region must be at least 1"
                )));
            }
        }
        if self.daemon.repository.is_empty() || self.daemon.checkout_dir().is_empty() {
            return invalid("daemon.repository must be a repository URL");
        }
        if self.daemon.branch.is_empty() {
            return invalid("daemon.branch must not be empty");
        }
        if self.daemon.service.is_empty() {
            return invalid("daemon.service must not be empty");
        }
        if self.remote.user.is_empty() {
            return invalid("remote.user must not be empty");
        }
        if !self.remote.artifacts_dir.starts_with('/') || !self.remote.state_dir.starts_with('/') {
            return invalid("remote.artifacts_dir and remote.state_dir must be absolute paths");
        }
        if self.remote.ssh_port == 0 {
            return invalid("remote.ssh_port must not be 0");
        }
        if self.remote.sync_timeout_secs == Some(0) {
            return invalid("remote.sync_timeout_secs must be positive when set");
        }
        if self.artifacts.binary.is_empty() || self.artifacts.library.is_empty() {
            return invalid("artifacts.binary and artifacts.library must not be empty");
        }
        if self.provisioner.up_command.trim().is_empty()
            || self.provisioner.destroy_command.trim().is_empty()
        {
            return invalid("provisioner.up_command and provisioner.destroy_command must be set");
        }
        if self.provisioner.rollback_timeout_secs == 0 {
            return invalid("provisioner.rollback_timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(
            &self.artifacts.root,
            &self.artifacts.binary,
            &self.artifacts.library,
        )
    }

    pub fn pool(&self, role: NodeRole) -> &NodePool {
        match role {
            NodeRole::Validator => &self.validators,
            NodeRole::Sentry => &self.sentries,
        }
    }

    pub fn pool_mut(&mut self, role: NodeRole) -> &mut NodePool {
        match role {
            NodeRole::Validator => &mut self.validators,
            NodeRole::Sentry => &mut self.sentries,
        }
    }

    /// Node count per role, skipping roles with an empty pool.
    pub fn expected_counts(&self) -> Vec<(NodeRole, usize)> {
        NodeRole::ALL
            .into_iter()
            .map(|role| (role, self.pool(role).size))
            .filter(|(_, size)| *size > 0)
            .collect()
    }

    pub fn rollback_timeout(&self) -> Duration {
        Duration::from_secs(self.provisioner.rollback_timeout_secs)
    }

    pub fn sync_timeout(&self) -> Option<Duration> {
        self.remote.sync_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: NetworkSettings::default(),
            validators: NodePool::for_role(NodeRole::Validator),
            sentries: NodePool::for_role(NodeRole::Sentry),
            daemon: DaemonSettings::default(),
            remote: RemoteSettings::default(),
            artifacts: ArtifactSettings::default(),
            provisioner: ProvisionerSettings::default(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}
