//! Test fixtures: a scratch artifact tree plus fake engine and transport.
//!
//! [`Fixture`] lays out what the chain generator would produce for a fleet
//! (per-node binary, library and `config.toml`, plus a per-role `ids.json`).
//! [`FakeProvisioner`] hands back a fixed node set and counts destroys.
//! [`FakeTransport`] records every transfer and command and can be told to
//! fail specific hosts.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use starnet_deployer::remote::{CommandOutput, SessionError, Transport};
use starnet_deployer::{
    ArtifactLayout, DeployConfig, Error, FileStore, Node, NodeRole, NodeSet, Pipeline,
    Provisioner, Result,
};

use crate::constants::{COMETBFT_CONFIG, TEST_DOMAIN};

/// A node named the way the provisioning engine names it.
pub fn node(role: NodeRole, index: usize, ip: &str) -> Node {
    Node::new(role.hostname(index, TEST_DOMAIN), ip)
}

/// A scratch deployment directory.
pub struct Fixture {
    pub config: DeployConfig,
    /// Dropped last; removes everything.
    _dir: tempfile::TempDir,
}

impl Fixture {
    /// Artifacts for `validators` and `sentries` nodes, with IDs `v<i>` / `s<i>`.
    pub fn new(validators: usize, sentries: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DeployConfig::default();
        config.artifacts.root = dir.path().join("chain-stresser-deploy");
        config.store_path = dir.path().join("storage.json");
        config.validators.size = validators;
        config.sentries.size = sentries;

        let fixture = Self { config, _dir: dir };
        for (role, count, prefix) in [
            (NodeRole::Validator, validators, "v"),
            (NodeRole::Sentry, sentries, "s"),
        ] {
            for index in 0..count {
                fixture.write_node(role, index);
            }
            let ids: Vec<String> = (0..count).map(|i| format!("{prefix}{i}")).collect();
            fixture.write_ids(role, ids.as_slice());
        }
        fixture
    }

    pub fn layout(&self) -> ArtifactLayout {
        self.config.layout()
    }

    pub fn store(&self) -> FileStore {
        FileStore::new(&self.config.store_path)
    }

    fn write_node(&self, role: NodeRole, index: usize) {
        let layout = self.layout();
        let config_toml = layout.config_toml_path(role, index);
        fs::create_dir_all(config_toml.parent().unwrap()).unwrap();
        fs::write(&config_toml, COMETBFT_CONFIG).unwrap();
        fs::write(layout.binary_path(role, index), b"\x7fELF").unwrap();
        fs::write(layout.library_path(role, index), b"\x7fELF").unwrap();
    }

    /// Overwrite a role's `ids.json`.
    pub fn write_ids<S: AsRef<str>>(&self, role: NodeRole, ids: &[S]) {
        let ids: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
        let path = self.layout().ids_path(role);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_vec(&ids).unwrap()).unwrap();
    }

    pub fn config_toml(&self, role: NodeRole, index: usize) -> String {
        fs::read_to_string(self.layout().config_toml_path(role, index)).unwrap()
    }

    /// The `persistent_peers` line of a node's config.
    pub fn peer_line(&self, role: NodeRole, index: usize) -> String {
        self.config_toml(role, index)
            .lines()
            .find(|line| line.starts_with("persistent_peers ="))
            .unwrap()
            .to_string()
    }

    pub fn remove_artifact(&self, path: &Path) {
        fs::remove_file(path).unwrap();
    }

    /// A pipeline over this fixture.
    pub fn pipeline(
        &self,
        provisioner: FakeProvisioner,
        transport: Arc<FakeTransport>,
    ) -> Pipeline<FakeProvisioner, FakeTransport, FileStore> {
        Pipeline::new(self.config.clone(), provisioner, transport, self.store())
    }
}

#[derive(Default)]
struct ProvisionerState {
    ups: AtomicUsize,
    destroys: AtomicUsize,
}

/// Provisioning engine that "creates" a fixed node set.
#[derive(Clone)]
pub struct FakeProvisioner {
    nodes: NodeSet,
    fail_destroy: bool,
    state: Arc<ProvisionerState>,
}

impl FakeProvisioner {
    pub fn new(nodes: NodeSet) -> Self {
        Self {
            nodes,
            fail_destroy: false,
            state: Arc::default(),
        }
    }

    pub fn failing_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }

    pub fn ups(&self) -> usize {
        self.state.ups.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.state.destroys.load(Ordering::SeqCst)
    }
}

impl Provisioner for FakeProvisioner {
    async fn up(&self) -> Result<NodeSet> {
        self.state.ups.fetch_add(1, Ordering::SeqCst);
        Ok(self.nodes.clone())
    }

    async fn destroy(&self) -> Result<()> {
        self.state.destroys.fetch_add(1, Ordering::SeqCst);
        if self.fail_destroy {
            return Err(Error::Provision("instances still in use".to_string()));
        }
        Ok(())
    }
}

/// Transport that records everything and fails on request.
#[derive(Default)]
pub struct FakeTransport {
    /// Hosts that reject authentication.
    pub unreachable: HashSet<String>,
    /// Hosts whose commands exit with status 2.
    pub failing: HashSet<String>,
    /// Hosts whose transfers fail.
    pub full_disk: HashSet<String>,
    /// Delay applied to every transfer.
    pub transfer_delay: Option<Duration>,
    pub copies: Mutex<Vec<(PathBuf, String, String)>>,
    pub commands: Mutex<Vec<(String, String, String)>>,
}

impl FakeTransport {
    pub fn with_unreachable(hosts: &[&str]) -> Self {
        Self {
            unreachable: hosts.iter().map(|h| h.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_failing(hosts: &[&str]) -> Self {
        Self {
            failing: hosts.iter().map(|h| h.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_full_disk(hosts: &[&str]) -> Self {
        Self {
            full_disk: hosts.iter().map(|h| h.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Hosts that received a command, sorted.
    pub fn commanded_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<_> = self
            .commands
            .lock()
            .unwrap()
            .iter()
            .map(|(host, _, _)| host.clone())
            .collect();
        hosts.sort();
        hosts
    }

    /// `(local dir, host)` of every transfer, sorted by host.
    pub fn transfers(&self) -> Vec<(PathBuf, String)> {
        let mut copies: Vec<_> = self
            .copies
            .lock()
            .unwrap()
            .iter()
            .map(|(local, host, _)| (local.clone(), host.clone()))
            .collect();
        copies.sort_by(|a, b| a.1.cmp(&b.1));
        copies
    }
}

impl Transport for FakeTransport {
    async fn execute(
        &self,
        host: &str,
        user: &str,
        command: &str,
    ) -> std::result::Result<CommandOutput, SessionError> {
        self.commands
            .lock()
            .unwrap()
            .push((host.to_string(), user.to_string(), command.to_string()));
        if self.unreachable.contains(host) {
            return Err(SessionError::Dial(format!(
                "{user}@{host}: Permission denied (publickey)."
            )));
        }
        if self.failing.contains(host) {
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: "make: *** [Makefile:42: install] Error 2\n".to_string(),
                exit_code: 2,
            });
        }
        Ok(CommandOutput {
            stdout: format!("ran on {host}\n"),
            stderr: String::new(),
            exit_code: 0,
        })
    }

    async fn copy_dir(
        &self,
        local: &Path,
        host: &str,
        user: &str,
        remote: &str,
    ) -> std::result::Result<(), SessionError> {
        if let Some(delay) = self.transfer_delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.contains(host) {
            return Err(SessionError::Dial(format!(
                "{user}@{host}: Permission denied (publickey)."
            )));
        }
        if self.full_disk.contains(host) {
            return Err(SessionError::Transfer {
                code: 11,
                stderr: "rsync: write failed: No space left on device (28)".to_string(),
            });
        }
        self.copies
            .lock()
            .unwrap()
            .push((local.to_path_buf(), host.to_string(), remote.to_string()));
        Ok(())
    }
}
