//! The deployment pipeline.
//!
//! A run moves one way through [`Stage`]s:
//!
//! ```text
//! Provisioned -> Indexed -> IdAssigned -> PeersBuilt -> ConfigPatched
//!             -> ArtifactsChecked -> Synced -> Built
//! ```
//!
//! Local artifacts are checked before anything is provisioned. Once the
//! provisioning engine has been invoked, a failure at any stage hands the run
//! to [`crate::rollback`], which destroys the fleet.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use crate::checker::check_artifacts;
use crate::config::DeployConfig;
use crate::error::{Error, Result};
use crate::identity::{assign_ids, load_ids};
use crate::indexer::index_nodes;
use crate::layout::ArtifactLayout;
use crate::node::{NodeRole, NodeSet};
use crate::patch::patch_role_configs;
use crate::peers::{PeerList, build_peers};
use crate::provision::Provisioner;
use crate::remote::{Executor, Transport};
use crate::rollback::rollback_within;
use crate::store::RecordStore;
use crate::sync::{SyncReport, build_fleet, transfer_fleet};

/// A step of a deployment run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Provisioned,
    Indexed,
    IdAssigned,
    PeersBuilt,
    ConfigPatched,
    ArtifactsChecked,
    Synced,
    Built,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Provisioned => "provision",
            Self::Indexed => "index",
            Self::IdAssigned => "id assignment",
            Self::PeersBuilt => "peer list",
            Self::ConfigPatched => "config patch",
            Self::ArtifactsChecked => "artifact check",
            Self::Synced => "transfer",
            Self::Built => "remote build",
        })
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Started,
    Reached(Stage),
    Failed(Stage),
    RolledBack,
    RollbackFailed,
}

/// Drives one deployment.
pub struct Pipeline<P, T, S> {
    config: DeployConfig,
    layout: ArtifactLayout,
    provisioner: P,
    executor: Executor<T>,
    store: S,
    history: Vec<RunState>,
}

impl<P, T, S> Pipeline<P, T, S>
where
    P: Provisioner,
    T: Transport,
    S: RecordStore,
{
    pub fn new(config: DeployConfig, provisioner: P, transport: Arc<T>, store: S) -> Self {
        let layout = config.layout();
        let executor = Executor::new(transport, config.remote.user.clone());
        Self {
            config,
            layout,
            provisioner,
            executor,
            store,
            history: vec![RunState::Started],
        }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn executor(&self) -> &Executor<T> {
        &self.executor
    }

    /// The most recent state.
    pub fn state(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Started)
    }

    /// Every state the run has been in, oldest first.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    fn advance(&mut self, stage: Stage) {
        info!(%stage, "stage complete");
        self.history.push(RunState::Reached(stage));
    }

    fn record_failure(&mut self, err: &Error) {
        if matches!(self.state(), RunState::Failed(_)) {
            return;
        }
        if let Some(stage) = err.stage() {
            error!(%stage, error = %err, "stage failed");
            self.history.push(RunState::Failed(stage));
        }
    }

    /// Check local artifacts for the configured pool sizes.
    pub fn preflight(&self) -> Result<()> {
        check_artifacts(&self.layout, self.config.expected_counts())
            .map_err(|e| e.at(Stage::ArtifactsChecked))
    }

    /// Provision, configure and sync the whole fleet.
    ///
    /// On failure after provisioning the fleet is destroyed; the returned error
    /// is then [`Error::RolledBack`] or [`Error::RollbackFailed`].
    pub async fn up(&mut self) -> Result<NodeSet> {
        if let Err(err) = self.preflight() {
            self.record_failure(&err);
            return Err(err);
        }

        let outcome = self.provision_and_deploy().await;
        if let Err(err) = &outcome {
            self.record_failure(err);
        }

        let timeout = self.config.rollback_timeout();
        let result = rollback_within(&self.provisioner, outcome, timeout).await;
        match &result {
            Err(Error::RolledBack { .. }) => self.history.push(RunState::RolledBack),
            Err(Error::RollbackFailed { .. }) => self.history.push(RunState::RollbackFailed),
            _ => {}
        }
        result
    }

    async fn provision_and_deploy(&mut self) -> Result<NodeSet> {
        let mut nodes = self
            .provisioner
            .up()
            .await
            .and_then(|nodes| self.check_pool_sizes(nodes))
            .map_err(|e| e.at(Stage::Provisioned))?;
        self.advance(Stage::Provisioned);

        self.configure(&mut nodes)?;
        self.sync(&nodes).await?;
        Ok(nodes)
    }

    fn check_pool_sizes(&self, nodes: NodeSet) -> Result<NodeSet> {
        for role in NodeRole::ALL {
            let expected = self.config.pool(role).size;
            let got = nodes.nodes(role).len();
            if got != expected {
                return Err(Error::Provision(format!(
                    "expected {expected} {role}, provisioning returned {got}"
                )));
            }
        }
        Ok(nodes)
    }

    /// Configure every role that has nodes.
    pub fn configure(&mut self, nodes: &mut NodeSet) -> Result<BTreeMap<NodeRole, PeerList>> {
        let roles: Vec<NodeRole> = NodeRole::ALL
            .into_iter()
            .filter(|role| !nodes.nodes(*role).is_empty())
            .collect();
        self.configure_roles(nodes, &roles)
    }

    /// Run [`configure_roles`] as part of this pipeline.
    pub fn configure_roles(
        &mut self,
        nodes: &mut NodeSet,
        roles: &[NodeRole],
    ) -> Result<BTreeMap<NodeRole, PeerList>> {
        let history = &mut self.history;
        let result = configure_roles(
            &self.config,
            &self.layout,
            &self.store,
            nodes,
            roles,
            |stage| {
                info!(%stage, "stage complete");
                history.push(RunState::Reached(stage));
            },
        );
        if let Err(err) = &result {
            self.record_failure(err);
        }
        result
    }

    /// Re-check artifacts, transfer them and build on every host.
    ///
    /// Bounded by the configured sync budget, if any.
    pub async fn sync(&mut self, nodes: &NodeSet) -> Result<SyncReport> {
        let result = match self.config.sync_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, self.sync_stages(nodes))
                .await
                .unwrap_or(Err(Error::StageTimeout {
                    stage: Stage::Synced,
                    timeout,
                })),
            None => self.sync_stages(nodes).await,
        };
        if let Err(err) = &result {
            self.record_failure(err);
        }
        result
    }

    async fn sync_stages(&mut self, nodes: &NodeSet) -> Result<SyncReport> {
        let counts = NodeRole::ALL
            .into_iter()
            .map(|role| (role, nodes.nodes(role).len()))
            .filter(|(_, count)| *count > 0);
        check_artifacts(&self.layout, counts).map_err(|e| e.at(Stage::ArtifactsChecked))?;
        self.advance(Stage::ArtifactsChecked);

        let transfers = transfer_fleet(
            &self.executor,
            &self.layout,
            nodes,
            &self.config.remote.artifacts_dir,
        )
        .await;
        let transfers_ok = transfers.failures.is_empty();
        if transfers_ok {
            self.advance(Stage::Synced);
        }

        let build = build_fleet(&self.executor, &transfers.completed, &self.config.daemon).await;
        let stage = if transfers_ok {
            Stage::Built
        } else {
            Stage::Synced
        };
        let report = SyncReport { transfers, build }
            .into_result()
            .map_err(|e| e.at(stage))?;
        self.advance(Stage::Built);
        Ok(report)
    }
}

/// Index, assign IDs, build peers and patch configs for `roles`.
///
/// Each step completes for every role before the next starts, and peers are
/// built in [`NodeRole::ALL`] order so validators reach the record store
/// before sentries read it. `on_stage` is called as each step completes.
pub fn configure_roles(
    config: &DeployConfig,
    layout: &ArtifactLayout,
    store: &impl RecordStore,
    nodes: &mut NodeSet,
    roles: &[NodeRole],
    mut on_stage: impl FnMut(Stage),
) -> Result<BTreeMap<NodeRole, PeerList>> {
    let mut roles = roles.to_vec();
    roles.sort();
    roles.dedup();
    let domain = &config.network.domain;
    let port = config.network.p2p_port;

    for &role in &roles {
        index_nodes(role, domain, nodes.nodes_mut(role)).map_err(|e| e.at(Stage::Indexed))?;
    }
    on_stage(Stage::Indexed);

    for &role in &roles {
        load_ids(&layout.ids_path(role))
            .and_then(|ids| assign_ids(role, nodes.nodes_mut(role), ids))
            .map_err(|e| e.at(Stage::IdAssigned))?;
    }
    on_stage(Stage::IdAssigned);

    let mut peers = BTreeMap::new();
    for &role in &roles {
        let list = build_peers(role, nodes.nodes(role), store, port)
            .map_err(|e| e.at(Stage::PeersBuilt))?;
        peers.insert(role, list);
    }
    on_stage(Stage::PeersBuilt);

    for (&role, list) in &peers {
        patch_role_configs(layout, role, nodes.nodes(role).len(), list)
            .map_err(|e| e.at(Stage::ConfigPatched))?;
    }
    on_stage(Stage::ConfigPatched);

    Ok(peers)
}
