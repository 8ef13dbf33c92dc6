//! starnet-deployer: Turn a provisioned validator/sentry node pool into a
//! peer-connected network.
//!
//! The crate consumes fully resolved provisioning outputs (hostname and IP per
//! node), recovers each node's ordinal from its hostname, binds the externally
//! generated network IDs, writes the `persistent_peers` topology into every
//! node's CometBFT `config.toml`, and then pushes the artifacts to the fleet and
//! builds the node daemon remotely. Any failure after provisioning hands a
//! destroy decision back to the provisioning engine.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use starnet_deployer::{CommandProvisioner, DeployConfig, FileStore, OpenSsh, Pipeline};
//!
//! # async fn run() -> starnet_deployer::Result<()> {
//! let config = DeployConfig::load("starnet.toml")?;
//! let provisioner = CommandProvisioner::from_config(&config);
//! let transport = Arc::new(OpenSsh::from_env(None, config.remote.ssh_port)?);
//! let store = FileStore::new(&config.store_path);
//!
//! let mut pipeline = Pipeline::new(config, provisioner, transport, store);
//! let nodes = pipeline.up().await?;
//! println!("{} validators online", nodes.validators.len());
//! # Ok(())
//! # }
//! ```

pub mod checker;
pub mod config;
pub mod credential;
pub mod error;
pub mod identity;
pub mod indexer;
pub mod layout;
pub mod node;
pub mod patch;
pub mod peers;
pub mod pipeline;
pub mod provision;
pub mod remote;
pub mod rollback;
pub mod service;
pub mod store;
pub mod sync;

pub use config::{DeployConfig, NodePool};
pub use credential::KeyFile;
pub use error::{Error, HostFailure, Result};
pub use layout::ArtifactLayout;
pub use node::{Node, NodeRole, NodeSet};
pub use peers::{DEFAULT_P2P_PORT, PeerList};
pub use pipeline::{Pipeline, RunState, Stage};
pub use provision::{CommandProvisioner, ProvisionRequest, Provisioner};
pub use remote::{
    CommandOutput, ExecutionReport, Executor, HostResult, OpenSsh, SessionError, Transport,
};
pub use store::{FileStore, Record, RecordStore};
