//! Peer topology for each role.
//!
//! Validators peer with each other and publish their identities to the record
//! store. Sentries never look at in-memory validators (they may be provisioned
//! by a separate run) and instead build their peer list from the store.

use std::fmt;

use tracing::info;

use crate::error::{Error, Result};
use crate::node::{Node, NodeRole};
use crate::store::{Record, RecordStore};

/// Default CometBFT P2P port.
pub const DEFAULT_P2P_PORT: u16 = 26656;

/// An ordered list of `node_id@ip:port` peer addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerList(Vec<String>);

impl PeerList {
    /// Build peers from indexed nodes, in index order.
    pub fn from_nodes(nodes: &[Node], port: u16) -> Result<Self> {
        nodes
            .iter()
            .map(|node| {
                node.persistent_peer_address(port)
                    .ok_or_else(|| Error::MissingNodeId {
                        host: node.host.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Build peers from persisted validator records, in record order.
    pub fn from_records(records: &[Record], port: u16) -> Result<Self> {
        records
            .iter()
            .map(|record| {
                if record.id.is_empty() {
                    Err(Error::MissingNodeId {
                        host: record.hostname.clone(),
                    })
                } else {
                    Ok(format!("{}@{}:{}", record.id, record.ip, port))
                }
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// The comma-separated form used in `persistent_peers`.
    pub fn joined(&self) -> String {
        self.0.join(",")
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

/// Records for `validators`, in index order.
pub fn validator_records(validators: &[Node]) -> Result<Vec<Record>> {
    validators
        .iter()
        .map(|node| match node.network_node_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(Record {
                hostname: node.host.clone(),
                ip: node.ip.clone(),
                id: id.to_string(),
            }),
            _ => Err(Error::MissingNodeId {
                host: node.host.clone(),
            }),
        })
        .collect()
}

/// Build the peer list `nodes` of `role` should be configured with.
///
/// For validators this also overwrites the record store with their identities.
/// For sentries `nodes` is not consulted; peers come from the store.
pub fn build_peers(
    role: NodeRole,
    nodes: &[Node],
    store: &impl RecordStore,
    port: u16,
) -> Result<PeerList> {
    let peers = match role {
        NodeRole::Validator => {
            let peers = PeerList::from_nodes(nodes, port)?;
            store.set_all(&validator_records(nodes)?)?;
            peers
        }
        NodeRole::Sentry => PeerList::from_records(&store.get_all()?, port)?,
    };
    info!(%role, peers = peers.len(), "built peer list");
    Ok(peers)
}
