//! Node types for starnet node pools.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix shared by every provisioned hostname.
pub const HOSTNAME_PREFIX: &str = "starnet";

/// Domain the provisioning engine registers hostnames under by default.
pub const DEFAULT_DOMAIN: &str = "injective.network";

/// The role of a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// A validator node that participates in consensus.
    #[serde(rename = "validators")]
    Validator,
    /// A sentry node that shields validators from direct exposure.
    #[serde(rename = "sentry-nodes")]
    Sentry,
}

impl NodeRole {
    /// Both roles, in the order their phases run.
    pub const ALL: [NodeRole; 2] = [Self::Validator, Self::Sentry];

    /// Returns true if this node is a validator.
    pub fn is_validator(&self) -> bool {
        matches!(self, Self::Validator)
    }

    /// The type tag used both in hostnames and as the artifact directory name.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Validator => "validators",
            Self::Sentry => "sentry-nodes",
        }
    }

    /// The hostname prefix up to (and including) the dash before the ordinal.
    pub fn hostname_prefix(&self) -> String {
        format!("{HOSTNAME_PREFIX}-{}-", self.type_tag())
    }

    /// The canonical hostname of the node at `index`.
    pub fn hostname(&self, index: usize, domain: &str) -> String {
        format!("{}{index}.{domain}", self.hostname_prefix())
    }

    /// Work out which role a provisioned hostname belongs to.
    pub fn from_hostname(host: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|role| host.starts_with(&role.hostname_prefix()))
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_tag())
    }
}

/// A provisioned host in a starnet node pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Fully qualified hostname, `starnet-<type>-<N>.<domain>`.
    pub host: String,
    /// Public IP assigned by the provisioning engine.
    pub ip: String,
    /// The CometBFT node ID (populated after index resolution).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_node_id: Option<String>,
}

impl Node {
    /// Create a node as it comes out of provisioning, without an ID.
    pub fn new(host: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ip: ip.into(),
            network_node_id: None,
        }
    }

    /// Get the persistent peer address (node_id@ip:port).
    /// Returns None if the network node ID is not set.
    pub fn persistent_peer_address(&self, port: u16) -> Option<String> {
        self.network_node_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| format!("{}@{}:{}", id, self.ip, port))
    }
}

/// The validators and sentries of one deployment, each indexed independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSet {
    pub validators: Vec<Node>,
    pub sentries: Vec<Node>,
}

impl NodeSet {
    /// Split a provisioning output map (`hostname -> ip`) into roles.
    ///
    /// Order within each role is whatever the map yields; callers must run the
    /// indexer before relying on position.
    pub fn from_outputs(outputs: &BTreeMap<String, String>) -> Result<Self> {
        let mut set = Self::default();
        for (host, ip) in outputs {
            let role = NodeRole::from_hostname(host)
                .ok_or_else(|| Error::UnknownRole { host: host.clone() })?;
            set.nodes_mut(role).push(Node::new(host.as_str(), ip.as_str()));
        }
        Ok(set)
    }

    /// The nodes of one role.
    pub fn nodes(&self, role: NodeRole) -> &[Node] {
        match role {
            NodeRole::Validator => &self.validators,
            NodeRole::Sentry => &self.sentries,
        }
    }

    /// Mutable access to the nodes of one role.
    pub fn nodes_mut(&mut self, role: NodeRole) -> &mut Vec<Node> {
        match role {
            NodeRole::Validator => &mut self.validators,
            NodeRole::Sentry => &mut self.sentries,
        }
    }

    /// Every node with its role and position, validators first.
    pub fn iter(&self) -> impl Iterator<Item = (NodeRole, usize, &Node)> {
        NodeRole::ALL.into_iter().flat_map(move |role| {
            self.nodes(role)
                .iter()
                .enumerate()
                .map(move |(i, node)| (role, i, node))
        })
    }

    /// IPs of the whole fleet, validators first.
    pub fn ips(&self) -> Vec<String> {
        self.iter().map(|(_, _, node)| node.ip.clone()).collect()
    }

    /// Total number of nodes across both roles.
    pub fn len(&self) -> usize {
        self.validators.len() + self.sentries.len()
    }

    /// Returns true if neither role has any node.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
