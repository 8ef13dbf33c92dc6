//! Recover canonical node order from provisioned hostnames.
//!
//! The provisioning engine creates hosts asynchronously and reports them in no
//! particular order. Each hostname encodes its ordinal
//! (`starnet-<type>-<N>.<domain>`), so the list can be validated and sorted back
//! into index order before anything downstream relies on position.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::node::{Node, NodeRole};

/// Extract the ordinal encoded in `host`.
pub fn parse_index(role: NodeRole, domain: &str, host: &str) -> Result<usize> {
    let malformed = || Error::MalformedHostname {
        role,
        host: host.to_string(),
        domain: domain.to_string(),
    };

    let digits = host
        .strip_prefix(role.hostname_prefix().as_str())
        .and_then(|rest| rest.strip_suffix(domain))
        .and_then(|rest| rest.strip_suffix('.'))
        .ok_or_else(malformed)?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    digits.parse().map_err(|_| malformed())
}

/// Validate that `nodes` covers `0..=max` exactly once and sort it by index.
///
/// The sort is stable and ascending, so afterwards `nodes[i]` is the node whose
/// hostname encodes `i`.
pub fn index_nodes(role: NodeRole, domain: &str, nodes: &mut Vec<Node>) -> Result<()> {
    let mut positions: BTreeMap<usize, usize> = BTreeMap::new();
    let mut indices = Vec::with_capacity(nodes.len());

    for (position, node) in nodes.iter().enumerate() {
        let index = parse_index(role, domain, &node.host)?;
        if let Some(&first) = positions.get(&index) {
            return Err(Error::DuplicateSequenceIndex {
                role,
                index,
                first: nodes[first].host.clone(),
                second: node.host.clone(),
            });
        }
        positions.insert(index, position);
        indices.push(index);
    }

    if let Some(&max_index) = positions.keys().next_back() {
        if let Some(index) = (0..=max_index).find(|i| !positions.contains_key(i)) {
            return Err(Error::MissingSequenceIndex {
                role,
                index,
                count: nodes.len(),
            });
        }
    }

    let mut keyed: Vec<(usize, Node)> = indices.into_iter().zip(nodes.drain(..)).collect();
    keyed.sort_by_key(|(index, _)| *index);
    nodes.extend(keyed.into_iter().map(|(_, node)| node));

    debug!(%role, count = nodes.len(), "indexed nodes");
    Ok(())
}
