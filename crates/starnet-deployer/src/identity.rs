//! Bind externally generated network IDs to indexed nodes.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::node::{Node, NodeRole};

/// Read a role's `ids.json`, a JSON array of node ID strings.
pub fn load_ids(path: &Path) -> Result<Vec<String>> {
    let data = fs::read(path).map_err(Error::io("read node ids", path))?;
    serde_json::from_slice(&data).map_err(Error::json(path))
}

/// Assign `ids[i]` to `nodes[i]`.
///
/// `nodes` must already be in index order (see [`crate::indexer::index_nodes`]).
/// Nothing is assigned unless the counts match exactly.
pub fn assign_ids(role: NodeRole, nodes: &mut [Node], ids: Vec<String>) -> Result<()> {
    if ids.len() != nodes.len() {
        return Err(Error::IdCountMismatch {
            role,
            ids: ids.len(),
            nodes: nodes.len(),
            hosts: nodes.iter().map(|n| n.host.clone()).collect(),
            id_list: ids,
        });
    }

    for (node, id) in nodes.iter_mut().zip(ids) {
        debug!(%role, host = %node.host, %id, "assigned network node id");
        node.network_node_id = Some(id);
    }
    Ok(())
}
