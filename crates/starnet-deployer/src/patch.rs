//! Rewrite the `persistent_peers` directive of generated CometBFT configs.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::layout::ArtifactLayout;
use crate::node::NodeRole;
use crate::peers::PeerList;

/// The config key holding the peer list.
pub const PEER_DIRECTIVE: &str = "persistent_peers";

/// Returns true if `line` assigns [`PEER_DIRECTIVE`].
///
/// Keys that merely start with the directive name (for example
/// `persistent_peers_max_dial_period`) do not count.
fn is_peer_directive(line: &str) -> bool {
    line.trim_start()
        .strip_prefix(PEER_DIRECTIVE)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

/// Replace the first peer directive line in `content`.
///
/// Every other line, and the presence or absence of a trailing newline, is
/// preserved byte for byte. Returns `None` if there is no directive.
pub fn patch_content(content: &str, peers: &PeerList) -> Option<String> {
    let mut lines: Vec<&str> = content.split('\n').collect();
    let position = lines.iter().position(|line| is_peer_directive(line))?;

    let replacement = format!("{PEER_DIRECTIVE} = \"{}\"", peers.joined());
    lines[position] = &replacement;
    Some(lines.join("\n"))
}

/// Patch one config file in place.
pub fn patch_config(path: &Path, peers: &PeerList) -> Result<()> {
    let content = fs::read_to_string(path).map_err(Error::io("read config file", path))?;
    let patched = patch_content(&content, peers).ok_or_else(|| Error::PeerDirectiveNotFound {
        path: path.to_path_buf(),
    })?;
    fs::write(path, patched).map_err(Error::io("write config file", path))?;
    debug!(path = %path.display(), "patched persistent_peers");
    Ok(())
}

/// Patch the configs of nodes `0..count` of `role` with the same peer list.
pub fn patch_role_configs(
    layout: &ArtifactLayout,
    role: NodeRole,
    count: usize,
    peers: &PeerList,
) -> Result<()> {
    for index in 0..count {
        patch_config(&layout.config_toml_path(role, index), peers)?;
    }
    Ok(())
}
