//! Pre-flight check that every node's build artifacts exist locally.
//!
//! This runs before any cloud resource is created and again before the first
//! remote session opens, so a missing file never leaves a half-synced fleet.

use tracing::info;

use crate::error::{Error, Result};
use crate::layout::ArtifactLayout;
use crate::node::NodeRole;

/// Verify the executable and support library of nodes `0..count` for each role.
///
/// All missing paths are collected and reported together.
pub fn check_artifacts(
    layout: &ArtifactLayout,
    expected: impl IntoIterator<Item = (NodeRole, usize)>,
) -> Result<()> {
    let mut missing = Vec::new();
    let mut checked = 0;

    for (role, count) in expected {
        let role_dir = layout.role_dir(role);
        if !role_dir.is_dir() {
            missing.push(role_dir);
            continue;
        }
        for index in 0..count {
            for path in [layout.binary_path(role, index), layout.library_path(role, index)] {
                if !path.is_file() {
                    missing.push(path);
                }
            }
            checked += 1;
        }
    }

    if !missing.is_empty() {
        return Err(Error::MissingArtifacts { missing });
    }
    info!(nodes = checked, root = %layout.root().display(), "all build artifacts present");
    Ok(())
}
