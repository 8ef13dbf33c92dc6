//! On-disk layout of the generated per-node artifacts.
//!
//! The artifact root is produced by the network generator (one directory per
//! role, one numbered directory per node) and is passed explicitly to every
//! component that touches it.

use std::path::{Path, PathBuf};

use crate::node::NodeRole;

/// File holding the externally generated node IDs of a role.
pub const ID_FILE_NAME: &str = "ids.json";

/// Default artifact root, relative to the working directory.
pub const DEFAULT_ARTIFACTS_ROOT: &str = "chain-stresser-deploy";

/// Default name of the node daemon executable inside each node directory.
pub const DEFAULT_BINARY_NAME: &str = "injectived";

/// Default name of the native support library inside each node directory.
pub const DEFAULT_LIBRARY_NAME: &str = "libwasmvm.x86_64.so";

/// Paths into a generated artifact tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
    binary: String,
    library: String,
}

impl ArtifactLayout {
    pub fn new(
        root: impl Into<PathBuf>,
        binary: impl Into<String>,
        library: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            binary: binary.into(),
            library: library.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the directory holding all nodes of `role`.
    pub fn role_dir(&self, role: NodeRole) -> PathBuf {
        self.root.join(role.type_tag())
    }

    /// Get the path to the ids.json file of `role`.
    pub fn ids_path(&self, role: NodeRole) -> PathBuf {
        self.role_dir(role).join(ID_FILE_NAME)
    }

    /// Get the generated directory of the node at sorted position `index`.
    pub fn node_dir(&self, role: NodeRole, index: usize) -> PathBuf {
        self.role_dir(role).join(index.to_string())
    }

    /// Get the path to the config.toml file.
    pub fn config_toml_path(&self, role: NodeRole, index: usize) -> PathBuf {
        self.node_dir(role, index).join("config").join("config.toml")
    }

    /// Get the path to the node daemon executable.
    pub fn binary_path(&self, role: NodeRole, index: usize) -> PathBuf {
        self.node_dir(role, index).join(&self.binary)
    }

    /// Get the path to the native support library.
    pub fn library_path(&self, role: NodeRole, index: usize) -> PathBuf {
        self.node_dir(role, index).join(&self.library)
    }
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self::new(DEFAULT_ARTIFACTS_ROOT, DEFAULT_BINARY_NAME, DEFAULT_LIBRARY_NAME)
    }
}
