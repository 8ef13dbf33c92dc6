//! Scoped SSH identity file.
//!
//! Key material handed to the deployer (typically through a CI secret) has to
//! live in a file for `ssh -i`. A [`KeyFile`] owns that file for the duration of
//! a run and removes it when dropped, whether the run succeeded or not.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};

/// A private key written to a temporary file, removed on drop.
#[derive(Debug)]
pub struct KeyFile {
    file: NamedTempFile,
}

impl KeyFile {
    /// Write `key` to a fresh temporary file readable only by the current user.
    pub fn from_key_material(key: &[u8]) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("starnet_key_")
            .tempfile()
            .map_err(Error::io("create key file", std::env::temp_dir()))?;
        file.write_all(key)
            .and_then(|()| file.flush())
            .map_err(Error::io("write key file", file.path()))?;
        debug!(path = %file.path().display(), "wrote temporary ssh identity");
        Ok(Self { file })
    }

    /// Read key material from the environment variable `var`, if it is set.
    pub fn from_env(var: &str) -> Result<Option<Self>> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => {
                let mut key = key;
                if !key.ends_with('\n') {
                    // OpenSSH refuses PEM keys without the final newline.
                    key.push('\n');
                }
                Self::from_key_material(key.as_bytes()).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
