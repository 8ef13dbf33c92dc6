//! Flat record store carrying validator identities to the sentry phase.
//!
//! The store is a single JSON array on disk. Writers always replace the whole
//! record set; there is no locking, the validator and sentry phases are run one
//! after another.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default location of the record store, relative to the working directory.
pub const DEFAULT_STORE_PATH: &str = "./storage.json";

/// A validator's peer identity as persisted for later phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub hostname: String,
    pub ip: String,
    pub id: String,
}

/// Whole-set access to persisted validator records.
pub trait RecordStore {
    /// Read every record. A store that was never written is an error.
    fn get_all(&self) -> Result<Vec<Record>>;
    /// Replace the entire record set.
    fn set_all(&self, records: &[Record]) -> Result<()>;
    /// Remove every record. Removing an absent store is not an error.
    fn delete_all(&self) -> Result<()>;
}

/// A [`RecordStore`] backed by one JSON file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_PATH)
    }
}

impl RecordStore for FileStore {
    fn get_all(&self) -> Result<Vec<Record>> {
        let data = fs::read(&self.path).map_err(Error::io("read record store", &self.path))?;
        if data.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&data).map_err(Error::json(&self.path))
    }

    fn set_all(&self, records: &[Record]) -> Result<()> {
        let data = serde_json::to_vec(records).map_err(Error::json(&self.path))?;
        fs::write(&self.path, data).map_err(Error::io("write record store", &self.path))
    }

    fn delete_all(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other.map_err(Error::io("remove record store", &self.path)),
        }
    }
}
