//! Record store inspection.

use std::path::PathBuf;

use clap::Subcommand;
use color_eyre::eyre::Context;

use starnet_deployer::store::DEFAULT_STORE_PATH;
use starnet_deployer::{FileStore, RecordStore};

use super::Run;

/// Inspect or clear the validator record store.
#[derive(Subcommand)]
pub enum Records {
    /// Print every record as JSON.
    Show {
        /// Record store file.
        #[arg(long, default_value = DEFAULT_STORE_PATH)]
        storage: PathBuf,
    },
    /// Delete the record store.
    Clear {
        /// Record store file.
        #[arg(long, default_value = DEFAULT_STORE_PATH)]
        storage: PathBuf,
    },
}

impl Run for Records {
    async fn run(self) -> color_eyre::Result<()> {
        match self {
            Self::Show { storage } => {
                let records = FileStore::new(&storage).get_all()?;
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
            Self::Clear { storage } => {
                FileStore::new(&storage)
                    .delete_all()
                    .wrap_err_with(|| format!("failed to clear {}", storage.display()))?;
                println!("Cleared {}", storage.display());
            }
        }
        Ok(())
    }
}
