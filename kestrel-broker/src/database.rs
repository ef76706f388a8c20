//! Database management for the embedded metadata store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use sled::{Config as SledConfig, Db, IVec};

use crate::config::Config;
use crate::error::{ShutdownError, ShutdownResult};

pub type Tree = sled::Tree;

/// The directory under the storage root holding the metadata database.
const METADATA_DIR: &str = "metadata";
/// The DB tree used for broker registrations.
const TREE_BROKERS: &str = "brokers";
/// The DB tree used for topic descriptors.
const TREE_TOPICS: &str = "topics";
/// The DB tree used for partition states.
const TREE_PARTITIONS: &str = "partitions";
/// The DB tree used for committed group offsets.
const TREE_OFFSETS: &str = "offsets";

/// An abstraction over the Kestrel metadata database.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    /// The underlying DB handle.
    db: Db,
}

impl Database {
    /// Open the database for usage.
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        // Determine the database path, and ensure it exists.
        let dbpath = PathBuf::from(&config.storage_data_path).join(METADATA_DIR);
        tokio::fs::create_dir_all(&dbpath)
            .await
            .context("error creating dir for kestrel metadata database")?;

        Self::spawn_blocking(move || -> Result<Self> {
            let db = SledConfig::new().path(dbpath).mode(sled::Mode::HighThroughput).open()?;
            let inner = Arc::new(DatabaseInner { db });
            Ok(Self { inner })
        })
        .await?
    }

    /// Spawn a blocking database-related function, returning a ShutdownError if anything goes
    /// wrong related to spawning & joining.
    #[tracing::instrument(level = "trace", skip(f), err)]
    pub async fn spawn_blocking<F, R>(f: F) -> ShutdownResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        crate::utils::spawn_blocking(f).await
    }

    /// Flush all dirty data to disk.
    pub async fn flush(&self) -> ShutdownResult<()> {
        let db = self.inner.db.clone();
        Self::spawn_blocking(move || db.flush().map(|_| ()).map_err(|err| ShutdownError(anyhow!("{} {}", crate::error::ERR_DB_FLUSH, err))))
            .await
            .and_then(|res| res)
    }

    /// Get a handle to the DB tree of broker registrations.
    pub async fn get_brokers_tree(&self) -> ShutdownResult<Tree> {
        self.open_tree(TREE_BROKERS).await
    }

    /// Get a handle to the DB tree of topic descriptors.
    pub async fn get_topics_tree(&self) -> ShutdownResult<Tree> {
        self.open_tree(TREE_TOPICS).await
    }

    /// Get a handle to the DB tree of partition states.
    pub async fn get_partitions_tree(&self) -> ShutdownResult<Tree> {
        self.open_tree(TREE_PARTITIONS).await
    }

    /// Get a handle to the DB tree of committed group offsets.
    pub async fn get_offsets_tree(&self) -> ShutdownResult<Tree> {
        self.open_tree(TREE_OFFSETS).await
    }

    async fn open_tree(&self, name: &'static str) -> ShutdownResult<Tree> {
        let (db, ivname) = (self.inner.db.clone(), IVec::from(name));
        let tree = Self::spawn_blocking(move || -> Result<Tree> { Ok(db.open_tree(ivname)?) })
            .await
            .and_then(|res| res.map_err(|err| ShutdownError(anyhow!("could not open DB tree {} {}", name, err))))?;
        Ok(tree)
    }
}
