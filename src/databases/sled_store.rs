//! Sled database backend.
//!
//! Sled is an ordered, log-structured embedded store. Everything a shelf writes
//! goes into the database's default tree; keys iterate in lexicographic byte
//! order. Batches are applied through `sled::Batch`, which is atomic.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::debug;

use crate::backend::{Backend, BatchOp, BoxedIterator};
use crate::config::{BackendKind, FileConfig};
use crate::error::{BackendError, BackendResult};

/// Wrapper around `sled::Db` exposing it as a byte-keyed [`Backend`].
#[derive(Debug)]
pub struct SledStore {
    db: sled::Db,
    path: Option<PathBuf>,
    use_fsync: bool,
}

impl SledStore {
    /// Open a SledStore at the given path with default options
    pub fn new<P: AsRef<Path>>(path: P) -> BackendResult<Self> {
        Self::open(FileConfig::new(path.as_ref()))
    }

    /// Open a SledStore described by `config`
    pub fn open(config: FileConfig) -> BackendResult<Self> {
        let start = Instant::now();
        debug!("SledStore: Opening database at {}", config.path.display());

        if config.truncate && config.path.exists() {
            fs::remove_dir_all(&config.path)?;
        }
        if !config.create_if_missing && !config.path.exists() {
            return Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no sled database at {}", config.path.display()),
            )));
        }

        let db = sled::Config::new()
            .path(&config.path)
            .cache_capacity((config.cache_size_mb as u64) * 1024 * 1024)
            .open()?;

        debug!("SledStore: Opened in {:?}", start.elapsed());
        Ok(Self {
            db,
            path: Some(config.path),
            use_fsync: config.use_fsync,
        })
    }

    /// Create an in-memory SledStore (useful for testing)
    pub fn temp() -> BackendResult<Self> {
        debug!("SledStore: Creating temporary database");
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            path: None,
            use_fsync: false,
        })
    }

    /// Get direct access to the underlying sled database
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Directory the database lives in, `None` for temporary stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn sync_if_needed(&self) -> BackendResult<()> {
        if self.use_fsync {
            self.db.flush()?;
        }
        Ok(())
    }
}

impl Backend for SledStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Sled
    }

    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> BackendResult<()> {
        self.db.insert(key, value)?;
        self.sync_if_needed()
    }

    fn delete(&self, key: &[u8]) -> BackendResult<bool> {
        let existed = self.db.remove(key)?.is_some();
        self.sync_if_needed()?;
        Ok(existed)
    }

    fn contains(&self, key: &[u8]) -> BackendResult<bool> {
        Ok(self.db.contains_key(key)?)
    }

    fn iter(&self) -> BackendResult<BoxedIterator> {
        Ok(Box::new(self.db.iter().map(|entry| {
            entry
                .map(|(k, v)| (k.to_vec(), v.to_vec()))
                .map_err(BackendError::from)
        })))
    }

    fn len(&self) -> BackendResult<usize> {
        // sled walks the tree for this as well
        Ok(self.db.len())
    }

    fn is_empty(&self) -> BackendResult<bool> {
        Ok(self.db.is_empty())
    }

    fn supports_atomic_batch(&self) -> bool {
        true
    }

    fn batch(&self, ops: Vec<BatchOp>) -> BackendResult<()> {
        let mut batch = sled::Batch::default();
        for op in ops {
            match op {
                BatchOp::Put(key, value) => batch.insert(key, value),
                BatchOp::Delete(key) => batch.remove(key),
            }
        }
        self.db.apply_batch(batch)?;
        self.sync_if_needed()
    }

    fn clear(&self) -> BackendResult<()> {
        self.db.clear()?;
        for name in self.db.tree_names() {
            if &name[..] != b"__sled__default".as_slice() {
                self.db.drop_tree(&name)?;
            }
        }
        self.db.flush()?;
        Ok(())
    }

    fn flush(&self) -> BackendResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn close(&self) -> BackendResult<()> {
        let start = Instant::now();
        self.db.flush()?;
        debug!("SledStore: Flushed for close in {:?}", start.elapsed());
        Ok(())
    }
}
