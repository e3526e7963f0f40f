//! Redb database backend.
//!
//! Redb is a copy-on-write B-tree stored in a single file. A shelf uses one
//! untyped table of `&[u8] -> &[u8]`; every write runs in its own write
//! transaction and batches share one, which makes them atomic.

use std::fs;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::debug;
use redb::{Database, ReadableDatabase, TableDefinition};

use crate::backend::{Backend, BatchOp, BoxedIterator, ChunkedIter, ITER_CHUNK};
use crate::config::{BackendKind, FileConfig};
use crate::error::BackendResult;

const SHELF_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("netabase_shelf");

/// Wrapper around `redb::Database` exposing it as a byte-keyed [`Backend`].
pub struct RedbStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Create or open a RedbStore at the given path with default options
    pub fn new<P: AsRef<Path>>(path: P) -> BackendResult<Self> {
        Self::open(FileConfig::new(path.as_ref()))
    }

    /// Open a RedbStore described by `config`
    pub fn open(config: FileConfig) -> BackendResult<Self> {
        let start = Instant::now();
        debug!("RedbStore: Opening database at {}", config.path.display());

        if config.truncate && config.path.exists() {
            fs::remove_file(&config.path)?;
        }
        let db = if config.create_if_missing {
            Database::builder()
                .set_cache_size(config.cache_size_mb * 1024 * 1024)
                .create(&config.path)?
        } else {
            Database::builder()
                .set_cache_size(config.cache_size_mb * 1024 * 1024)
                .open(&config.path)?
        };

        debug!("RedbStore: Opened in {:?}", start.elapsed());
        Ok(Self { db: Arc::new(db) })
    }

    /// Get direct access to the underlying redb database
    pub fn db(&self) -> &Database {
        &self.db
    }

    fn write<F, R>(&self, f: F) -> BackendResult<R>
    where
        F: FnOnce(&mut redb::Table<'_, &'static [u8], &'static [u8]>) -> BackendResult<R>,
    {
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut table = write_txn.open_table(SHELF_TABLE)?;
            f(&mut table)?
        };
        write_txn.commit()?;
        Ok(result)
    }
}

fn read_page(db: &Database, after: Option<&[u8]>) -> BackendResult<Vec<(Vec<u8>, Vec<u8>)>> {
    let read_txn = db.begin_read()?;

    // Handle the case where the table doesn't exist yet (hasn't been written to)
    let table = match read_txn.open_table(SHELF_TABLE) {
        Ok(table) => table,
        Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let range = match after {
        Some(last) => table.range::<&[u8]>((Bound::Excluded(last), Bound::Unbounded))?,
        None => table.range::<&[u8]>(..)?,
    };

    let mut page = Vec::with_capacity(ITER_CHUNK);
    for item in range.take(ITER_CHUNK) {
        let (key_guard, value_guard) = item?;
        page.push((key_guard.value().to_vec(), value_guard.value().to_vec()));
    }
    Ok(page)
}

impl Backend for RedbStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Redb
    }

    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SHELF_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> BackendResult<()> {
        self.write(|table| {
            table.insert(key, value)?;
            Ok(())
        })
    }

    fn delete(&self, key: &[u8]) -> BackendResult<bool> {
        self.write(|table| Ok(table.remove(key)?.is_some()))
    }

    fn iter(&self) -> BackendResult<BoxedIterator> {
        let db = Arc::clone(&self.db);
        Ok(Box::new(ChunkedIter::new(move |after: Option<&[u8]>| {
            read_page(&db, after)
        })))
    }

    fn supports_atomic_batch(&self) -> bool {
        true
    }

    fn batch(&self, ops: Vec<BatchOp>) -> BackendResult<()> {
        self.write(|table| {
            for op in &ops {
                match op {
                    BatchOp::Put(key, value) => {
                        table.insert(key.as_slice(), value.as_slice())?;
                    }
                    BatchOp::Delete(key) => {
                        table.remove(key.as_slice())?;
                    }
                }
            }
            Ok(())
        })
    }

    fn clear(&self) -> BackendResult<()> {
        let write_txn = self.db.begin_write()?;
        write_txn.delete_table(SHELF_TABLE)?;
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, RedbStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::new(dir.path().join("shelf.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_reads_before_first_write() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get(b"missing").unwrap(), None);
        assert!(store.is_empty().unwrap());
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_put_get_delete() {
        let (_dir, store) = temp_store();
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(store.delete(b"k").unwrap());
        assert!(!store.delete(b"k").unwrap());
    }

    #[test]
    fn test_clear_then_reuse() {
        let (_dir, store) = temp_store();
        store.put(b"a", b"1").unwrap();
        store.clear().unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
        store.put(b"b", b"2").unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_iter_spans_pages() {
        let (_dir, store) = temp_store();
        let ops = (0..(ITER_CHUNK as u32 + 10))
            .map(|i| BatchOp::Put(i.to_be_bytes().to_vec(), vec![1]))
            .collect();
        store.batch(ops).unwrap();
        assert_eq!(store.iter().unwrap().count(), ITER_CHUNK + 10);
    }
}
