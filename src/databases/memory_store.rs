//! In-memory backend.
//!
//! Keeps everything in an ordered map behind a lock. Clones share the same
//! contents, so a test can hand one clone to a shelf, close the shelf, and open
//! a new shelf on another clone to simulate reopening a file. The store also
//! counts writes and can be told to fail, which makes it the test double for
//! write-back behaviour.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::backend::{Backend, BatchOp, BoxedIterator, ChunkedIter, ITER_CHUNK};
use crate::config::BackendKind;
use crate::error::{BackendError, BackendResult};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Default)]
struct Shared {
    data: RwLock<Table>,
    writes: AtomicU64,
    passing_writes: AtomicUsize,
    failing_writes: AtomicUsize,
}

/// Process-local store for tests and throwaway shelves
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    atomic_batches: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store whose batches are atomic
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            atomic_batches: true,
        }
    }

    /// Same contents, but batches are applied one operation at a time
    pub fn with_sequential_batches(mut self) -> Self {
        self.atomic_batches = false;
        self
    }

    /// Number of puts and deletes applied so far, batched ones included
    pub fn writes(&self) -> u64 {
        self.shared.writes.load(Ordering::SeqCst)
    }

    /// Make the next `count` writes fail with a storage error
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_writes_after(0, count);
    }

    /// Let `passing` writes through, then fail the `failing` after them
    pub fn fail_writes_after(&self, passing: usize, failing: usize) {
        self.shared.passing_writes.store(passing, Ordering::SeqCst);
        self.shared.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Raw bytes stored under `key`, bypassing any shelf
    pub fn raw(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.read().ok().and_then(|data| data.get(key).cloned())
    }

    fn read(&self) -> BackendResult<std::sync::RwLockReadGuard<'_, Table>> {
        self.shared
            .data
            .read()
            .map_err(|_| BackendError::Storage("Lock error".to_string()))
    }

    fn write(&self) -> BackendResult<std::sync::RwLockWriteGuard<'_, Table>> {
        self.shared
            .data
            .write()
            .map_err(|_| BackendError::Storage("Lock error".to_string()))
    }

    fn check_injected_failure(&self) -> BackendResult<()> {
        let passed = self
            .shared
            .passing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if passed.is_ok() {
            return Ok(());
        }
        let armed = self
            .shared
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match armed {
            Ok(_) => Err(BackendError::Storage("injected write failure".to_string())),
            Err(_) => Ok(()),
        }
    }

    fn record_write(&self) {
        self.shared.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Backend for MemoryStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> BackendResult<()> {
        self.check_injected_failure()?;
        self.write()?.insert(key.to_vec(), value.to_vec());
        self.record_write();
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> BackendResult<bool> {
        self.check_injected_failure()?;
        let existed = self.write()?.remove(key).is_some();
        self.record_write();
        Ok(existed)
    }

    fn contains(&self, key: &[u8]) -> BackendResult<bool> {
        Ok(self.read()?.contains_key(key))
    }

    fn iter(&self) -> BackendResult<BoxedIterator> {
        let shared = Arc::clone(&self.shared);
        Ok(Box::new(ChunkedIter::new(move |after: Option<&[u8]>| {
            let data = shared
                .data
                .read()
                .map_err(|_| BackendError::Storage("Lock error".to_string()))?;
            let start = match after {
                Some(key) => Bound::Excluded(key),
                None => Bound::Unbounded,
            };
            Ok(data
                .range::<[u8], _>((start, Bound::Unbounded))
                .take(ITER_CHUNK)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        })))
    }

    fn len(&self) -> BackendResult<usize> {
        Ok(self.read()?.len())
    }

    fn supports_atomic_batch(&self) -> bool {
        self.atomic_batches
    }

    fn batch(&self, ops: Vec<BatchOp>) -> BackendResult<()> {
        if !self.atomic_batches {
            for op in ops {
                match op {
                    BatchOp::Put(key, value) => self.put(&key, &value)?,
                    BatchOp::Delete(key) => {
                        self.delete(&key)?;
                    }
                }
            }
            return Ok(());
        }

        self.check_injected_failure()?;
        let mut data = self.write()?;
        for op in ops {
            match op {
                BatchOp::Put(key, value) => {
                    data.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    data.remove(&key);
                }
            }
            self.record_write();
        }
        Ok(())
    }

    fn clear(&self) -> BackendResult<()> {
        self.write()?.clear();
        Ok(())
    }
}
