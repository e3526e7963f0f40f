/// Backend trait definitions for Netabase Shelf
///
/// These traits define the interface that any key-value store backend must implement
/// to be used by a shelf. Keys and values are opaque byte strings; all typing
/// happens above this layer through the shelf's codec.

use std::collections::VecDeque;
use std::fmt::Debug;

use crate::config::BackendKind;
use crate::error::BackendResult;

/// Number of entries fetched per read transaction by [`ChunkedIter`]
pub const ITER_CHUNK: usize = 256;

/// Type alias for backend iterators to enable trait object usage
pub type BoxedIterator = Box<dyn Iterator<Item = BackendResult<(Vec<u8>, Vec<u8>)>> + Send>;

/// A single write inside a [`Backend::batch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Main backend store interface
///
/// All methods take `&self`; implementations synchronize internally so a single
/// backend can be shared between the shelf and release hooks running on other
/// threads. No method is cancellable, and any of them may block on I/O.
pub trait Backend: Send + Sync + Debug {
    /// Which engine this is, used for logging
    fn kind(&self) -> BackendKind;

    /// Get a value by key, returns None if not found
    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>>;

    /// Insert or overwrite a key-value pair
    fn put(&self, key: &[u8], value: &[u8]) -> BackendResult<()>;

    /// Remove a key-value pair, returns true if it existed
    fn delete(&self, key: &[u8]) -> BackendResult<bool>;

    /// Returns true if the key is present
    fn contains(&self, key: &[u8]) -> BackendResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Lazily iterate over all key-value pairs, in backend-defined order
    fn iter(&self) -> BackendResult<BoxedIterator>;

    /// Number of entries.
    ///
    /// The default walks the whole store, so this is linear in its size.
    fn len(&self) -> BackendResult<usize> {
        let mut count = 0;
        for entry in self.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Returns true if the store holds no entries
    fn is_empty(&self) -> BackendResult<bool> {
        match self.iter()?.next() {
            Some(entry) => entry.map(|_| false),
            None => Ok(true),
        }
    }

    /// Whether [`Backend::batch`] applies all of its operations or none of them
    fn supports_atomic_batch(&self) -> bool {
        false
    }

    /// Apply a group of writes.
    ///
    /// The default applies them one at a time: if an operation fails, the ones
    /// before it stay written and the ones after it are never attempted.
    fn batch(&self, ops: Vec<BatchOp>) -> BackendResult<()> {
        for op in ops {
            match op {
                BatchOp::Put(key, value) => self.put(&key, &value)?,
                BatchOp::Delete(key) => {
                    self.delete(&key)?;
                }
            }
        }
        Ok(())
    }

    /// Destroy all contents, leaving an empty store open at the same location
    fn clear(&self) -> BackendResult<()>;

    /// Flush any cached changes to disk
    fn flush(&self) -> BackendResult<()> {
        Ok(())
    }

    /// Release the store. Called once; the backend is dropped right after.
    fn close(&self) -> BackendResult<()> {
        self.flush()
    }
}

impl<T: Backend + ?Sized> Backend for Box<T> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> BackendResult<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> BackendResult<bool> {
        (**self).delete(key)
    }

    fn contains(&self, key: &[u8]) -> BackendResult<bool> {
        (**self).contains(key)
    }

    fn iter(&self) -> BackendResult<BoxedIterator> {
        (**self).iter()
    }

    fn len(&self) -> BackendResult<usize> {
        (**self).len()
    }

    fn is_empty(&self) -> BackendResult<bool> {
        (**self).is_empty()
    }

    fn supports_atomic_batch(&self) -> bool {
        (**self).supports_atomic_batch()
    }

    fn batch(&self, ops: Vec<BatchOp>) -> BackendResult<()> {
        (**self).batch(ops)
    }

    fn clear(&self) -> BackendResult<()> {
        (**self).clear()
    }

    fn flush(&self) -> BackendResult<()> {
        (**self).flush()
    }

    fn close(&self) -> BackendResult<()> {
        (**self).close()
    }
}

/// Iterator that pages through an ordered store a chunk at a time.
///
/// `fetch` is called with the last key seen (or `None` at the start) and
/// returns up to [`ITER_CHUNK`] entries strictly after it. Each page is read
/// in its own short transaction, so the iterator owns no borrow of the store
/// and concurrent writes may or may not be observed.
pub struct ChunkedIter<F> {
    fetch: F,
    cursor: Option<Vec<u8>>,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    exhausted: bool,
}

impl<F> ChunkedIter<F>
where
    F: FnMut(Option<&[u8]>) -> BackendResult<Vec<(Vec<u8>, Vec<u8>)>>,
{
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<F> Iterator for ChunkedIter<F>
where
    F: FnMut(Option<&[u8]>) -> BackendResult<Vec<(Vec<u8>, Vec<u8>)>>,
{
    type Item = BackendResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match (self.fetch)(self.cursor.as_deref()) {
                Ok(page) => {
                    if page.len() < ITER_CHUNK {
                        self.exhausted = true;
                    }
                    if let Some((last, _)) = page.last() {
                        self.cursor = Some(last.clone());
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
