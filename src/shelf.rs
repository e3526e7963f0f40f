//! The typed, persistent mapping.
//!
//! A [`Shelf`] maps serializable keys to serializable values on top of any
//! byte-keyed [`Backend`]. Keys and values go through the shelf's [`Codec`]
//! on the way in and out; the backend only ever sees bytes.
//!
//! ```
//! use netabase_shelf::prelude::*;
//!
//! let shelf: Shelf<String, u64, MemoryStore> = Shelf::in_memory(ShelfConfig::default());
//! shelf.set(&"visits".to_string(), &1)?;
//! assert!(shelf.contains(&"visits".to_string())?);
//! assert_eq!(shelf.len()?, 1);
//!
//! shelf.delete(&"visits".to_string())?;
//! assert!(matches!(shelf.get(&"visits".to_string()), Err(ShelfError::NotFound)));
//! # Ok::<(), ShelfError>(())
//! ```
//!
//! With [`ShelfConfig::track_value_changes`] on, values returned by
//! [`Shelf::get`] are written back when released; see [`Tracked`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, Weak};
use std::time::Instant;

use log::{debug, error, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::{Backend, BatchOp, BoxedIterator};
use crate::codec::{BincodeCodec, Codec};
use crate::config::{BackendKind, FileConfig, ShelfConfig};
use crate::databases::{self, MemoryStore};
use crate::error::{FlushError, ShelfError, ShelfResult};
use crate::tracker::{
    ChangeTracker, EntryState, Lookup, Tracked, TrackedCell, TrackedSlot, TrackerStats,
};

#[cfg(feature = "redb")]
use crate::databases::RedbStore;
#[cfg(feature = "sled")]
use crate::databases::SledStore;

/// State shared between a shelf, its iterators and its tracked values.
///
/// The backend sits in an `Option` so closing can drop it (releasing any file
/// locks) while tracked values still hold the core.
pub(crate) struct ShelfCore<B, C> {
    backend: RwLock<Option<B>>,
    codec: C,
    tracker: ChangeTracker,
    config: ShelfConfig,
    closed: AtomicBool,
}

impl<B, C> ShelfCore<B, C>
where
    B: Backend,
    C: Codec,
{
    pub(crate) fn codec(&self) -> &C {
        &self.codec
    }

    pub(crate) fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn backend(&self) -> ShelfResult<RwLockReadGuard<'_, Option<B>>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ShelfError::Closed);
        }
        self.backend
            .read()
            .map_err(|_| ShelfError::LockPoisoned("backend".to_string()))
    }

    fn with_backend<R>(&self, f: impl FnOnce(&B) -> ShelfResult<R>) -> ShelfResult<R> {
        let guard = self.backend()?;
        let backend = guard.as_ref().ok_or(ShelfError::Closed)?;
        f(backend)
    }

    /// Compare `current` against what the store holds under `key` and write
    /// it if they differ.
    ///
    /// Not gated on the closed flag: draining on close runs after the flag is
    /// set but before the backend is taken away.
    pub(crate) fn write_back(
        &self,
        key: &[u8],
        current: &[u8],
        generation: u64,
    ) -> Result<EntryState, FlushError> {
        let guard = self.backend.read().map_err(|_| FlushError::LockPoisoned)?;
        let backend = guard.as_ref().ok_or(FlushError::Closed)?;

        if self.tracker.generation() != generation {
            return Ok(EntryState::Invalidated);
        }
        // an absent key differs from any encoding, so a value deleted since
        // the fetch is written again
        if backend.get(key)?.as_deref() == Some(current) {
            return Ok(EntryState::Discarded);
        }
        backend.put(key, current)?;
        Ok(EntryState::Flushed)
    }
}

/// Where [`Shelf::update`] takes its entries from.
///
/// ```
/// use netabase_shelf::shelf::MappingSource;
/// use std::collections::HashMap;
///
/// let from_map: MappingSource<&str, u8> = HashMap::from([("a", 1)]).into();
/// let from_pairs: MappingSource<&str, u8> = vec![("a", 1), ("a", 2)].into();
/// assert_eq!(from_map.len(), 1);
/// assert_eq!(from_pairs.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub enum MappingSource<K, V> {
    /// A keyed collection; each key appears once
    Keyed(HashMap<K, V>),
    /// Ordered pairs; a later pair wins over an earlier one with the same key
    Pairs(Vec<(K, V)>),
}

impl<K, V> MappingSource<K, V> {
    pub fn len(&self) -> usize {
        match self {
            MappingSource::Keyed(map) => map.len(),
            MappingSource::Pairs(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_pairs(self) -> Vec<(K, V)> {
        match self {
            MappingSource::Keyed(map) => map.into_iter().collect(),
            MappingSource::Pairs(pairs) => pairs,
        }
    }
}

impl<K, V> From<HashMap<K, V>> for MappingSource<K, V> {
    fn from(map: HashMap<K, V>) -> Self {
        MappingSource::Keyed(map)
    }
}

impl<K, V> From<BTreeMap<K, V>> for MappingSource<K, V> {
    fn from(map: BTreeMap<K, V>) -> Self {
        MappingSource::Pairs(map.into_iter().collect())
    }
}

impl<K, V> From<Vec<(K, V)>> for MappingSource<K, V> {
    fn from(pairs: Vec<(K, V)>) -> Self {
        MappingSource::Pairs(pairs)
    }
}

impl<K, V> FromIterator<(K, V)> for MappingSource<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        MappingSource::Pairs(iter.into_iter().collect())
    }
}

/// A persistent mapping from `K` to `V` stored in backend `B`.
///
/// The shelf is `Send + Sync` whenever its backend and codec are, and every
/// method takes `&self`; wrap it in an `Arc` to share it between threads.
/// Dropping the shelf closes it.
pub struct Shelf<K, V, B, C = BincodeCodec>
where
    B: Backend + 'static,
    C: Codec + 'static,
{
    core: Arc<ShelfCore<B, C>>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, B, C> Shelf<K, V, B, C>
where
    B: Backend + 'static,
    C: Codec + 'static,
{
    /// Wrap an already open backend
    pub fn from_backend(backend: B, codec: C, config: ShelfConfig) -> Self {
        debug!(
            "Shelf: Opened on {} (tracking: {})",
            backend.kind(),
            config.track_value_changes
        );
        Self {
            core: Arc::new(ShelfCore {
                backend: RwLock::new(Some(backend)),
                codec,
                tracker: ChangeTracker::new(),
                config,
                closed: AtomicBool::new(false),
            }),
            _marker: PhantomData,
        }
    }

    pub fn config(&self) -> &ShelfConfig {
        &self.core.config
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Engine backing this shelf
    pub fn backend_kind(&self) -> ShelfResult<BackendKind> {
        self.core.with_backend(|backend| Ok(backend.kind()))
    }

    pub fn tracker_stats(&self) -> TrackerStats {
        self.core.tracker.stats()
    }

    /// Ask the backend to persist anything it has buffered
    pub fn flush(&self) -> ShelfResult<()> {
        self.core.with_backend(|backend| Ok(backend.flush()?))
    }

    /// Remove every entry.
    ///
    /// Values fetched before the clear are invalidated: releasing them writes
    /// nothing, whether or not they were modified.
    pub fn clear(&self) -> ShelfResult<()> {
        let start = Instant::now();
        let generation = {
            let guard = self
                .core
                .backend
                .write()
                .map_err(|_| ShelfError::LockPoisoned("backend".to_string()))?;
            if self.is_closed() {
                return Err(ShelfError::Closed);
            }
            let backend = guard.as_ref().ok_or(ShelfError::Closed)?;
            let generation = self.core.tracker.advance_generation();
            backend.clear()?;
            generation
        };
        // backend lock released first: invalidation takes each entry's lock,
        // and an entry mid-release holds its lock while waiting on the backend.
        // Values fetched since then belong to the new generation and are kept.
        let invalidated = self.core.tracker.invalidate_before(generation);
        debug!(
            "Shelf: Cleared in {:?}, {} tracked values invalidated",
            start.elapsed(),
            invalidated
        );
        Ok(())
    }

    /// Close the shelf.
    ///
    /// If change tracking and [`ShelfConfig::flush_on_close`] are on, every
    /// tracked value still alive is written back first; failures are logged
    /// and don't stop the others. Then the backend is closed and dropped.
    /// Calling `close` again does nothing.
    ///
    /// Every other operation fails with [`ShelfError::Closed`] afterwards.
    /// Tracked values released later write nothing.
    pub fn close(&self) -> ShelfResult<()> {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let start = Instant::now();

        let config = &self.core.config;
        if config.track_value_changes {
            if config.flush_on_close {
                let written = self.core.tracker.drain();
                debug!("Shelf: Wrote back {} tracked values on close", written);
            } else {
                self.core.tracker.invalidate_all();
            }
        }

        let backend = self
            .core
            .backend
            .write()
            .map_err(|_| ShelfError::LockPoisoned("backend".to_string()))?
            .take();
        if let Some(backend) = backend {
            backend.close()?;
        }
        debug!("Shelf: Closed in {:?}", start.elapsed());
        Ok(())
    }
}

impl<K, V> Shelf<K, V, MemoryStore, BincodeCodec> {
    /// Shelf over a fresh [`MemoryStore`]
    pub fn in_memory(config: ShelfConfig) -> Self {
        Self::from_backend(MemoryStore::new(), BincodeCodec, config)
    }
}

#[cfg(feature = "sled")]
impl<K, V> Shelf<K, V, SledStore, BincodeCodec> {
    /// Open a shelf on a sled database
    pub fn open_sled(file: FileConfig, config: ShelfConfig) -> ShelfResult<Self> {
        Ok(Self::from_backend(SledStore::open(file)?, BincodeCodec, config))
    }
}

#[cfg(feature = "redb")]
impl<K, V> Shelf<K, V, RedbStore, BincodeCodec> {
    /// Open a shelf on a redb database file
    pub fn open_redb(file: FileConfig, config: ShelfConfig) -> ShelfResult<Self> {
        Ok(Self::from_backend(RedbStore::open(file)?, BincodeCodec, config))
    }
}

impl<K, V> Shelf<K, V, Box<dyn Backend>, BincodeCodec> {
    /// Open a shelf on the backend named at runtime
    ///
    /// ```
    /// use netabase_shelf::prelude::*;
    ///
    /// let kind: BackendKind = "memory".parse().unwrap();
    /// let shelf: Shelf<u32, String, _> = Shelf::open(kind, FileConfig::temp(), ShelfConfig::default())?;
    /// assert_eq!(shelf.backend_kind()?, BackendKind::Memory);
    /// # Ok::<(), ShelfError>(())
    /// ```
    pub fn open(kind: BackendKind, file: FileConfig, config: ShelfConfig) -> ShelfResult<Self> {
        let backend = databases::open_backend(kind, file)?;
        Ok(Self::from_backend(backend, BincodeCodec, config))
    }
}

impl<K, V, B, C> Shelf<K, V, B, C>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned + Send + 'static,
    B: Backend + 'static,
    C: Codec + 'static,
{
    /// Fetch the value stored under `key`.
    ///
    /// Returns [`ShelfError::NotFound`] if there is none.
    pub fn get(&self, key: &K) -> ShelfResult<Tracked<V, B, C>> {
        self.try_get(key)?.ok_or(ShelfError::NotFound)
    }

    /// Fetch the value stored under `key`, `None` if there is none
    pub fn try_get(&self, key: &K) -> ShelfResult<Option<Tracked<V, B, C>>> {
        let key_bytes = self.core.codec.encode(key)?;
        // the generation is read under the same lock as the value, so a
        // concurrent clear can't hand pre-clear data a post-clear id
        let (stored, generation) = self.core.with_backend(|backend| {
            Ok((backend.get(&key_bytes)?, self.core.tracker.generation()))
        })?;
        let Some(value_bytes) = stored else {
            return Ok(None);
        };
        let value: V = self.core.codec.decode(&value_bytes)?;
        Ok(Some(self.track(key_bytes, value, generation)?))
    }

    /// Fetch the value stored under `key`, or hand back `default` untracked
    pub fn get_or(&self, key: &K, default: V) -> ShelfResult<Lookup<V, B, C>> {
        Ok(match self.try_get(key)? {
            Some(tracked) => Lookup::Stored(tracked),
            None => Lookup::Default(default),
        })
    }

    fn track(&self, key: Vec<u8>, value: V, generation: u64) -> ShelfResult<Tracked<V, B, C>> {
        let core = Arc::clone(&self.core);
        if !self.core.config.track_value_changes {
            return Ok(Tracked::new(Arc::new(TrackedCell::untracked(key, value, core))));
        }

        // snapshot the re-encoded value rather than the stored bytes; codecs
        // need not be canonical
        let snapshot = self.core.codec.encode(&value)?;
        let id = self.core.tracker.next_id(generation);
        let cell = Arc::new(TrackedCell::tracked(id, key, snapshot, value, core));
        let slot: Weak<dyn TrackedSlot> = Arc::downgrade(&cell) as Weak<dyn TrackedSlot>;
        self.core.tracker.register(id, slot);

        // a close that started after the read may have drained the table
        // before this entry joined it
        if self.is_closed() {
            cell.invalidate();
            return Err(ShelfError::Closed);
        }
        Ok(Tracked::new(cell))
    }

    /// Store `value` under `key`, replacing anything already there
    pub fn set(&self, key: &K, value: &V) -> ShelfResult<()> {
        let key_bytes = self.core.codec.encode(key)?;
        let value_bytes = self.core.codec.encode(value)?;
        self.core
            .with_backend(|backend| Ok(backend.put(&key_bytes, &value_bytes)?))
    }

    /// Remove the entry under `key`.
    ///
    /// Returns [`ShelfError::NotFound`] if there was none.
    pub fn delete(&self, key: &K) -> ShelfResult<()> {
        let key_bytes = self.core.codec.encode(key)?;
        let existed = self
            .core
            .with_backend(|backend| Ok(backend.delete(&key_bytes)?))?;
        if existed {
            Ok(())
        } else {
            Err(ShelfError::NotFound)
        }
    }

    pub fn contains(&self, key: &K) -> ShelfResult<bool> {
        let key_bytes = self.core.codec.encode(key)?;
        self.core
            .with_backend(|backend| Ok(backend.contains(&key_bytes)?))
    }

    /// Number of entries. May walk the whole store.
    pub fn len(&self) -> ShelfResult<usize> {
        self.core.with_backend(|backend| Ok(backend.len()?))
    }

    pub fn is_empty(&self) -> ShelfResult<bool> {
        self.core.with_backend(|backend| Ok(backend.is_empty()?))
    }

    /// Write every entry of `source`. Returns how many were written.
    ///
    /// Everything is encoded before the first write, so a value that fails to
    /// encode leaves the store untouched. On a backend with atomic batches the
    /// whole update then lands or fails as one; elsewhere it is applied in
    /// order and a backend error can leave a prefix written.
    pub fn update(&self, source: impl Into<MappingSource<K, V>>) -> ShelfResult<usize> {
        let source: MappingSource<K, V> = source.into();
        let pairs = source.into_pairs();
        let mut ops = Vec::with_capacity(pairs.len());
        for (key, value) in &pairs {
            ops.push(BatchOp::Put(
                self.core.codec.encode(key)?,
                self.core.codec.encode(value)?,
            ));
        }
        let count = ops.len();

        let start = Instant::now();
        self.core.with_backend(|backend| {
            if !backend.supports_atomic_batch() && count > 1 {
                warn!(
                    "Shelf: {} cannot batch atomically, applying {} writes in order",
                    backend.kind(),
                    count
                );
            }
            backend.batch(ops)?;
            Ok(())
        })?;
        debug!("Shelf: Updated {} entries in {:?}", count, start.elapsed());
        Ok(count)
    }

    fn raw_iter(&self) -> ShelfResult<BoxedIterator> {
        self.core.with_backend(|backend| Ok(backend.iter()?))
    }

    /// Iterate over every key, in backend order
    pub fn keys(&self) -> ShelfResult<Keys<K, B, C>> {
        Ok(Keys {
            inner: self.raw_iter()?,
            core: Arc::clone(&self.core),
            _marker: PhantomData,
        })
    }

    /// Iterate over every value, in backend order. Values are not tracked.
    pub fn values(&self) -> ShelfResult<Values<V, B, C>> {
        Ok(Values {
            inner: self.raw_iter()?,
            core: Arc::clone(&self.core),
            _marker: PhantomData,
        })
    }

    /// Iterate over every entry, in backend order. Values are not tracked.
    pub fn items(&self) -> ShelfResult<Items<K, V, B, C>> {
        Ok(Items {
            inner: self.raw_iter()?,
            core: Arc::clone(&self.core),
            _marker: PhantomData,
        })
    }
}

impl<K, V, B, C> Drop for Shelf<K, V, B, C>
where
    B: Backend + 'static,
    C: Codec + 'static,
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Shelf: Failed to close on drop: {}", e);
        }
    }
}

impl<K, V, B, C> fmt::Debug for Shelf<K, V, B, C>
where
    B: Backend + 'static,
    C: Codec + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shelf")
            .field("config", &self.core.config)
            .field("closed", &self.is_closed())
            .field("tracker", &self.core.tracker)
            .finish_non_exhaustive()
    }
}

/// Iterator over the keys of a shelf, see [`Shelf::keys`]
pub struct Keys<K, B, C> {
    inner: BoxedIterator,
    core: Arc<ShelfCore<B, C>>,
    _marker: PhantomData<fn() -> K>,
}

impl<K, B, C> Iterator for Keys<K, B, C>
where
    K: DeserializeOwned,
    B: Backend,
    C: Codec,
{
    type Item = ShelfResult<K>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.inner.next()?;
        Some(entry.map_err(ShelfError::from).and_then(|(key, _)| {
            Ok(self.core.codec.decode(&key)?)
        }))
    }
}

/// Iterator over the values of a shelf, see [`Shelf::values`]
pub struct Values<V, B, C> {
    inner: BoxedIterator,
    core: Arc<ShelfCore<B, C>>,
    _marker: PhantomData<fn() -> V>,
}

impl<V, B, C> Iterator for Values<V, B, C>
where
    V: DeserializeOwned,
    B: Backend,
    C: Codec,
{
    type Item = ShelfResult<V>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.inner.next()?;
        Some(entry.map_err(ShelfError::from).and_then(|(_, value)| {
            Ok(self.core.codec.decode(&value)?)
        }))
    }
}

/// Iterator over the entries of a shelf, see [`Shelf::items`]
pub struct Items<K, V, B, C> {
    inner: BoxedIterator,
    core: Arc<ShelfCore<B, C>>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, B, C> Iterator for Items<K, V, B, C>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
    B: Backend,
    C: Codec,
{
    type Item = ShelfResult<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.inner.next()?;
        Some(entry.map_err(ShelfError::from).and_then(|(key, value)| {
            Ok((self.core.codec.decode(&key)?, self.core.codec.decode(&value)?))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        hits: u32,
    }

    fn tracking_shelf() -> (MemoryStore, Shelf<String, Counter, MemoryStore>) {
        let store = MemoryStore::new();
        let shelf = Shelf::from_backend(store.clone(), BincodeCodec, ShelfConfig::tracking());
        (store, shelf)
    }

    #[test]
    fn test_unchanged_value_is_not_rewritten() {
        let (store, shelf) = tracking_shelf();
        shelf.set(&"a".to_string(), &Counter { hits: 1 }).unwrap();
        let writes = store.writes();

        let counter = shelf.get(&"a".to_string()).unwrap();
        assert_eq!(counter.read().hits, 1);
        assert_eq!(counter.release().unwrap(), EntryState::Discarded);
        assert_eq!(store.writes(), writes);
    }

    #[test]
    fn test_modified_value_is_written_once() {
        let (store, shelf) = tracking_shelf();
        shelf.set(&"a".to_string(), &Counter { hits: 1 }).unwrap();
        let writes = store.writes();

        let counter = shelf.get(&"a".to_string()).unwrap();
        counter.modify(|c| c.hits += 1);
        assert!(counter.is_dirty().unwrap());
        assert_eq!(counter.release().unwrap(), EntryState::Flushed);
        assert_eq!(store.writes(), writes + 1);
        assert_eq!(shelf.get(&"a".to_string()).unwrap().read().hits, 2);
    }

    #[test]
    fn test_write_back_restores_deleted_key() {
        let (_store, shelf) = tracking_shelf();
        shelf.set(&"a".to_string(), &Counter { hits: 1 }).unwrap();
        let counter = shelf.get(&"a".to_string()).unwrap();
        shelf.delete(&"a".to_string()).unwrap();

        counter.write().hits = 9;
        assert_eq!(counter.release().unwrap(), EntryState::Flushed);
        assert_eq!(shelf.get(&"a".to_string()).unwrap().read().hits, 9);
    }

    #[test]
    fn test_fetch_between_clear_and_sweep_stays_tracked() {
        let (store, shelf) = tracking_shelf();
        shelf.set(&"a".to_string(), &Counter { hits: 1 }).unwrap();
        let stale = shelf.get(&"a".to_string()).unwrap();

        // the steps of `clear`, with another fetch landing before the sweep
        let generation = shelf.core.tracker.advance_generation();
        store.clear().unwrap();
        shelf.set(&"a".to_string(), &Counter { hits: 1 }).unwrap();
        let fresh = shelf.get(&"a".to_string()).unwrap();
        assert_eq!(fresh.id().unwrap().generation(), generation);
        assert_eq!(shelf.core.tracker.invalidate_before(generation), 1);

        assert_eq!(fresh.state(), EntryState::Active);
        fresh.write().hits = 2;
        assert_eq!(fresh.release().unwrap(), EntryState::Flushed);
        assert_eq!(stale.release().unwrap(), EntryState::Invalidated);
        assert_eq!(shelf.get(&"a".to_string()).unwrap().read().hits, 2);
    }

    #[test]
    fn test_fetch_racing_close_is_refused() {
        let (_store, shelf) = tracking_shelf();
        // a read that got past the closed check just before close ran
        shelf.core.closed.store(true, Ordering::SeqCst);
        let result = shelf.track(b"a".to_vec(), Counter { hits: 1 }, 0);

        assert!(matches!(result, Err(ShelfError::Closed)));
        let stats = shelf.tracker_stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.invalidated, 1);
    }

    #[test]
    fn test_untracked_values_never_write() {
        let store = MemoryStore::new();
        let shelf: Shelf<String, Counter, _> =
            Shelf::from_backend(store.clone(), BincodeCodec, ShelfConfig::default());
        shelf.set(&"a".to_string(), &Counter { hits: 1 }).unwrap();
        let writes = store.writes();

        let counter = shelf.get(&"a".to_string()).unwrap();
        assert!(!counter.is_tracked());
        counter.write().hits = 5;
        assert_eq!(counter.release().unwrap(), EntryState::Untracked);
        assert_eq!(store.writes(), writes);
        assert_eq!(shelf.tracker_stats(), TrackerStats::default());
    }

    #[test]
    fn test_operations_after_close() {
        let (_store, shelf) = tracking_shelf();
        shelf.close().unwrap();
        shelf.close().unwrap();
        assert!(shelf.is_closed());
        assert!(matches!(shelf.get(&"a".to_string()), Err(ShelfError::Closed)));
        assert!(matches!(shelf.set(&"a".to_string(), &Counter { hits: 0 }), Err(ShelfError::Closed)));
        assert!(matches!(shelf.clear(), Err(ShelfError::Closed)));
        assert!(matches!(shelf.len(), Err(ShelfError::Closed)));
        assert!(shelf.keys().is_err());
    }

    #[test]
    fn test_changes_after_close_are_reported() {
        let (store, shelf) = tracking_shelf();
        shelf.set(&"a".to_string(), &Counter { hits: 1 }).unwrap();
        let untouched = shelf.get(&"a".to_string()).unwrap();
        let counter = shelf.get(&"a".to_string()).unwrap();
        drop(shelf);

        // drained on close; the late change has nowhere to go
        counter.write().hits = 3;
        assert!(counter.is_dirty().unwrap());
        assert!(matches!(counter.release(), Err(ShelfError::Flush(FlushError::Closed))));
        assert_eq!(untouched.release().unwrap(), EntryState::Discarded);
        let stored = store.raw(&BincodeCodec.encode("a").unwrap()).unwrap();
        let counter: Counter = BincodeCodec.decode(&stored).unwrap();
        assert_eq!(counter.hits, 1);
    }

    #[test]
    fn test_detach_stops_tracking() {
        let (store, shelf) = tracking_shelf();
        shelf.set(&"a".to_string(), &Counter { hits: 1 }).unwrap();
        let writes = store.writes();

        let counter = shelf.get(&"a".to_string()).unwrap();
        counter.write().hits = 2;
        let value = counter.detach();
        assert_eq!(value.hits, 2);
        assert_eq!(store.writes(), writes);
        assert_eq!(shelf.tracker_stats().active, 0);
    }

    #[test]
    fn test_update_counts_pairs() {
        let (_store, shelf) = tracking_shelf();
        let written = shelf
            .update(vec![
                ("a".to_string(), Counter { hits: 1 }),
                ("a".to_string(), Counter { hits: 2 }),
            ])
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(shelf.len().unwrap(), 1);
        assert_eq!(shelf.get(&"a".to_string()).unwrap().read().hits, 2);
    }
}
