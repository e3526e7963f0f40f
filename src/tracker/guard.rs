//! Guard types handed out by a shelf.
//!
//! [`Tracked`] wraps a value fetched from a shelf. With change tracking on, the
//! guard writes the value back when it goes away; with tracking off it is just
//! a thin owner of the decoded value.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::error;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{EntryState, TrackedSlot, TrackerId};
use crate::backend::Backend;
use crate::codec::{BincodeCodec, Codec};
use crate::error::{FlushError, ShelfResult};
use crate::shelf::ShelfCore;

pub(super) struct Slot<V> {
    value: V,
    state: EntryState,
    /// Encoding the store is known to hold for this value: the fetch-time
    /// snapshot, then whatever the last write-back settled on
    baseline: Vec<u8>,
}

/// Shared state behind one [`Tracked`] guard.
///
/// The guard owns the only strong reference; the tracker table points here
/// through a `Weak`. `slot` serializes every transition out of `Active`, so
/// whichever of release, drain or invalidation gets there first wins and the
/// others observe a terminal state.
pub(crate) struct TrackedCell<V, B, C> {
    id: Option<TrackerId>,
    key: Vec<u8>,
    slot: Mutex<Slot<V>>,
    core: Arc<ShelfCore<B, C>>,
}

impl<V, B, C> TrackedCell<V, B, C>
where
    V: Serialize + Send + 'static,
    B: Backend + 'static,
    C: Codec + 'static,
{
    /// Cell for a registered value. `snapshot` is the encoding of `value` at fetch time.
    pub(crate) fn tracked(
        id: TrackerId,
        key: Vec<u8>,
        snapshot: Vec<u8>,
        value: V,
        core: Arc<ShelfCore<B, C>>,
    ) -> Self {
        Self {
            id: Some(id),
            key,
            slot: Mutex::new(Slot {
                value,
                state: EntryState::Active,
                baseline: snapshot,
            }),
            core,
        }
    }

    pub(crate) fn untracked(key: Vec<u8>, value: V, core: Arc<ShelfCore<B, C>>) -> Self {
        Self {
            id: None,
            key,
            slot: Mutex::new(Slot {
                value,
                state: EntryState::Untracked,
                baseline: Vec::new(),
            }),
            core,
        }
    }

    // A panic while the user held `write()` leaves the value in whatever state
    // the closure got it to, which is still a valid `V`.
    fn lock(&self) -> MutexGuard<'_, Slot<V>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, slot: &mut Slot<V>, state: EntryState) {
        slot.state = state;
        if let Some(id) = self.id {
            self.core.tracker().retire(id, state);
        }
    }

    fn flush_locked(&self, slot: &mut Slot<V>) -> Result<EntryState, FlushError> {
        let Some(id) = self.id else {
            return Ok(slot.state);
        };
        if slot.state.is_terminal() {
            return self.settled(slot);
        }

        let result = self
            .core
            .codec()
            .encode(&slot.value)
            .map_err(FlushError::from)
            .and_then(|current| {
                let state = self.core.write_back(&self.key, &current, id.generation())?;
                Ok((state, current))
            });

        match result {
            Ok((state, current)) => {
                if state != EntryState::Invalidated {
                    slot.baseline = current;
                }
                self.transition(slot, state);
                Ok(state)
            }
            Err(e) => {
                self.transition(slot, EntryState::Failed);
                Err(e)
            }
        }
    }

    /// Outcome for an entry that already left `Active`.
    ///
    /// Only a close drains entries whose guard is still alive, so a value
    /// written back that way and changed afterwards has nowhere left to go.
    fn settled(&self, slot: &Slot<V>) -> Result<EntryState, FlushError> {
        if self.core.is_closed()
            && matches!(slot.state, EntryState::Flushed | EntryState::Discarded)
            && self.core.codec().encode(&slot.value)? != slot.baseline
        {
            return Err(FlushError::Closed);
        }
        Ok(slot.state)
    }
}

impl<V, B, C> TrackedSlot for TrackedCell<V, B, C>
where
    V: Serialize + Send + 'static,
    B: Backend + 'static,
    C: Codec + 'static,
{
    fn flush(&self) -> Result<EntryState, FlushError> {
        let mut slot = self.lock();
        self.flush_locked(&mut slot)
    }

    fn invalidate(&self) -> bool {
        let mut slot = self.lock();
        if slot.state.is_terminal() {
            return false;
        }
        self.transition(&mut slot, EntryState::Invalidated);
        true
    }
}

/// A value fetched from a [`Shelf`](crate::shelf::Shelf).
///
/// When the shelf tracks changes, dropping the guard encodes the value again
/// and, if the bytes differ from what the store currently holds under the same
/// key, writes them back. Mutating the value through [`Tracked::write`] or
/// [`Tracked::modify`] is therefore enough to persist it:
///
/// ```
/// use netabase_shelf::prelude::*;
///
/// let shelf: Shelf<String, Vec<u32>, MemoryStore> = Shelf::in_memory(ShelfConfig::tracking());
/// shelf.set(&"primes".to_string(), &vec![2, 3, 5])?;
///
/// shelf.get(&"primes".to_string())?.write().push(7);
///
/// assert_eq!(*shelf.get(&"primes".to_string())?.read(), vec![2, 3, 5, 7]);
/// # Ok::<(), netabase_shelf::error::ShelfError>(())
/// ```
///
/// Errors during that implicit write-back can't be returned from `Drop`; they
/// are logged at `error` level and the value is dropped. Use
/// [`Tracked::release`] to observe them.
///
/// Each call to `get` yields an independent guard, even for the same key.
/// Their write-backs don't merge: the one released last determines what is
/// stored.
///
/// # Deadlocks
///
/// [`ValueRef`] and [`ValueMut`] lock the guard. Closing or clearing the
/// shelf visits every live guard and waits for those locks, so holding one
/// across `Shelf::close` or `Shelf::clear` on the same thread never returns.
pub struct Tracked<V, B, C = BincodeCodec>
where
    V: Serialize + Send + 'static,
    B: Backend + 'static,
    C: Codec + 'static,
{
    cell: Arc<TrackedCell<V, B, C>>,
}

impl<V, B, C> Tracked<V, B, C>
where
    V: Serialize + Send + 'static,
    B: Backend + 'static,
    C: Codec + 'static,
{
    pub(crate) fn new(cell: Arc<TrackedCell<V, B, C>>) -> Self {
        Self { cell }
    }

    /// Shared access to the value
    pub fn read(&self) -> ValueRef<'_, V> {
        ValueRef {
            slot: self.cell.lock(),
        }
    }

    /// Exclusive access to the value. Changes are written back on release.
    pub fn write(&self) -> ValueMut<'_, V> {
        ValueMut {
            slot: self.cell.lock(),
        }
    }

    /// Run `f` against the value and return its result
    pub fn modify<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        f(&mut self.write())
    }

    /// Encoded key this value was fetched under
    pub fn key_bytes(&self) -> &[u8] {
        &self.cell.key
    }

    /// Decode the key this value was fetched under
    pub fn key<K: DeserializeOwned>(&self) -> ShelfResult<K> {
        Ok(self.cell.core.codec().decode(&self.cell.key)?)
    }

    /// Tracker id, `None` when change tracking is off
    pub fn id(&self) -> Option<TrackerId> {
        self.cell.id
    }

    pub fn is_tracked(&self) -> bool {
        self.cell.id.is_some()
    }

    pub fn state(&self) -> EntryState {
        self.cell.lock().state
    }

    /// Whether the value no longer encodes to the bytes it was fetched with,
    /// or to the bytes a close last wrote back for it.
    ///
    /// Always false for untracked values, which keep no snapshot.
    pub fn is_dirty(&self) -> ShelfResult<bool> {
        if !self.is_tracked() {
            return Ok(false);
        }
        let slot = self.cell.lock();
        let current = self.cell.core.codec().encode(&slot.value)?;
        Ok(current != slot.baseline)
    }

    /// Write the value back now and report what happened.
    ///
    /// Returns the terminal state the entry reached. Untracked values return
    /// `EntryState::Untracked` without touching the store.
    ///
    /// If the shelf was closed while this guard was alive, the value was
    /// written back then. Changes made after that fail with
    /// [`FlushError::Closed`](crate::error::FlushError::Closed).
    pub fn release(self) -> ShelfResult<EntryState> {
        Ok(self.cell.flush()?)
    }

    /// Write back (logging any failure) and hand out the value.
    pub fn into_inner(self) -> V
    where
        V: Clone,
    {
        if let Err(e) = self.cell.flush() {
            error!("Tracked: write-back before into_inner failed: {}", e);
        }
        let slot = self.cell.lock();
        slot.value.clone()
    }

    /// Stop tracking without writing anything and hand out the value.
    pub fn detach(self) -> V
    where
        V: Clone,
    {
        let mut slot = self.cell.lock();
        if !slot.state.is_terminal() {
            self.cell.transition(&mut slot, EntryState::Discarded);
        }
        // changes are dropped on purpose, not lost to a close
        if self.cell.id.is_some() {
            if let Ok(current) = self.cell.core.codec().encode(&slot.value) {
                slot.baseline = current;
            }
        }
        slot.value.clone()
    }
}

impl<V, B, C> Drop for Tracked<V, B, C>
where
    V: Serialize + Send + 'static,
    B: Backend + 'static,
    C: Codec + 'static,
{
    fn drop(&mut self) {
        if let Err(e) = self.cell.flush() {
            match self.cell.id {
                Some(id) => error!("Tracked: write-back of {} failed: {}", id, e),
                None => error!("Tracked: write-back failed: {}", e),
            }
        }
    }
}

impl<V, B, C> fmt::Debug for Tracked<V, B, C>
where
    V: Serialize + Send + fmt::Debug + 'static,
    B: Backend + 'static,
    C: Codec + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.cell.lock();
        f.debug_struct("Tracked")
            .field("id", &self.cell.id)
            .field("state", &slot.state)
            .field("value", &slot.value)
            .finish()
    }
}

/// Shared borrow of a tracked value, see [`Tracked::read`]
pub struct ValueRef<'a, V> {
    slot: MutexGuard<'a, Slot<V>>,
}

impl<V> Deref for ValueRef<'_, V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.slot.value
    }
}

/// Mutable borrow of a tracked value, see [`Tracked::write`]
pub struct ValueMut<'a, V> {
    slot: MutexGuard<'a, Slot<V>>,
}

impl<V> Deref for ValueMut<'_, V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.slot.value
    }
}

impl<V> DerefMut for ValueMut<'_, V> {
    fn deref_mut(&mut self) -> &mut V {
        &mut self.slot.value
    }
}

/// Result of [`Shelf::get_or`](crate::shelf::Shelf::get_or).
///
/// Only a stored value is tracked. A default stays a plain value and is never
/// written, even if mutated.
pub enum Lookup<V, B, C = BincodeCodec>
where
    V: Serialize + Send + 'static,
    B: Backend + 'static,
    C: Codec + 'static,
{
    Stored(Tracked<V, B, C>),
    Default(V),
}

impl<V, B, C> Lookup<V, B, C>
where
    V: Serialize + Send + 'static,
    B: Backend + 'static,
    C: Codec + 'static,
{
    pub fn is_stored(&self) -> bool {
        matches!(self, Lookup::Stored(_))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Lookup::Default(_))
    }

    pub fn into_stored(self) -> Option<Tracked<V, B, C>> {
        match self {
            Lookup::Stored(tracked) => Some(tracked),
            Lookup::Default(_) => None,
        }
    }

    /// Run `f` against whichever value this is
    pub fn with_value<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        match self {
            Lookup::Stored(tracked) => f(&tracked.read()),
            Lookup::Default(value) => f(value),
        }
    }

    /// The value itself. A stored value is written back first.
    pub fn into_value(self) -> V
    where
        V: Clone,
    {
        match self {
            Lookup::Stored(tracked) => tracked.into_inner(),
            Lookup::Default(value) => value,
        }
    }
}

impl<V, B, C> fmt::Debug for Lookup<V, B, C>
where
    V: Serialize + Send + fmt::Debug + 'static,
    B: Backend + 'static,
    C: Codec + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Stored(tracked) => f.debug_tuple("Stored").field(tracked).finish(),
            Lookup::Default(value) => f.debug_tuple("Default").field(value).finish(),
        }
    }
}
