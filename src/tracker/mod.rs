//! Write-back change tracking.
//!
//! When change tracking is enabled, every value a shelf hands out is wrapped in
//! a [`Tracked`] guard. The guard owns the decoded value together with the
//! encoded key it came from and a snapshot of its encoding at fetch time. When
//! the guard is dropped (or explicitly released) the value is encoded again,
//! compared with what the backend currently holds under that key, and written
//! back only if the bytes differ.
//!
//! The [`ChangeTracker`] keeps a table of every guard that has not been
//! released yet, so that closing a shelf can flush values whose guards are
//! still alive and clearing a shelf can invalidate them. The table holds
//! `Weak` references only; it never keeps a value alive.
//!
//! # Entry lifecycle
//!
//! ```text
//!            release / drop / close
//!   Active ──────────────────────────┬──> Flushed      (bytes changed or key gone, written)
//!     │                              ├──> Discarded    (unchanged)
//!     │                              └──> Failed       (encode or write error, logged)
//!     └── shelf cleared ───────────────> Invalidated  (no-op against the new store)
//! ```
//!
//! Every entry leaves the table exactly once. Fetching the same key twice
//! creates two independent entries; whichever is released last wins.
//!
//! # Concurrency
//!
//! The table is behind a mutex and may be touched from any thread. The
//! write-back itself is a read-compare-write on the backend and is **not**
//! atomic: two guards for the same key released concurrently race, and the
//! slower one wins. Callers that share keys across threads must serialize
//! releases per key themselves.

mod guard;

pub use guard::{Lookup, Tracked, ValueMut, ValueRef};
pub(crate) use guard::TrackedCell;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

use log::{error, trace};
use strum::Display;

use crate::error::FlushError;

/// Identity of one tracked fetch.
///
/// The generation changes every time the shelf is cleared and the serial is
/// never reused within a tracker, so an id can't alias a newer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackerId {
    generation: u64,
    serial: u64,
}

impl TrackerId {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.generation, self.serial)
    }
}

/// Where a tracked value is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum EntryState {
    /// Handed out with change tracking disabled; never written back
    Untracked,
    /// Registered and waiting for release
    Active,
    /// Re-encoded bytes differed from the store and were written
    Flushed,
    /// Nothing to write
    Discarded,
    /// The shelf was cleared after the fetch
    Invalidated,
    /// Write-back raised an error
    Failed,
}

impl EntryState {
    /// True for every state an entry can't leave
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EntryState::Active)
    }
}

/// Counters describing what the tracker has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Entries currently in the table
    pub active: usize,
    pub registered: u64,
    pub flushed: u64,
    pub discarded: u64,
    pub invalidated: u64,
    pub failed: u64,
}

/// Type-erased view of a tracked value, as stored in the table.
pub(crate) trait TrackedSlot: Send + Sync {
    /// Run the write-back protocol if the entry is still active
    fn flush(&self) -> Result<EntryState, FlushError>;

    /// Move an active entry to `Invalidated` without touching the store.
    /// Returns false if it had already left `Active`.
    fn invalidate(&self) -> bool;
}

#[derive(Debug, Default)]
struct Counters {
    registered: AtomicU64,
    flushed: AtomicU64,
    discarded: AtomicU64,
    invalidated: AtomicU64,
    failed: AtomicU64,
}

/// Table of live tracked values for one shelf.
pub struct ChangeTracker {
    generation: AtomicU64,
    next_serial: AtomicU64,
    table: Mutex<HashMap<TrackerId, Weak<dyn TrackedSlot>>>,
    counters: Counters,
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("generation", &self.generation())
            .field("stats", &self.stats())
            .finish()
    }
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            next_serial: AtomicU64::new(0),
            table: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Current store generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Number of entries still waiting for release
    pub fn active(&self) -> usize {
        self.table().len()
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            active: self.active(),
            registered: self.counters.registered.load(Ordering::Relaxed),
            flushed: self.counters.flushed.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            invalidated: self.counters.invalidated.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    // Entries only do trivial map operations under this lock, so a poisoned
    // table is still consistent.
    fn table(&self) -> MutexGuard<'_, HashMap<TrackerId, Weak<dyn TrackedSlot>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Id for a value read from the store while it was at `generation`
    pub(crate) fn next_id(&self, generation: u64) -> TrackerId {
        TrackerId {
            generation,
            serial: self.next_serial.fetch_add(1, Ordering::SeqCst),
        }
    }

    pub(crate) fn register(&self, id: TrackerId, slot: Weak<dyn TrackedSlot>) {
        self.table().insert(id, slot);
        self.counters.registered.fetch_add(1, Ordering::Relaxed);
        trace!("Tracker: registered {}", id);
    }

    /// Record that `id` reached the terminal `state` and drop it from the table.
    ///
    /// Called by the entry itself, once, on its transition out of `Active`.
    pub(crate) fn retire(&self, id: TrackerId, state: EntryState) {
        self.table().remove(&id);
        let counter = match state {
            EntryState::Flushed => &self.counters.flushed,
            EntryState::Discarded => &self.counters.discarded,
            EntryState::Invalidated => &self.counters.invalidated,
            EntryState::Failed => &self.counters.failed,
            EntryState::Untracked | EntryState::Active => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        trace!("Tracker: {} -> {}", id, state);
    }

    /// Start a new generation. Entries fetched before this point can no
    /// longer write.
    pub(crate) fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Flush every active entry, in no particular order.
    ///
    /// Failures are logged and skipped. Returns how many entries were written.
    pub(crate) fn drain(&self) -> usize {
        let pending: Vec<(TrackerId, Weak<dyn TrackedSlot>)> = self
            .table()
            .iter()
            .map(|(id, slot)| (*id, slot.clone()))
            .collect();

        let mut written = 0;
        for (id, slot) in pending {
            let Some(slot) = slot.upgrade() else {
                // guard already gone, and with it its own release
                self.table().remove(&id);
                continue;
            };
            match slot.flush() {
                Ok(EntryState::Flushed) => written += 1,
                Ok(_) => {}
                Err(e) => error!("Tracker: write-back of {} during drain failed: {}", id, e),
            }
        }
        written
    }

    /// Invalidate every active entry. Returns how many were still active.
    pub(crate) fn invalidate_all(&self) -> usize {
        self.invalidate_before(u64::MAX)
    }

    /// Invalidate the active entries fetched before `generation`.
    ///
    /// Entries of `generation` or later were registered against the store as
    /// it is now and stay in the table. Returns how many were invalidated.
    pub(crate) fn invalidate_before(&self, generation: u64) -> usize {
        let mut stale: Vec<Weak<dyn TrackedSlot>> = Vec::new();
        self.table().retain(|id, slot| {
            if id.generation() < generation {
                stale.push(slot.clone());
                false
            } else {
                true
            }
        });
        stale
            .into_iter()
            .filter_map(|slot| slot.upgrade())
            .filter(|slot| slot.invalidate())
            .count()
    }
}
