//! Prelude module for convenient imports.
//!
//! ```rust
//! use netabase_shelf::prelude::*;
//! ```
//!
//! Brings in the shelf itself, its configuration, the codecs, the backends
//! compiled into this build and the error types.

pub use crate::backend::{Backend, BatchOp};
pub use crate::codec::{BincodeCodec, Codec, JsonCodec};
pub use crate::config::{BackendKind, FileConfig, ShelfConfig};
pub use crate::databases::MemoryStore;
pub use crate::error::{BackendError, CodecError, FlushError, ShelfError, ShelfResult};
pub use crate::shelf::{MappingSource, Shelf};
pub use crate::tracker::{EntryState, Lookup, Tracked, TrackerStats};

#[cfg(feature = "redb")]
pub use crate::databases::RedbStore;
#[cfg(feature = "sled")]
pub use crate::databases::SledStore;
