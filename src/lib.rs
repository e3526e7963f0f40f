//! # Netabase Shelf
//!
//! A persistent, dictionary-like mapping over embedded key-value stores.
//!
//! ## Features
//!
//! - **Typed**: Any `serde` key maps to any `serde` value; bytes never leak out
//! - **Pluggable Storage**: Sled, Redb or an in-process map behind one [`Backend`](backend::Backend) trait
//! - **Write-Back Tracking**: Mutate a fetched value in place and it is written back on release
//! - **Change Detection**: Only values whose encoding actually changed hit the store
//! - **Batch Updates**: Bulk writes land atomically where the backend allows it
//!
//! ## Quick Start
//!
//! ```rust
//! use netabase_shelf::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Dog {
//!     name: String,
//!     number: u32,
//! }
//!
//! let dir = tempfile::tempdir().unwrap();
//! let file = FileConfig::new(dir.path().join("dogs.redb"));
//!
//! let shelf: Shelf<u32, Dog, RedbStore> = Shelf::open_redb(file.clone(), ShelfConfig::tracking())?;
//! shelf.set(&1, &Dog { name: "rex".into(), number: 1 })?;
//!
//! // mutate in place; the change is persisted when the guard is released
//! shelf.get(&1)?.write().number = 42;
//! shelf.close()?;
//!
//! let shelf: Shelf<u32, Dog, RedbStore> = Shelf::open_redb(file, ShelfConfig::default())?;
//! assert_eq!(shelf.get(&1)?.read().number, 42);
//! # Ok::<(), ShelfError>(())
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod databases;
pub mod error;
pub mod prelude;
pub mod shelf;
pub mod tracker;

pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use config::{BackendKind, FileConfig, ShelfConfig};
pub use error::{ShelfError, ShelfResult};
pub use shelf::{MappingSource, Shelf};
pub use tracker::{EntryState, Lookup, Tracked};
