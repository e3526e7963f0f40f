pub mod memory_store;

#[cfg(feature = "redb")]
pub mod redb_store;

#[cfg(feature = "sled")]
pub mod sled_store;

pub use memory_store::MemoryStore;

#[cfg(feature = "redb")]
pub use redb_store::RedbStore;

#[cfg(feature = "sled")]
pub use sled_store::SledStore;

use crate::backend::Backend;
use crate::config::{BackendKind, FileConfig};
use crate::error::{BackendError, BackendResult};

/// Open the backend named by `kind` behind a trait object.
///
/// `BackendKind::Memory` ignores the file configuration.
pub fn open_backend(kind: BackendKind, config: FileConfig) -> BackendResult<Box<dyn Backend>> {
    match kind {
        BackendKind::Memory => Ok(Box::new(MemoryStore::new())),
        #[cfg(feature = "sled")]
        BackendKind::Sled => Ok(Box::new(SledStore::open(config)?)),
        #[cfg(feature = "redb")]
        BackendKind::Redb => Ok(Box::new(RedbStore::open(config)?)),
        #[allow(unreachable_patterns)]
        other => {
            let _ = config;
            Err(BackendError::Storage(format!(
                "backend `{other}` is not compiled into this build"
            )))
        }
    }
}
