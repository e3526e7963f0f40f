use thiserror::Error;

pub type ShelfResult<T> = Result<T, ShelfError>;
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced by user-initiated shelf operations.
#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("Key not found")]
    NotFound,
    #[error("There was a conversion Error: {0}")]
    Codec(#[from] CodecError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Write-back of a tracked value failed: {0}")]
    Flush(#[from] FlushError),
    #[error("The shelf has been closed")]
    Closed,
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("There was an error encoding type: {0}")]
    Encoding(#[from] bincode::error::EncodeError),
    #[error("There was an error decoding type: {0}")]
    Decoding(#[from] bincode::error::DecodeError),
    #[error("Json codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// I/O failures reported by a storage backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[cfg(feature = "sled")]
    #[error("There was an error with the Sled database: {0}")]
    Sled(#[from] sled::Error),
    #[cfg(feature = "redb")]
    #[error(transparent)]
    Redb(#[from] RedbError),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Backend is closed")]
    Closed,
    #[error("Storage error: {0}")]
    Storage(String),
}

#[cfg(feature = "redb")]
#[derive(Error, Debug)]
pub enum RedbError {
    #[error("Redb Database Error: {0}")]
    DatabaseError(#[from] redb::DatabaseError),
    #[error("Redb Transaction Error: {0}")]
    TransactionError(#[from] redb::TransactionError),
    #[error("Redb Table Error: {0}")]
    TableError(#[from] redb::TableError),
    #[error("Redb Commit Error: {0}")]
    CommitError(#[from] redb::CommitError),
    #[error("Redb Storage Error: {0}")]
    StorageError(#[from] redb::StorageError),
}

#[cfg(feature = "redb")]
macro_rules! impl_from_redb {
    ($($err:ty => $variant:ident),*) => {
        $(
            impl From<$err> for BackendError {
                fn from(err: $err) -> Self {
                    BackendError::Redb(RedbError::$variant(err))
                }
            }
        )*
    };
}

#[cfg(feature = "redb")]
impl_from_redb!(
    redb::DatabaseError => DatabaseError,
    redb::TransactionError => TransactionError,
    redb::TableError => TableError,
    redb::CommitError => CommitError,
    redb::StorageError => StorageError
);

/// Failure while writing a tracked value back on release.
///
/// Raised from `Drop`, so outside of an explicit [`Tracked::release`](crate::tracker::Tracked::release)
/// it is only ever logged.
#[derive(Error, Debug)]
pub enum FlushError {
    #[error("Could not re-encode tracked value: {0}")]
    Codec(#[from] CodecError),
    #[error("Could not write tracked value back: {0}")]
    Backend(#[from] BackendError),
    #[error("Store was closed before the tracked value was released")]
    Closed,
    #[error("Lock poisoned during write-back")]
    LockPoisoned,
}
