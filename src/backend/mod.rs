/// Backend abstraction layer for Netabase Shelf
///
/// This module defines the narrow interface any byte-keyed store must implement
/// to sit underneath a [`Shelf`](crate::shelf::Shelf). Concrete engines live in
/// [`databases`](crate::databases).

pub mod traits;

pub use traits::{Backend, BatchOp, BoxedIterator, ChunkedIter, ITER_CHUNK};
pub use crate::error::{BackendError, BackendResult};
