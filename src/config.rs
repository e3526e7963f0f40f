//! Unified configuration for shelves and their storage backends.
//!
//! Configuration structs use the builder pattern via `typed-builder`, so every
//! option has a sensible default and only the interesting ones need naming.

use std::path::PathBuf;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use typed_builder::TypedBuilder;

/// The storage engines a shelf can be opened on.
///
/// Parses from and displays as its lowercase name, so it can come straight
/// out of a config file or command line flag.
///
/// ```
/// use netabase_shelf::config::BackendKind;
///
/// let kind: BackendKind = "redb".parse().unwrap();
/// assert_eq!(kind, BackendKind::Redb);
/// assert_eq!(BackendKind::Sled.to_string(), "sled");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    /// Ordered log-structured store (sled)
    Sled,
    /// Copy-on-write B-tree file store (redb)
    Redb,
    /// Process-local ordered map, nothing reaches disk
    Memory,
}

/// Configuration for file-based backends (Sled, Redb).
///
/// # Examples
///
/// ```
/// use netabase_shelf::config::FileConfig;
/// use std::path::PathBuf;
///
/// // Create with defaults
/// let config = FileConfig::new("my_shelf.db");
///
/// // Customize options
/// let config = FileConfig::builder()
///     .path(PathBuf::from("/data/shelf.db"))
///     .cache_size_mb(512)
///     .use_fsync(false)
///     .build();
/// assert_eq!(config.cache_size_mb, 512);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
#[builder(doc)]
pub struct FileConfig {
    /// Path to the database file or directory
    pub path: PathBuf,

    /// Cache size in megabytes (backend-specific interpretation)
    #[builder(default = 256)]
    pub cache_size_mb: usize,

    /// Whether to create the database if it doesn't exist
    #[builder(default = true)]
    pub create_if_missing: bool,

    /// Whether to remove any existing database before opening
    #[builder(default = false)]
    pub truncate: bool,

    /// Flush to disk after every write instead of relying on background flushing
    #[builder(default = false)]
    pub use_fsync: bool,
}

impl FileConfig {
    /// Create a basic configuration with just a path
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            cache_size_mb: 256,
            create_if_missing: true,
            truncate: false,
            use_fsync: false,
        }
    }

    /// Create configuration for a fresh database under the system temp directory
    pub fn temp() -> Self {
        let temp_path = std::env::temp_dir().join(format!("netabase_shelf_{}", uuid::Uuid::new_v4()));
        Self::new(temp_path)
    }
}

/// Behaviour of the mapping layer itself, independent of the backend.
///
/// ```
/// use netabase_shelf::config::ShelfConfig;
///
/// let config = ShelfConfig::builder().track_value_changes(true).build();
/// assert!(config.track_value_changes);
/// assert!(config.flush_on_close);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
#[builder(doc)]
pub struct ShelfConfig {
    /// Write fetched values back to the store when their guard is released
    #[builder(default = false)]
    pub track_value_changes: bool,

    /// Flush every still-active tracked value when the shelf is closed
    #[builder(default = true)]
    pub flush_on_close: bool,
}

impl ShelfConfig {
    /// Configuration with change tracking switched on
    pub fn tracking() -> Self {
        Self::builder().track_value_changes(true).build()
    }
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_file_config_builder() {
        let config = FileConfig::builder()
            .path(PathBuf::from("/tmp/test.db"))
            .cache_size_mb(512)
            .create_if_missing(false)
            .build();

        assert_eq!(config.path, PathBuf::from("/tmp/test.db"));
        assert_eq!(config.cache_size_mb, 512);
        assert!(!config.create_if_missing);
        assert!(!config.use_fsync);
    }

    #[test]
    fn test_file_config_defaults() {
        let config = FileConfig::new("/tmp/default.db");
        assert_eq!(config.cache_size_mb, 256);
        assert!(config.create_if_missing);
        assert!(!config.truncate);
    }

    #[test]
    fn test_temp_paths_are_unique() {
        assert_ne!(FileConfig::temp().path, FileConfig::temp().path);
    }

    #[test]
    fn test_shelf_config_defaults() {
        let config = ShelfConfig::default();
        assert!(!config.track_value_changes);
        assert!(config.flush_on_close);
        assert!(ShelfConfig::tracking().track_value_changes);
    }

    #[test]
    fn test_backend_kind_names() {
        for kind in BackendKind::iter() {
            let parsed: BackendKind = kind.as_ref().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("leveldb".parse::<BackendKind>().is_err());
    }
}
