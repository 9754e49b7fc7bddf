//! Error and trait definitions shared by the persistent caches.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures while loading or saving a cache blob.
///
/// These never abort a build: lookups fall back to an empty cache and save
/// failures are reported as warnings.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("cache version mismatch in {path}: expected {expected}, got {actual}")]
  VersionMismatch { path: PathBuf, expected: u32, actual: u32 },

  #[error("cache serialization error: {reason}")]
  Serialization { reason: String },
}

/// A cache instance that can be persisted by [`super::CacheRegistry::save_all`].
pub trait PersistentCache: Send + Sync {
  /// Path of the blob this instance loads from and saves to.
  fn location(&self) -> &Path;

  fn is_dirty(&self) -> bool;

  /// Writes the blob if dirty; a clean instance is a no-op.
  fn save(&self) -> Result<(), CacheError>;
}
