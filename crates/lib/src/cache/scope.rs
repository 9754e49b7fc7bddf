//! Hierarchical cache scopes.
//!
//! Each cache instance owns the files under one base directory and keeps its
//! blob in a cache directory. Instances are chained from the most specific
//! scope (a project) to the most general (the engine or a shared root);
//! lookups for files outside an instance's base directory are forwarded to
//! its parent. The root of a chain answers for everything that reaches it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::fs::path::{is_under_directory, normalize};

/// Where a cache instance sits: which files it owns and where its blobs live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheScope {
  /// Files under this directory are owned by the scope.
  pub base_dir: PathBuf,
  /// Directory holding the scope's cache blobs.
  pub cache_dir: PathBuf,
}

impl CacheScope {
  pub fn new(base_dir: impl AsRef<Path>, cache_dir: impl AsRef<Path>) -> Self {
    Self {
      base_dir: normalize(base_dir.as_ref()),
      cache_dir: normalize(cache_dir.as_ref()),
    }
  }

  pub fn owns(&self, file: &Path) -> bool {
    is_under_directory(file, &self.base_dir)
  }
}

/// A cache that participates in a scope chain.
pub trait ScopedCache: Sized {
  fn scope(&self) -> &CacheScope;

  fn parent(&self) -> Option<&Arc<Self>>;

  /// The instance responsible for `file`: this one if it owns the file or
  /// has no parent, otherwise whatever the parent resolves to.
  fn scope_for(&self, file: &Path) -> &Self {
    match self.parent() {
      Some(parent) if !self.scope().owns(file) => parent.scope_for(file),
      _ => self,
    }
  }
}
