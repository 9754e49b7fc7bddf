//! Ownership of every cache instance opened during a run.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::dependency::IncludeDependencyCache;
use super::history::CommandLineHistory;
use super::metadata::SourceMetadataCache;
use super::scope::{CacheScope, ScopedCache};
use super::types::PersistentCache;

/// The three caches for one scope chain, as consumed by the graph.
#[derive(Debug, Clone)]
pub struct EngineCaches {
  pub history: Arc<CommandLineHistory>,
  pub dependencies: Arc<IncludeDependencyCache>,
  pub metadata: Arc<SourceMetadataCache>,
}

/// Hands out one cache instance per cache directory and saves them together.
///
/// Opening the same cache directory twice yields the same instances, so two
/// chains that share a root (say, the engine) also share its entries. A
/// directory keeps the parent it was first opened with.
#[derive(Debug, Default)]
pub struct CacheRegistry {
  histories: DashMap<PathBuf, Arc<CommandLineHistory>>,
  dependencies: DashMap<PathBuf, Arc<IncludeDependencyCache>>,
  metadata: DashMap<PathBuf, Arc<SourceMetadataCache>>,
}

impl CacheRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Opens a chain of caches. `root` answers for every file not owned by a
  /// more specific scope; `scopes` run from general to specific.
  pub fn open_chain(&self, root: &CacheScope, scopes: &[CacheScope]) -> EngineCaches {
    let mut caches = EngineCaches {
      history: intern(&self.histories, root, None, CommandLineHistory::new),
      dependencies: intern(&self.dependencies, root, None, IncludeDependencyCache::new),
      metadata: intern(&self.metadata, root, None, SourceMetadataCache::new),
    };

    for scope in scopes {
      caches = EngineCaches {
        history: intern(&self.histories, scope, Some(caches.history), CommandLineHistory::new),
        dependencies: intern(
          &self.dependencies,
          scope,
          Some(caches.dependencies),
          IncludeDependencyCache::new,
        ),
        metadata: intern(&self.metadata, scope, Some(caches.metadata), SourceMetadataCache::new),
      };
    }
    caches
  }

  fn all(&self) -> Vec<Arc<dyn PersistentCache>> {
    let mut all: Vec<Arc<dyn PersistentCache>> = Vec::new();
    all.extend(self.histories.iter().map(|e| Arc::clone(e.value()) as Arc<dyn PersistentCache>));
    all.extend(self.dependencies.iter().map(|e| Arc::clone(e.value()) as Arc<dyn PersistentCache>));
    all.extend(self.metadata.iter().map(|e| Arc::clone(e.value()) as Arc<dyn PersistentCache>));
    all
  }

  /// Persists every dirty cache in parallel and returns how many were written.
  ///
  /// Failures are logged and leave the cache dirty; they never fail the build.
  pub fn save_all(&self) -> usize {
    let dirty: Vec<Arc<dyn PersistentCache>> = self.all().into_iter().filter(|c| c.is_dirty()).collect();

    let saved = dirty
      .par_iter()
      .filter(|cache| match cache.save() {
        Ok(()) => true,
        Err(e) => {
          warn!(path = %cache.location().display(), error = %e, "failed to save cache");
          false
        }
      })
      .count();

    info!(saved, dirty = dirty.len(), "saved caches");
    saved
  }
}

fn intern<C: ScopedCache>(
  map: &DashMap<PathBuf, Arc<C>>,
  scope: &CacheScope,
  parent: Option<Arc<C>>,
  make: fn(CacheScope, Option<Arc<C>>) -> C,
) -> Arc<C> {
  match map.entry(scope.cache_dir.clone()) {
    Entry::Occupied(entry) => {
      let existing = entry.get();
      let same_parent = match (existing.parent(), &parent) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
      };
      if !same_parent {
        debug!(
          cache_dir = %scope.cache_dir.display(),
          "cache directory already open with a different parent, keeping the first"
        );
      }
      Arc::clone(existing)
    }
    Entry::Vacant(entry) => Arc::clone(entry.insert(Arc::new(make(scope.clone(), parent))).value()),
  }
}
