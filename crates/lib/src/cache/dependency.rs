//! Parsed implicit-dependency lists, keyed by list file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::depfile::{DepListError, read_dependency_list};
use super::scope::{CacheScope, ScopedCache};
use super::store::PersistentMap;
use super::types::{CacheError, PersistentCache};
use crate::consts::{DEPENDENCY_CACHE_FILENAME, DEPENDENCY_CACHE_VERSION};
use crate::fs::FileRecord;
use crate::fs::path::normalize;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DependencyEntry {
  /// Modification time of the list file when it was parsed.
  last_write_time: SystemTime,
  /// Absolute, normalized dependency paths.
  dependencies: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct IncludeDependencyCache {
  scope: CacheScope,
  parent: Option<Arc<IncludeDependencyCache>>,
  entries: PersistentMap<PathBuf, DependencyEntry>,
}

impl IncludeDependencyCache {
  pub fn new(scope: CacheScope, parent: Option<Arc<IncludeDependencyCache>>) -> Self {
    let location = scope.cache_dir.join(DEPENDENCY_CACHE_FILENAME);
    Self {
      scope,
      parent,
      entries: PersistentMap::new(location, DEPENDENCY_CACHE_VERSION),
    }
  }

  /// Dependencies listed in `list`, or `None` if the list file does not exist.
  ///
  /// The list is parsed again only when it is newer than the cached copy.
  /// Relative entries are resolved against the list file's directory.
  pub fn try_get_dependencies(&self, list: &FileRecord) -> Result<Option<Vec<PathBuf>>, DepListError> {
    if !list.exists() {
      return Ok(None);
    }

    let owner = self.scope_for(list.location());
    let key = list.location().to_path_buf();
    let stamp = list.last_write_time();

    if let Some(entry) = owner.entries.get(&key)
      && entry.last_write_time >= stamp
    {
      trace!(path = %key.display(), "dependency list cache hit");
      return Ok(Some(entry.dependencies));
    }

    let base = list.location().parent().unwrap_or_else(|| Path::new("/"));
    let dependencies: Vec<PathBuf> = read_dependency_list(list.location())?
      .into_iter()
      .map(|dep| normalize(&base.join(dep)))
      .collect();

    debug!(path = %key.display(), count = dependencies.len(), "parsed dependency list");
    owner.entries.insert(
      key,
      DependencyEntry {
        last_write_time: stamp,
        dependencies: dependencies.clone(),
      },
    );
    Ok(Some(dependencies))
  }

  /// Parses every list in parallel so later lookups are cache hits.
  ///
  /// Parse failures are only logged here; they surface again from
  /// [`Self::try_get_dependencies`] when the list is actually needed.
  pub fn prewarm(&self, lists: &[Arc<FileRecord>]) {
    lists.par_iter().for_each(|list| {
      if let Err(e) = self.try_get_dependencies(list) {
        debug!(error = %e, "prewarm skipped dependency list");
      }
    });
  }
}

impl ScopedCache for IncludeDependencyCache {
  fn scope(&self) -> &CacheScope {
    &self.scope
  }

  fn parent(&self) -> Option<&Arc<Self>> {
    self.parent.as_ref()
  }
}

impl PersistentCache for IncludeDependencyCache {
  fn location(&self) -> &Path {
    self.entries.location()
  }

  fn is_dirty(&self) -> bool {
    self.entries.is_dirty()
  }

  fn save(&self) -> Result<(), CacheError> {
    self.entries.save()
  }
}
