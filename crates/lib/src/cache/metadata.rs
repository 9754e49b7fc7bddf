//! Cheap per-source facts that are expensive to recompute across many files.
//!
//! Two facts are kept per source file, each stamped with the file's
//! modification time and invalidated independently:
//!
//! - the target of the first `#include`/`#import` directive,
//! - whether the file contains code-generation markup (`UCLASS(...)` and friends).
//!
//! The outdated check never consults this cache. It is a query API for the
//! tools that build action graphs, such as header generators deciding which
//! sources to scan.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::SystemTime;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::scope::{CacheScope, ScopedCache};
use super::store::PersistentMap;
use super::types::{CacheError, PersistentCache};
use crate::consts::{METADATA_CACHE_FILENAME, METADATA_CACHE_VERSION};
use crate::fs::FileRecord;

static INCLUDE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"^\s*#\s*(?:include|import)\s*(?:"([^"]*)"|<([^>]*)>|([A-Za-z_][A-Za-z0-9_]*))"#)
    .expect("invalid include directive regex")
});

static REFLECTION_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\bU(?:CLASS|STRUCT|ENUM|INTERFACE|DELEGATE)\b")
    .expect("invalid reflection markup regex")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stamped<T> {
  last_write_time: SystemTime,
  value: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SourceFacts {
  first_include: Option<Stamped<Option<String>>>,
  reflection_markup: Option<Stamped<bool>>,
}

#[derive(Debug)]
pub struct SourceMetadataCache {
  scope: CacheScope,
  parent: Option<Arc<SourceMetadataCache>>,
  entries: PersistentMap<PathBuf, SourceFacts>,
}

impl SourceMetadataCache {
  pub fn new(scope: CacheScope, parent: Option<Arc<SourceMetadataCache>>) -> Self {
    let location = scope.cache_dir.join(METADATA_CACHE_FILENAME);
    Self {
      scope,
      parent,
      entries: PersistentMap::new(location, METADATA_CACHE_VERSION),
    }
  }

  /// Target named by the first include or import directive, without its
  /// quotes or angle brackets. `None` if there is no such directive.
  pub fn first_include(&self, source: &FileRecord) -> Option<String> {
    let owner = self.scope_for(source.location());
    let stamp = source.last_write_time();

    if let Some(facts) = owner.entries.get(&source.location().to_path_buf())
      && let Some(cached) = facts.first_include
      && cached.last_write_time == stamp
    {
      return cached.value;
    }

    let text = read_source(source)?;
    let value = find_first_include(&text);
    owner.update(source.location(), |facts| {
      facts.first_include = Some(Stamped {
        last_write_time: stamp,
        value: value.clone(),
      });
    });
    value
  }

  /// Whether the source declares any reflected types.
  pub fn contains_reflection_markup(&self, source: &FileRecord) -> bool {
    let owner = self.scope_for(source.location());
    let stamp = source.last_write_time();

    if let Some(facts) = owner.entries.get(&source.location().to_path_buf())
      && let Some(cached) = facts.reflection_markup
      && cached.last_write_time == stamp
    {
      return cached.value;
    }

    let Some(text) = read_source(source) else {
      return false;
    };
    let value = REFLECTION_MARKUP.is_match(&text);
    owner.update(source.location(), |facts| {
      facts.reflection_markup = Some(Stamped {
        last_write_time: stamp,
        value,
      });
    });
    value
  }

  fn update(&self, file: &Path, apply: impl FnOnce(&mut SourceFacts)) {
    apply(&mut self.entries.entries().entry(file.to_path_buf()).or_default());
    self.entries.mark_dirty();
  }
}

fn read_source(source: &FileRecord) -> Option<String> {
  if !source.exists() {
    return None;
  }
  match std::fs::read(source.location()) {
    Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
    Err(e) => {
      warn!(path = %source.location().display(), error = %e, "failed to read source file");
      None
    }
  }
}

fn find_first_include(text: &str) -> Option<String> {
  text.lines().find_map(|line| {
    let caps = INCLUDE_DIRECTIVE.captures(line)?;
    (1..=3).find_map(|i| caps.get(i)).map(|m| m.as_str().to_string())
  })
}

impl ScopedCache for SourceMetadataCache {
  fn scope(&self) -> &CacheScope {
    &self.scope
  }

  fn parent(&self) -> Option<&Arc<Self>> {
    self.parent.as_ref()
  }
}

impl PersistentCache for SourceMetadataCache {
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
