//! Command lines that produced each output file.
//!
//! An output is stale when the command about to produce it differs from the
//! one that produced it last time, even if every input is older than it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::scope::{CacheScope, ScopedCache};
use super::store::PersistentMap;
use super::types::{CacheError, PersistentCache};
use crate::consts::{HISTORY_FILENAME, HISTORY_VERSION};

/// SHA-256 of the upper-cased command line, so comparisons ignore letter case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandLineHash(pub [u8; 32]);

impl CommandLineHash {
  pub fn of(command_line: &str) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(command_line.to_uppercase().as_bytes());
    Self(hasher.finalize().into())
  }
}

impl fmt::Display for CommandLineHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", hex::encode(self.0))
  }
}

#[derive(Debug)]
pub struct CommandLineHistory {
  scope: CacheScope,
  parent: Option<Arc<CommandLineHistory>>,
  entries: PersistentMap<PathBuf, CommandLineHash>,
}

impl CommandLineHistory {
  pub fn new(scope: CacheScope, parent: Option<Arc<CommandLineHistory>>) -> Self {
    let location = scope.cache_dir.join(HISTORY_FILENAME);
    Self {
      scope,
      parent,
      entries: PersistentMap::new(location, HISTORY_VERSION),
    }
  }

  /// Hash of the command line that last produced `file`, if recorded.
  pub fn producing_command_line(&self, file: &Path) -> Option<CommandLineHash> {
    self.scope_for(file).entries.get(&file.to_path_buf())
  }

  /// Records `command_line` as the producer of `file`.
  ///
  /// Returns true if the stored hash was missing or different, which is
  /// exactly the "command line changed" signal for outdatedness.
  pub fn update_producing_command_line(&self, file: &Path, command_line: &str) -> bool {
    let owner = self.scope_for(file);
    let hash = CommandLineHash::of(command_line);

    let changed = match owner.entries.entries().entry(file.to_path_buf()) {
      Entry::Occupied(entry) if *entry.get() == hash => false,
      Entry::Occupied(mut entry) => {
        entry.insert(hash);
        true
      }
      Entry::Vacant(entry) => {
        entry.insert(hash);
        true
      }
    };

    if changed {
      owner.entries.mark_dirty();
    }
    changed
  }
}

impl ScopedCache for CommandLineHistory {
  fn scope(&self) -> &CacheScope {
    &self.scope
  }

  fn parent(&self) -> Option<&Arc<Self>> {
    self.parent.as_ref()
  }
}

impl PersistentCache for CommandLineHistory {
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
