//! Cached directory listings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::arena::{DirId, FileArena};
use super::record::{FileId, FileInfo};

#[derive(Debug, Default)]
struct Children {
  files: HashMap<String, FileId>,
  directories: HashMap<String, DirId>,
}

/// Process-lifetime record for one canonical directory path.
///
/// Child maps are populated on first query and kept until [`DirectoryRecord::reset_cached_info`].
/// Queries take the owning arena so children can be interned as records.
#[derive(Debug)]
pub struct DirectoryRecord {
  id: DirId,
  location: PathBuf,
  info: RwLock<Option<FileInfo>>,
  children: RwLock<Option<Arc<Children>>>,
}

impl DirectoryRecord {
  pub(crate) fn new(id: DirId, location: PathBuf) -> Self {
    Self {
      id,
      location,
      info: RwLock::new(None),
      children: RwLock::new(None),
    }
  }

  pub fn id(&self) -> DirId {
    self.id
  }

  pub fn location(&self) -> &Path {
    &self.location
  }

  pub fn exists(&self) -> bool {
    if let Some(info) = *self.info.read() {
      return info.exists && info.is_directory;
    }
    let info = *self.info.write().get_or_insert_with(|| FileInfo::read(&self.location));
    info.exists && info.is_directory
  }

  /// Creates the directory (and parents) if it is missing.
  pub fn create(&self) -> std::io::Result<()> {
    if !self.exists() {
      std::fs::create_dir_all(&self.location)?;
      self.reset_cached_info();
    }
    Ok(())
  }

  /// Drops the cached listing and re-reads existence.
  pub fn reset_cached_info(&self) {
    *self.info.write() = Some(FileInfo::read(&self.location));
    *self.children.write() = None;
  }

  pub fn contains_file(&self, arena: &FileArena, name: &str) -> bool {
    self.children(arena).files.contains_key(name)
  }

  pub fn get_file(&self, arena: &FileArena, name: &str) -> Option<FileId> {
    self.children(arena).files.get(name).copied()
  }

  pub fn get_directory(&self, arena: &FileArena, name: &str) -> Option<DirId> {
    self.children(arena).directories.get(name).copied()
  }

  pub fn enumerate_files(&self, arena: &FileArena) -> Vec<FileId> {
    let mut files: Vec<FileId> = self.children(arena).files.values().copied().collect();
    files.sort();
    files
  }

  pub fn enumerate_directories(&self, arena: &FileArena) -> Vec<DirId> {
    let mut dirs: Vec<DirId> = self.children(arena).directories.values().copied().collect();
    dirs.sort();
    dirs
  }

  fn children(&self, arena: &FileArena) -> Arc<Children> {
    if let Some(children) = self.children.read().as_ref() {
      return Arc::clone(children);
    }

    // Listing happens outside the lock; a racing thread's listing is equivalent.
    let listed = Arc::new(self.list(arena));
    let mut slot = self.children.write();
    Arc::clone(slot.get_or_insert(listed))
  }

  fn list(&self, arena: &FileArena) -> Children {
    trace!(path = %self.location.display(), "enumerate directory");
    let mut children = Children::default();
    let Ok(entries) = std::fs::read_dir(&self.location) else {
      return children;
    };

    for entry in entries.flatten() {
      let name = entry.file_name().to_string_lossy().into_owned();
      let Ok(metadata) = entry.metadata() else {
        continue;
      };
      if metadata.is_dir() {
        children.directories.insert(name, arena.directory(entry.path()));
      } else {
        let id = arena.file(entry.path());
        arena.get(id).prime_info(FileInfo::from_metadata(&metadata));
        children.files.insert(name, id);
      }
    }
    children
  }
}
