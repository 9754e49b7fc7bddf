//! Intern table for file and directory records.
//!
//! The arena hands out small copyable handles ([`FileId`], [`DirId`]) and
//! guarantees that every canonical path maps to exactly one record for as
//! long as the arena lives. It is shared by reference (usually as an
//! `Arc<FileArena>`) instead of living in a global.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;

use super::directory::DirectoryRecord;
use super::path::normalize;
use super::record::{FileId, FileRecord};

/// Handle to an interned [`DirectoryRecord`]: its position in the arena.
///
/// Only meaningful for the arena that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirId(pub(crate) usize);

impl DirId {
  /// Position of the record in the arena's directory table.
  pub fn index(self) -> usize {
    self.0
  }
}

/// Owns every [`FileRecord`] and [`DirectoryRecord`] of a build process.
#[derive(Debug, Default)]
pub struct FileArena {
  file_ids: DashMap<PathBuf, FileId>,
  files: RwLock<Vec<Arc<FileRecord>>>,
  dir_ids: DashMap<PathBuf, DirId>,
  dirs: RwLock<Vec<Arc<DirectoryRecord>>>,
}

impl FileArena {
  /// An empty arena.
  pub fn new() -> Self {
    Self::default()
  }

  /// Interns `path`, returning the handle of its unique record.
  pub fn file(&self, path: impl AsRef<Path>) -> FileId {
    let location = normalize(path.as_ref());
    if let Some(id) = self.file_ids.get(&location) {
      return *id;
    }

    // The entry guard serializes racing inserts for the same path.
    match self.file_ids.entry(location) {
      Entry::Occupied(entry) => *entry.get(),
      Entry::Vacant(entry) => {
        let mut files = self.files.write();
        let id = FileId(files.len());
        files.push(Arc::new(FileRecord::new(id, entry.key().clone())));
        entry.insert(id);
        id
      }
    }
  }

  /// Shorthand for `get(file(path))`.
  pub fn record(&self, path: impl AsRef<Path>) -> Arc<FileRecord> {
    self.get(self.file(path))
  }

  /// Returns the record behind `id`.
  ///
  /// # Panics
  ///
  /// Panics if `id` was issued by a different arena.
  pub fn get(&self, id: FileId) -> Arc<FileRecord> {
    Arc::clone(&self.files.read()[id.index()])
  }

  /// Looks up an already-interned path without creating a record.
  pub fn lookup(&self, path: impl AsRef<Path>) -> Option<FileId> {
    self.file_ids.get(&normalize(path.as_ref())).map(|id| *id)
  }

  /// Interns a directory path, returning the handle of its unique record.
  pub fn directory(&self, path: impl AsRef<Path>) -> DirId {
    let location = normalize(path.as_ref());
    if let Some(id) = self.dir_ids.get(&location) {
      return *id;
    }

    match self.dir_ids.entry(location) {
      Entry::Occupied(entry) => *entry.get(),
      Entry::Vacant(entry) => {
        let mut dirs = self.dirs.write();
        let id = DirId(dirs.len());
        dirs.push(Arc::new(DirectoryRecord::new(id, entry.key().clone())));
        entry.insert(id);
        id
      }
    }
  }

  /// # Panics
  ///
  /// Panics if `id` was issued by a different arena.
  pub fn get_directory(&self, id: DirId) -> Arc<DirectoryRecord> {
    Arc::clone(&self.dirs.read()[id.index()])
  }

  /// The directory containing `file`, resolved once and remembered on the record.
  pub fn parent_directory(&self, file: &FileRecord) -> Option<Arc<DirectoryRecord>> {
    if let Some(dir) = file.cached_directory() {
      return Some(self.get_directory(dir));
    }
    let parent = file.location().parent()?;
    let dir = file.set_directory(self.directory(parent));
    Some(self.get_directory(dir))
  }

  /// Number of file records interned so far.
  pub fn file_count(&self) -> usize {
    self.files.read().len()
  }

  pub fn directory_count(&self) -> usize {
    self.dirs.read().len()
  }

  /// Re-reads metadata for every listed file.
  pub fn reset_files(&self, ids: impl IntoIterator<Item = FileId>) {
    for id in ids {
      self.get(id).reset_cached_info();
    }
  }
}
