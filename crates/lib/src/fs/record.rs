//! Cached metadata for a single file path.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::trace;

use super::arena::DirId;
use super::path::{has_any_extension, has_extension};

/// Handle to an interned [`FileRecord`]: its position in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub(crate) usize);

impl FileId {
  pub fn index(self) -> usize {
    self.0
  }
}

/// A snapshot of what the filesystem reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
  pub exists: bool,
  pub is_directory: bool,
  /// Byte length; zero for directories and missing files.
  pub length: u64,
  /// Last-modified time; `UNIX_EPOCH` for missing files.
  pub last_write_time: SystemTime,
  pub read_only: bool,
}

impl FileInfo {
  pub fn missing() -> Self {
    Self {
      exists: false,
      is_directory: false,
      length: 0,
      last_write_time: SystemTime::UNIX_EPOCH,
      read_only: false,
    }
  }

  pub fn from_metadata(metadata: &Metadata) -> Self {
    Self {
      exists: true,
      is_directory: metadata.is_dir(),
      length: if metadata.is_dir() { 0 } else { metadata.len() },
      last_write_time: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
      read_only: metadata.permissions().readonly(),
    }
  }

  /// Stats `path`. Any error other than "present" is reported as missing.
  pub fn read(path: &Path) -> Self {
    trace!(path = %path.display(), "stat");
    match std::fs::metadata(path) {
      Ok(metadata) => Self::from_metadata(&metadata),
      Err(_) => Self::missing(),
    }
  }
}

/// Process-lifetime record for one canonical path.
///
/// Records are only created by [`super::FileArena`], which guarantees one
/// record per canonical path. Metadata is read on first use and cached until
/// [`FileRecord::reset_cached_info`] is called.
#[derive(Debug)]
pub struct FileRecord {
  id: FileId,
  location: PathBuf,
  info: RwLock<Option<FileInfo>>,
  directory: OnceLock<DirId>,
  relative_cost: AtomicU64,
}

impl FileRecord {
  pub(crate) fn new(id: FileId, location: PathBuf) -> Self {
    Self {
      id,
      location,
      info: RwLock::new(None),
      directory: OnceLock::new(),
      relative_cost: AtomicU64::new(0),
    }
  }

  pub fn id(&self) -> FileId {
    self.id
  }

  /// Canonical absolute path.
  pub fn location(&self) -> &Path {
    &self.location
  }

  pub fn file_name(&self) -> Option<&str> {
    self.location.file_name().and_then(|n| n.to_str())
  }

  pub fn has_extension(&self, ext: &str) -> bool {
    has_extension(&self.location, ext)
  }

  pub fn has_any_extension(&self, exts: &[&str]) -> bool {
    has_any_extension(&self.location, exts)
  }

  /// Cached metadata, reading it from disk on first access.
  pub fn info(&self) -> FileInfo {
    if let Some(info) = *self.info.read() {
      return info;
    }

    let mut slot = self.info.write();
    // Another reader may have filled the slot while we waited for the lock.
    *slot.get_or_insert_with(|| FileInfo::read(&self.location))
  }

  pub fn exists(&self) -> bool {
    self.info().exists
  }

  pub fn is_directory(&self) -> bool {
    self.info().is_directory
  }

  pub fn length(&self) -> u64 {
    self.info().length
  }

  pub fn last_write_time(&self) -> SystemTime {
    self.info().last_write_time
  }

  /// Re-reads the metadata from disk.
  ///
  /// Must be called after anything writes to this path; readers holding an
  /// older [`FileInfo`] copy are not notified.
  pub fn reset_cached_info(&self) {
    *self.info.write() = Some(FileInfo::read(&self.location));
  }

  /// Seeds the cache with metadata gathered elsewhere (directory enumeration).
  /// Has no effect if metadata was already cached.
  pub(crate) fn prime_info(&self, info: FileInfo) {
    let mut slot = self.info.write();
    if slot.is_none() {
      *slot = Some(info);
    }
  }

  /// Deletes the file if present and refreshes the cached metadata.
  pub fn delete(&self) -> io::Result<()> {
    let result = match std::fs::remove_file(&self.location) {
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      other => other,
    };
    self.reset_cached_info();
    result
  }

  /// Hint supplied by the planning layer about how expensive this file is to produce.
  pub fn relative_cost(&self) -> u64 {
    self.relative_cost.load(Ordering::Relaxed)
  }

  pub fn set_relative_cost(&self, cost: u64) {
    self.relative_cost.store(cost, Ordering::Relaxed);
  }

  pub(crate) fn cached_directory(&self) -> Option<DirId> {
    self.directory.get().copied()
  }

  pub(crate) fn set_directory(&self, dir: DirId) -> DirId {
    *self.directory.get_or_init(|| dir)
  }
}
