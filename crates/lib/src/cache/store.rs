//! Versioned binary blobs backing the persistent caches.
//!
//! On-disk layout: a little-endian `u32` format version followed by a
//! bincode-encoded list of entries. Blobs are written to a temporary file in
//! the target directory and renamed into place, so a reader never sees a
//! partial write.

use std::collections::HashMap;
use std::hash::Hash;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::types::CacheError;

const HEADER_LEN: usize = 4;

pub fn encode<T: Serialize>(version: u32, value: &T) -> Result<Vec<u8>, CacheError> {
  let payload = bincode::serde::encode_to_vec(value, bincode::config::standard())
    .map_err(|e| CacheError::Serialization { reason: e.to_string() })?;

  let mut output = Vec::with_capacity(HEADER_LEN + payload.len());
  output.extend_from_slice(&version.to_le_bytes());
  output.extend_from_slice(&payload);
  Ok(output)
}

pub fn decode<T: DeserializeOwned>(path: &Path, version: u32, raw: &[u8]) -> Result<T, CacheError> {
  let Some((header, payload)) = raw.split_first_chunk::<HEADER_LEN>() else {
    return Err(CacheError::Serialization {
      reason: format!("{} is too short to hold a version header", path.display()),
    });
  };

  let actual = u32::from_le_bytes(*header);
  if actual != version {
    return Err(CacheError::VersionMismatch {
      path: path.to_path_buf(),
      expected: version,
      actual,
    });
  }

  let (value, _) = bincode::serde::decode_from_slice(payload, bincode::config::standard())
    .map_err(|e| CacheError::Serialization { reason: e.to_string() })?;
  Ok(value)
}

/// Reads and decodes a blob. A missing file is `Ok(None)`.
pub fn read<T: DeserializeOwned>(path: &Path, version: u32) -> Result<Option<T>, CacheError> {
  let raw = match std::fs::read(path) {
    Ok(raw) => raw,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(CacheError::Io {
        path: path.to_path_buf(),
        source,
      });
    }
  };
  decode(path, version, &raw).map(Some)
}

/// Encodes `value` and atomically replaces the blob at `path`.
pub fn write<T: Serialize>(path: &Path, version: u32, value: &T) -> Result<(), CacheError> {
  let bytes = encode(version, value)?;
  let io_err = |source| CacheError::Io {
    path: path.to_path_buf(),
    source,
  };

  let dir = path.parent().unwrap_or_else(|| Path::new("."));
  std::fs::create_dir_all(dir).map_err(io_err)?;

  let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
  temp.write_all(&bytes).map_err(io_err)?;
  temp.as_file().sync_all().map_err(io_err)?;
  temp.persist(path).map_err(|e| io_err(e.error))?;
  Ok(())
}

/// A concurrent map loaded from a blob on first access and written back
/// only when modified.
///
/// Load failures are not fatal: a version mismatch is logged at debug level,
/// anything else as a warning, and the map starts out empty.
#[derive(Debug)]
pub struct PersistentMap<K: Eq + Hash, V> {
  location: PathBuf,
  version: u32,
  entries: OnceLock<DashMap<K, V>>,
  dirty: AtomicBool,
}

impl<K, V> PersistentMap<K, V>
where
  K: Eq + Hash + Clone + Serialize + DeserializeOwned,
  V: Clone + Serialize + DeserializeOwned,
{
  pub fn new(location: PathBuf, version: u32) -> Self {
    Self {
      location,
      version,
      entries: OnceLock::new(),
      dirty: AtomicBool::new(false),
    }
  }

  pub fn location(&self) -> &Path {
    &self.location
  }

  pub fn entries(&self) -> &DashMap<K, V> {
    self.entries.get_or_init(|| self.load())
  }

  pub fn get(&self, key: &K) -> Option<V> {
    self.entries().get(key).map(|v| v.value().clone())
  }

  pub fn insert(&self, key: K, value: V) {
    self.entries().insert(key, value);
    self.mark_dirty();
  }

  pub fn mark_dirty(&self) {
    self.dirty.store(true, Ordering::Release);
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty.load(Ordering::Acquire)
  }

  /// Writes the map if it changed since the last load or save.
  pub fn save(&self) -> Result<(), CacheError> {
    if !self.dirty.swap(false, Ordering::AcqRel) {
      return Ok(());
    }

    let snapshot: HashMap<K, V> = self
      .entries()
      .iter()
      .map(|e| (e.key().clone(), e.value().clone()))
      .collect();

    let result = write(&self.location, self.version, &snapshot);
    if result.is_err() {
      self.mark_dirty();
    }
    result
  }

  fn load(&self) -> DashMap<K, V> {
    match read::<HashMap<K, V>>(&self.location, self.version) {
      Ok(Some(map)) => {
        debug!(path = %self.location.display(), entries = map.len(), "loaded cache");
        map.into_iter().collect()
      }
      Ok(None) => DashMap::new(),
      Err(e @ CacheError::VersionMismatch { .. }) => {
        debug!(error = %e, "discarding cache");
        DashMap::new()
      }
      Err(e) => {
        warn!(error = %e, "failed to load cache, starting empty");
        DashMap::new()
      }
    }
  }
}
