//! Engine configuration.
//!
//! Settings come from an optional JSON file and can be overridden by
//! environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `KILN_USE_ACTION_HISTORY` | `use_action_history` |
//! | `KILN_IGNORE_OUTDATED_IMPORT_LIBRARIES` | `ignore_outdated_import_libraries` |
//! | `KILN_SKIP_LINKING` | `skip_linking_when_nothing_to_compile` |
//! | `KILN_LOG_DETAILED_ACTION_STATS` | `log_detailed_action_stats` |
//! | `KILN_CACHE_DIR` | `cache_dir` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::APP_NAME;

pub const ENV_USE_ACTION_HISTORY: &str = "KILN_USE_ACTION_HISTORY";
pub const ENV_IGNORE_OUTDATED_IMPORT_LIBRARIES: &str = "KILN_IGNORE_OUTDATED_IMPORT_LIBRARIES";
pub const ENV_SKIP_LINKING: &str = "KILN_SKIP_LINKING";
pub const ENV_LOG_DETAILED_ACTION_STATS: &str = "KILN_LOG_DETAILED_ACTION_STATS";
pub const ENV_CACHE_DIR: &str = "KILN_CACHE_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid value for {var}: {value:?} (expected 1, 0, true or false)")]
  InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Treat a changed command line as making an output stale.
  pub use_action_history: bool,

  /// Let dependents ignore a stale import library when nothing else of the
  /// producing action changed for them. May under-rebuild if a library's ABI
  /// changes without a header change.
  pub ignore_outdated_import_libraries: bool,

  /// Drop link actions that have no freshly compiled inputs.
  pub skip_linking_when_nothing_to_compile: bool,

  /// Slack, in seconds, before a prerequisite counts as newer than an output.
  pub timestamp_tolerance_secs: u64,

  /// Passed to the executor as its verbosity flag.
  pub log_detailed_action_stats: bool,

  /// Run the outdated check on the rayon pool.
  pub parallel_outdated_check: bool,

  /// Where cache blobs live when no scope overrides it.
  pub cache_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      use_action_history: true,
      ignore_outdated_import_libraries: false,
      skip_linking_when_nothing_to_compile: false,
      timestamp_tolerance_secs: 1,
      log_detailed_action_stats: false,
      parallel_outdated_check: true,
      cache_dir: None,
    }
  }
}

impl EngineConfig {
  /// Reads `path` (if given) and applies environment overrides.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match path {
      Some(path) => {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
          path: path.to_path_buf(),
          source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
          path: path.to_path_buf(),
          source,
        })?
      }
      None => Self::default(),
    };

    config.apply_env()?;
    debug!(?config, "loaded engine config");
    Ok(config)
  }

  fn apply_env(&mut self) -> Result<(), ConfigError> {
    let flags = [
      (ENV_USE_ACTION_HISTORY, &mut self.use_action_history),
      (ENV_IGNORE_OUTDATED_IMPORT_LIBRARIES, &mut self.ignore_outdated_import_libraries),
      (ENV_SKIP_LINKING, &mut self.skip_linking_when_nothing_to_compile),
      (ENV_LOG_DETAILED_ACTION_STATS, &mut self.log_detailed_action_stats),
    ];

    for (var, field) in flags {
      if let Ok(value) = std::env::var(var) {
        *field = parse_flag(var, &value)?;
      }
    }

    if let Ok(dir) = std::env::var(ENV_CACHE_DIR)
      && !dir.is_empty()
    {
      self.cache_dir = Some(PathBuf::from(dir));
    }
    Ok(())
  }

  pub fn timestamp_tolerance(&self) -> Duration {
    Duration::from_secs(self.timestamp_tolerance_secs)
  }

  /// Configured cache directory, or the platform default.
  pub fn cache_dir(&self) -> PathBuf {
    self.cache_dir.clone().unwrap_or_else(default_cache_dir)
  }
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
  match value.trim().to_ascii_lowercase().as_str() {
    "1" | "true" => Ok(true),
    "0" | "false" => Ok(false),
    _ => Err(ConfigError::InvalidEnv {
      var,
      value: value.to_string(),
    }),
  }
}

/// Platform cache directory for the application.
#[cfg(windows)]
pub fn default_cache_dir() -> PathBuf {
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
    .join(APP_NAME)
    .join("Cache")
}

/// Platform cache directory for the application.
#[cfg(not(windows))]
pub fn default_cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".cache")))
    .unwrap_or_else(|_| std::env::temp_dir());
  cache_home.join(APP_NAME)
}
