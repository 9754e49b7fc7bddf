//! Shared constants.

use std::time::Duration;

/// Application name, used for default directory names and env-var prefixes.
pub const APP_NAME: &str = "kiln";

/// File name of the command-line history blob inside a cache directory.
pub const HISTORY_FILENAME: &str = "ActionHistory.bin";

/// File name of the implicit-dependency cache blob inside a cache directory.
pub const DEPENDENCY_CACHE_FILENAME: &str = "DependencyCache.bin";

/// File name of the source metadata cache blob inside a cache directory.
pub const METADATA_CACHE_FILENAME: &str = "SourceFileCache.bin";

/// Format version of the command-line history blob.
pub const HISTORY_VERSION: u32 = 1;

/// Format version of the implicit-dependency cache blob.
pub const DEPENDENCY_CACHE_VERSION: u32 = 1;

/// Format version of the source metadata cache blob.
pub const METADATA_CACHE_VERSION: u32 = 1;

/// Slop allowed between a prerequisite's timestamp and the oldest produced
/// item before the prerequisite counts as newer (networked filesystems).
pub const DEFAULT_TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(1);

/// Executor name reported when a batch turns out to be empty.
pub const NO_ACTIONS_EXECUTOR_NAME: &str = "NoActionsToExecute";

/// Extensions of compiler byproducts that never belong in a plain dependency list.
pub const EXCLUDED_DEPENDENCY_EXTENSIONS: &[&str] = &["tlh", "tli"];

/// Extensions treated as object files for the zero-length output check.
pub const OBJECT_FILE_EXTENSIONS: &[&str] = &["o", "obj"];

/// Extension of import/interface libraries.
pub const IMPORT_LIBRARY_EXTENSION: &str = "lib";

/// Extension of the dynamic library that accompanies an import library.
pub const DYNAMIC_LIBRARY_EXTENSION: &str = "dll";

/// Extension of Makefile-rule dependency lists.
pub const MAKEFILE_DEPENDENCY_EXTENSION: &str = "d";
