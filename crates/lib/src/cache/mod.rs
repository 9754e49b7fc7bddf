//! Persistent caches consulted by the outdated check.
//!
//! - [`CommandLineHistory`]: command line that last produced each output.
//! - [`IncludeDependencyCache`]: parsed compiler dependency lists.
//! - [`SourceMetadataCache`]: first include and reflection markup per source.
//!
//! Each cache is one instance per [`CacheScope`], chained to a parent scope
//! for files it does not own, loaded lazily from a versioned blob and written
//! back by [`CacheRegistry::save_all`] only when modified.

mod dependency;
pub mod depfile;
mod history;
mod metadata;
mod registry;
mod scope;
pub mod store;
mod types;

pub use dependency::IncludeDependencyCache;
pub use depfile::DepListError;
pub use history::{CommandLineHash, CommandLineHistory};
pub use metadata::SourceMetadataCache;
pub use registry::{CacheRegistry, EngineCaches};
pub use scope::{CacheScope, ScopedCache};
pub use types::{CacheError, PersistentCache};
