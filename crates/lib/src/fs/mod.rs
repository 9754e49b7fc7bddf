//! Filesystem metadata cache.
//!
//! One record per canonical path, interned in a [`FileArena`]. Records read
//! their metadata lazily and keep it until explicitly reset, so callers that
//! write to tracked paths must reset the affected records themselves.

mod arena;
mod directory;
pub mod path;
mod record;

pub use arena::{DirId, FileArena};
pub use directory::DirectoryRecord;
pub use record::{FileId, FileInfo, FileRecord};
