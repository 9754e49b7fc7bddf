//! Path canonicalization for the intern tables.
//!
//! Canonical paths are computed lexically so that files which do not exist
//! yet (build outputs) intern to the same key they will have once written.

use std::path::{Component, Path, PathBuf};

/// Turns `path` into an absolute path with `.` and `..` components resolved.
///
/// Relative paths are resolved against the current working directory.
/// Symlinks are not followed.
pub fn normalize(path: &Path) -> PathBuf {
  let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

  let mut normalized = PathBuf::new();
  for component in absolute.components() {
    match component {
      Component::ParentDir => {
        // Never pop past the root or a drive prefix.
        if normalized.file_name().is_some() {
          normalized.pop();
        }
      }
      Component::CurDir => {}
      _ => normalized.push(component),
    }
  }

  dunce::simplified(&normalized).to_path_buf()
}

/// Returns true if `path` is `dir` or lies somewhere beneath it.
pub fn is_under_directory(path: &Path, dir: &Path) -> bool {
  path.starts_with(dir)
}

/// Case-insensitive extension check; `ext` is given without the leading dot.
pub fn has_extension(path: &Path, ext: &str) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Returns true if the path's extension matches any of `exts`, ignoring case.
pub fn has_any_extension(path: &Path, exts: &[&str]) -> bool {
  exts.iter().any(|ext| has_extension(path, ext))
}
