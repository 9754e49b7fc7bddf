//! Error types for graph construction and the outdated check.

use std::path::PathBuf;

use thiserror::Error;

use crate::action::ActionId;
use crate::cache::DepListError;

#[derive(Debug, Error)]
pub enum GraphError {
  /// Some actions transitively depend on their own outputs.
  #[error("action graph contains a cycle:\n\n{description}")]
  Cycle { description: String, actions: Vec<ActionId> },

  /// Two actions that are not equivalent claim the same output.
  #[error("conflicting actions produce {path}:\n  {first}\n  {second}")]
  ConflictingOutputs { path: PathBuf, first: String, second: String },

  #[error("unknown action {0}")]
  UnknownAction(ActionId),

  #[error("action graph must be linked before it can be queried")]
  NotLinked,

  /// A compiler dependency list could not be parsed.
  #[error(transparent)]
  DependencyList(#[from] DepListError),
}
