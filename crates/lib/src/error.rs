//! Crate-wide error type.
//!
//! Each module reports its own error enum; `KilnError` lets a driver that
//! strings several phases together propagate any of them with `?`.

use thiserror::Error;

use crate::cache::{CacheError, DepListError};
use crate::config::ConfigError;
use crate::execute::ExecuteError;
use crate::graph::GraphError;

#[derive(Debug, Error)]
pub enum KilnError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error(transparent)]
  DependencyList(#[from] DepListError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),
}

impl KilnError {
  /// True when the failure came from the executor rather than the engine.
  pub fn is_executor_failure(&self) -> bool {
    matches!(self, KilnError::Execute(ExecuteError::ExecutorFailed { .. }))
  }
}
