//! Types shared between the engine and executor backends.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::action::{ActionId, BuildAction};
use crate::fs::FileArena;
use crate::graph::{ActionGraph, GraphError};

/// How an executor run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorOutcome {
  /// The run was canceled by the user or the backend.
  Canceled,
  /// A tool or the backend itself terminated abnormally.
  Crashed { code: Option<i32> },
  /// A tool ran and reported errors in its input.
  CompileError { code: i32 },
  /// Anything else the backend wants to report.
  Other(String),
}

impl fmt::Display for ExecutorOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExecutorOutcome::Canceled => write!(f, "canceled"),
      ExecutorOutcome::Crashed { code: Some(code) } => write!(f, "crashed with exit code {code}"),
      ExecutorOutcome::Crashed { code: None } => write!(f, "crashed"),
      ExecutorOutcome::CompileError { code } => write!(f, "compile error (exit code {code})"),
      ExecutorOutcome::Other(message) => write!(f, "{message}"),
    }
  }
}

/// Errors that abort execution.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error("executor {executor} failed: {outcome}")]
  ExecutorFailed { executor: String, outcome: ExecutorOutcome },

  #[error("no available executor")]
  NoExecutorAvailable,

  /// A link action reported success but one of its outputs is absent.
  #[error("failed to produce item: {path}")]
  MissingBuildProduct { path: PathBuf },

  #[error("failed to {operation} {path}: {source}")]
  Io {
    operation: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Graph(#[from] GraphError),
}

/// A non-empty set of outdated actions handed to an executor, in
/// scheduling order.
pub struct ActionBatch<'a> {
  graph: &'a ActionGraph,
  actions: &'a [ActionId],
}

impl<'a> ActionBatch<'a> {
  pub(crate) fn new(graph: &'a ActionGraph, actions: &'a [ActionId]) -> Self {
    Self { graph, actions }
  }

  pub fn ids(&self) -> &'a [ActionId] {
    self.actions
  }

  pub fn iter(&self) -> impl Iterator<Item = (ActionId, &'a BuildAction)> + '_ {
    let graph = self.graph;
    self.actions.iter().map(move |&id| (id, graph.action(id)))
  }

  pub fn len(&self) -> usize {
    self.actions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.actions.is_empty()
  }

  /// Actions that must finish before `id` may start. May include actions
  /// outside the batch, which are already up to date.
  pub fn prerequisite_actions(&self, id: ActionId) -> &'a [ActionId] {
    self.graph.prerequisite_actions(id)
  }

  /// Resolves the file handles stored on actions.
  pub fn arena(&self) -> &'a FileArena {
    self.graph.arena()
  }
}

/// What happened during [`ActionGraph::execute_actions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSummary {
  /// Name of the executor that ran the batch, or `NoActionsToExecute`.
  pub executor: String,
  pub executed: usize,
}
