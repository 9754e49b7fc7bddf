//! One build, start to finish.
//!
//! 1. Link the graph (if it changed since the last link)
//! 2. Narrow to the actions needed for the requested outputs
//! 3. Determine which of those are outdated and prepare for them
//! 4. Hand the batch to an executor and verify the results
//! 5. Persist every dirty cache, whether or not the build succeeded

use std::path::Path;

use tracing::info;

use super::{ExecutionSummary, Executor};
use crate::cache::{CacheRegistry, CacheScope, EngineCaches};
use crate::config::EngineConfig;
use crate::error::KilnError;
use crate::fs::FileId;
use crate::graph::{ActionGraph, OutdatedQuery};

/// Config and caches shared by every build in a process.
pub struct BuildSession {
  config: EngineConfig,
  registry: CacheRegistry,
  caches: EngineCaches,
}

impl BuildSession {
  /// Opens the caches for `project_dir`. `scopes` run from general to
  /// specific; files outside all of them use the configured cache directory.
  pub fn open(config: EngineConfig, project_dir: &Path, scopes: &[CacheScope]) -> Self {
    let root = CacheScope::new(project_dir, config.cache_dir());
    let registry = CacheRegistry::new();
    let caches = registry.open_chain(&root, scopes);
    info!(cache_dir = %root.cache_dir.display(), scopes = scopes.len(), "opened build session");
    Self {
      config,
      registry,
      caches,
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn caches(&self) -> &EngineCaches {
    &self.caches
  }

  /// Brings `outputs` up to date.
  pub fn build(
    &self,
    graph: &mut ActionGraph,
    outputs: &[FileId],
    executors: &[Box<dyn Executor>],
  ) -> Result<ExecutionSummary, KilnError> {
    let result = self.run(graph, outputs, executors, OutdatedQuery::from(&self.config));
    self.registry.save_all();
    result
  }

  /// Compiles just the actions reading `source`. History is left untouched.
  pub fn compile_single_file(
    &self,
    graph: &mut ActionGraph,
    source: FileId,
    executors: &[Box<dyn Executor>],
  ) -> Result<ExecutionSummary, KilnError> {
    let query = OutdatedQuery {
      single_file_to_compile: Some(source),
      ..OutdatedQuery::from(&self.config)
    };
    let produced: Vec<FileId> = graph
      .actions()
      .filter(|(_, action)| action.prerequisite_items.contains(&source))
      .flat_map(|(_, action)| action.produced_items.iter().copied())
      .collect();
    self.run(graph, &produced, executors, query)
  }

  fn run(
    &self,
    graph: &mut ActionGraph,
    outputs: &[FileId],
    executors: &[Box<dyn Executor>],
    query: OutdatedQuery,
  ) -> Result<ExecutionSummary, KilnError> {
    if !graph.is_linked() {
      graph.link()?;
    }

    let required = graph.gather_prerequisite_actions(outputs.iter().copied());
    let batch = graph.get_actions_to_execute(&required, &self.caches, &query)?;
    let summary = graph.execute_actions(&batch, executors, self.config.log_detailed_action_stats)?;

    info!(executor = %summary.executor, executed = summary.executed, "build complete");
    Ok(summary)
  }
}
