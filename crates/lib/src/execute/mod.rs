//! Handing outdated actions to an executor backend.
//!
//! The flow for one build is:
//! 1. [`ActionGraph::get_actions_to_execute`] runs the outdated check,
//!    deletes stale "delete-first" items, saves the command-line history,
//!    creates output directories and narrows the result to the required,
//!    runnable actions.
//! 2. [`ActionGraph::execute_actions`] picks an executor, runs the batch,
//!    refreshes cached metadata for everything the batch produced and
//!    verifies that link steps left their outputs behind.

mod session;
mod types;

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::action::{ActionId, ActionKind};
use crate::cache::{EngineCaches, PersistentCache, ScopedCache};
use crate::consts::{DYNAMIC_LIBRARY_EXTENSION, IMPORT_LIBRARY_EXTENSION, NO_ACTIONS_EXECUTOR_NAME};
use crate::graph::{ActionGraph, OutdatedQuery, OutdatedSet};

pub use session::BuildSession;
pub use types::{ActionBatch, ExecuteError, ExecutionSummary, ExecutorOutcome};

/// A backend that physically runs actions.
///
/// `execute_actions` blocks until the batch is done. Backends own any
/// parallelism, cancellation and timeout policy and report only the outcome.
pub trait Executor: Send + Sync {
  fn name(&self) -> &str;

  /// Whether the backend can run on this machine right now.
  fn is_available(&self) -> bool {
    true
  }

  fn execute_actions(&self, batch: &ActionBatch<'_>, verbose: bool) -> Result<(), ExecutorOutcome>;
}

/// The first available executor, in caller preference order.
pub fn select_executor<'a>(executors: &'a [Box<dyn Executor>]) -> Option<&'a dyn Executor> {
  executors.iter().map(Box::as_ref).find(|e| e.is_available())
}

impl ActionGraph {
  /// Outdated actions that are required and runnable, in scheduling order.
  ///
  /// `required` is typically [`ActionGraph::gather_prerequisite_actions`] for
  /// the requested outputs.
  pub fn get_actions_to_execute(
    &self,
    required: &[ActionId],
    caches: &EngineCaches,
    query: &OutdatedQuery,
  ) -> Result<Vec<ActionId>, ExecuteError> {
    let outdated = self.outdated_actions(caches, query)?;
    self.prepare_outdated(&outdated, caches)?;

    let required: HashSet<ActionId> = required.iter().copied().collect();
    let mut batch: Vec<ActionId> = outdated
      .outdated()
      .filter(|id| required.contains(id) && self.action(*id).has_command())
      .collect();

    if query.skip_linking_when_nothing_to_compile {
      batch = self.skip_unneeded_links(batch);
    }

    info!(outdated = outdated.len(), to_execute = batch.len(), "selected actions to execute");
    Ok(batch)
  }

  /// Deletes the "delete-first" items of outdated actions, saves the
  /// command-line history, then creates missing output directories.
  ///
  /// The saved history never describes deleted products.
  pub fn prepare_outdated(&self, outdated: &OutdatedSet, caches: &EngineCaches) -> Result<(), ExecuteError> {
    for id in outdated.outdated() {
      for &file in &self.action(id).delete_items {
        let record = self.arena().get(file);
        if record.exists() {
          debug!(path = %record.location().display(), "deleting outdated item");
          record.delete().map_err(|source| ExecuteError::Io {
            operation: "delete",
            path: record.location().to_path_buf(),
            source,
          })?;
        }
      }
    }

    if outdated.save_history() {
      let mut history = Some(&caches.history);
      while let Some(level) = history {
        if let Err(e) = level.save() {
          warn!(path = %level.location().display(), error = %e, "failed to save action history");
        }
        history = level.parent();
      }
    }

    for id in outdated.outdated() {
      for &file in &self.action(id).produced_items {
        let record = self.arena().get(file);
        if let Some(dir) = self.arena().parent_directory(&record)
          && !dir.exists()
        {
          debug!(path = %dir.location().display(), "creating directory for produced item");
          dir.create().map_err(|source| ExecuteError::Io {
            operation: "create directory",
            path: dir.location().to_path_buf(),
            source,
          })?;
        }
      }
    }
    Ok(())
  }

  /// Drops link actions that have no freshly compiled inputs, re-adding any
  /// whose products another scheduled link consumes.
  fn skip_unneeded_links(&self, batch: Vec<ActionId>) -> Vec<ActionId> {
    let compiled: HashSet<_> = batch
      .iter()
      .filter(|id| self.action(**id).kind == ActionKind::Compile)
      .flat_map(|id| self.action(*id).produced_items.iter().copied())
      .collect();

    let mut unlinked: HashSet<ActionId> = batch
      .iter()
      .copied()
      .filter(|&id| {
        let action = self.action(id);
        action.kind == ActionKind::Link && !action.prerequisite_items.iter().any(|f| compiled.contains(f))
      })
      .collect();
    let mut scheduled: HashSet<ActionId> = batch.iter().copied().filter(|id| !unlinked.contains(id)).collect();

    while !unlinked.is_empty() {
      let consumed: HashSet<ActionId> = scheduled
        .iter()
        .filter(|id| self.action(**id).kind == ActionKind::Link)
        .flat_map(|id| self.prerequisite_actions(*id).iter().copied())
        .collect();

      let mut readd: HashSet<ActionId> = unlinked.iter().copied().filter(|id| consumed.contains(id)).collect();

      // A rebuilt import library refers to its DLL, so that must exist too.
      let dlls: HashSet<String> = readd
        .iter()
        .flat_map(|id| self.action(*id).produced_items.iter())
        .map(|&file| self.arena().get(file))
        .filter(|record| record.has_extension(IMPORT_LIBRARY_EXTENSION))
        .filter_map(|record| {
          let stem = record.location().file_stem()?.to_str()?;
          Some(format!("{stem}.{DYNAMIC_LIBRARY_EXTENSION}").to_lowercase())
        })
        .collect();
      readd.extend(unlinked.iter().copied().filter(|&id| {
        self.action(id).produced_items.iter().any(|&file| {
          let record = self.arena().get(file);
          record.file_name().is_some_and(|name| dlls.contains(&name.to_lowercase()))
        })
      }));

      if readd.is_empty() {
        break;
      }
      unlinked.retain(|id| !readd.contains(id));
      scheduled.extend(readd);
    }

    // Drop anything that only consumes products of skipped links.
    scheduled.retain(|&id| {
      let action = self.action(id);
      action.prerequisite_items.is_empty()
        || !action
          .prerequisite_items
          .iter()
          .all(|&file| self.producer_of(file).is_some_and(|p| unlinked.contains(&p)))
    });

    if !unlinked.is_empty() {
      info!(skipped = unlinked.len(), "skipping link actions with nothing to compile");
    }
    batch.into_iter().filter(|id| scheduled.contains(id)).collect()
  }

  /// Runs `batch` on the first available executor and verifies the results.
  ///
  /// Cached metadata of every produced file is refreshed whether or not
  /// the executor succeeded.
  pub fn execute_actions(
    &self,
    batch: &[ActionId],
    executors: &[Box<dyn Executor>],
    verbose: bool,
  ) -> Result<ExecutionSummary, ExecuteError> {
    if batch.is_empty() {
      info!("target is up to date");
      return Ok(ExecutionSummary {
        executor: NO_ACTIONS_EXECUTOR_NAME.to_string(),
        executed: 0,
      });
    }

    let executor = select_executor(executors).ok_or(ExecuteError::NoExecutorAvailable)?;
    info!(executor = executor.name(), actions = batch.len(), "executing actions");

    let result = executor.execute_actions(&ActionBatch::new(self, batch), verbose);
    self.reset_produced_items(batch);

    if let Err(outcome) = result {
      return Err(ExecuteError::ExecutorFailed {
        executor: executor.name().to_string(),
        outcome,
      });
    }

    self.verify_link_outputs(batch)?;
    Ok(ExecutionSummary {
      executor: executor.name().to_string(),
      executed: batch.len(),
    })
  }

  fn reset_produced_items(&self, batch: &[ActionId]) {
    let arena = self.arena();
    for &id in batch {
      for &file in &self.action(id).produced_items {
        let record = arena.get(file);
        record.reset_cached_info();
        if let Some(dir) = arena.parent_directory(&record) {
          dir.reset_cached_info();
        }
      }
    }
  }

  fn verify_link_outputs(&self, batch: &[ActionId]) -> Result<(), ExecuteError> {
    for &id in batch {
      let action = self.action(id);
      if action.kind != ActionKind::Link {
        continue;
      }
      for &file in &action.produced_items {
        let record = self.arena().get(file);
        if !record.exists() {
          return Err(ExecuteError::MissingBuildProduct {
            path: record.location().to_path_buf(),
          });
        }
      }
    }
    Ok(())
  }
}
