//! Deciding which actions must run.
//!
//! An action is outdated when any of these hold:
//!
//! - the command line about to produce one of its outputs differs from the
//!   recorded one,
//! - an output is missing, or is an empty object file from a compile,
//! - a prerequisite is produced by an outdated action,
//! - a prerequisite is newer than the oldest output (beyond the tolerance),
//! - its dependency list is missing, or lists a file that is missing or newer.
//!
//! Results are memoized per action in a concurrent map, so the check can be
//! driven from several rayon workers over overlapping subgraphs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use rayon::prelude::*;
use tracing::{debug, info};

use super::{ActionGraph, GraphError};
use crate::action::{ActionId, ActionKind, BuildAction};
use crate::cache::EngineCaches;
use crate::config::EngineConfig;
use crate::consts::{IMPORT_LIBRARY_EXTENSION, OBJECT_FILE_EXTENSIONS};
use crate::fs::{FileId, FileRecord};

/// Options for one outdated query.
#[derive(Debug, Clone)]
pub struct OutdatedQuery {
  pub use_action_history: bool,
  pub ignore_outdated_import_libraries: bool,
  pub skip_linking_when_nothing_to_compile: bool,
  pub timestamp_tolerance: Duration,
  pub parallel: bool,

  /// When set, only compile actions are considered and exactly the ones
  /// reading this file are outdated. History is not saved.
  pub single_file_to_compile: Option<FileId>,
}

impl From<&EngineConfig> for OutdatedQuery {
  fn from(config: &EngineConfig) -> Self {
    Self {
      use_action_history: config.use_action_history,
      ignore_outdated_import_libraries: config.ignore_outdated_import_libraries,
      skip_linking_when_nothing_to_compile: config.skip_linking_when_nothing_to_compile,
      timestamp_tolerance: config.timestamp_tolerance(),
      parallel: config.parallel_outdated_check,
      single_file_to_compile: None,
    }
  }
}

impl Default for OutdatedQuery {
  fn default() -> Self {
    Self::from(&EngineConfig::default())
  }
}

/// Result of an outdated query over a linked graph.
#[derive(Debug, Clone, Default)]
pub struct OutdatedSet {
  considered: Vec<ActionId>,
  outdated: HashSet<ActionId>,
  save_history: bool,
}

impl OutdatedSet {
  /// Actions the query looked at, in scheduling order.
  pub fn considered(&self) -> &[ActionId] {
    &self.considered
  }

  pub fn is_outdated(&self, id: ActionId) -> bool {
    self.outdated.contains(&id)
  }

  /// Outdated actions in scheduling order.
  pub fn outdated(&self) -> impl Iterator<Item = ActionId> + '_ {
    self.considered.iter().copied().filter(|id| self.outdated.contains(id))
  }

  pub fn len(&self) -> usize {
    self.outdated.len()
  }

  pub fn is_empty(&self) -> bool {
    self.outdated.is_empty()
  }

  /// False for single-file queries, whose history must not be persisted.
  pub fn save_history(&self) -> bool {
    self.save_history
  }
}

impl ActionGraph {
  /// Determines which linked actions are outdated.
  ///
  /// Fails only on an unlinked graph or a malformed dependency list; cache
  /// problems degrade to "outdated".
  pub fn outdated_actions(&self, caches: &EngineCaches, query: &OutdatedQuery) -> Result<OutdatedSet, GraphError> {
    self.ensure_linked()?;

    if let Some(file) = query.single_file_to_compile {
      return Ok(self.single_file_outdated(file));
    }

    let checker = OutdatedChecker {
      graph: self,
      caches,
      query,
      memo: DashMap::new(),
      command_line_changed: DashMap::new(),
    };

    if query.parallel {
      let lists: Vec<Arc<FileRecord>> = self
        .order
        .iter()
        .filter_map(|&id| self.actions[id.0].dependency_list_file)
        .map(|file| self.arena.get(file))
        .collect();
      caches.dependencies.prewarm(&lists);

      self
        .order
        .par_iter()
        .try_for_each(|&id| checker.is_outdated(id).map(|_| ()))?;
    } else {
      for &id in &self.order {
        checker.is_outdated(id)?;
      }
    }

    let outdated: HashSet<ActionId> = checker
      .memo
      .iter()
      .filter(|entry| *entry.value())
      .map(|entry| *entry.key())
      .collect();

    info!(outdated = outdated.len(), total = self.order.len(), "checked actions for outdatedness");
    Ok(OutdatedSet {
      considered: self.order.clone(),
      outdated,
      save_history: true,
    })
  }

  fn single_file_outdated(&self, file: FileId) -> OutdatedSet {
    let considered: Vec<ActionId> = self
      .order
      .iter()
      .copied()
      .filter(|id| self.actions[id.0].kind == ActionKind::Compile)
      .collect();
    let outdated = considered
      .iter()
      .copied()
      .filter(|id| self.actions[id.0].prerequisite_items.contains(&file))
      .collect();

    OutdatedSet {
      considered,
      outdated,
      save_history: false,
    }
  }
}

struct OutdatedChecker<'a> {
  graph: &'a ActionGraph,
  caches: &'a EngineCaches,
  query: &'a OutdatedQuery,
  memo: DashMap<ActionId, bool>,
  /// Whether each output's command line changed. The history update is not
  /// idempotent, so it must run once per output even if two workers race.
  command_line_changed: DashMap<FileId, bool>,
}

impl OutdatedChecker<'_> {
  fn is_outdated(&self, id: ActionId) -> Result<bool, GraphError> {
    if let Some(known) = self.memo.get(&id) {
      return Ok(*known);
    }

    let outdated = self.compute(id)?;
    Ok(*self.memo.entry(id).or_insert(outdated))
  }

  fn compute(&self, id: ActionId) -> Result<bool, GraphError> {
    let graph = self.graph;
    let action = &graph.actions[id.0];
    let label = &action.status_description;
    let mut outdated = false;

    // Oldest valid output; `None` when the action produces nothing valid.
    let mut last_execution: Option<SystemTime> = None;
    for &file in &action.produced_items {
      let record = graph.arena.get(file);

      if self.query.use_action_history && self.command_line_changed(file, &record, action) {
        debug!(action = %label, item = %record.location().display(), "produced by an outdated command line");
        outdated = true;
      }

      if is_valid_output(action, &record) {
        let written = record.last_write_time();
        last_execution = Some(last_execution.map_or(written, |t| t.min(written)));
      } else {
        debug!(action = %label, item = %record.location().display(), "produced item doesn't exist");
        outdated = true;
      }
    }

    if !outdated {
      for &file in &action.prerequisite_items {
        let record = graph.arena.get(file);
        let producer = graph.producer_of(file);

        if self.query.ignore_outdated_import_libraries
          && let Some(p) = producer
          && graph.actions[p.0].produces_import_library
          && record.has_extension(IMPORT_LIBRARY_EXTENSION)
        {
          continue;
        }

        if let Some(p) = producer
          && self.is_outdated(p)?
        {
          debug!(action = %label, item = %record.location().display(), "prerequisite is produced by an outdated action");
          outdated = true;
        }

        if record.exists() && self.is_newer(&record, last_execution) {
          debug!(action = %label, item = %record.location().display(), "prerequisite is newer than the last execution");
          outdated = true;
        }

        if outdated {
          break;
        }
      }
    }

    if !outdated && let Some(list) = action.dependency_list_file {
      outdated = self.dependency_list_outdated(action, &graph.arena.get(list), last_execution)?;
    }

    Ok(outdated)
  }

  fn command_line_changed(&self, file: FileId, record: &FileRecord, action: &BuildAction) -> bool {
    *self.command_line_changed.entry(file).or_insert_with(|| {
      self
        .caches
        .history
        .update_producing_command_line(record.location(), &action.command_line())
    })
  }

  fn dependency_list_outdated(
    &self,
    action: &BuildAction,
    list: &FileRecord,
    last_execution: Option<SystemTime>,
  ) -> Result<bool, GraphError> {
    let label = &action.status_description;
    let Some(dependencies) = self.caches.dependencies.try_get_dependencies(list)? else {
      debug!(action = %label, list = %list.location().display(), "dependency list doesn't exist");
      return Ok(true);
    };

    for path in dependencies {
      let dependency = self.graph.arena.record(&path);
      if !dependency.exists() {
        debug!(action = %label, item = %path.display(), "listed dependency doesn't exist");
        return Ok(true);
      }
      if self.is_newer(&dependency, last_execution) {
        debug!(action = %label, item = %path.display(), "listed dependency is newer than the last execution");
        return Ok(true);
      }
    }
    Ok(false)
  }

  fn is_newer(&self, record: &FileRecord, last_execution: Option<SystemTime>) -> bool {
    let Some(last) = last_execution else {
      return false;
    };
    record
      .last_write_time()
      .duration_since(last)
      .is_ok_and(|delta| delta > self.query.timestamp_tolerance)
  }
}

/// Outputs must exist; compiles must not leave empty object files behind.
fn is_valid_output(action: &BuildAction, record: &FileRecord) -> bool {
  if !record.exists() {
    return false;
  }
  let empty_object = action.kind == ActionKind::Compile
    && !record.is_directory()
    && record.length() == 0
    && record.has_any_extension(OBJECT_FILE_EXTENSIONS);
  !empty_object
}
