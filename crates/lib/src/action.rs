//! Build actions: one unit of work with declared inputs and outputs.
//!
//! Actions refer to files by [`FileId`] handle and never point back at the
//! graph that owns them. The scheduling fields are filled in by
//! [`crate::graph::ActionGraph::link`].

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::fs::FileId;

/// What kind of step an action performs. The set is open; anything the
/// engine does not special-case goes in [`ActionKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
  Compile,
  Link,
  GenerateMetadata,
  PostStep,
  Other(String),
}

impl fmt::Display for ActionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ActionKind::Compile => write!(f, "compile"),
      ActionKind::Link => write!(f, "link"),
      ActionKind::GenerateMetadata => write!(f, "generate-metadata"),
      ActionKind::PostStep => write!(f, "post-step"),
      ActionKind::Other(name) => write!(f, "{name}"),
    }
  }
}

/// Stable index of an action inside its [`crate::graph::ActionGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(pub(crate) usize);

impl ActionId {
  /// Position of the action in insertion order.
  pub fn index(self) -> usize {
    self.0
  }
}

impl fmt::Display for ActionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// One step of a build: a command that turns prerequisite files into
/// produced files.
///
/// Built with [`BuildAction::new`] and the `with_*`/item methods, then handed
/// to [`crate::graph::ActionGraph::add`].
#[derive(Debug, Clone)]
pub struct BuildAction {
  pub kind: ActionKind,

  /// Input files, in declaration order, without duplicates.
  pub prerequisite_items: Vec<FileId>,

  /// Output files, in declaration order, without duplicates.
  pub produced_items: Vec<FileId>,

  /// Files removed before the action runs, when it is outdated.
  pub delete_items: Vec<FileId>,

  /// Directory the command runs in; empty means the executor's default.
  pub working_directory: PathBuf,
  /// Program to run. Empty for bookkeeping actions that are never executed.
  pub command_path: String,
  pub command_arguments: String,
  /// Longer human-readable description, e.g. for build logs.
  pub command_description: String,

  /// Short label shown while the action runs, usually the primary input's file name.
  pub status_description: String,

  /// Set when one of the outputs is an import library whose staleness may be
  /// ignored by dependents (see `ignore_outdated_import_libraries`).
  pub produces_import_library: bool,

  /// Compiler-emitted list of implicit inputs discovered on a previous run.
  pub dependency_list_file: Option<FileId>,

  pub(crate) num_total_dependent_actions: usize,
  pub(crate) relative_cost: u64,
}

impl BuildAction {
  /// An action of `kind` with no command and no items.
  pub fn new(kind: ActionKind) -> Self {
    Self {
      kind,
      prerequisite_items: Vec::new(),
      produced_items: Vec::new(),
      delete_items: Vec::new(),
      working_directory: PathBuf::new(),
      command_path: String::new(),
      command_arguments: String::new(),
      command_description: String::new(),
      status_description: "...".to_string(),
      produces_import_library: false,
      dependency_list_file: None,
      num_total_dependent_actions: 0,
      relative_cost: 0,
    }
  }

  /// Sets the program and its argument string.
  pub fn with_command(mut self, path: impl Into<String>, arguments: impl Into<String>) -> Self {
    self.command_path = path.into();
    self.command_arguments = arguments.into();
    self
  }

  /// Sets the label shown while the action runs.
  pub fn with_status(mut self, status: impl Into<String>) -> Self {
    self.status_description = status.into();
    self
  }

  pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
    self.working_directory = dir.into();
    self
  }

  /// Names the file the compiler writes implicit dependencies to.
  pub fn with_dependency_list(mut self, file: FileId) -> Self {
    self.dependency_list_file = Some(file);
    self
  }

  /// Marks one of the outputs as an import library.
  pub fn producing_import_library(mut self) -> Self {
    self.produces_import_library = true;
    self
  }

  /// Appends an input unless it is already listed.
  pub fn add_prerequisite(&mut self, file: FileId) -> &mut Self {
    push_unique(&mut self.prerequisite_items, file);
    self
  }

  /// Appends an output unless it is already listed.
  pub fn add_produced(&mut self, file: FileId) -> &mut Self {
    push_unique(&mut self.produced_items, file);
    self
  }

  /// Appends a file to delete before running unless it is already listed.
  pub fn add_delete(&mut self, file: FileId) -> &mut Self {
    push_unique(&mut self.delete_items, file);
    self
  }

  /// Builder form of [`Self::add_prerequisite`] for several files.
  pub fn prerequisites(mut self, files: impl IntoIterator<Item = FileId>) -> Self {
    for file in files {
      self.add_prerequisite(file);
    }
    self
  }

  /// Builder form of [`Self::add_produced`] for several files.
  pub fn produces(mut self, files: impl IntoIterator<Item = FileId>) -> Self {
    for file in files {
      self.add_produced(file);
    }
    self
  }

  /// Builder form of [`Self::add_delete`] for several files.
  pub fn deletes(mut self, files: impl IntoIterator<Item = FileId>) -> Self {
    for file in files {
      self.add_delete(file);
    }
    self
  }

  /// The full command text recorded in the command-line history.
  pub fn command_line(&self) -> String {
    if self.command_arguments.is_empty() {
      self.command_path.clone()
    } else {
      format!("{} {}", self.command_path, self.command_arguments)
    }
  }

  /// Actions without a command are bookkeeping only and are never executed.
  pub fn has_command(&self) -> bool {
    !self.command_path.is_empty()
  }

  /// Number of actions that transitively depend on this one. Zero until linked.
  pub fn num_total_dependent_actions(&self) -> usize {
    self.num_total_dependent_actions
  }

  /// Sum of the relative-cost hints of the produced files. Zero until linked.
  pub fn relative_cost(&self) -> u64 {
    self.relative_cost
  }

  /// Two actions are equivalent when running either would produce the same
  /// outputs from the same inputs, so one may stand in for the other.
  pub fn is_equivalent(&self, other: &BuildAction) -> bool {
    self.kind == other.kind
      && self.command_path == other.command_path
      && self.command_arguments == other.command_arguments
      && self.working_directory == other.working_directory
      && same_set(&self.prerequisite_items, &other.prerequisite_items)
      && same_set(&self.produced_items, &other.produced_items)
  }

  /// Scheduling order: most dependents first, then most expensive, then
  /// most prerequisite files.
  pub fn compare_for_scheduling(&self, other: &BuildAction) -> Ordering {
    other
      .num_total_dependent_actions
      .cmp(&self.num_total_dependent_actions)
      .then_with(|| other.relative_cost.cmp(&self.relative_cost))
      .then_with(|| other.prerequisite_items.len().cmp(&self.prerequisite_items.len()))
  }
}

impl fmt::Display for BuildAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if !self.command_path.is_empty() {
      write!(f, "{} - ", self.command_path)?;
    }
    write!(f, "{}", self.command_arguments)
  }
}

fn push_unique(items: &mut Vec<FileId>, file: FileId) {
  if !items.contains(&file) {
    items.push(file);
  }
}

fn same_set(a: &[FileId], b: &[FileId]) -> bool {
  a.len() == b.len() && a.iter().all(|f| b.contains(f))
}
