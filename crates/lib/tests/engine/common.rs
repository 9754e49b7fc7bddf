//! Shared helpers for engine integration tests.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use kiln_lib::action::{ActionId, ActionKind, BuildAction};
use kiln_lib::cache::{CacheRegistry, CacheScope, EngineCaches};
use kiln_lib::execute::{ActionBatch, Executor, ExecutorOutcome};
use kiln_lib::fs::{FileArena, FileId};
use kiln_lib::graph::{ActionGraph, OutdatedQuery};
use parking_lot::Mutex;
use tempfile::TempDir;

/// A fixed point in time; tests express timestamps as seconds after it.
pub fn at(secs: u64) -> SystemTime {
  SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
}

/// Query with history off, so only timestamps and dependency lists count.
pub fn timestamps_only() -> OutdatedQuery {
  OutdatedQuery {
    use_action_history: false,
    parallel: false,
    ..OutdatedQuery::default()
  }
}

/// Isolated source tree with its own cache directory.
pub struct Workspace {
  pub temp: TempDir,
}

impl Workspace {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }

  pub fn cache_dir(&self) -> PathBuf {
    self.path(".kiln")
  }

  /// Writes `contents` to `relative` and pins its modification time.
  pub fn write_at(&self, relative: &str, contents: &str, secs: u64) -> PathBuf {
    let path = self.path(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    set_mtime(&path, at(secs));
    path
  }

  /// Writes a non-empty placeholder file at `secs`.
  pub fn touch_at(&self, relative: &str, secs: u64) -> PathBuf {
    self.write_at(relative, "x", secs)
  }

  /// Opens a fresh cache chain rooted at the workspace, as a new process would.
  pub fn open_caches(&self) -> (CacheRegistry, EngineCaches) {
    let registry = CacheRegistry::new();
    let caches = registry.open_chain(&CacheScope::new(self.temp.path(), self.cache_dir()), &[]);
    (registry, caches)
  }

  /// A new, empty build over a fresh file arena.
  pub fn build(&self) -> Build<'_> {
    Build {
      workspace: self,
      graph: ActionGraph::new(Arc::new(FileArena::new())),
    }
  }
}

pub fn set_mtime(path: &Path, time: SystemTime) {
  File::options().write(true).open(path).unwrap().set_modified(time).unwrap();
}

/// One build's worth of actions over a workspace.
pub struct Build<'w> {
  pub workspace: &'w Workspace,
  pub graph: ActionGraph,
}

impl Build<'_> {
  pub fn file(&self, relative: &str) -> FileId {
    self.graph.arena().file(self.workspace.path(relative))
  }

  pub fn files(&self, relative: &[&str]) -> Vec<FileId> {
    relative.iter().map(|r| self.file(r)).collect()
  }

  /// Builder seeded with a command and the given items.
  pub fn action(&self, kind: ActionKind, command: &str, inputs: &[&str], outputs: &[&str]) -> BuildAction {
    let (path, arguments) = command.split_once(' ').unwrap_or((command, ""));
    BuildAction::new(kind)
      .with_command(path, arguments)
      .with_status(outputs.first().copied().unwrap_or(command))
      .prerequisites(self.files(inputs))
      .produces(self.files(outputs))
  }

  pub fn add(&mut self, kind: ActionKind, command: &str, inputs: &[&str], outputs: &[&str]) -> ActionId {
    let action = self.action(kind, command, inputs, outputs);
    self.graph.add(action)
  }

  pub fn compile(&mut self, source: &str, object: &str) -> ActionId {
    self.add(ActionKind::Compile, &format!("cc -c {source}"), &[source], &[object])
  }

  pub fn link(&mut self, inputs: &[&str], output: &str) -> ActionId {
    self.add(ActionKind::Link, &format!("ld -o {output}"), inputs, &[output])
  }

  pub fn linked(mut self) -> Self {
    self.graph.link().unwrap();
    self
  }
}

/// What an executor run should do.
#[derive(Debug, Clone)]
pub enum Behavior {
  /// Write every produced item and succeed.
  Succeed,
  /// Succeed without writing anything.
  SucceedSilently,
  /// Write the first action's outputs, then fail.
  FailAfterFirst(ExecutorOutcome),
}

/// Executor that records what it was asked to run and fakes the outputs.
pub struct RecordingExecutor {
  pub name: &'static str,
  pub available: bool,
  pub behavior: Behavior,
  pub runs: Arc<Mutex<Vec<Run>>>,
}

#[derive(Debug, Clone)]
pub struct Run {
  pub actions: Vec<ActionId>,
  pub commands: Vec<String>,
  pub verbose: bool,
}

impl RecordingExecutor {
  pub fn new(name: &'static str, behavior: Behavior) -> Self {
    Self {
      name,
      available: true,
      behavior,
      runs: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn unavailable(name: &'static str) -> Self {
    Self {
      available: false,
      ..Self::new(name, Behavior::Succeed)
    }
  }

  pub fn boxed(self) -> (Box<dyn Executor>, Arc<Mutex<Vec<Run>>>) {
    let runs = Arc::clone(&self.runs);
    (Box::new(self), runs)
  }
}

impl Executor for RecordingExecutor {
  fn name(&self) -> &str {
    self.name
  }

  fn is_available(&self) -> bool {
    self.available
  }

  fn execute_actions(&self, batch: &ActionBatch<'_>, verbose: bool) -> Result<(), ExecutorOutcome> {
    self.runs.lock().push(Run {
      actions: batch.ids().to_vec(),
      commands: batch.iter().map(|(_, action)| action.command_line()).collect(),
      verbose,
    });

    let write_outputs = |action: &BuildAction| {
      for &file in &action.produced_items {
        let record = batch.arena().get(file);
        std::fs::write(record.location(), "output").unwrap();
      }
    };

    match &self.behavior {
      Behavior::Succeed => {
        for (_, action) in batch.iter() {
          write_outputs(action);
        }
        Ok(())
      }
      Behavior::SucceedSilently => Ok(()),
      Behavior::FailAfterFirst(outcome) => {
        if let Some((_, action)) = batch.iter().next() {
          write_outputs(action);
        }
        Err(outcome.clone())
      }
    }
  }
}
