//! Whole builds driven through a `BuildSession`.

use kiln_lib::config::EngineConfig;
use kiln_lib::consts::{HISTORY_FILENAME, NO_ACTIONS_EXECUTOR_NAME};
use kiln_lib::error::KilnError;
use kiln_lib::execute::{BuildSession, ExecutorOutcome};
use kiln_lib::fs::FileId;

use super::common::{Behavior, Build, RecordingExecutor, Workspace};

fn session(ws: &Workspace) -> BuildSession {
  let config = EngineConfig {
    cache_dir: Some(ws.cache_dir()),
    ..EngineConfig::default()
  };
  BuildSession::open(config, ws.temp.path(), &[])
}

fn program(ws: &Workspace) -> Build<'_> {
  let mut build = ws.build();
  build.compile("a.c", "out/a.o");
  build.compile("b.c", "out/b.o");
  build.link(&["out/a.o", "out/b.o"], "out/app");
  build
}

fn outputs_of(build: &Build<'_>) -> Vec<FileId> {
  build.files(&["out/app"])
}

#[test]
fn rebuild_after_success_is_a_no_op() {
  let ws = Workspace::new();
  ws.touch_at("a.c", 0);
  ws.touch_at("b.c", 0);

  let mut build = program(&ws);
  let outputs = outputs_of(&build);
  let (executor, _) = RecordingExecutor::new("local", Behavior::Succeed).boxed();
  let summary = session(&ws).build(&mut build.graph, &outputs, &[executor]).unwrap();
  assert_eq!(summary.executed, 3);
  assert!(ws.cache_dir().join(HISTORY_FILENAME).is_file());

  let mut build = program(&ws);
  let outputs = outputs_of(&build);
  let (executor, runs) = RecordingExecutor::new("local", Behavior::Succeed).boxed();
  let summary = session(&ws).build(&mut build.graph, &outputs, &[executor]).unwrap();
  assert_eq!(summary.executor, NO_ACTIONS_EXECUTOR_NAME);
  assert!(runs.lock().is_empty());
}

#[test]
fn executor_failure_surfaces_as_kiln_error() {
  let ws = Workspace::new();
  ws.touch_at("a.c", 0);
  ws.touch_at("b.c", 0);

  let mut build = program(&ws);
  let outputs = outputs_of(&build);
  let (executor, _) = RecordingExecutor::new("local", Behavior::FailAfterFirst(ExecutorOutcome::Canceled)).boxed();
  let err = session(&ws).build(&mut build.graph, &outputs, &[executor]).unwrap_err();
  assert!(err.is_executor_failure());

  // The failed run still recorded command lines, so only what is missing reruns.
  let mut build = program(&ws);
  let outputs = outputs_of(&build);
  let (executor, runs) = RecordingExecutor::new("local", Behavior::Succeed).boxed();
  let summary = session(&ws).build(&mut build.graph, &outputs, &[executor]).unwrap();
  assert_eq!(summary.executed, 2);
  assert_eq!(runs.lock()[0].commands, vec!["cc -c b.c", "ld -o out/app"]);
}

#[test]
fn cycles_fail_before_anything_runs() {
  let ws = Workspace::new();
  let mut build = ws.build();
  build.link(&["b"], "a");
  build.link(&["a"], "b");
  let outputs = build.files(&["a"]);

  let (executor, runs) = RecordingExecutor::new("local", Behavior::Succeed).boxed();
  let err = session(&ws).build(&mut build.graph, &outputs, &[executor]).unwrap_err();
  assert!(matches!(err, KilnError::Graph(_)));
  assert!(runs.lock().is_empty());
}

#[test]
fn single_file_compile_leaves_history_alone() {
  let ws = Workspace::new();
  ws.touch_at("a.c", 0);
  ws.touch_at("b.c", 0);

  let mut build = program(&ws);
  let source = build.file("a.c");
  let (executor, runs) = RecordingExecutor::new("local", Behavior::Succeed).boxed();
  let summary = session(&ws)
    .compile_single_file(&mut build.graph, source, &[executor])
    .unwrap();

  assert_eq!(summary.executed, 1);
  assert_eq!(runs.lock()[0].commands, vec!["cc -c a.c"]);
  assert!(!ws.cache_dir().join(HISTORY_FILENAME).exists());
}
