//! Selecting, preparing and executing outdated actions.

use kiln_lib::action::{ActionId, ActionKind, BuildAction};
use kiln_lib::consts::{HISTORY_FILENAME, NO_ACTIONS_EXECUTOR_NAME};
use kiln_lib::execute::{ExecuteError, Executor, ExecutorOutcome};
use kiln_lib::graph::OutdatedQuery;

use super::common::{Behavior, Build, RecordingExecutor, Workspace, timestamps_only};

fn required(build: &Build<'_>, outputs: &[&str]) -> Vec<ActionId> {
  build.graph.gather_prerequisite_actions(build.files(outputs))
}

fn sequential() -> OutdatedQuery {
  OutdatedQuery {
    parallel: false,
    ..OutdatedQuery::default()
  }
}

fn skipping_links() -> OutdatedQuery {
  OutdatedQuery {
    skip_linking_when_nothing_to_compile: true,
    ..timestamps_only()
  }
}

fn small_program(ws: &Workspace) -> (Build<'_>, [ActionId; 3]) {
  let mut build = ws.build();
  let a = build.compile("a.c", "out/a.o");
  let b = build.compile("b.c", "out/b.o");
  let link = build.link(&["out/a.o", "out/b.o"], "out/app");
  (build.linked(), [a, b, link])
}

#[test]
fn first_build_runs_everything_then_nothing() {
  let ws = Workspace::new();
  ws.touch_at("a.c", 0);
  ws.touch_at("b.c", 0);

  {
    let (build, [a, b, link]) = small_program(&ws);
    let (_registry, caches) = ws.open_caches();
    let batch = build
      .graph
      .get_actions_to_execute(&required(&build, &["out/app"]), &caches, &sequential())
      .unwrap();
    assert_eq!(batch, vec![a, b, link]);
    assert!(ws.path("out").is_dir(), "output directories are created up front");

    let (executor, runs) = RecordingExecutor::new("local", Behavior::Succeed).boxed();
    let summary = build.graph.execute_actions(&batch, &[executor], false).unwrap();
    assert_eq!(summary.executor, "local");
    assert_eq!(summary.executed, 3);
    assert_eq!(runs.lock().len(), 1);
    assert_eq!(runs.lock()[0].actions, batch);
    assert_eq!(runs.lock()[0].commands, vec!["cc -c a.c", "cc -c b.c", "ld -o out/app"]);
    assert!(build.graph.arena().record(ws.path("out/app")).exists());
  }

  {
    let (build, _) = small_program(&ws);
    let (_registry, caches) = ws.open_caches();
    let batch = build
      .graph
      .get_actions_to_execute(&required(&build, &["out/app"]), &caches, &sequential())
      .unwrap();
    assert!(batch.is_empty());

    let (executor, runs) = RecordingExecutor::new("local", Behavior::Succeed).boxed();
    let summary = build.graph.execute_actions(&batch, &[executor], false).unwrap();
    assert_eq!(summary.executor, NO_ACTIONS_EXECUTOR_NAME);
    assert_eq!(summary.executed, 0);
    assert!(runs.lock().is_empty());
  }
}

#[test]
fn delete_items_go_before_the_history_is_saved() {
  let ws = Workspace::new();
  ws.touch_at("a.c", 0);
  ws.touch_at("a.pch", 0);

  let mut build = ws.build();
  let action = build
    .action(ActionKind::Compile, "cc -c a.c", &["a.c"], &["obj/a.o"])
    .deletes(build.files(&["a.pch"]));
  build.graph.add(action);
  let build = build.linked();
  let (_registry, caches) = ws.open_caches();

  let batch = build
    .graph
    .get_actions_to_execute(&required(&build, &["obj/a.o"]), &caches, &sequential())
    .unwrap();
  assert_eq!(batch.len(), 1);
  assert!(!ws.path("a.pch").exists());
  assert!(ws.cache_dir().join(HISTORY_FILENAME).is_file());
  assert!(ws.path("obj").is_dir());
}

#[test]
fn single_file_builds_do_not_save_history() {
  let ws = Workspace::new();
  ws.touch_at("a.c", 0);
  ws.touch_at("b.c", 0);
  let (build, [a, _, _]) = small_program(&ws);
  let (_registry, caches) = ws.open_caches();

  let query = OutdatedQuery {
    single_file_to_compile: Some(build.file("a.c")),
    ..sequential()
  };
  let batch = build
    .graph
    .get_actions_to_execute(&required(&build, &["out/app"]), &caches, &query)
    .unwrap();
  assert_eq!(batch, vec![a]);
  assert!(!ws.cache_dir().join(HISTORY_FILENAME).exists());
}

#[test]
fn unrequired_and_commandless_actions_are_not_executed() {
  let ws = Workspace::new();
  let mut build = ws.build();
  let app = build.compile("app.c", "app.o");
  build.compile("tool.c", "tool.o");
  let stamp = build.files(&["app.stamp"]);
  let bookkeeping = build.graph.add(BuildAction::new(ActionKind::PostStep).produces(stamp));
  let build = build.linked();
  let (_registry, caches) = ws.open_caches();

  let wanted = required(&build, &["app.o", "app.stamp"]);
  assert!(wanted.contains(&bookkeeping));
  let batch = build
    .graph
    .get_actions_to_execute(&wanted, &caches, &timestamps_only())
    .unwrap();
  assert_eq!(batch, vec![app]);
}

/// `a.c` changed, `b.o` is current and nothing downstream of it exists yet.
fn partially_built(ws: &Workspace) {
  ws.touch_at("a.c", 40);
  ws.touch_at("a.o", 10);
  ws.touch_at("b.c", 0);
  ws.touch_at("b.o", 10);
}

#[test]
fn links_without_fresh_objects_are_skipped() {
  let ws = Workspace::new();
  partially_built(&ws);
  let mut build = ws.build();
  let compile_a = build.compile("a.c", "a.o");
  build.compile("b.c", "b.o");
  let app = build.link(&["a.o"], "app");
  let lib_b = build.link(&["b.o"], "libb.so");
  let post = build.add(ActionKind::PostStep, "strip libb.so", &["libb.so"], &["libb.stripped"]);
  let build = build.linked();
  let (_registry, caches) = ws.open_caches();
  let wanted = required(&build, &["app", "libb.stripped"]);

  let all = build
    .graph
    .get_actions_to_execute(&wanted, &caches, &timestamps_only())
    .unwrap();
  assert!(all.contains(&lib_b) && all.contains(&post));

  let batch = build
    .graph
    .get_actions_to_execute(&wanted, &caches, &skipping_links())
    .unwrap();
  assert!(batch.contains(&compile_a));
  assert!(batch.contains(&app));
  assert!(!batch.contains(&lib_b));
  assert!(!batch.contains(&post), "its only input comes from a skipped link");
}

#[test]
fn skipped_links_come_back_when_a_scheduled_link_needs_them() {
  let ws = Workspace::new();
  partially_built(&ws);
  let mut build = ws.build();
  let compile_a = build.compile("a.c", "a.o");
  build.compile("b.c", "b.o");
  let lib_b = build.link(&["b.o"], "libb.so");
  let app = build.link(&["a.o", "libb.so"], "app");
  let build = build.linked();
  let (_registry, caches) = ws.open_caches();

  let batch = build
    .graph
    .get_actions_to_execute(&required(&build, &["app"]), &caches, &skipping_links())
    .unwrap();
  assert_eq!(batch.len(), 3);
  assert!(batch.contains(&compile_a) && batch.contains(&lib_b) && batch.contains(&app));
}

#[test]
fn readded_import_library_brings_its_dll_back() {
  let ws = Workspace::new();
  partially_built(&ws);
  ws.touch_at("foo.def", 0);
  let mut build = ws.build();
  build.compile("a.c", "a.o");
  let implib = build.add(ActionKind::Link, "lib /def:foo.def", &["foo.def"], &["FOO.lib"]);
  let dll = build.add(ActionKind::Link, "link /dll b.o", &["b.o"], &["foo.dll"]);
  let app = build.link(&["a.o", "FOO.lib"], "app.exe");
  let build = build.linked();
  let (_registry, caches) = ws.open_caches();

  let batch = build
    .graph
    .get_actions_to_execute(&required(&build, &["app.exe", "foo.dll"]), &caches, &skipping_links())
    .unwrap();
  assert!(batch.contains(&app));
  assert!(batch.contains(&implib));
  assert!(batch.contains(&dll));
}

#[test]
fn executor_failure_still_refreshes_outputs() {
  let ws = Workspace::new();
  ws.touch_at("a.c", 0);
  ws.touch_at("b.c", 0);
  let (build, [a, _, _]) = small_program(&ws);
  let (_registry, caches) = ws.open_caches();
  let batch = build
    .graph
    .get_actions_to_execute(&required(&build, &["out/app"]), &caches, &sequential())
    .unwrap();
  let first_output = build.graph.arena().get(build.graph.action(a).produced_items[0]);
  assert!(!first_output.exists());

  let outcome = ExecutorOutcome::CompileError { code: 2 };
  let (executor, _) = RecordingExecutor::new("local", Behavior::FailAfterFirst(outcome.clone())).boxed();
  match build.graph.execute_actions(&batch, &[executor], false) {
    Err(ExecuteError::ExecutorFailed { executor, outcome: got }) => {
      assert_eq!(executor, "local");
      assert_eq!(got, outcome);
    }
    other => panic!("expected an executor failure, got {other:?}"),
  }
  assert!(first_output.exists(), "cached metadata was refreshed after the failed run");
}

#[test]
fn link_reporting_success_without_output_fails() {
  let ws = Workspace::new();
  ws.touch_at("a.c", 0);
  ws.touch_at("b.c", 0);
  let (build, _) = small_program(&ws);
  let (_registry, caches) = ws.open_caches();
  let batch = build
    .graph
    .get_actions_to_execute(&required(&build, &["out/app"]), &caches, &sequential())
    .unwrap();

  let (executor, _) = RecordingExecutor::new("liar", Behavior::SucceedSilently).boxed();
  match build.graph.execute_actions(&batch, &[executor], false) {
    Err(ExecuteError::MissingBuildProduct { path }) => assert_eq!(path, ws.path("out/app")),
    other => panic!("expected a missing product, got {other:?}"),
  }
}

#[test]
fn first_available_executor_is_used() {
  let ws = Workspace::new();
  ws.touch_at("a.c", 0);
  ws.touch_at("b.c", 0);
  let (build, _) = small_program(&ws);
  let (_registry, caches) = ws.open_caches();
  let batch = build
    .graph
    .get_actions_to_execute(&required(&build, &["out/app"]), &caches, &sequential())
    .unwrap();

  let (remote, remote_runs) = RecordingExecutor::unavailable("remote").boxed();
  let (local, local_runs) = RecordingExecutor::new("local", Behavior::Succeed).boxed();
  let executors: Vec<Box<dyn Executor>> = vec![remote, local];
  let summary = build.graph.execute_actions(&batch, &executors, true).unwrap();

  assert_eq!(summary.executor, "local");
  assert!(remote_runs.lock().is_empty());
  assert!(local_runs.lock()[0].verbose);
}

#[test]
fn no_available_executor_is_an_error() {
  let ws = Workspace::new();
  ws.touch_at("a.c", 0);
  ws.touch_at("b.c", 0);
  let (build, _) = small_program(&ws);
  let (_registry, caches) = ws.open_caches();
  let batch = build
    .graph
    .get_actions_to_execute(&required(&build, &["out/app"]), &caches, &sequential())
    .unwrap();

  let (remote, _) = RecordingExecutor::unavailable("remote").boxed();
  let err = build.graph.execute_actions(&batch, &[remote], false).unwrap_err();
  assert!(matches!(err, ExecuteError::NoExecutorAvailable));
}
