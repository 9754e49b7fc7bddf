//! Linking a realistic graph: ordering, narrowing and diagnostics.

use kiln_lib::action::ActionKind;
use kiln_lib::graph::GraphError;

use super::common::Workspace;

#[test]
fn shared_generators_are_scheduled_first() {
  let ws = Workspace::new();
  let mut build = ws.build();
  let tool = build.link(&["c.o"], "tool");
  let app = build.link(&["a.o", "b.o"], "app");
  let c = build.compile("c.c", "c.o");
  let b = build.add(ActionKind::Compile, "cc -c b.c", &["b.c", "gen.h"], &["b.o"]);
  let a = build.add(ActionKind::Compile, "cc -c a.c", &["a.c", "gen.h"], &["a.o"]);
  let generate = build.add(ActionKind::GenerateMetadata, "idl schema.idl", &["schema.idl"], &["gen.h"]);
  let build = build.linked();

  assert_eq!(build.graph.action(generate).num_total_dependent_actions(), 3);
  assert_eq!(build.graph.action(a).num_total_dependent_actions(), 1);
  assert_eq!(build.graph.action(app).num_total_dependent_actions(), 0);

  // Ties on dependents and cost fall back to prerequisite count, then insertion.
  assert_eq!(build.graph.sorted(), &[generate, b, a, c, app, tool]);
}

#[test]
fn prerequisite_gathering_narrows_to_requested_outputs() {
  let ws = Workspace::new();
  let mut build = ws.build();
  let generate = build.add(ActionKind::GenerateMetadata, "idl schema.idl", &["schema.idl"], &["gen.h"]);
  let a = build.add(ActionKind::Compile, "cc -c a.c", &["a.c", "gen.h"], &["a.o"]);
  let c = build.compile("c.c", "c.o");
  let app = build.link(&["a.o"], "app");
  let tool = build.link(&["c.o"], "tool");
  let build = build.linked();

  assert_eq!(build.graph.gather_prerequisite_actions([build.file("app")]), vec![generate, a, app]);
  assert_eq!(build.graph.gather_prerequisite_actions([build.file("tool")]), vec![c, tool]);
  assert!(build.graph.gather_prerequisite_actions([build.file("a.c")]).is_empty());
}

#[test]
fn expensive_outputs_break_ties() {
  let ws = Workspace::new();
  let mut build = ws.build();
  let cheap = build.compile("small.c", "small.o");
  let costly = build.compile("big.c", "big.o");
  build.graph.arena().record(ws.path("big.o")).set_relative_cost(250);
  let build = build.linked();

  assert_eq!(build.graph.action(costly).relative_cost(), 250);
  assert_eq!(build.graph.sorted(), &[costly, cheap]);
}

#[test]
fn cycle_description_lists_every_blocked_action() {
  let ws = Workspace::new();
  let mut build = ws.build();
  build.add(ActionKind::Other("stamp".into()), "tool-a --in f2", &["f2"], &["f1"]);
  build.add(ActionKind::Other("stamp".into()), "tool-b --in f1", &["f1"], &["f2"]);

  let Err(GraphError::Cycle { description, actions }) = build.graph.link() else {
    panic!("expected a cycle");
  };
  assert_eq!(actions.len(), 2);

  let f1 = ws.path("f1").display().to_string();
  let f2 = ws.path("f2").display().to_string();
  assert!(description.contains("Action #0: tool-a"));
  assert!(description.contains("\twith arguments: --in f2"));
  assert!(description.contains(&format!("\tdepends on: {f2}")));
  assert!(description.contains(&format!("\tproduces:   {f1}")));
  assert!(description.contains(&format!("\t\t#1 (produces: {f2})")));
}

#[test]
fn conflicting_producers_name_both_commands() {
  let ws = Workspace::new();
  let mut build = ws.build();
  build.add(ActionKind::Compile, "cc -O0 -c x.c", &["x.c"], &["x.o"]);
  build.add(ActionKind::Compile, "cc -O2 -c x.c", &["x.c"], &["x.o"]);

  let err = build.graph.link().unwrap_err();
  let message = err.to_string();
  assert!(message.contains("cc - -O0 -c x.c"), "{message}");
  assert!(message.contains("cc - -O2 -c x.c"), "{message}");
}
