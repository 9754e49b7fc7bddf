//! The action graph: actions linked through the files they share.
//!
//! An action depends on another when one of its prerequisite files is
//! produced by the other. [`ActionGraph::link`] derives those edges, rejects
//! conflicting producers and cycles, and orders the actions so that the ones
//! unblocking the most downstream work come first.

mod outdated;
mod types;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use tracing::{debug, error, info};

use crate::action::{ActionId, BuildAction};
use crate::fs::{FileArena, FileId};

pub use outdated::{OutdatedQuery, OutdatedSet};
pub use types::GraphError;

/// A set of build actions and, once linked, the edges between them.
///
/// Mutating the graph with [`ActionGraph::add`] clears the linked state;
/// queries that need edges fail with [`GraphError::NotLinked`] until
/// [`ActionGraph::link`] succeeds again.
pub struct ActionGraph {
  arena: Arc<FileArena>,
  actions: Vec<BuildAction>,

  /// Producing action of every produced file.
  producers: HashMap<FileId, ActionId>,

  /// Per action: the distinct producers of its prerequisite files.
  prerequisite_actions: Vec<Vec<ActionId>>,

  /// Actions that duplicate an equivalent, earlier action. They stay
  /// addressable but are never scheduled.
  duplicates: HashSet<ActionId>,

  /// Scheduling order of the non-duplicate actions.
  order: Vec<ActionId>,

  linked: bool,
}

impl ActionGraph {
  /// An empty graph whose actions refer to files interned in `arena`.
  pub fn new(arena: Arc<FileArena>) -> Self {
    Self {
      arena,
      actions: Vec::new(),
      producers: HashMap::new(),
      prerequisite_actions: Vec::new(),
      duplicates: HashSet::new(),
      order: Vec::new(),
      linked: false,
    }
  }

  /// The arena that resolves the graph's file handles.
  pub fn arena(&self) -> &Arc<FileArena> {
    &self.arena
  }

  /// Adds an action. The graph must be linked again before it is queried.
  pub fn add(&mut self, action: BuildAction) -> ActionId {
    let id = ActionId(self.actions.len());
    self.actions.push(action);
    self.linked = false;
    id
  }

  /// Number of actions added, including merged duplicates.
  pub fn len(&self) -> usize {
    self.actions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.actions.is_empty()
  }

  pub fn is_linked(&self) -> bool {
    self.linked
  }

  /// # Panics
  ///
  /// Panics if `id` was not issued by this graph; see [`Self::get`].
  pub fn action(&self, id: ActionId) -> &BuildAction {
    &self.actions[id.0]
  }

  /// Like [`Self::action`], but reports a foreign id as an error.
  pub fn get(&self, id: ActionId) -> Result<&BuildAction, GraphError> {
    self.actions.get(id.0).ok_or(GraphError::UnknownAction(id))
  }

  /// All actions in insertion order, including merged duplicates.
  pub fn actions(&self) -> impl Iterator<Item = (ActionId, &BuildAction)> {
    self.actions.iter().enumerate().map(|(i, a)| (ActionId(i), a))
  }

  /// Linked actions in scheduling order. Empty until [`Self::link`] succeeds.
  pub fn sorted(&self) -> &[ActionId] {
    &self.order
  }

  /// The action that produces `file`, if any. Empty until linked.
  pub fn producer_of(&self, file: FileId) -> Option<ActionId> {
    self.producers.get(&file).copied()
  }

  /// Producers of `id`'s prerequisite files, in prerequisite order.
  pub fn prerequisite_actions(&self, id: ActionId) -> &[ActionId] {
    self.prerequisite_actions.get(id.0).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Whether `id` was merged into an equivalent earlier action.
  pub fn is_duplicate(&self, id: ActionId) -> bool {
    self.duplicates.contains(&id)
  }

  /// Links every action to the producers of its prerequisites, checks the
  /// result for conflicts and cycles, and computes the scheduling order.
  pub fn link(&mut self) -> Result<(), GraphError> {
    self.linked = false;
    self.link_items()?;
    self.resolve_prerequisite_actions();
    self.detect_cycles()?;
    self.sort_actions();
    self.linked = true;

    info!(
      actions = self.actions.len(),
      scheduled = self.order.len(),
      duplicates = self.duplicates.len(),
      "linked action graph"
    );
    Ok(())
  }

  fn link_items(&mut self) -> Result<(), GraphError> {
    self.producers.clear();
    self.duplicates.clear();

    let mut conflicts = Vec::new();
    for (index, action) in self.actions.iter().enumerate() {
      let id = ActionId(index);
      for &file in &action.produced_items {
        match self.producers.get(&file) {
          None => {
            self.producers.insert(file, id);
          }
          Some(&existing) if existing == id => {}
          Some(&existing) if self.actions[existing.0].is_equivalent(action) => {
            debug!(action = %id, original = %existing, "merging equivalent action");
            self.duplicates.insert(id);
          }
          Some(&existing) => conflicts.push((file, existing, id)),
        }
      }
    }

    for action in &mut self.actions {
      action.relative_cost = action
        .produced_items
        .iter()
        .map(|&file| self.arena.get(file).relative_cost())
        .sum();
    }

    self.check_for_conflicts(conflicts)
  }

  /// Reports every conflicting producer and fails on the first one.
  fn check_for_conflicts(&self, conflicts: Vec<(FileId, ActionId, ActionId)>) -> Result<(), GraphError> {
    for &(file, first, second) in &conflicts {
      error!(
        path = %self.arena.get(file).location().display(),
        first = %self.actions[first.0],
        second = %self.actions[second.0],
        "conflicting actions produce the same file"
      );
    }

    match conflicts.first() {
      Some(&(file, first, second)) => Err(GraphError::ConflictingOutputs {
        path: self.arena.get(file).location().to_path_buf(),
        first: self.actions[first.0].to_string(),
        second: self.actions[second.0].to_string(),
      }),
      None => Ok(()),
    }
  }

  fn resolve_prerequisite_actions(&mut self) {
    self.prerequisite_actions = self
      .actions
      .iter()
      .map(|action| {
        let mut producers = Vec::new();
        for &file in &action.prerequisite_items {
          if let Some(&producer) = self.producers.get(&file)
            && !producers.contains(&producer)
          {
            producers.push(producer);
          }
        }
        producers
      })
      .collect();
  }

  fn active(&self) -> impl Iterator<Item = ActionId> + '_ {
    (0..self.actions.len()).map(ActionId).filter(|id| !self.duplicates.contains(id))
  }

  /// Grows the set of actions proven acyclic until a pass proves nothing new;
  /// whatever is left participates in (or depends on) a cycle.
  fn detect_cycles(&self) -> Result<(), GraphError> {
    let active: Vec<ActionId> = self.active().collect();
    let mut non_cyclic: HashSet<ActionId> = HashSet::new();
    let mut blocked_by: HashMap<ActionId, Vec<ActionId>> = HashMap::new();

    loop {
      let mut found_new = false;
      for &id in &active {
        if non_cyclic.contains(&id) {
          continue;
        }

        let blockers: Vec<ActionId> = self.prerequisite_actions[id.0]
          .iter()
          .copied()
          .filter(|p| !non_cyclic.contains(p))
          .collect();

        if blockers.is_empty() {
          non_cyclic.insert(id);
          blocked_by.remove(&id);
          found_new = true;
        } else {
          blocked_by.insert(id, blockers);
        }
      }

      if !found_new {
        break;
      }
    }

    if non_cyclic.len() == active.len() {
      return Ok(());
    }

    let cyclic: Vec<ActionId> = active.into_iter().filter(|id| !non_cyclic.contains(id)).collect();
    let description = self.describe_cycle(&cyclic, &blocked_by);
    Err(GraphError::Cycle {
      description,
      actions: cyclic,
    })
  }

  fn describe_cycle(&self, cyclic: &[ActionId], blocked_by: &HashMap<ActionId, Vec<ActionId>>) -> String {
    CycleDescription {
      graph: self,
      cyclic,
      blocked_by,
    }
    .to_string()
  }

  /// Counts transitive dependents of every action, then orders by
  /// [`BuildAction::compare_for_scheduling`]. Ties keep insertion order.
  fn sort_actions(&mut self) {
    let active: Vec<ActionId> = self.active().collect();

    let mut graph: DiGraph<ActionId, ()> = DiGraph::with_capacity(active.len(), 0);
    let nodes: HashMap<ActionId, NodeIndex> = active.iter().map(|&id| (id, graph.add_node(id))).collect();
    for &id in &active {
      for producer in &self.prerequisite_actions[id.0] {
        if let Some(&from) = nodes.get(producer) {
          graph.add_edge(from, nodes[&id], ());
        }
      }
    }

    // Each action walks its ancestors once and bumps their counters.
    let mut dependents = vec![0usize; self.actions.len()];
    let reversed = Reversed(&graph);
    for &id in &active {
      let start = nodes[&id];
      let mut dfs = Dfs::new(reversed, start);
      while let Some(node) = dfs.next(reversed) {
        if node != start {
          dependents[graph[node].0] += 1;
        }
      }
    }

    for (action, count) in self.actions.iter_mut().zip(dependents) {
      action.num_total_dependent_actions = count;
    }

    let mut order = active;
    order.sort_by(|a, b| self.actions[a.0].compare_for_scheduling(&self.actions[b.0]));
    self.order = order;
  }

  /// Every action needed to produce `outputs`, directly or through
  /// prerequisites, in scheduling order.
  pub fn gather_prerequisite_actions(&self, outputs: impl IntoIterator<Item = FileId>) -> Vec<ActionId> {
    let mut needed: HashSet<ActionId> = HashSet::new();
    let mut pending: Vec<FileId> = outputs.into_iter().collect();

    while let Some(file) = pending.pop() {
      if let Some(producer) = self.producer_of(file)
        && needed.insert(producer)
      {
        pending.extend(self.actions[producer.0].prerequisite_items.iter().copied());
      }
    }

    self.order.iter().copied().filter(|id| needed.contains(id)).collect()
  }

  pub(crate) fn ensure_linked(&self) -> Result<(), GraphError> {
    if self.linked { Ok(()) } else { Err(GraphError::NotLinked) }
  }
}

/// Multi-line report of the actions left over by cycle detection, each with
/// its files and the cyclic actions blocking it.
struct CycleDescription<'a> {
  graph: &'a ActionGraph,
  cyclic: &'a [ActionId],
  blocked_by: &'a HashMap<ActionId, Vec<ActionId>>,
}

impl fmt::Display for CycleDescription<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let path_of = |file: FileId| self.graph.arena.get(file).location().display().to_string();

    for &id in self.cyclic {
      let action = &self.graph.actions[id.0];
      writeln!(f, "Action {id}: {}", action.command_path)?;
      writeln!(f, "\twith arguments: {}", action.command_arguments)?;
      for &file in &action.prerequisite_items {
        writeln!(f, "\tdepends on: {}", path_of(file))?;
      }
      for &file in &action.produced_items {
        writeln!(f, "\tproduces:   {}", path_of(file))?;
      }
      writeln!(f, "\tdepends on cyclic actions:")?;
      for &blocker in self.blocked_by.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
        match self.graph.actions[blocker.0].produced_items.as_slice() {
          [single] => writeln!(f, "\t\t{blocker} (produces: {})", path_of(*single))?,
          many => {
            writeln!(f, "\t\t{blocker}")?;
            for &file in many {
              writeln!(f, "\t\t\tproduces:   {}", path_of(file))?;
            }
          }
        }
      }
      writeln!(f)?;
    }
    Ok(())
  }
}
