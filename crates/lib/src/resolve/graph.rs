//! Dependency graph over resolved packages.
//!
//! Edges point from a dependent to its dependency, so a post-order walk from
//! the root yields dependencies before dependents. Each [`PackageId`] maps to
//! exactly one node, which deduplicates packages declared by several
//! dependents and keeps the walk finite even if identifiers repeat.
//!
//! Only [`MAX_RESOLVE_DEPTH`] levels below the root enter the graph.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use tracing::debug;

use super::types::ResolvedPackage;
use crate::package::PackageId;

/// How many dependency levels the resolver expands below a requested package.
pub const MAX_RESOLVE_DEPTH: usize = 1;

pub struct DependencyGraph {
  graph: DiGraph<ResolvedPackage, ()>,
  nodes: HashMap<PackageId, NodeIndex>,
  root: NodeIndex,
}

impl DependencyGraph {
  /// Build the graph for `root`, descending at most [`MAX_RESOLVE_DEPTH`] levels.
  pub fn from_resolved(root: &ResolvedPackage) -> Self {
    Self::with_max_depth(root, MAX_RESOLVE_DEPTH)
  }

  /// Build the graph for `root`; dependencies deeper than `max_depth` are left out.
  pub fn with_max_depth(root: &ResolvedPackage, max_depth: usize) -> Self {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    let root_idx = graph.add_node(root.clone());
    nodes.insert(root.id.clone(), root_idx);

    let mut this = Self {
      graph,
      nodes,
      root: root_idx,
    };
    this.add_dependencies(root_idx, root, 1, max_depth);
    this
  }

  fn add_dependencies(&mut self, parent: NodeIndex, package: &ResolvedPackage, depth: usize, max_depth: usize) {
    if depth > max_depth {
      if !package.dependencies.is_empty() {
        debug!(package = %package.id, depth, "dependency depth limit reached");
      }
      return;
    }

    for dep in &package.dependencies {
      let (idx, is_new) = match self.nodes.get(&dep.id) {
        Some(&idx) => (idx, false),
        None => {
          let idx = self.graph.add_node(dep.clone());
          self.nodes.insert(dep.id.clone(), idx);
          (idx, true)
        }
      };

      self.graph.add_edge(parent, idx, ());
      if is_new {
        self.add_dependencies(idx, dep, depth + 1, max_depth);
      }
    }
  }

  /// Dependencies first, each package once, skipping installed ones.
  pub fn install_order(&self) -> Vec<ResolvedPackage> {
    let mut order = Vec::new();
    let mut dfs = DfsPostOrder::new(&self.graph, self.root);
    while let Some(idx) = dfs.next(&self.graph) {
      let package = &self.graph[idx];
      if !package.installed {
        order.push(package.clone());
      }
    }
    order
  }

  /// Every package reachable from the root that is not installed.
  pub fn missing(&self) -> Vec<PackageId> {
    let mut dfs = DfsPostOrder::new(&self.graph, self.root);
    let mut missing = Vec::new();
    while let Some(idx) = dfs.next(&self.graph) {
      if idx != self.root && !self.graph[idx].installed {
        missing.push(self.graph[idx].id.clone());
      }
    }
    missing
  }
}
