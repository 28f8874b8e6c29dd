use std::collections::HashSet;

use super::AssetGraph;
use super::AssetGraphNode;
use super::EdgeFilter;
use super::NodeId;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraversalAction {
  Continue,
  /// Do not visit the children of the current node
  SkipChildren,
  /// End the traversal
  Stop,
}

#[derive(Clone, Copy, Debug)]
pub struct DfsOptions {
  pub start: NodeId,
  pub filter: EdgeFilter,
  /// Emit nodes after their children rather than before
  pub post_order: bool,
}

impl AssetGraph {
  /// Pre-order depth first traversal from `start`
  ///
  /// Each node is visited at most once per call, so cycles terminate. Children are visited in
  /// edge insertion order.
  pub fn traverse<F>(&self, start: NodeId, filter: EdgeFilter, mut visit: F)
  where
    F: FnMut(NodeId, &AssetGraphNode) -> TraversalAction,
  {
    let mut visited = HashSet::new();
    let mut stack = vec![start];

    while let Some(id) = stack.pop() {
      if !visited.insert(id) {
        continue;
      }

      let Some(node) = self.get_node(id) else {
        continue;
      };

      match visit(id, node) {
        TraversalAction::Stop => return,
        TraversalAction::SkipChildren => continue,
        TraversalAction::Continue => {}
      }

      let children = self.get_node_ids_connected_from(id, filter);
      stack.extend(
        children
          .into_iter()
          .rev()
          .filter(|child| !visited.contains(child)),
      );
    }
  }

  /// The ids visited by a depth first traversal
  pub fn dfs(&self, options: DfsOptions) -> Vec<NodeId> {
    if !options.post_order {
      let mut order = Vec::new();
      self.traverse(options.start, options.filter, |id, _| {
        order.push(id);
        TraversalAction::Continue
      });
      return order;
    }

    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(options.start, false)];

    while let Some((id, expanded)) = stack.pop() {
      if expanded {
        order.push(id);
        continue;
      }

      if !visited.insert(id) || self.get_node(id).is_none() {
        continue;
      }

      stack.push((id, true));
      for child in self
        .get_node_ids_connected_from(id, options.filter)
        .into_iter()
        .rev()
      {
        if !visited.contains(&child) {
          stack.push((child, false));
        }
      }
    }

    order
  }

  /// Every asset reachable from a dependency, in traversal order
  pub fn reachable_assets(&self, dependency_id: NodeId, filter: EdgeFilter) -> Vec<NodeId> {
    let mut assets = Vec::new();
    self.traverse(dependency_id, filter, |id, node| {
      if matches!(node, AssetGraphNode::Asset(_)) {
        assets.push(id);
      }
      TraversalAction::Continue
    });
    assets
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use pretty_assertions::assert_eq;

  use crate::asset_graph::test_utils::*;

  use super::*;

  /// a -> b -> a, with a -> c after b
  fn cyclic_graph() -> (AssetGraph, Vec<NodeId>) {
    let mut graph = AssetGraph::new();
    let (_, a) = add_entry_with_asset(&mut graph, asset_fixture("/a.js", &[]));
    let a_deps = graph.set_asset_dependencies(
      a,
      vec![
        dependency_from("/a.js", "./b.js", &[]),
        dependency_from("/a.js", "./c.js", &[]),
      ],
    );
    let b = graph.add_asset(Arc::new(asset_fixture("/b.js", &[])), None);
    let c = graph.add_asset(Arc::new(asset_fixture("/c.js", &[])), None);
    graph.resolve_dependency(a_deps[0], b);
    graph.resolve_dependency(a_deps[1], c);

    let b_to_a = graph.set_asset_dependencies(b, vec![dependency_from("/b.js", "./a.js", &[])])[0];
    graph.resolve_dependency(b_to_a, a);

    (graph, vec![a, b, c])
  }

  #[test]
  fn test_traversal_visits_each_node_once_in_cycles() {
    let (graph, assets) = cyclic_graph();

    let mut visits = Vec::new();
    graph.traverse(graph.root_node(), EdgeFilter::ALL, |id, _| {
      visits.push(id);
      TraversalAction::Continue
    });

    let unique = visits.iter().collect::<HashSet<_>>();
    assert_eq!(unique.len(), visits.len());
    assert_eq!(visits.len(), graph.node_count());
    assert_eq!(graph.reachable_assets(graph.root_node(), EdgeFilter::ALL), assets);
  }

  #[test]
  fn test_traversal_order_follows_insertion_order() {
    let (graph, _) = cyclic_graph();
    let (other, _) = cyclic_graph();

    let options = DfsOptions {
      start: graph.root_node(),
      filter: EdgeFilter::ALL,
      post_order: false,
    };

    let keys = |graph: &AssetGraph| {
      graph
        .dfs(options)
        .into_iter()
        .map(|id| graph.get_node(id).unwrap().content_key())
        .collect::<Vec<_>>()
    };

    assert_eq!(keys(&graph), keys(&other));
  }

  #[test]
  fn test_post_order_emits_children_first() {
    let (graph, assets) = cyclic_graph();

    let order = graph.dfs(DfsOptions {
      start: graph.root_node(),
      filter: EdgeFilter::ALL,
      post_order: true,
    });

    let position = |id: NodeId| order.iter().position(|n| *n == id).unwrap();
    assert_eq!(order.len(), graph.node_count());
    assert_eq!(order.last(), Some(&graph.root_node()));
    assert!(position(assets[1]) < position(assets[0]));
    assert!(position(assets[2]) < position(assets[0]));
  }

  #[test]
  fn test_skip_children_and_stop() {
    let (graph, assets) = cyclic_graph();

    let mut visited_assets = Vec::new();
    graph.traverse(graph.root_node(), EdgeFilter::ALL, |id, node| {
      if matches!(node, AssetGraphNode::Asset(_)) {
        visited_assets.push(id);
        return TraversalAction::SkipChildren;
      }
      TraversalAction::Continue
    });
    assert_eq!(visited_assets, vec![assets[0]]);

    let mut count = 0;
    graph.traverse(graph.root_node(), EdgeFilter::ALL, |_, _| {
      count += 1;
      if count == 2 {
        TraversalAction::Stop
      } else {
        TraversalAction::Continue
      }
    });
    assert_eq!(count, 2);
  }

  #[test]
  fn test_filters_exclude_deferred_resolutions() {
    let (mut graph, assets) = cyclic_graph();
    let a_to_c = graph.outgoing_dependencies(assets[0])[1];
    graph.get_dependency_node_mut(a_to_c).unwrap().deferred = true;

    assert_eq!(
      graph.reachable_assets(graph.root_node(), EdgeFilter::ACTIVE),
      vec![assets[0], assets[1]]
    );
    assert_eq!(graph.reachable_assets(a_to_c, EdgeFilter::ALL), vec![assets[2]]);
  }
}
