use std::collections::HashSet;

use crate::types::Diagnostic;

use super::AssetGraph;
use super::AssetGraphNode;
use super::EdgeFilter;
use super::NodeId;
use super::TraversalAction;

/// A diagnostic attached to a node of the graph
#[derive(Clone, Debug, PartialEq)]
pub struct GraphDiagnostic {
  pub node_id: NodeId,
  pub diagnostic: Diagnostic,

  /// Whether the node is reachable from an entry without passing an optional dependency
  pub required: bool,
}

impl GraphDiagnostic {
  /// Errors on required nodes fail the build
  pub fn is_fatal(&self) -> bool {
    self.required && self.diagnostic.is_error()
  }
}

/// Gather the diagnostics of every node reachable through active edges, in traversal order
///
/// Deferred subtrees are not part of the build and never report.
pub fn collect_diagnostics(asset_graph: &AssetGraph) -> Vec<GraphDiagnostic> {
  let mut required = HashSet::new();
  asset_graph.traverse(asset_graph.root_node(), EdgeFilter::ACTIVE, |id, node| {
    if let AssetGraphNode::Dependency(node) = node {
      if node.dependency.is_optional {
        return TraversalAction::SkipChildren;
      }
    }

    required.insert(id);
    TraversalAction::Continue
  });

  let mut diagnostics = Vec::new();
  asset_graph.traverse(asset_graph.root_node(), EdgeFilter::ACTIVE, |id, node| {
    let node_diagnostics = match node {
      AssetGraphNode::Dependency(node) => &node.diagnostics,
      AssetGraphNode::Asset(node) => &node.diagnostics,
      _ => return TraversalAction::Continue,
    };

    diagnostics.extend(node_diagnostics.iter().map(|diagnostic| GraphDiagnostic {
      node_id: id,
      diagnostic: diagnostic.clone(),
      required: required.contains(&id),
    }));

    TraversalAction::Continue
  });

  diagnostics
}
