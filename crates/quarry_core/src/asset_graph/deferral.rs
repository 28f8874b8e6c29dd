use crate::types::FeatureFlags;

use super::AssetGraph;
use super::AssetGraphNode;
use super::DependencyNode;
use super::DfsOptions;
use super::EdgeFilter;

/// Whether a freshly resolved dependency can skip transforming its target
///
/// Nothing has been requested through the dependency yet, the resolver found no side effects and
/// allowed deferral. Entries and dependencies without static symbol information are never
/// deferred.
pub fn should_defer_dependency(
  node: &DependencyNode,
  side_effects: bool,
  can_defer: bool,
  feature_flags: &FeatureFlags,
) -> bool {
  feature_flags.defer_unused_dependencies()
    && !node.dependency.is_entry
    && !side_effects
    && can_defer
    && node.dependency.symbols.is_some()
    && node.used_symbols_down.is_empty()
}

/// Recompute `has_deferred` for the whole graph
///
/// An asset has deferred dependencies when one of its own dependencies is deferred, or when one
/// of the dependencies it re-exports through leads to deferred dependencies. A dependency carries
/// the flag of the asset it resolves to.
pub fn update_has_deferred(asset_graph: &mut AssetGraph) {
  let order = asset_graph.dfs(DfsOptions {
    start: asset_graph.root_node(),
    filter: EdgeFilter::ALL,
    post_order: true,
  });

  for id in &order {
    match asset_graph.get_node_mut(*id) {
      Some(AssetGraphNode::Asset(node)) => node.has_deferred = false,
      Some(AssetGraphNode::Dependency(node)) => node.has_deferred = false,
      _ => {}
    }
  }

  // Flags only ever turn on, so this settles even with cycles
  loop {
    let mut changed = false;

    for id in &order {
      let has_deferred = match asset_graph.get_node(*id) {
        Some(AssetGraphNode::Dependency(node)) => {
          node.deferred
            || asset_graph
              .resolved_asset(*id)
              .and_then(|target| asset_graph.get_asset_node(target))
              .is_some_and(|target| target.has_deferred)
        }
        Some(AssetGraphNode::Asset(_)) => asset_graph
          .outgoing_dependencies(*id)
          .into_iter()
          .filter_map(|dependency_id| asset_graph.get_dependency_node(dependency_id))
          .any(|dependency| {
            let forwards = dependency
              .dependency
              .symbols
              .as_ref()
              .is_some_and(|symbols| symbols.values().any(|symbol| symbol.is_weak));
            dependency.deferred || (forwards && dependency.has_deferred)
          }),
        _ => continue,
      };

      match asset_graph.get_node_mut(*id) {
        Some(AssetGraphNode::Asset(node)) if has_deferred && !node.has_deferred => {
          node.has_deferred = true;
          changed = true;
        }
        Some(AssetGraphNode::Dependency(node)) if has_deferred && !node.has_deferred => {
          node.has_deferred = true;
          changed = true;
        }
        _ => {}
      }
    }

    if !changed {
      break;
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use crate::asset_graph::test_utils::*;

  use super::*;

  #[test]
  fn test_defers_only_unrequested_side_effect_free_dependencies() {
    let flags = FeatureFlags::default();
    let node = DependencyNode::new(Arc::new(dependency_from("/a.js", "./b.js", &["x"])));
    let mut requested = node.clone();
    requested.used_symbols_down.insert(String::from("x"));

    assert!(should_defer_dependency(&node, false, true, &flags));
    assert!(!should_defer_dependency(&node, true, true, &flags));
    assert!(!should_defer_dependency(&node, false, false, &flags));
    assert!(!should_defer_dependency(&requested, false, true, &flags));
    assert!(!should_defer_dependency(
      &node,
      false,
      true,
      &FeatureFlags::default().with_bool_flag("deferUnusedDependencies", false)
    ));
  }

  #[test]
  fn test_never_defers_entries_or_dynamic_imports() {
    let flags = FeatureFlags::default();
    let entry = DependencyNode::new(Arc::new(entry_dependency("/index.js")));
    let dynamic = DependencyNode::new(Arc::new(require_from("/a.js", "./b.js")));

    assert!(!should_defer_dependency(&entry, false, true, &flags));
    assert!(!should_defer_dependency(&dynamic, false, true, &flags));
  }

  #[test]
  fn test_has_deferred_follows_reexports_only() {
    let mut graph = AssetGraph::new();
    let (_, a) = add_entry_with_asset(&mut graph, asset_fixture("/a.js", &[]));
    let a_deps = graph.set_asset_dependencies(a, vec![dependency_from("/a.js", "./b.js", &["x"])]);
    let (b, b_deps) = add_resolved_asset(
      &mut graph,
      a_deps[0],
      reexporting_asset("/b.js", &["x"], &["y"]),
      vec![reexport_from("/b.js", "./c.js", &["y"])],
    );
    let (c, c_deps) = add_resolved_asset(
      &mut graph,
      b_deps[0],
      reexporting_asset("/c.js", &[], &["y"]),
      vec![reexport_from("/c.js", "./d.js", &["y"])],
    );
    graph.get_dependency_node_mut(c_deps[0]).unwrap().deferred = true;

    update_has_deferred(&mut graph);

    assert!(graph.get_asset_node(c).unwrap().has_deferred);
    assert!(graph.get_dependency_node(b_deps[0]).unwrap().has_deferred);
    assert!(graph.get_asset_node(b).unwrap().has_deferred);
    assert!(graph.get_dependency_node(a_deps[0]).unwrap().has_deferred);
    // a.js only imports from b.js, so its own importers are unaffected
    assert!(!graph.get_asset_node(a).unwrap().has_deferred);

    graph.get_dependency_node_mut(c_deps[0]).unwrap().deferred = false;
    update_has_deferred(&mut graph);

    assert!(!graph.get_asset_node(b).unwrap().has_deferred);
  }
}
