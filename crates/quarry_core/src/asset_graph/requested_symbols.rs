use std::collections::BTreeSet;

use crate::types::Asset;
use crate::types::Dependency;
use crate::types::CHAR_STAR;

use super::AssetGraph;
use super::NodeId;

/// The exports of `asset` selected by `requested`, expanding the namespace marker into every
/// export the asset has
pub fn expand_requested_symbols(asset: &Asset, requested: &BTreeSet<String>) -> BTreeSet<String> {
  if !requested.contains(CHAR_STAR) {
    return requested.clone();
  }

  let mut expanded = requested.clone();
  expanded.extend(asset.exported_symbol_names().cloned());
  expanded
}

/// The symbols `dependency` has to request from whatever it resolves to, given the exports of
/// `asset` that are in use
///
/// Plain imports are always requested. Named re-exports are requested when the export they
/// feed is used, and `export *` receives every used name the asset does not declare itself.
pub fn dependency_demand(
  asset: &Asset,
  used: &BTreeSet<String>,
  dependency: &Dependency,
) -> BTreeSet<String> {
  let Some(symbols) = &dependency.symbols else {
    // Nothing is known about what a dynamic import uses
    return BTreeSet::from([CHAR_STAR.to_string()]);
  };

  let namespace_used = used.contains(CHAR_STAR);
  let mut demand = BTreeSet::new();

  for (imported, symbol) in symbols {
    if !symbol.is_weak {
      demand.insert(imported.clone());
      continue;
    }

    if symbol.is_namespace_reexport() {
      if namespace_used {
        demand.insert(CHAR_STAR.to_string());
        continue;
      }

      let own_symbols = asset.symbols.as_ref();
      demand.extend(
        used
          .iter()
          .filter(|name| !own_symbols.is_some_and(|symbols| symbols.contains_key(*name)))
          .cloned(),
      );
      continue;
    }

    let reexport_used = namespace_used
      || used.iter().any(|name| {
        asset
          .symbols
          .as_ref()
          .and_then(|symbols| symbols.get(name))
          .is_some_and(|asset_symbol| asset_symbol.local == symbol.local)
      });

    if reexport_used {
      demand.insert(imported.clone());
    }
  }

  demand
}

/// Push the demand of `dependency_id` into the asset it resolves to, and onwards through the
/// dependencies of that asset
///
/// Demand only grows here. Deferred dependencies that start receiving demand are undeferred and
/// reported through `on_undeferred` so the caller can schedule them.
pub fn propagate_requested_symbols<F>(
  asset_graph: &mut AssetGraph,
  initial_asset_id: NodeId,
  initial_dependency_id: NodeId,
  on_undeferred: &mut F,
) where
  F: FnMut(NodeId),
{
  let mut next = vec![(initial_asset_id, initial_dependency_id)];

  while let Some((asset_id, dependency_id)) = next.pop() {
    let Some(requested) = asset_graph
      .get_dependency_node(dependency_id)
      .map(|node| node.used_symbols_down.clone())
    else {
      continue;
    };

    let Some(asset_node) = asset_graph.get_asset_node_mut(asset_id) else {
      continue;
    };

    let expanded = expand_requested_symbols(&asset_node.asset, &requested);
    asset_node.used_symbols.extend(expanded);

    let asset = asset_node.asset.clone();
    let used = asset_node.used_symbols.clone();

    for nested_dependency_id in asset_graph.outgoing_dependencies(asset_id) {
      let Some(node) = asset_graph.get_dependency_node_mut(nested_dependency_id) else {
        continue;
      };

      let demand = dependency_demand(&asset, &used, &node.dependency);
      let previous_len = node.used_symbols_down.len();
      node.used_symbols_down.extend(demand);

      if node.used_symbols_down.len() == previous_len {
        continue;
      }

      node.used_symbols_up_dirty_down = true;

      if node.deferred {
        tracing::debug!(
          specifier = %node.dependency.specifier,
          "Undeferring dependency with new requested symbols"
        );
        node.deferred = false;
        on_undeferred(nested_dependency_id);
      }

      if let Some(target) = asset_graph.resolved_asset(nested_dependency_id) {
        if target != asset_id {
          next.push((target, nested_dependency_id));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use crate::asset_graph::test_utils::*;

  use super::*;

  fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
  }

  #[test]
  fn test_plain_imports_are_always_requested() {
    let asset = asset_fixture("/a.js", &[]);
    let dependency = dependency_from("/a.js", "./b.js", &["x", "y"]);

    assert_eq!(dependency_demand(&asset, &set(&[]), &dependency), set(&["x", "y"]));
  }

  #[test]
  fn test_dynamic_imports_request_everything() {
    let asset = asset_fixture("/a.js", &[]);
    let dependency = require_from("/a.js", "./b.js");

    assert_eq!(dependency_demand(&asset, &set(&[]), &dependency), set(&["*"]));
  }

  #[test]
  fn test_named_reexports_follow_usage() {
    let asset = reexporting_asset("/b.js", &["x"], &["y"]);
    let dependency = reexport_from("/b.js", "./c.js", &["y"]);

    assert_eq!(dependency_demand(&asset, &set(&["x"]), &dependency), set(&[]));
    assert_eq!(dependency_demand(&asset, &set(&["y"]), &dependency), set(&["y"]));
    assert_eq!(dependency_demand(&asset, &set(&["*"]), &dependency), set(&["y"]));
  }

  #[test]
  fn test_export_all_receives_unmatched_names() {
    let asset = asset_fixture("/b.js", &["x"]);
    let dependency = export_all_from("/b.js", "./c.js");

    assert_eq!(
      dependency_demand(&asset, &set(&["x", "z"]), &dependency),
      set(&["z"])
    );
    assert_eq!(dependency_demand(&asset, &set(&["*"]), &dependency), set(&["*"]));
  }

  #[test]
  fn test_namespace_requests_expand_to_exports() {
    let asset = reexporting_asset("/b.js", &["x"], &["y"]);

    assert_eq!(
      expand_requested_symbols(&asset, &set(&["*"])),
      set(&["*", "x", "y"])
    );
    assert_eq!(expand_requested_symbols(&asset, &set(&["x"])), set(&["x"]));
  }

  #[test]
  fn test_requested_symbols_flow_through_reexports() {
    let mut graph = AssetGraph::new();
    let (_, a) = add_entry_with_asset(&mut graph, asset_fixture("/a.js", &[]));
    let a_deps = graph.set_asset_dependencies(a, vec![dependency_from("/a.js", "./b.js", &["x"])]);
    let (b, b_deps) = add_resolved_asset(
      &mut graph,
      a_deps[0],
      reexporting_asset("/b.js", &["x"], &["y"]),
      vec![reexport_from("/b.js", "./c.js", &["y"])],
    );
    let (c, _) = add_resolved_asset(&mut graph, b_deps[0], asset_fixture("/c.js", &["y"]), Vec::new());

    let mut undeferred = Vec::new();
    let entry = graph.get_node_ids_connected_to(a, crate::asset_graph::EdgeFilter::RESOLUTION)[0];
    propagate_requested_symbols(&mut graph, a, entry, &mut |id| undeferred.push(id));

    assert_eq!(graph.get_dependency_node(a_deps[0]).unwrap().used_symbols_down, set(&["x"]));
    assert_eq!(graph.get_asset_node(b).unwrap().used_symbols, set(&["x"]));
    assert_eq!(graph.get_dependency_node(b_deps[0]).unwrap().used_symbols_down, set(&[]));
    assert_eq!(graph.get_asset_node(c).unwrap().used_symbols, set(&[]));
    assert!(undeferred.is_empty());
  }

  #[test]
  fn test_new_demand_undefers_dependencies() {
    let mut graph = AssetGraph::new();
    let (entry, a) = add_entry_with_asset(&mut graph, asset_fixture("/a.js", &[]));
    let a_deps = graph.set_asset_dependencies(a, vec![dependency_from("/a.js", "./b.js", &["x"])]);
    let (b, b_deps) = add_resolved_asset(
      &mut graph,
      a_deps[0],
      reexporting_asset("/b.js", &["x"], &["y"]),
      vec![reexport_from("/b.js", "./c.js", &["y"])],
    );
    propagate_requested_symbols(&mut graph, a, entry, &mut |_| {});
    graph.get_dependency_node_mut(b_deps[0]).unwrap().deferred = true;

    // a.js now also imports y
    let a_deps = graph.set_asset_dependencies(a, vec![dependency_from("/a.js", "./b.js", &["x", "y"])]);
    graph.resolve_dependency(a_deps[0], b);

    let mut undeferred = Vec::new();
    propagate_requested_symbols(&mut graph, a, entry, &mut |id| undeferred.push(id));

    assert_eq!(undeferred, vec![b_deps[0]]);
    let node = graph.get_dependency_node(b_deps[0]).unwrap();
    assert!(!node.deferred);
    assert_eq!(node.used_symbols_down, set(&["y"]));
  }

  #[test]
  fn test_cycles_terminate() {
    let mut graph = AssetGraph::new();
    let (entry, a) = add_entry_with_asset(&mut graph, asset_fixture("/a.js", &["a"]));
    let a_deps = graph.set_asset_dependencies(a, vec![dependency_from("/a.js", "./b.js", &["b"])]);
    let (_, b_deps) = add_resolved_asset(
      &mut graph,
      a_deps[0],
      asset_fixture("/b.js", &["b"]),
      vec![dependency_from("/b.js", "./a.js", &["a"])],
    );
    graph.resolve_dependency(b_deps[0], a);

    propagate_requested_symbols(&mut graph, a, entry, &mut |_| {});

    assert_eq!(graph.get_asset_node(a).unwrap().used_symbols, set(&["a"]));
  }
}
