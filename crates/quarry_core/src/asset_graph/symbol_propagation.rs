use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use crate::diagnostic_error;
use crate::types::CodeFrame;
use crate::types::CodeHighlight;
use crate::types::Diagnostic;
use crate::types::DiagnosticBuilder;
use crate::types::DiagnosticSeverity;
use crate::types::ErrorKind;
use crate::types::FeatureFlags;
use crate::types::CHAR_STAR;

use super::dependency_demand;
use super::expand_requested_symbols;
use super::update_has_deferred;
use super::AssetGraph;
use super::AssetGraphNode;
use super::DfsOptions;
use super::EdgeFilter;
use super::NodeId;
use super::ResolvedSymbol;
use super::TraversalAction;

/// Bounds how often one dependency is recomputed while `export *` cycles settle
const MAX_UP_ITERATIONS: usize = 64;

/// Bounds the rounds of propagation triggered by deferral changes
const MAX_DEFERRAL_ROUNDS: usize = 16;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SymbolPropagationResult {
  /// Dependencies that were deferred by the pass
  pub deferred: Vec<NodeId>,

  /// Dependencies that were undeferred by the pass
  ///
  /// Ones without a resolved asset have to be scheduled again by the caller.
  pub undeferred: Vec<NodeId>,
}

/// Recompute used symbols in both directions, then re-evaluate which dependencies are deferred
///
/// Only the part of the graph reachable from dirty nodes is recomputed. Within a round used
/// symbols only grow; a symbol that stops being used after an edit disappears because its
/// region is reset and recomputed from scratch.
pub fn propagate_symbols(
  asset_graph: &mut AssetGraph,
  feature_flags: &FeatureFlags,
) -> SymbolPropagationResult {
  let mut result = SymbolPropagationResult::default();
  let strict = feature_flags.strict_symbol_checks();
  let defer = feature_flags.defer_unused_dependencies();

  for round in 0..MAX_DEFERRAL_ROUNDS {
    propagate_symbols_down(asset_graph);
    propagate_symbols_up(asset_graph, strict);

    let (deferred, undeferred) = update_deferral(asset_graph, defer);
    if deferred.is_empty() && undeferred.is_empty() {
      break;
    }

    for id in deferred {
      result.undeferred.retain(|other| *other != id);
      result.deferred.push(id);
    }

    for id in undeferred {
      result.deferred.retain(|other| *other != id);
      result.undeferred.push(id);
    }

    if round + 1 == MAX_DEFERRAL_ROUNDS {
      tracing::warn!("Deferral did not settle after {} rounds", MAX_DEFERRAL_ROUNDS);
    }
  }

  update_has_deferred(asset_graph);

  result
}

/// Assets whose demand has to be recomputed: everything reachable from a dirty node
fn dirty_region(asset_graph: &AssetGraph) -> Vec<NodeId> {
  let mut seeds = Vec::new();
  for (id, node) in asset_graph.nodes() {
    match node {
      AssetGraphNode::Asset(node) if node.used_symbols_down_dirty => seeds.push(id),
      AssetGraphNode::Dependency(node) if node.used_symbols_down_dirty => {
        seeds.extend(asset_graph.source_asset(id));
        seeds.extend(asset_graph.resolved_asset(id));
      }
      _ => {}
    }
  }

  let mut seen = HashSet::new();
  let mut region = Vec::new();
  for seed in seeds {
    asset_graph.traverse(seed, EdgeFilter::ALL, |id, node| {
      if !seen.insert(id) {
        return TraversalAction::SkipChildren;
      }
      if matches!(node, AssetGraphNode::Asset(_)) {
        region.push(id);
      }
      TraversalAction::Continue
    });
  }

  region
}

fn propagate_symbols_down(asset_graph: &mut AssetGraph) {
  let region = dirty_region(asset_graph);
  if region.is_empty() {
    return;
  }

  tracing::debug!(assets = region.len(), "Propagating used symbols down");

  let active = asset_graph
    .dfs(DfsOptions {
      start: asset_graph.root_node(),
      filter: EdgeFilter::ACTIVE,
      post_order: false,
    })
    .into_iter()
    .collect::<HashSet<_>>();

  let mut previous_demand = HashMap::new();
  for asset_id in &region {
    if let Some(node) = asset_graph.get_asset_node_mut(*asset_id) {
      node.used_symbols.clear();
    }

    for dependency_id in asset_graph.outgoing_dependencies(*asset_id) {
      if let Some(node) = asset_graph.get_dependency_node_mut(dependency_id) {
        previous_demand.insert(dependency_id, std::mem::take(&mut node.used_symbols_down));
      }
    }
  }

  let in_region = region.iter().copied().collect::<HashSet<_>>();
  let mut queued = in_region.clone();
  let mut queue = region.iter().copied().collect::<VecDeque<_>>();

  while let Some(asset_id) = queue.pop_front() {
    queued.remove(&asset_id);

    // Assets only reachable through deferred dependencies demand nothing
    if !active.contains(&asset_id) {
      continue;
    }

    let Some(asset) = asset_graph
      .get_asset_node(asset_id)
      .map(|node| node.asset.clone())
    else {
      continue;
    };

    let mut used = BTreeSet::new();
    for incoming in asset_graph.get_node_ids_connected_to(asset_id, EdgeFilter::RESOLUTION) {
      if !active.contains(&incoming) {
        continue;
      }
      if let Some(node) = asset_graph.get_dependency_node(incoming) {
        used.extend(expand_requested_symbols(&asset, &node.used_symbols_down));
      }
    }

    for dependency_id in asset_graph.outgoing_dependencies(asset_id) {
      let Some(node) = asset_graph.get_dependency_node_mut(dependency_id) else {
        continue;
      };

      let demand = dependency_demand(&asset, &used, &node.dependency);
      if demand.is_subset(&node.used_symbols_down) {
        continue;
      }

      node.used_symbols_down.extend(demand);
      let follow = !node.deferred && !node.excluded;

      if let Some(target) = asset_graph.resolved_asset(dependency_id) {
        if follow && in_region.contains(&target) && queued.insert(target) {
          queue.push_back(target);
        }
      }
    }

    if let Some(node) = asset_graph.get_asset_node_mut(asset_id) {
      node.used_symbols = used;
    }
  }

  for (dependency_id, previous) in previous_demand {
    if let Some(node) = asset_graph.get_dependency_node_mut(dependency_id) {
      if node.used_symbols_down != previous {
        node.used_symbols_up_dirty_down = true;
      }
    }
  }

  for asset_id in region {
    if let Some(node) = asset_graph.get_asset_node_mut(asset_id) {
      node.used_symbols_down_dirty = false;
    }
  }

  for dependency_id in asset_graph.dependency_node_ids() {
    if let Some(node) = asset_graph.get_dependency_node_mut(dependency_id) {
      node.used_symbols_down_dirty = false;
    }
  }
}

fn propagate_symbols_up(asset_graph: &mut AssetGraph, strict: bool) {
  let order = asset_graph.dfs(DfsOptions {
    start: asset_graph.root_node(),
    filter: EdgeFilter::ALL,
    post_order: true,
  });
  let position = order
    .iter()
    .enumerate()
    .map(|(index, id)| (*id, index))
    .collect::<HashMap<_, _>>();

  // Children come before parents so re-exports see settled values
  let mut dirty = BTreeSet::new();
  for (id, node) in asset_graph.nodes() {
    let Some(index) = position.get(&id) else {
      continue;
    };

    match node {
      AssetGraphNode::Dependency(node)
        if node.used_symbols_up_dirty_down || node.used_symbols_up_dirty_up =>
      {
        dirty.insert((*index, id));
      }
      AssetGraphNode::Asset(node) if node.used_symbols_up_dirty => {
        for incoming in asset_graph.incoming_dependencies(id) {
          if let Some(index) = position.get(&incoming) {
            dirty.insert((*index, incoming));
          }
        }
      }
      _ => {}
    }
  }

  if !dirty.is_empty() {
    tracing::debug!(dependencies = dirty.len(), "Propagating used symbols up");
  }

  let mut iterations = HashMap::<NodeId, usize>::new();
  while let Some((_, dependency_id)) = dirty.pop_first() {
    let count = iterations.entry(dependency_id).or_default();
    *count += 1;
    if *count > MAX_UP_ITERATIONS {
      tracing::warn!(?dependency_id, "Used symbols did not settle");
      continue;
    }

    let (used_symbols_up, missing) = resolve_used_symbols(asset_graph, dependency_id, strict);

    let Some(node) = asset_graph.get_dependency_node_mut(dependency_id) else {
      continue;
    };

    let changed = node.used_symbols_up != used_symbols_up;
    node.used_symbols_up = used_symbols_up;
    node.used_symbols_up_dirty_down = false;
    node.used_symbols_up_dirty_up = false;
    node
      .diagnostics
      .retain(|diagnostic| diagnostic.kind != ErrorKind::SymbolNotExported);
    node.diagnostics.extend(missing);

    let forwards = node
      .dependency
      .symbols
      .as_ref()
      .is_some_and(|symbols| symbols.values().any(|symbol| symbol.is_weak));

    if !changed || !forwards {
      continue;
    }

    // Importers of the re-exporting asset resolve through this dependency
    if let Some(source) = asset_graph.source_asset(dependency_id) {
      for importer in asset_graph.incoming_dependencies(source) {
        if let Some(node) = asset_graph.get_dependency_node_mut(importer) {
          node.used_symbols_up_dirty_up = true;
        }
        if let Some(index) = position.get(&importer) {
          dirty.insert((*index, importer));
        }
      }
    }
  }

  for asset_id in asset_graph.asset_node_ids() {
    if let Some(node) = asset_graph.get_asset_node_mut(asset_id) {
      node.used_symbols_up_dirty = false;
    }
  }
}

enum Lookup {
  Found(Option<ResolvedSymbol>),
  Unknown,
  Missing,
}

/// Resolve each symbol a dependency demands to its declaration
fn resolve_used_symbols(
  asset_graph: &AssetGraph,
  dependency_id: NodeId,
  strict: bool,
) -> (BTreeMap<String, Option<ResolvedSymbol>>, Vec<Diagnostic>) {
  let mut used_symbols_up = BTreeMap::new();
  let mut missing = Vec::new();

  let Some(node) = asset_graph.get_dependency_node(dependency_id) else {
    return (used_symbols_up, missing);
  };

  if node.excluded {
    return (used_symbols_up, missing);
  }

  let Some(target_id) = asset_graph.resolved_asset(dependency_id) else {
    return (used_symbols_up, missing);
  };

  let Some(target) = asset_graph.get_asset_node(target_id) else {
    return (used_symbols_up, missing);
  };

  let routed = node.dependency.has_namespace_reexport();

  for symbol in &node.used_symbols_down {
    if symbol == CHAR_STAR {
      used_symbols_up.insert(CHAR_STAR.to_string(), None);
      for name in target.asset.exported_symbol_names() {
        if let Lookup::Found(resolved) = lookup_symbol(asset_graph, target_id, name) {
          used_symbols_up.insert(name.clone(), resolved);
        }
      }
      continue;
    }

    match lookup_symbol(asset_graph, target_id, symbol) {
      Lookup::Found(resolved) => {
        used_symbols_up.insert(symbol.clone(), resolved);
      }
      Lookup::Unknown => {
        used_symbols_up.insert(symbol.clone(), None);
      }
      // Names routed through `export *` may be provided by a sibling re-export instead
      Lookup::Missing if routed => {}
      // Only declared exports are used, the import is reported instead
      Lookup::Missing => {
        if !node.deferred {
          missing.push(symbol_not_exported(asset_graph, dependency_id, target_id, symbol, strict));
        }
      }
    }
  }

  (used_symbols_up, missing)
}

fn lookup_symbol(asset_graph: &AssetGraph, asset_id: NodeId, symbol: &str) -> Lookup {
  let Some(asset_node) = asset_graph.get_asset_node(asset_id) else {
    return Lookup::Unknown;
  };

  let Some(symbols) = &asset_node.asset.symbols else {
    return Lookup::Unknown;
  };

  if let Some(asset_symbol) = symbols.get(symbol) {
    if !asset_symbol.is_weak {
      return Lookup::Found(Some(ResolvedSymbol {
        asset: asset_node.asset.id.clone(),
        symbol: symbol.to_string(),
      }));
    }

    // A named re-export resolves through the dependency that imports its local
    for dependency_id in asset_graph.outgoing_dependencies(asset_id) {
      let Some(node) = asset_graph.get_dependency_node(dependency_id) else {
        continue;
      };

      let imported = node.dependency.symbols.iter().flatten().find(|(_, s)| {
        s.is_weak && !s.is_namespace_reexport() && s.local == asset_symbol.local
      });

      if let Some((imported, _)) = imported {
        return Lookup::Found(node.used_symbols_up.get(imported).cloned().flatten());
      }
    }

    return Lookup::Found(None);
  }

  let mut unknown = false;
  for dependency_id in asset_graph.outgoing_dependencies(asset_id) {
    let Some(node) = asset_graph.get_dependency_node(dependency_id) else {
      continue;
    };

    if !node.dependency.has_namespace_reexport() {
      continue;
    }

    if let Some(resolved) = node.used_symbols_up.get(symbol) {
      return Lookup::Found(resolved.clone());
    }

    let settled = !node.deferred
      && node.complete
      && asset_graph
        .resolved_asset(dependency_id)
        .and_then(|target| asset_graph.get_asset_node(target))
        .is_some_and(|target| target.asset.symbols.is_some());

    if !node.excluded && !settled {
      unknown = true;
    }
  }

  if unknown {
    Lookup::Unknown
  } else {
    Lookup::Missing
  }
}

fn symbol_not_exported(
  asset_graph: &AssetGraph,
  dependency_id: NodeId,
  target_id: NodeId,
  symbol: &str,
  strict: bool,
) -> Diagnostic {
  let target_path = asset_graph
    .get_asset_node(target_id)
    .map(|node| node.asset.file_path.display().to_string())
    .unwrap_or_default();

  let dependency = asset_graph
    .get_dependency_node(dependency_id)
    .map(|node| node.dependency.clone());

  let code_frames = dependency
    .as_ref()
    .and_then(|dependency| dependency.loc.clone())
    .map(|loc| {
      vec![CodeFrame {
        file_path: Some(loc.file_path.clone()),
        code: None,
        code_highlights: vec![CodeHighlight {
          message: Some(String::from("imported here")),
          start: loc.start,
          end: loc.end,
        }],
      }]
    })
    .unwrap_or_default();

  let severity = if strict {
    DiagnosticSeverity::Error
  } else {
    DiagnosticSeverity::Warning
  };

  diagnostic_error!(DiagnosticBuilder::default()
    .kind(ErrorKind::SymbolNotExported)
    .severity(severity)
    .code_frames(code_frames)
    .message(format!("{} does not export '{}'", target_path, symbol)))
}

/// Defer dependencies whose resolved asset is free of side effects and provides nothing that is
/// used, and undefer the ones that are used again
fn update_deferral(asset_graph: &mut AssetGraph, enabled: bool) -> (Vec<NodeId>, Vec<NodeId>) {
  let mut deferred = Vec::new();
  let mut undeferred = Vec::new();

  for dependency_id in asset_graph.dependency_node_ids() {
    let target_id = asset_graph.resolved_asset(dependency_id);
    let target_side_effects = target_id
      .and_then(|id| asset_graph.get_asset_node(id))
      .map(|node| node.asset.side_effects);

    let Some(node) = asset_graph.get_dependency_node_mut(dependency_id) else {
      continue;
    };

    if node.dependency.is_entry || node.excluded {
      continue;
    }

    let imports_missing = node
      .diagnostics
      .iter()
      .any(|diagnostic| diagnostic.kind == ErrorKind::SymbolNotExported);

    let should_defer = enabled
      && node.dependency.symbols.is_some()
      && !imports_missing
      && match target_side_effects {
        Some(side_effects) => !side_effects && node.used_symbols_up.is_empty(),
        // Deferred before its asset was ever transformed
        None => node.deferred && node.used_symbols_down.is_empty(),
      };

    if should_defer == node.deferred {
      continue;
    }

    node.deferred = should_defer;
    tracing::debug!(
      specifier = %node.dependency.specifier,
      deferred = should_defer,
      "Updated dependency deferral"
    );

    if should_defer {
      deferred.push(dependency_id);
    } else {
      undeferred.push(dependency_id);
    }

    if let Some(target_id) = target_id {
      if let Some(target) = asset_graph.get_asset_node_mut(target_id) {
        target.used_symbols_down_dirty = true;
      }
    }
  }

  (deferred, undeferred)
}
