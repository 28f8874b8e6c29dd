use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use bitflags::bitflags;
use petgraph::stable_graph::EdgeIndex;
use petgraph::stable_graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::as_variant_impl;
use crate::types::Asset;
use crate::types::AssetId;
use crate::types::Dependency;
use crate::types::Diagnostic;
use crate::types::Entry;

use super::DfsOptions;

pub type NodeId = NodeIndex;

const ROOT_CONTENT_KEY: &str = "@@root";

/// Where a used symbol is declared, once re-exports have been followed
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct ResolvedSymbol {
  pub asset: AssetId,
  pub symbol: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DependencyState {
  /// Not resolved yet, or waiting to be resolved again
  Pending,
  Resolved,
  Excluded,
  Deferred,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DependencyNode {
  pub dependency: Arc<Dependency>,

  /// Whether the dependency finished resolving and its target was transformed
  pub complete: bool,

  /// The id of the path request that last resolved this dependency
  pub corresponding_request: Option<u64>,

  pub deferred: bool,

  pub excluded: bool,

  pub has_deferred: bool,

  /// Symbols the importing asset demands from the resolved asset
  pub used_symbols_down: BTreeSet<String>,

  /// The demanded symbols the resolved asset provides, and where each one is declared
  ///
  /// `None` marks a symbol that could not be traced to a declaration, e.g. when it passes
  /// through an asset without static symbol information.
  pub used_symbols_up: BTreeMap<String, Option<ResolvedSymbol>>,

  pub used_symbols_down_dirty: bool,

  pub used_symbols_up_dirty_down: bool,

  pub used_symbols_up_dirty_up: bool,

  pub diagnostics: Vec<Diagnostic>,
}

impl DependencyNode {
  pub fn new(dependency: Arc<Dependency>) -> Self {
    DependencyNode {
      dependency,
      complete: false,
      corresponding_request: None,
      deferred: false,
      excluded: false,
      has_deferred: false,
      used_symbols_down: BTreeSet::new(),
      used_symbols_up: BTreeMap::new(),
      used_symbols_down_dirty: true,
      used_symbols_up_dirty_down: true,
      used_symbols_up_dirty_up: true,
      diagnostics: Vec::new(),
    }
  }

  pub fn state(&self) -> DependencyState {
    if self.excluded {
      DependencyState::Excluded
    } else if self.deferred {
      DependencyState::Deferred
    } else if self.complete {
      DependencyState::Resolved
    } else {
      DependencyState::Pending
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssetNode {
  pub asset: Arc<Asset>,

  /// The id of the asset request that produced the asset
  pub corresponding_request: Option<u64>,

  /// Exports of the asset that importers use
  pub used_symbols: BTreeSet<String>,

  pub has_deferred: bool,

  pub used_symbols_down_dirty: bool,

  pub used_symbols_up_dirty: bool,

  /// Warnings reported while transforming the asset
  pub diagnostics: Vec<Diagnostic>,
}

impl AssetNode {
  pub fn new(asset: Arc<Asset>) -> Self {
    AssetNode {
      asset,
      corresponding_request: None,
      used_symbols: BTreeSet::new(),
      has_deferred: false,
      used_symbols_down_dirty: true,
      used_symbols_up_dirty: true,
      diagnostics: Vec::new(),
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum AssetGraphNode {
  Root,
  EntrySpecifier(String),
  EntryFile(Entry),
  Dependency(DependencyNode),
  Asset(AssetNode),
}

as_variant_impl!(AssetGraphNode, as_dependency, Dependency, DependencyNode);
as_variant_impl!(AssetGraphNode, as_asset, Asset, AssetNode);
as_variant_impl!(AssetGraphNode, as_entry_file, EntryFile, Entry);

impl AssetGraphNode {
  /// The key that identifies the node across builds
  pub fn content_key(&self) -> String {
    match self {
      AssetGraphNode::Root => ROOT_CONTENT_KEY.to_string(),
      AssetGraphNode::EntrySpecifier(specifier) => format!("entry_specifier:{}", specifier),
      AssetGraphNode::EntryFile(entry) => format!(
        "entry_file:{}:{}",
        entry.file_path.display(),
        entry.target.as_deref().unwrap_or_default()
      ),
      AssetGraphNode::Dependency(node) => node.dependency.id.clone(),
      AssetGraphNode::Asset(node) => node.asset.id.clone(),
    }
  }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AssetGraphEdgeType {
  /// Root to entry specifier, entry specifier to entry file, entry file to entry dependency
  Entry,
  /// An asset declares a dependency
  Dependency,
  /// A dependency resolves to an asset
  Resolution,
}

impl AssetGraphEdgeType {
  fn filter(&self) -> EdgeFilter {
    match self {
      AssetGraphEdgeType::Entry => EdgeFilter::ENTRY,
      AssetGraphEdgeType::Dependency => EdgeFilter::DEPENDENCY,
      AssetGraphEdgeType::Resolution => EdgeFilter::RESOLUTION,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AssetGraphEdge {
  pub edge_type: AssetGraphEdgeType,
  /// Insertion order, which is the order children are visited in
  order: u64,
}

bitflags! {
  /// Selects which edges traversals follow
  #[derive(Clone, Copy, Debug, Eq, PartialEq)]
  pub struct EdgeFilter: u8 {
    const ENTRY = 1;
    const DEPENDENCY = 1 << 1;
    const RESOLUTION = 1 << 2;
    /// Also follow resolution edges out of deferred dependencies
    const DEFERRED = 1 << 3;

    const ACTIVE = Self::ENTRY.bits() | Self::DEPENDENCY.bits() | Self::RESOLUTION.bits();
    const ALL = Self::ACTIVE.bits() | Self::DEFERRED.bits();
  }
}

/// The graph of entries, dependencies and assets of a build
///
/// Nodes live in an arena addressed by `NodeId`. Every path from the root alternates between
/// dependency and asset nodes once past the entries, and children are always visited in the
/// order their edges were added.
#[derive(Clone, Debug)]
pub struct AssetGraph {
  graph: StableDiGraph<AssetGraphNode, AssetGraphEdge>,
  content_key_to_node_id: HashMap<String, NodeId>,
  root_node_id: NodeId,
  next_edge_order: u64,
}

impl Default for AssetGraph {
  fn default() -> Self {
    Self::new()
  }
}

impl AssetGraph {
  pub fn new() -> Self {
    let mut graph = StableDiGraph::new();
    let root_node_id = graph.add_node(AssetGraphNode::Root);

    let mut content_key_to_node_id = HashMap::new();
    content_key_to_node_id.insert(ROOT_CONTENT_KEY.to_string(), root_node_id);

    AssetGraph {
      graph,
      content_key_to_node_id,
      root_node_id,
      next_edge_order: 0,
    }
  }

  /// Rebuild a graph from its nodes and its edges in insertion order
  ///
  /// Edges address nodes by their position in `nodes`. Returns `None` when there is no root or an
  /// edge points outside `nodes`.
  pub fn from_parts(
    nodes: Vec<AssetGraphNode>,
    edges: Vec<(usize, usize, AssetGraphEdgeType)>,
  ) -> Option<AssetGraph> {
    let mut graph = StableDiGraph::with_capacity(nodes.len(), edges.len());
    let mut content_key_to_node_id = HashMap::new();
    let mut root_node_id = None;
    let mut ids = Vec::with_capacity(nodes.len());

    for node in nodes {
      let is_root = matches!(node, AssetGraphNode::Root);
      let content_key = node.content_key();
      let id = graph.add_node(node);
      if is_root {
        root_node_id.get_or_insert(id);
      }
      content_key_to_node_id.insert(content_key, id);
      ids.push(id);
    }

    let mut asset_graph = AssetGraph {
      graph,
      content_key_to_node_id,
      root_node_id: root_node_id?,
      next_edge_order: 0,
    };

    for (from, to, edge_type) in edges {
      asset_graph.add_edge(*ids.get(from)?, *ids.get(to)?, edge_type);
    }

    Some(asset_graph)
  }

  pub fn root_node(&self) -> NodeId {
    self.root_node_id
  }

  pub fn node_count(&self) -> usize {
    self.graph.node_count()
  }

  pub fn get_node(&self, id: NodeId) -> Option<&AssetGraphNode> {
    self.graph.node_weight(id)
  }

  pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut AssetGraphNode> {
    self.graph.node_weight_mut(id)
  }

  pub fn get_node_id_by_content_key(&self, content_key: &str) -> Option<NodeId> {
    self.content_key_to_node_id.get(content_key).copied()
  }

  pub fn get_dependency_node(&self, id: NodeId) -> Option<&DependencyNode> {
    self.get_node(id).and_then(AssetGraphNode::as_dependency)
  }

  pub fn get_dependency_node_mut(&mut self, id: NodeId) -> Option<&mut DependencyNode> {
    match self.graph.node_weight_mut(id) {
      Some(AssetGraphNode::Dependency(node)) => Some(node),
      _ => None,
    }
  }

  pub fn get_asset_node(&self, id: NodeId) -> Option<&AssetNode> {
    self.get_node(id).and_then(AssetGraphNode::as_asset)
  }

  pub fn get_asset_node_mut(&mut self, id: NodeId) -> Option<&mut AssetNode> {
    match self.graph.node_weight_mut(id) {
      Some(AssetGraphNode::Asset(node)) => Some(node),
      _ => None,
    }
  }

  /// All nodes in id order
  pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &AssetGraphNode)> {
    self
      .graph
      .node_indices()
      .filter_map(|id| self.graph.node_weight(id).map(|node| (id, node)))
  }

  pub fn dependency_node_ids(&self) -> Vec<NodeId> {
    self
      .nodes()
      .filter(|(_, node)| matches!(node, AssetGraphNode::Dependency(_)))
      .map(|(id, _)| id)
      .collect()
  }

  pub fn asset_node_ids(&self) -> Vec<NodeId> {
    self
      .nodes()
      .filter(|(_, node)| matches!(node, AssetGraphNode::Asset(_)))
      .map(|(id, _)| id)
      .collect()
  }

  /// All edges in insertion order
  pub fn edges(&self) -> Vec<(NodeId, NodeId, AssetGraphEdgeType)> {
    let mut edges = self
      .graph
      .edge_indices()
      .filter_map(|edge| {
        let (from, to) = self.graph.edge_endpoints(edge)?;
        let weight = self.graph.edge_weight(edge)?;
        Some((weight.order, from, to, weight.edge_type))
      })
      .collect::<Vec<_>>();
    edges.sort_by_key(|(order, ..)| *order);
    edges
      .into_iter()
      .map(|(_, from, to, edge_type)| (from, to, edge_type))
      .collect()
  }

  /// Insert a node, or replace the payload of the node with the same content key
  fn upsert_node(&mut self, node: AssetGraphNode) -> NodeId {
    let content_key = node.content_key();
    if let Some(id) = self.content_key_to_node_id.get(&content_key) {
      if let Some(existing) = self.graph.node_weight_mut(*id) {
        *existing = node;
      }
      return *id;
    }

    let id = self.graph.add_node(node);
    self.content_key_to_node_id.insert(content_key, id);
    id
  }

  /// Add an edge unless an edge of the same type already connects the nodes
  pub fn add_edge(&mut self, from: NodeId, to: NodeId, edge_type: AssetGraphEdgeType) {
    let exists = self
      .graph
      .edges_connecting(from, to)
      .any(|edge| edge.weight().edge_type == edge_type);
    if exists {
      return;
    }

    let order = self.next_edge_order;
    self.next_edge_order += 1;
    self
      .graph
      .add_edge(from, to, AssetGraphEdge { edge_type, order });
  }

  fn remove_outgoing_edges(&mut self, from: NodeId, edge_type: AssetGraphEdgeType) {
    let edges = self
      .graph
      .edges_directed(from, Direction::Outgoing)
      .filter(|edge| edge.weight().edge_type == edge_type)
      .map(|edge| edge.id())
      .collect::<Vec<EdgeIndex>>();

    for edge in edges {
      self.graph.remove_edge(edge);
    }
  }

  pub fn add_entry_specifier(&mut self, specifier: String) -> NodeId {
    let content_key = AssetGraphNode::EntrySpecifier(specifier.clone()).content_key();
    let id = match self.get_node_id_by_content_key(&content_key) {
      Some(id) => id,
      None => self.upsert_node(AssetGraphNode::EntrySpecifier(specifier)),
    };

    self.add_edge(self.root_node_id, id, AssetGraphEdgeType::Entry);
    id
  }

  /// Disconnect entry specifiers that are no longer part of the build
  ///
  /// Their subtrees are left for `remove_unreachable`.
  pub fn retain_entry_specifiers(&mut self, specifiers: &[String]) {
    let stale = self
      .graph
      .edges_directed(self.root_node_id, Direction::Outgoing)
      .filter(|edge| match &self.graph[edge.target()] {
        AssetGraphNode::EntrySpecifier(specifier) => !specifiers.contains(specifier),
        _ => false,
      })
      .map(|edge| edge.id())
      .collect::<Vec<EdgeIndex>>();

    for edge in stale {
      self.graph.remove_edge(edge);
    }
  }

  /// Replace the entry files of an entry specifier
  pub fn clear_entry_files(&mut self, entry_specifier_id: NodeId) {
    self.remove_outgoing_edges(entry_specifier_id, AssetGraphEdgeType::Entry);
  }

  pub fn add_entry_file(&mut self, entry_specifier_id: NodeId, entry: Entry) -> NodeId {
    let id = self.upsert_node(AssetGraphNode::EntryFile(entry));
    self.add_edge(entry_specifier_id, id, AssetGraphEdgeType::Entry);
    id
  }

  /// Add the dependency connecting an entry file to a target
  ///
  /// Entry dependencies demand the symbols they declare, or everything when they declare none.
  pub fn add_entry_dependency(&mut self, entry_file_id: NodeId, dependency: Dependency) -> NodeId {
    let id = self.upsert_dependency(dependency);
    self.add_edge(entry_file_id, id, AssetGraphEdgeType::Entry);

    if let Some(node) = self.get_dependency_node_mut(id) {
      node.used_symbols_down = entry_demand(&node.dependency);
    }

    id
  }

  /// Insert a dependency node, reusing the existing node (and its symbol state) when one with the
  /// same id already exists
  fn upsert_dependency(&mut self, dependency: Dependency) -> NodeId {
    if let Some(id) = self.get_node_id_by_content_key(&dependency.id) {
      if let Some(node) = self.get_dependency_node_mut(id) {
        if *node.dependency != dependency {
          if node.dependency.symbols != dependency.symbols {
            node.used_symbols_down_dirty = true;
            node.used_symbols_up_dirty_up = true;
          }
          node.dependency = Arc::new(dependency);
        }
        return id;
      }
    }

    self.upsert_node(AssetGraphNode::Dependency(DependencyNode::new(Arc::new(
      dependency,
    ))))
  }

  /// Insert an asset, or replace the record of the asset with the same id
  ///
  /// A replaced asset keeps its graph state. It is only marked dirty for symbol propagation when
  /// the record changed.
  pub fn add_asset(&mut self, asset: Arc<Asset>, corresponding_request: Option<u64>) -> NodeId {
    if let Some(id) = self.get_node_id_by_content_key(&asset.id) {
      if let Some(node) = self.get_asset_node_mut(id) {
        if *node.asset != *asset {
          if node.asset.symbols != asset.symbols {
            node.used_symbols_up_dirty = true;
          }
          node.used_symbols_down_dirty = true;
        }
        node.asset = asset;
        node.corresponding_request = corresponding_request;
        return id;
      }
    }

    let mut node = AssetNode::new(asset);
    node.corresponding_request = corresponding_request;
    self.upsert_node(AssetGraphNode::Asset(node))
  }

  /// Replace the dependencies of an asset with `dependencies`, in order
  ///
  /// Dependencies that survive a re-transform keep their node. Ones that are no longer declared
  /// are disconnected and collected by `remove_unreachable`.
  pub fn set_asset_dependencies(
    &mut self,
    asset_id: NodeId,
    dependencies: impl IntoIterator<Item = Dependency>,
  ) -> Vec<NodeId> {
    let previous = self.outgoing_dependencies(asset_id);
    self.remove_outgoing_edges(asset_id, AssetGraphEdgeType::Dependency);

    let mut ids = Vec::new();
    for dependency in dependencies {
      let id = self.upsert_dependency(dependency);
      self.add_edge(asset_id, id, AssetGraphEdgeType::Dependency);
      ids.push(id);
    }

    // Changed dependency records dirty themselves in `upsert_dependency`
    if self.outgoing_dependencies(asset_id) != previous {
      if let Some(node) = self.get_asset_node_mut(asset_id) {
        node.used_symbols_down_dirty = true;
      }
    }

    ids
  }

  /// Point a dependency at the asset it resolves to, replacing any previous resolution
  pub fn resolve_dependency(&mut self, dependency_id: NodeId, asset_id: NodeId) {
    let previous = self.resolved_asset(dependency_id);
    self.remove_outgoing_edges(dependency_id, AssetGraphEdgeType::Resolution);
    self.add_edge(dependency_id, asset_id, AssetGraphEdgeType::Resolution);

    if let Some(node) = self.get_dependency_node_mut(dependency_id) {
      node.complete = true;
      node.excluded = false;
      node.diagnostics.clear();
      if previous != Some(asset_id) {
        node.used_symbols_up_dirty_up = true;
      }
    }

    if previous != Some(asset_id) {
      if let Some(node) = self.get_asset_node_mut(asset_id) {
        node.used_symbols_down_dirty = true;
      }
    }
  }

  /// Mark a dependency as intentionally left out of the graph
  pub fn exclude_dependency(&mut self, dependency_id: NodeId) {
    self.remove_outgoing_edges(dependency_id, AssetGraphEdgeType::Resolution);

    if let Some(node) = self.get_dependency_node_mut(dependency_id) {
      node.excluded = true;
      node.complete = true;
      node.used_symbols_up.clear();
    }
  }

  /// Record a failure on a dependency, leaving it to be retried on the next build
  pub fn fail_dependency(&mut self, dependency_id: NodeId, diagnostics: Vec<Diagnostic>) {
    if let Some(node) = self.get_dependency_node_mut(dependency_id) {
      node.complete = false;
      node.diagnostics = diagnostics;
    }
  }

  /// The asset a dependency resolves to
  pub fn resolved_asset(&self, dependency_id: NodeId) -> Option<NodeId> {
    self
      .graph
      .edges_directed(dependency_id, Direction::Outgoing)
      .find(|edge| edge.weight().edge_type == AssetGraphEdgeType::Resolution)
      .map(|edge| edge.target())
  }

  /// The dependencies of an asset in declaration order
  pub fn outgoing_dependencies(&self, asset_id: NodeId) -> Vec<NodeId> {
    self.get_node_ids_connected_from(asset_id, EdgeFilter::DEPENDENCY)
  }

  /// The dependencies that resolve to an asset, including deferred ones
  pub fn incoming_dependencies(&self, asset_id: NodeId) -> Vec<NodeId> {
    self.get_node_ids_connected_to(asset_id, EdgeFilter::RESOLUTION | EdgeFilter::DEFERRED)
  }

  /// The asset that declares a dependency, `None` for entry dependencies
  pub fn source_asset(&self, dependency_id: NodeId) -> Option<NodeId> {
    self
      .get_node_ids_connected_to(dependency_id, EdgeFilter::DEPENDENCY)
      .into_iter()
      .next()
  }

  fn is_edge_followed(&self, from: NodeId, edge: &AssetGraphEdge, filter: EdgeFilter) -> bool {
    if !filter.contains(edge.edge_type.filter()) {
      return false;
    }

    if edge.edge_type == AssetGraphEdgeType::Resolution && !filter.contains(EdgeFilter::DEFERRED) {
      return !self
        .get_dependency_node(from)
        .is_some_and(|node| node.deferred || node.excluded);
    }

    true
  }

  /// Children of a node in edge insertion order
  pub fn get_node_ids_connected_from(&self, id: NodeId, filter: EdgeFilter) -> Vec<NodeId> {
    let mut edges = self
      .graph
      .edges_directed(id, Direction::Outgoing)
      .filter(|edge| self.is_edge_followed(id, edge.weight(), filter))
      .map(|edge| (edge.weight().order, edge.target()))
      .collect::<Vec<_>>();
    edges.sort_by_key(|(order, _)| *order);
    edges.into_iter().map(|(_, target)| target).collect()
  }

  /// Parents of a node in edge insertion order
  pub fn get_node_ids_connected_to(&self, id: NodeId, filter: EdgeFilter) -> Vec<NodeId> {
    let mut edges = self
      .graph
      .edges_directed(id, Direction::Incoming)
      .filter(|edge| self.is_edge_followed(edge.source(), edge.weight(), filter))
      .map(|edge| (edge.weight().order, edge.source()))
      .collect::<Vec<_>>();
    edges.sort_by_key(|(order, _)| *order);
    edges.into_iter().map(|(_, source)| source).collect()
  }

  /// Remove every node that can no longer be reached from the root
  ///
  /// Deferred subtrees are kept. Returns the number of removed nodes.
  pub fn remove_unreachable(&mut self) -> usize {
    let reachable = self
      .dfs(DfsOptions {
        start: self.root_node_id,
        filter: EdgeFilter::ALL,
        post_order: false,
      })
      .into_iter()
      .collect::<HashSet<_>>();

    let unreachable = self
      .graph
      .node_indices()
      .filter(|id| !reachable.contains(id))
      .collect::<Vec<_>>();

    for id in &unreachable {
      if let Some(node) = self.graph.remove_node(*id) {
        self.content_key_to_node_id.remove(&node.content_key());
      }
    }

    if !unreachable.is_empty() {
      tracing::debug!(removed = unreachable.len(), "Removed unreachable asset graph nodes");
    }

    unreachable.len()
  }

  /// A snapshot of the graph structure used for equality: every node reachable from the root in
  /// traversal order, with the content keys of its children
  fn structure(&self) -> Vec<(&AssetGraphNode, Vec<(String, AssetGraphEdgeType)>)> {
    self
      .dfs(DfsOptions {
        start: self.root_node_id,
        filter: EdgeFilter::ALL,
        post_order: false,
      })
      .into_iter()
      .filter_map(|id| {
        let node = self.graph.node_weight(id)?;
        let mut children = self
          .graph
          .edges_directed(id, Direction::Outgoing)
          .filter_map(|edge| {
            let child = self.graph.node_weight(edge.target())?;
            Some((edge.weight().order, child.content_key(), edge.weight().edge_type))
          })
          .collect::<Vec<_>>();
        children.sort_by_key(|(order, ..)| *order);

        Some((
          node,
          children
            .into_iter()
            .map(|(_, key, edge_type)| (key, edge_type))
            .collect(),
        ))
      })
      .collect()
  }
}

impl PartialEq for AssetGraph {
  fn eq(&self, other: &Self) -> bool {
    self.structure() == other.structure()
  }
}

/// The initial demand of an entry dependency
fn entry_demand(dependency: &Dependency) -> BTreeSet<String> {
  match &dependency.symbols {
    Some(symbols) => symbols.keys().cloned().collect(),
    None => BTreeSet::from([crate::types::CHAR_STAR.to_string()]),
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use pretty_assertions::assert_eq;

  use crate::asset_graph::test_utils::*;

  use super::*;

  #[test]
  fn test_new_graph_only_has_a_root() {
    let graph = AssetGraph::new();

    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.get_node(graph.root_node()), Some(&AssetGraphNode::Root));
    assert_eq!(graph.get_node_id_by_content_key("@@root"), Some(graph.root_node()));
  }

  #[test]
  fn test_removed_entries_are_collected() {
    let mut graph = AssetGraph::new();
    add_entry_with_asset(&mut graph, asset_fixture("/a.js", &[]));
    add_entry_with_asset(&mut graph, asset_fixture("/b.js", &[]));
    assert_eq!(graph.node_count(), 9);

    graph.retain_entry_specifiers(&[String::from("/a.js")]);

    assert_eq!(graph.remove_unreachable(), 4);
    assert!(graph.get_node_id_by_content_key("entry_specifier:/a.js").is_some());
    assert!(graph.get_node_id_by_content_key("entry_specifier:/b.js").is_none());
    assert!(graph.get_node_id_by_content_key(&asset_id("/b.js")).is_none());
  }

  #[test]
  fn test_entries_hang_off_the_root() {
    let mut graph = AssetGraph::new();
    let specifier = graph.add_entry_specifier(String::from("./index.js"));
    let entry = graph.add_entry_file(
      specifier,
      Entry {
        file_path: PathBuf::from("/index.js"),
        ..Entry::default()
      },
    );
    let dependency = graph.add_entry_dependency(entry, entry_dependency("/index.js"));

    assert_eq!(
      graph.get_node_ids_connected_from(graph.root_node(), EdgeFilter::ALL),
      vec![specifier]
    );
    assert_eq!(
      graph.get_node_ids_connected_from(entry, EdgeFilter::ALL),
      vec![dependency]
    );
    assert_eq!(graph.source_asset(dependency), None);
  }

  #[test]
  fn test_identical_dependencies_collapse_to_one_node() {
    let mut graph = AssetGraph::new();
    let (_, asset) = add_entry_with_asset(&mut graph, asset_fixture("/index.js", &[]));

    let first = dependency_from("/index.js", "./b.js", &["x"]);
    let second = dependency_from("/index.js", "./b.js", &["x"]);
    let ids = graph.set_asset_dependencies(asset, vec![first, second]);

    assert_eq!(ids[0], ids[1]);
    assert_eq!(graph.outgoing_dependencies(asset), vec![ids[0]]);
    assert_eq!(graph.dependency_node_ids().len(), 2);
  }

  #[test]
  fn test_retransformed_dependencies_keep_their_state() {
    let mut graph = AssetGraph::new();
    let (_, asset) = add_entry_with_asset(&mut graph, asset_fixture("/index.js", &[]));

    let ids = graph.set_asset_dependencies(asset, vec![dependency_from("/index.js", "./b.js", &["x"])]);
    graph
      .get_dependency_node_mut(ids[0])
      .unwrap()
      .used_symbols_down
      .insert(String::from("x"));

    let ids_after = graph.set_asset_dependencies(
      asset,
      vec![
        dependency_from("/index.js", "./c.js", &[]),
        dependency_from("/index.js", "./b.js", &["x"]),
      ],
    );

    assert_eq!(ids_after[1], ids[0]);
    assert_eq!(
      graph.get_dependency_node(ids[0]).unwrap().used_symbols_down,
      BTreeSet::from([String::from("x")])
    );
    assert_eq!(graph.outgoing_dependencies(asset), ids_after);
  }

  #[test]
  fn test_resolution_replaces_the_previous_target() {
    let mut graph = AssetGraph::new();
    let (_, asset) = add_entry_with_asset(&mut graph, asset_fixture("/index.js", &[]));
    let dependency = graph.set_asset_dependencies(asset, vec![dependency_from("/index.js", "./b.js", &[])])[0];

    let b = graph.add_asset(Arc::new(asset_fixture("/b.js", &[])), None);
    let c = graph.add_asset(Arc::new(asset_fixture("/c.js", &[])), None);
    graph.resolve_dependency(dependency, b);
    graph.resolve_dependency(dependency, c);

    assert_eq!(graph.resolved_asset(dependency), Some(c));
    assert_eq!(graph.incoming_dependencies(b), Vec::<NodeId>::new());
    assert_eq!(graph.incoming_dependencies(c), vec![dependency]);
    assert_eq!(
      graph.get_dependency_node(dependency).unwrap().state(),
      DependencyState::Resolved
    );
  }

  #[test]
  fn test_removes_unreachable_subtrees_including_cycles() {
    let mut graph = AssetGraph::new();
    let (_, a) = add_entry_with_asset(&mut graph, asset_fixture("/a.js", &[]));
    let a_to_b = graph.set_asset_dependencies(a, vec![dependency_from("/a.js", "./b.js", &[])])[0];
    let b = graph.add_asset(Arc::new(asset_fixture("/b.js", &[])), None);
    graph.resolve_dependency(a_to_b, b);
    let b_to_c = graph.set_asset_dependencies(b, vec![dependency_from("/b.js", "./c.js", &[])])[0];
    let c = graph.add_asset(Arc::new(asset_fixture("/c.js", &[])), None);
    graph.resolve_dependency(b_to_c, c);
    let c_to_b = graph.set_asset_dependencies(c, vec![dependency_from("/c.js", "./b.js", &[])])[0];
    graph.resolve_dependency(c_to_b, b);

    let before = graph.node_count();
    graph.set_asset_dependencies(a, Vec::new());
    let removed = graph.remove_unreachable();

    assert_eq!(removed, 5);
    assert_eq!(graph.node_count(), before - 5);
    assert_eq!(graph.get_node_id_by_content_key(&asset_fixture("/b.js", &[]).id), None);
  }

  #[test]
  fn test_deferred_subtrees_survive_collection() {
    let mut graph = AssetGraph::new();
    let (_, a) = add_entry_with_asset(&mut graph, asset_fixture("/a.js", &[]));
    let a_to_b = graph.set_asset_dependencies(a, vec![dependency_from("/a.js", "./b.js", &[])])[0];
    let b = graph.add_asset(Arc::new(asset_fixture("/b.js", &[])), None);
    graph.resolve_dependency(a_to_b, b);
    graph.get_dependency_node_mut(a_to_b).unwrap().deferred = true;

    assert_eq!(graph.remove_unreachable(), 0);
    assert_eq!(
      graph.get_node_ids_connected_from(a_to_b, EdgeFilter::ACTIVE),
      Vec::<NodeId>::new()
    );
    assert_eq!(
      graph.get_node_ids_connected_from(a_to_b, EdgeFilter::ALL),
      vec![b]
    );
  }

  #[test]
  fn test_equality_is_structural() {
    let build = || {
      let mut graph = AssetGraph::new();
      let (_, a) = add_entry_with_asset(&mut graph, asset_fixture("/a.js", &[]));
      let a_to_b = graph.set_asset_dependencies(a, vec![dependency_from("/a.js", "./b.js", &[])])[0];
      let b = graph.add_asset(Arc::new(asset_fixture("/b.js", &[])), None);
      graph.resolve_dependency(a_to_b, b);
      graph
    };

    let mut other = build();
    assert_eq!(build(), other);

    other.add_asset(Arc::new(asset_fixture("/c.js", &[])), None);
    // Unreachable nodes are not part of the structure
    assert_eq!(build(), other);

    let a = other.get_node_id_by_content_key(&asset_fixture("/a.js", &[]).id).unwrap();
    other.set_asset_dependencies(a, Vec::new());
    assert_ne!(build(), other);
  }
}
