use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use petgraph::graph::NodeIndex;
use petgraph::visit::Dfs;
use petgraph::visit::EdgeRef;
use petgraph::visit::Reversed;
use petgraph::Direction;
use quarry_core::cache::ContentStoreRef;
use quarry_core::types::Invalidation;
use quarry_core::types::QuarryOptions;
use quarry_filesystem::FileSystem;
use quarry_filesystem::FileSystemRef;
use serde::Serialize;
use tokio::sync::watch;
use tokio::sync::RwLock;
use xxhash_rust::xxh3::xxh3_64;

use crate::plugins::PluginsRef;
use crate::requests::RequestResult;
use crate::QuarryError;
use crate::WatchEvent;
use crate::WatchEvents;

use super::AbortSignal;
use super::PendingRequest;
use super::Request;
use super::RequestEdgeType;
use super::RequestGraph;
use super::RequestId;
use super::RequestNode;
use super::RequestStart;
use super::ResultAndInvalidations;
use super::RunRequestContext;

/// [`RequestTracker`] runs quarry work items and constructs a graph of their dependencies.
///
/// Whenever a [`Request`] implementation needs to get the result of another piece of work, it'll
/// make a call into [`RequestTracker`] through its [`RunRequestContext`] abstraction. The request
/// tracker will verify if the piece of work has been completed and return its result. If the work
/// has not been seen yet, or was invalidated, it runs.
///
/// By asking for the result of a piece of work a request is creating an edge between itself and
/// that sub-request, so invalidating the sub-request also invalidates the request.
pub struct RequestTracker {
  abort_signal: AbortSignal,
  file_system: FileSystemRef,
  options: Arc<QuarryOptions>,
  plugins: PluginsRef,
  store: ContentStoreRef,
  state: Arc<RwLock<RequestTrackerState>>,
}

impl RequestTracker {
  pub fn new(
    file_system: FileSystemRef,
    options: Arc<QuarryOptions>,
    plugins: PluginsRef,
    store: ContentStoreRef,
  ) -> Self {
    RequestTracker {
      abort_signal: AbortSignal::default(),
      file_system,
      options,
      plugins,
      store,
      state: Arc::new(RwLock::new(RequestTrackerState::new())),
    }
  }

  /// Run a request that has no parent. Return the result.
  ///
  /// Requests subscribed to [`Invalidation::Always`], and requests whose sub-requests failed,
  /// are invalidated first so they run again.
  ///
  /// ## Multi-threading
  /// Sub-requests may be queued from this initial `request` using
  /// [`RunRequestContext::queue_request`]. They run as separate tasks on the tokio runtime and
  /// wait on their own sub-requests without blocking a worker thread.
  pub async fn run_request(&self, request: impl Request) -> anyhow::Result<Arc<RequestResult>> {
    tracing::debug!(request = request.name(), "Running top level request");

    self.state.write().await.invalidate_always();

    self.context().run_request(request).await
  }

  fn context(&self) -> RunRequestContext {
    RunRequestContext::new(
      self.abort_signal.clone(),
      self.file_system.clone(),
      self.options.clone(),
      self.plugins.clone(),
      self.store.clone(),
      self.state.clone(),
    )
  }

  pub fn abort_signal(&self) -> &AbortSignal {
    &self.abort_signal
  }

  pub fn options(&self) -> &Arc<QuarryOptions> {
    &self.options
  }

  /// Invalidate the requests that read the files in `watch_events`, and their parents
  ///
  /// Updates to files whose content hash did not change are ignored. Returns whether anything
  /// needs to rebuild.
  #[tracing::instrument(level = "info", skip_all)]
  pub async fn respond_to_fs_events(&self, watch_events: WatchEvents) -> bool {
    tracing::info!("Responding to {} watch events", watch_events.len());

    let mut state = self.state.write().await;
    let mut need_rebuild = false;

    for event in watch_events.iter() {
      let path = event.path();
      let Some(recorded) = state.file_hashes.get(path).copied() else {
        continue;
      };

      let hash = hash_file(self.file_system.as_ref(), path);
      if matches!(event, WatchEvent::Update(_)) && recorded == hash {
        tracing::trace!(path = %path.display(), "Ignoring update without content changes");
        continue;
      }

      need_rebuild |= state.invalidate_file(path, hash);
    }

    need_rebuild
  }

  /// Re-hash every file a request read, invalidating the ones that changed
  ///
  /// Used between builds when no watcher reports changes.
  #[tracing::instrument(level = "info", skip_all)]
  pub async fn invalidate_changed_files(&self) -> bool {
    let mut state = self.state.write().await;

    let changed = state
      .file_hashes
      .iter()
      .filter_map(|(path, recorded)| {
        let hash = hash_file(self.file_system.as_ref(), path);
        (hash != *recorded).then(|| (path.clone(), hash))
      })
      .collect::<Vec<(PathBuf, Option<u64>)>>();

    let mut need_rebuild = false;
    for (path, hash) in changed {
      tracing::debug!(path = %path.display(), "File changed since the last build");
      need_rebuild |= state.invalidate_file(&path, hash);
    }

    need_rebuild
  }

  /// Replace the environment variables, invalidating requests that read a changed variable
  pub async fn update_env(&mut self, env: BTreeMap<String, String>) -> bool {
    let mut state = self.state.write().await;
    let mut need_rebuild = false;

    let changed = state
      .env_invalidations
      .iter()
      .filter(|(name, _)| self.options.env.get(*name) != env.get(*name))
      .map(|(_, node)| *node)
      .collect::<Vec<NodeIndex>>();

    for node in changed {
      need_rebuild |= state.invalidate(node);
    }

    let mut options = (*self.options).clone();
    options.env = env;
    self.options = Arc::new(options);

    need_rebuild
  }

  /// Replace the build options, invalidating requests that read a changed top-level option
  pub async fn update_options(&mut self, options: QuarryOptions) -> bool {
    let mut state = self.state.write().await;
    let mut need_rebuild = false;

    let changed = state
      .option_invalidations
      .iter()
      .filter(|(key, _)| self.options.option_value(key) != options.option_value(key))
      .map(|(_, node)| *node)
      .collect::<Vec<NodeIndex>>();

    for node in changed {
      need_rebuild |= state.invalidate(node);
    }

    self.options = Arc::new(options);

    need_rebuild
  }

  pub async fn request_stats(&self) -> RequestStats {
    self.state.read().await.stats.clone()
  }

  pub async fn reset_request_stats(&self) {
    self.state.write().await.stats = RequestStats::default();
  }
}

fn hash_file(fs: &dyn FileSystem, path: &Path) -> Option<u64> {
  fs.read(path).ok().map(|contents| xxh3_64(&contents))
}

/// How often each type of request ran, or was answered from the cache
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RequestStats(BTreeMap<String, RequestStat>);

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RequestStat {
  pub executed: usize,
  pub cached: usize,
}

impl RequestStats {
  pub fn executed(&self, name: &str) -> usize {
    self.0.get(name).map(|stat| stat.executed).unwrap_or_default()
  }

  pub fn cached(&self, name: &str) -> usize {
    self.0.get(name).map(|stat| stat.cached).unwrap_or_default()
  }

  fn record(&mut self, name: &str, cached: bool) {
    let stat = self.0.entry(name.to_string()).or_default();
    if cached {
      stat.cached += 1;
    } else {
      stat.executed += 1;
    }
  }
}

/// The request graph and its bookkeeping, shared by every running request
pub struct RequestTrackerState {
  graph: RequestGraph,
  root: NodeIndex,
  request_index: HashMap<RequestId, NodeIndex>,
  pending: HashMap<RequestId, PendingRequest>,
  file_invalidations: HashMap<PathBuf, NodeIndex>,
  /// Content hash of each subscribed file when it was last read, `None` when it did not exist
  file_hashes: HashMap<PathBuf, Option<u64>>,
  env_invalidations: HashMap<String, NodeIndex>,
  option_invalidations: HashMap<String, NodeIndex>,
  /// Requests that run again on every build
  always_invalid: HashSet<NodeIndex>,
  stats: RequestStats,
}

impl RequestTrackerState {
  fn new() -> Self {
    let mut graph = RequestGraph::default();
    let root = graph.add_node(RequestNode::Root);

    RequestTrackerState {
      graph,
      root,
      request_index: HashMap::new(),
      pending: HashMap::new(),
      file_invalidations: HashMap::new(),
      file_hashes: HashMap::new(),
      env_invalidations: HashMap::new(),
      option_invalidations: HashMap::new(),
      always_invalid: HashSet::new(),
      stats: RequestStats::default(),
    }
  }

  fn request_node(&mut self, request_id: RequestId) -> NodeIndex {
    *self
      .request_index
      .entry(request_id)
      .or_insert_with(|| self.graph.add_node(RequestNode::Incomplete(None)))
  }

  /// Create an edge between a parent request, or the root, and the target request
  fn link_request_to_parent(&mut self, request_id: RequestId, parent_request_id: Option<RequestId>) {
    let node = self.request_node(request_id);
    let parent = match parent_request_id {
      Some(parent_request_id) => self.request_node(parent_request_id),
      None => self.root,
    };

    if self.graph.find_edge(parent, node).is_none() {
      self.graph.add_edge(parent, node, RequestEdgeType::SubRequest);
    }
  }

  /// Decide whether a request runs, waits for a pending run, or uses its cached result
  pub(crate) fn begin_request(
    &mut self,
    parent_request_id: Option<RequestId>,
    request_id: RequestId,
    name: &str,
  ) -> RequestStart {
    self.link_request_to_parent(request_id, parent_request_id);

    if let Some(receiver) = self.pending.get(&request_id) {
      self.stats.record(name, true);
      return RequestStart::Pending(receiver.clone());
    }

    let node = self.request_node(request_id);
    if let RequestNode::Valid(result) = &self.graph[node] {
      self.stats.record(name, true);
      return RequestStart::Cached(result.clone());
    }

    self.stats.record(name, false);

    // The request re-records its sub-requests and subscriptions as it runs
    let stale_edges = self
      .graph
      .edges_directed(node, Direction::Outgoing)
      .map(|edge| edge.id())
      .collect::<Vec<_>>();
    for edge in stale_edges {
      self.graph.remove_edge(edge);
    }
    self.always_invalid.remove(&node);

    let previous_result = self.graph[node].previous_result();
    self.graph[node] = RequestNode::Incomplete(previous_result.clone());

    let (sender, receiver) = watch::channel(None);
    self.pending.insert(request_id, receiver);

    RequestStart::Run {
      previous_result,
      sender,
    }
  }

  /// Once a request finishes, its result is stored under its [`RequestNode`] entry on the graph
  pub(crate) fn store_request(
    &mut self,
    request_id: RequestId,
    result: &Result<ResultAndInvalidations, QuarryError>,
    options: &QuarryOptions,
    fs: &dyn FileSystem,
  ) {
    self.pending.remove(&request_id);
    let node = self.request_node(request_id);

    let result = match result {
      Ok(result) => result,
      Err(error) => {
        tracing::debug!(request_id, %error, "Request failed");
        self.graph[node] = RequestNode::Error(error.clone());
        return;
      }
    };

    self.graph[node] = RequestNode::Valid(result.result.clone());

    for invalidation in result.invalidations.iter() {
      match invalidation {
        Invalidation::FileChange(path) if path.is_relative() => {
          tracing::warn!(
            path = %path.display(),
            "Cannot watch a relative path, the request will run on every build"
          );
          self.always_invalid.insert(node);
        }
        Invalidation::FileChange(path) => {
          let hash = hash_file(fs, path);
          let invalidation_node = *self
            .file_invalidations
            .entry(path.clone())
            .or_insert_with(|| self.graph.add_node(RequestNode::FileInvalidation));
          self.file_hashes.insert(path.clone(), hash);
          self.add_invalidation_edge(node, invalidation_node, RequestEdgeType::FileChangeInvalidation);
        }
        Invalidation::EnvChange(name) => {
          let invalidation_node = *self
            .env_invalidations
            .entry(name.clone())
            .or_insert_with(|| self.graph.add_node(RequestNode::EnvInvalidation));
          self.add_invalidation_edge(node, invalidation_node, RequestEdgeType::EnvChangeInvalidation);
        }
        Invalidation::OptionChange(key) => {
          if options.option_value(key).is_none() {
            tracing::warn!(key = %key, "Unknown option, the request will run on every build");
            self.always_invalid.insert(node);
            continue;
          }

          let invalidation_node = *self
            .option_invalidations
            .entry(key.clone())
            .or_insert_with(|| self.graph.add_node(RequestNode::OptionInvalidation));
          self.add_invalidation_edge(
            node,
            invalidation_node,
            RequestEdgeType::OptionChangeInvalidation,
          );
        }
        Invalidation::Always => {
          self.always_invalid.insert(node);
        }
      }
    }

    // A result built on top of a failed sub-request is never reused as is
    let failed_sub_request = self
      .graph
      .neighbors_directed(node, Direction::Outgoing)
      .any(|child| matches!(self.graph[child], RequestNode::Error(_)));
    if failed_sub_request {
      self.always_invalid.insert(node);
    }
  }

  fn add_invalidation_edge(&mut self, node: NodeIndex, invalidation: NodeIndex, edge: RequestEdgeType) {
    if self.graph.find_edge(node, invalidation).is_none() {
      self.graph.add_edge(node, invalidation, edge);
    }
  }

  pub(crate) fn is_valid(&self, request_id: RequestId) -> bool {
    self
      .request_index
      .get(&request_id)
      .is_some_and(|node| matches!(self.graph[*node], RequestNode::Valid(_)))
  }

  fn invalidate_file(&mut self, path: &Path, hash: Option<u64>) -> bool {
    self.file_hashes.insert(path.to_path_buf(), hash);
    match self.file_invalidations.get(path) {
      Some(node) => self.invalidate(*node),
      None => false,
    }
  }

  fn invalidate_always(&mut self) {
    let nodes = self.always_invalid.iter().copied().collect::<Vec<_>>();
    for node in nodes {
      self.invalidate(node);
    }
  }

  /// Mark `start` and every request that transitively depends on it as invalid
  fn invalidate(&mut self, start: NodeIndex) -> bool {
    let mut invalid_nodes = Vec::new();
    {
      let reverse_graph = Reversed(&self.graph);
      let mut dfs = Dfs::new(reverse_graph, start);

      while let Some(node_index) = dfs.next(reverse_graph) {
        invalid_nodes.push(node_index);
      }
    }

    let mut invalidated = false;
    for invalid_node in invalid_nodes {
      let replacement = match &self.graph[invalid_node] {
        RequestNode::Valid(result) => RequestNode::Invalid(Some(result.clone())),
        RequestNode::Error(_) => RequestNode::Invalid(None),
        RequestNode::Invalid(_) => {
          invalidated = true;
          continue;
        }
        _ => continue,
      };

      self.graph[invalid_node] = replacement;
      invalidated = true;
    }

    invalidated
  }
}
