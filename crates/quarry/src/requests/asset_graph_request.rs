use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use quarry_core::asset_graph::collect_diagnostics;
use quarry_core::asset_graph::propagate_requested_symbols;
use quarry_core::asset_graph::propagate_symbols;
use quarry_core::asset_graph::should_defer_dependency;
use quarry_core::asset_graph::AssetGraph;
use quarry_core::asset_graph::AssetGraphNode;
use quarry_core::asset_graph::EdgeFilter;
use quarry_core::asset_graph::NodeId;
use quarry_core::asset_graph::TraversalAction;
use quarry_core::hash::hash_bytes;
use quarry_core::types::Dependency;
use quarry_core::types::Diagnostic;
use quarry_core::types::Invalidation;
use quarry_core::wire;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::request_tracker::Request;
use crate::request_tracker::RequestId;
use crate::request_tracker::RequestResultSender;
use crate::request_tracker::ResultAndInvalidations;
use crate::request_tracker::RunRequestContext;
use crate::request_tracker::RunRequestError;
use crate::QuarryError;

use super::AssetRequest;
use super::AssetRequestOutput;
use super::EntryRequest;
use super::EntryRequestOutput;
use super::PathRequest;
use super::PathRequestOutput;
use super::RequestResult;

type ResultReceiver = UnboundedReceiver<(RequestId, anyhow::Result<Arc<RequestResult>>)>;

/// The AssetGraphRequest is in charge of building the AssetGraph
///
/// In doing so, it kicks off the EntryRequest, PathRequest and AssetRequests. A rebuild starts
/// from the previous graph and walks it again; unchanged sub-requests come back from the request
/// cache, so only invalidated work runs.
#[derive(Debug, Hash)]
pub struct AssetGraphRequest {}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssetGraphRequestOutput {
  pub graph: AssetGraph,

  /// Errors on nodes required by an entry
  pub errors: Vec<Diagnostic>,

  /// Warnings, and errors behind optional dependencies
  pub warnings: Vec<Diagnostic>,

  /// Whether the build stopped early because it was aborted
  pub aborted: bool,
}

#[async_trait]
impl Request for AssetGraphRequest {
  #[tracing::instrument(level = "info", skip_all)]
  async fn run(
    &self,
    request_context: RunRequestContext,
  ) -> Result<ResultAndInvalidations, RunRequestError> {
    let builder = AssetGraphBuilder::new(request_context, self.id());

    builder.build().await
  }
}

/// Where the persisted graph of a request is looked up
fn head_path(cache_dir: &Path, request_id: RequestId) -> PathBuf {
  cache_dir.join(format!("{:016x}.head", request_id))
}

/// Load the graph persisted by a previous process, if any
///
/// Blobs are write-once in the store, so the graph is stored under its content hash and a head
/// file points at the latest one.
fn load_persisted_graph(
  request_context: &RunRequestContext,
  request_id: RequestId,
) -> Option<AssetGraph> {
  let cache_dir = request_context.options.cache_dir.as_ref()?;
  let head = head_path(cache_dir, request_id);
  let fs = request_context.file_system();

  if !fs.is_file(&head) {
    return None;
  }

  let key = match fs.read_to_string(&head) {
    Ok(key) => key.trim().to_string(),
    Err(error) => {
      tracing::warn!("Unable to read {}: {}", head.display(), error);
      return None;
    }
  };

  let graph = request_context
    .store()
    .get(&key)
    .map_err(anyhow::Error::from)
    .and_then(|bytes| wire::decode::<AssetGraph>(&bytes).map_err(anyhow::Error::from));

  match graph {
    Ok(graph) => {
      tracing::info!(key = %key, "Loaded persisted asset graph");
      Some(graph)
    }
    Err(error) => {
      tracing::warn!(key = %key, "Cache corruption, ignoring persisted asset graph: {error:#}");
      None
    }
  }
}

struct AssetGraphBuilder {
  request_id: RequestId,
  graph: AssetGraph,
  request_context: RunRequestContext,
  sender: RequestResultSender,
  receiver: ResultReceiver,
  work_count: usize,
  aborted: bool,
  errors: Vec<Diagnostic>,
  entry_requests: HashMap<RequestId, NodeId>,
  path_requests: HashMap<RequestId, NodeId>,
  scheduled: HashSet<NodeId>,
  visited_assets: HashSet<RequestId>,
  waiting_asset_requests: HashMap<RequestId, Vec<NodeId>>,
  completed_assets: HashMap<RequestId, NodeId>,
  failed_assets: HashMap<RequestId, Vec<Diagnostic>>,
}

impl AssetGraphBuilder {
  fn new(request_context: RunRequestContext, request_id: RequestId) -> Self {
    let (sender, receiver) = unbounded_channel();

    let graph = match request_context
      .previous_result()
      .and_then(|result| result.as_asset_graph())
    {
      Some(previous) => previous.graph.clone(),
      None => load_persisted_graph(&request_context, request_id).unwrap_or_default(),
    };

    AssetGraphBuilder {
      request_id,
      graph,
      request_context,
      sender,
      receiver,
      work_count: 0,
      aborted: false,
      errors: Vec::new(),
      entry_requests: HashMap::new(),
      path_requests: HashMap::new(),
      scheduled: HashSet::new(),
      visited_assets: HashSet::new(),
      waiting_asset_requests: HashMap::new(),
      completed_assets: HashMap::new(),
      failed_assets: HashMap::new(),
    }
  }

  async fn build(mut self) -> Result<ResultAndInvalidations, RunRequestError> {
    // Every dependency that is not deferred is verified again
    for dependency_id in self.graph.dependency_node_ids() {
      if let Some(node) = self.graph.get_dependency_node_mut(dependency_id) {
        if !node.deferred {
          node.complete = false;
        }
      }
    }

    self.queue_entries();

    loop {
      while self.work_count > 0 {
        let Some((request_id, result)) = self.receiver.recv().await else {
          break;
        };

        self.work_count -= 1;
        self.handle_result(request_id, result)?;
      }

      if self.is_aborted() {
        tracing::info!("Asset graph build aborted");
        break;
      }

      if !self.propagate_symbols() {
        break;
      }
    }

    self.finish()
  }

  fn is_aborted(&mut self) -> bool {
    if self.request_context.abort_signal().is_aborted() {
      self.aborted = true;
    }

    self.aborted
  }

  fn queue_entries(&mut self) {
    let entries = self.request_context.options.entries.clone();
    self.graph.retain_entry_specifiers(&entries);

    for entry in entries {
      if self.is_aborted() {
        return;
      }

      let specifier_id = self.graph.add_entry_specifier(entry.clone());
      let request = EntryRequest { entry };
      let request_id = request.id();
      if self.entry_requests.contains_key(&request_id) {
        continue;
      }

      self.entry_requests.insert(request_id, specifier_id);
      self.work_count += 1;
      self
        .request_context
        .queue_request(request, self.sender.clone());
    }
  }

  fn queue_path_request(&mut self, dependency_id: NodeId) {
    if self.is_aborted() {
      return;
    }

    let Some(node) = self.graph.get_dependency_node(dependency_id) else {
      return;
    };

    let request = PathRequest {
      dependency: node.dependency.clone(),
    };
    let request_id = request.id();

    // A result that is still in flight is evaluated against the latest demand when it arrives
    if self.path_requests.contains_key(&request_id) {
      return;
    }

    self.scheduled.insert(dependency_id);
    self.path_requests.insert(request_id, dependency_id);
    self.work_count += 1;
    self
      .request_context
      .queue_request(request, self.sender.clone());
  }

  fn handle_result(
    &mut self,
    request_id: RequestId,
    result: anyhow::Result<Arc<RequestResult>>,
  ) -> Result<(), RunRequestError> {
    if let Some(specifier_id) = self.entry_requests.get(&request_id).copied() {
      match result {
        Ok(result) => {
          let output = result
            .as_entry()
            .ok_or_else(|| unexpected_result(request_id, &result))?;
          tracing::debug!("Handling EntryRequestOutput");
          self.handle_entry_result(specifier_id, output);
        }
        Err(error) => {
          self
            .errors
            .extend(QuarryError::from(&error).diagnostics());
        }
      }

      return Ok(());
    }

    if let Some(dependency_id) = self.path_requests.remove(&request_id) {
      match result {
        Ok(result) => {
          let output = result
            .as_path()
            .ok_or_else(|| unexpected_result(request_id, &result))?;
          tracing::debug!("Handling PathRequestOutput");
          self.handle_path_result(dependency_id, request_id, output);
        }
        Err(error) => {
          self
            .graph
            .fail_dependency(dependency_id, QuarryError::from(&error).diagnostics());
        }
      }

      return Ok(());
    }

    if self.visited_assets.contains(&request_id) {
      match result {
        Ok(result) => {
          let output = result
            .as_asset()
            .ok_or_else(|| unexpected_result(request_id, &result))?;
          tracing::debug!(
            "Handling AssetRequestOutput: {}",
            output.asset.file_path.display()
          );
          self.handle_asset_result(request_id, output);
        }
        Err(error) => self.handle_asset_failure(request_id, &error),
      }

      return Ok(());
    }

    Err(anyhow!(
      "Unexpected request result in AssetGraphRequest ({})",
      request_id
    ))
  }

  fn handle_entry_result(&mut self, specifier_id: NodeId, output: &EntryRequestOutput) {
    let EntryRequestOutput { entries } = output;
    let targets = self.request_context.options.targets();

    self.graph.clear_entry_files(specifier_id);

    for entry in entries {
      let entry_file_id = self.graph.add_entry_file(specifier_id, entry.clone());

      for target in targets
        .iter()
        .filter(|target| entry.target.as_ref().map_or(true, |name| *name == target.name))
      {
        let dependency = Dependency::entry(entry, target);
        let dependency_id = self.graph.add_entry_dependency(entry_file_id, dependency);
        self.queue_path_request(dependency_id);
      }
    }
  }

  fn handle_path_result(
    &mut self,
    dependency_id: NodeId,
    request_id: RequestId,
    output: &PathRequestOutput,
  ) {
    let Some(node) = self.graph.get_dependency_node_mut(dependency_id) else {
      return;
    };

    node.corresponding_request = Some(request_id);

    let (code, path, pipeline, query, side_effects) = match output {
      PathRequestOutput::Excluded => {
        self.graph.exclude_dependency(dependency_id);
        return;
      }
      PathRequestOutput::Unresolved(diagnostic) => {
        self.graph.exclude_dependency(dependency_id);
        if let Some(node) = self.graph.get_dependency_node_mut(dependency_id) {
          node.diagnostics = vec![diagnostic.clone()];
        }
        return;
      }
      PathRequestOutput::Resolved {
        can_defer,
        code,
        path,
        pipeline,
        query,
        side_effects,
      } => {
        if should_defer_dependency(
          node,
          *side_effects,
          *can_defer,
          self.request_context.feature_flags(),
        ) {
          tracing::debug!(specifier = %node.dependency.specifier, "Deferring dependency");
          node.deferred = true;
          node.excluded = false;
          node.diagnostics.clear();
          return;
        }

        (code, path, pipeline, query, side_effects)
      }
    };

    let request = AssetRequest {
      code: code.clone(),
      env: node.dependency.env.clone(),
      file_path: path.clone(),
      pipeline: pipeline.clone(),
      query: query.clone(),
      side_effects: *side_effects,
    };

    self.resolve_to_asset(dependency_id, request);
  }

  fn resolve_to_asset(&mut self, dependency_id: NodeId, request: AssetRequest) {
    let request_id = request.id();

    if let Some(diagnostics) = self.failed_assets.get(&request_id) {
      self.graph.fail_dependency(dependency_id, diagnostics.clone());
      return;
    }

    // We have already completed this AssetRequest so we can connect the Dependency to the Asset
    // immediately
    if let Some(asset_id) = self.completed_assets.get(&request_id).copied() {
      self.connect(dependency_id, asset_id);
      return;
    }

    // The AssetRequest has already been kicked off but is yet to complete. Register this
    // Dependency to be connected once it completes
    if self.visited_assets.contains(&request_id) {
      self
        .waiting_asset_requests
        .entry(request_id)
        .or_default()
        .push(dependency_id);
      return;
    }

    if self.is_aborted() {
      return;
    }

    self.visited_assets.insert(request_id);
    self
      .waiting_asset_requests
      .entry(request_id)
      .or_default()
      .push(dependency_id);
    self.work_count += 1;
    self
      .request_context
      .queue_request(request, self.sender.clone());
  }

  fn handle_asset_result(&mut self, request_id: RequestId, output: &AssetRequestOutput) {
    let AssetRequestOutput {
      asset,
      dependencies,
      diagnostics,
    } = output;

    let asset_id = self.graph.add_asset(asset.clone(), Some(request_id));
    if let Some(node) = self.graph.get_asset_node_mut(asset_id) {
      node.diagnostics = diagnostics.clone();
    }

    self.completed_assets.insert(request_id, asset_id);

    let dependency_ids = self
      .graph
      .set_asset_dependencies(asset_id, dependencies.iter().cloned());

    // Connect the Dependencies that were waiting for this Asset, which pushes their demand into
    // its new dependencies before those are resolved
    for dependency_id in self
      .waiting_asset_requests
      .remove(&request_id)
      .unwrap_or_default()
    {
      self.connect(dependency_id, asset_id);
    }

    for dependency_id in dependency_ids {
      let deferred = self
        .graph
        .get_dependency_node(dependency_id)
        .is_some_and(|node| node.deferred);

      if !deferred {
        self.queue_path_request(dependency_id);
      }
    }
  }

  fn handle_asset_failure(&mut self, request_id: RequestId, error: &anyhow::Error) {
    let diagnostics = QuarryError::from(error).diagnostics();

    for dependency_id in self
      .waiting_asset_requests
      .remove(&request_id)
      .unwrap_or_default()
    {
      self
        .graph
        .fail_dependency(dependency_id, diagnostics.clone());
    }

    self.failed_assets.insert(request_id, diagnostics);
  }

  fn connect(&mut self, dependency_id: NodeId, asset_id: NodeId) {
    self.graph.resolve_dependency(dependency_id, asset_id);
    self.propagate_requested_symbols(asset_id, dependency_id);
  }

  /// When we find dependencies, we will only trigger resolution and parsing for dependencies
  /// that have used symbols.
  ///
  /// Once they do have symbols in use, this re-triggers resolution and transformation for the
  /// dependency.
  fn propagate_requested_symbols(&mut self, asset_id: NodeId, dependency_id: NodeId) {
    let mut undeferred = Vec::new();
    propagate_requested_symbols(&mut self.graph, asset_id, dependency_id, &mut |id| {
      undeferred.push(id)
    });

    for dependency_id in undeferred {
      self.queue_path_request(dependency_id);
    }
  }

  /// Run symbol propagation over the settled graph and schedule whatever it undeferred
  ///
  /// Returns whether new work was scheduled.
  fn propagate_symbols(&mut self) -> bool {
    let result = propagate_symbols(&mut self.graph, self.request_context.feature_flags());

    tracing::debug!(
      deferred = result.deferred.len(),
      undeferred = result.undeferred.len(),
      "Propagated symbols"
    );

    for dependency_id in result.undeferred {
      self.queue_path_request(dependency_id);
    }

    for dependency_id in self.frontier() {
      self.queue_path_request(dependency_id);
    }

    self.work_count > 0
  }

  /// Active dependencies that are neither complete nor scheduled in this build
  fn frontier(&self) -> Vec<NodeId> {
    let mut frontier = Vec::new();

    self
      .graph
      .traverse(self.graph.root_node(), EdgeFilter::ACTIVE, |id, node| {
        if let AssetGraphNode::Dependency(node) = node {
          if !node.complete && !node.deferred && !node.excluded && !self.scheduled.contains(&id) {
            frontier.push(id);
          }
        }

        TraversalAction::Continue
      });

    frontier
  }

  fn finish(mut self) -> Result<ResultAndInvalidations, RunRequestError> {
    self.graph.remove_unreachable();

    let mut errors = std::mem::take(&mut self.errors);
    let mut warnings = Vec::new();

    for diagnostic in collect_diagnostics(&self.graph) {
      if diagnostic.is_fatal() {
        errors.push(diagnostic.diagnostic);
      } else {
        warnings.push(diagnostic.diagnostic);
      }
    }

    let mut invalidations = vec![
      Invalidation::OptionChange(String::from("entries")),
      Invalidation::OptionChange(String::from("targets")),
      Invalidation::OptionChange(String::from("featureFlags")),
    ];

    if !errors.is_empty() || self.aborted {
      // Failed and partial graphs are picked up again by the next build
      invalidations.push(Invalidation::Always);
    } else {
      self.persist_graph();
    }

    tracing::info!(
      nodes = self.graph.node_count(),
      errors = errors.len(),
      warnings = warnings.len(),
      "Built asset graph"
    );

    Ok(ResultAndInvalidations::new(
      RequestResult::AssetGraph(AssetGraphRequestOutput {
        graph: self.graph,
        errors,
        warnings,
        aborted: self.aborted,
      }),
      invalidations,
    ))
  }

  fn persist_graph(&self) {
    let Some(cache_dir) = self.request_context.options.cache_dir.as_ref() else {
      return;
    };

    let fs = self.request_context.file_system();
    let result = wire::encode(&self.graph)
      .map_err(anyhow::Error::from)
      .and_then(|bytes| {
        let key = format!("asset_graph_{}", hash_bytes(&bytes));
        self.request_context.store().put(&key, &bytes)?;

        let head = head_path(cache_dir, self.request_id);
        if let Some(parent) = head.parent() {
          fs.create_dir_all(parent)?;
        }
        fs.write(&head, key.as_bytes())?;

        tracing::debug!(key = %key, "Persisted asset graph");
        Ok(())
      });

    if let Err(error) = result {
      tracing::warn!("Failed to persist the asset graph: {error:#}");
    }
  }
}

fn unexpected_result(request_id: RequestId, result: &RequestResult) -> anyhow::Error {
  anyhow!(
    "Unexpected request result in AssetGraphRequest ({}): {:?}",
    request_id,
    result
  )
}
