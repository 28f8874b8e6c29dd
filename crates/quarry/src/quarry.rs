use anyhow::anyhow;
use quarry_core::asset_graph::AssetGraph;
use quarry_core::cache::ContentStoreRef;
use quarry_core::types::Diagnostic;
use quarry_core::types::Diagnostics;
use quarry_core::types::QuarryOptions;
use quarry_filesystem::FileSystemRef;
use tokio::runtime::Runtime;

use crate::plugins::PluginsRef;
use crate::request_tracker::AbortSignal;
use crate::request_tracker::RequestStats;
use crate::request_tracker::RequestTracker;
use crate::requests::AssetGraphRequest;
use crate::BuildError;
use crate::WatchEvents;

/// The asset graph of a successful build
#[derive(Clone, Debug, PartialEq)]
pub struct AssetGraphBuild {
  pub graph: AssetGraph,
  pub warnings: Vec<Diagnostic>,
}

/// Builds the asset graph of a project, incrementally across calls
///
/// Results of previous builds stay cached in the request tracker, so a rebuild only redoes the
/// work that was invalidated since.
pub struct Quarry {
  request_tracker: RequestTracker,
  runtime: Runtime,
}

impl Quarry {
  pub fn new(
    options: QuarryOptions,
    fs: FileSystemRef,
    plugins: PluginsRef,
    store: ContentStoreRef,
  ) -> Result<Self, anyhow::Error> {
    let threads = options.threads.unwrap_or_else(num_cpus::get);
    tracing::info!(%threads, "Creating tokio runtime...");
    let runtime = tokio::runtime::Builder::new_multi_thread()
      .enable_all()
      .thread_name("quarry-tokio-worker")
      .worker_threads(threads)
      .build()?;

    let request_tracker = RequestTracker::new(fs, std::sync::Arc::new(options), plugins, store);

    Ok(Self {
      request_tracker,
      runtime,
    })
  }

  pub fn build_asset_graph(&self) -> Result<AssetGraphBuild, BuildError> {
    self.runtime.block_on(self.run_asset_graph_request())
  }

  async fn run_asset_graph_request(&self) -> Result<AssetGraphBuild, BuildError> {
    self.request_tracker.reset_request_stats().await;

    let result = self
      .request_tracker
      .run_request(AssetGraphRequest {})
      .await?;

    let output = result
      .as_asset_graph()
      .ok_or_else(|| anyhow!("Unexpected result of the AssetGraphRequest: {:?}", result))?;

    tracing::info!("Request stats: {:?}", self.request_tracker.request_stats().await);

    if output.aborted {
      return Err(BuildError::Aborted);
    }

    if !output.errors.is_empty() {
      return Err(BuildError::Diagnostics(Diagnostics::from(
        output.errors.clone(),
      )));
    }

    Ok(AssetGraphBuild {
      graph: output.graph.clone(),
      warnings: output.warnings.clone(),
    })
  }

  /// Invalidate the work that read the changed files. Returns whether a rebuild is needed.
  pub fn respond_to_fs_events(&self, events: WatchEvents) -> bool {
    self
      .runtime
      .block_on(self.request_tracker.respond_to_fs_events(events))
  }

  /// Invalidate the work that read files changed since they were read, for builds without a
  /// watcher
  pub fn invalidate_changed_files(&self) -> bool {
    self
      .runtime
      .block_on(self.request_tracker.invalidate_changed_files())
  }

  /// Raising the signal stops scheduling new work in the running build
  pub fn abort_signal(&self) -> AbortSignal {
    self.request_tracker.abort_signal().clone()
  }

  /// Executed and cached requests of the last build, by request type
  pub fn request_stats(&self) -> RequestStats {
    self.runtime.block_on(self.request_tracker.request_stats())
  }
}
