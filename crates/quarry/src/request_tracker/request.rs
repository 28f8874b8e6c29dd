use std::fmt::Debug;
use std::hash::Hash;
use std::hash::Hasher;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use dyn_hash::DynHash;
use quarry_core::cache::ContentStoreRef;
use quarry_core::hash::IdentifierHasher;
use quarry_core::types::FeatureFlags;
use quarry_core::types::Invalidation;
use quarry_core::types::QuarryOptions;
use quarry_filesystem::FileSystemRef;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio::sync::RwLock;

use crate::plugins::PluginsRef;
use crate::requests::RequestResult;
use crate::QuarryError;

use super::RequestTrackerState;

pub type RunRequestError = anyhow::Error;
pub type RequestId = u64;

/// Receives the results of requests started with [`RunRequestContext::queue_request`]
pub type RequestResultSender = UnboundedSender<(RequestId, anyhow::Result<Arc<RequestResult>>)>;

pub(crate) type PendingRequest = watch::Receiver<Option<Result<Arc<RequestResult>, QuarryError>>>;

/// Cooperative cancellation of a build
///
/// Requests that are already running finish and are cached, but no new work is scheduled once
/// the signal is raised.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
  pub fn abort(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_aborted(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  pub fn reset(&self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

/// This is the API for requests to call back onto the `RequestTracker`.
///
/// We want to avoid exposing internals of the request tracker to the implementations so that we
/// can change this.
#[derive(Clone)]
pub struct RunRequestContext {
  request_id: Option<RequestId>,
  previous_result: Option<Arc<RequestResult>>,
  abort_signal: AbortSignal,
  file_system: FileSystemRef,
  pub options: Arc<QuarryOptions>,
  plugins: PluginsRef,
  store: ContentStoreRef,
  state: Arc<RwLock<RequestTrackerState>>,
}

impl RunRequestContext {
  pub(crate) fn new(
    abort_signal: AbortSignal,
    file_system: FileSystemRef,
    options: Arc<QuarryOptions>,
    plugins: PluginsRef,
    store: ContentStoreRef,
    state: Arc<RwLock<RequestTrackerState>>,
  ) -> Self {
    Self {
      request_id: None,
      previous_result: None,
      abort_signal,
      file_system,
      options,
      plugins,
      store,
      state,
    }
  }

  /// Run a child request to the current request
  ///
  /// Valid results are returned from the cache. When the same request is already running, the
  /// call waits for that run instead of starting another one.
  pub async fn run_request<R: Request>(&self, request: R) -> anyhow::Result<Arc<RequestResult>> {
    let request_id = request.id();
    let name = request.name();

    let start = {
      let mut state = self.state.write().await;
      state.begin_request(self.request_id, request_id, name)
    };

    let (previous_result, sender) = match start {
      RequestStart::Cached(result) => {
        tracing::trace!(request = name, request_id, "Using cached request result");
        return Ok(result);
      }
      RequestStart::Pending(receiver) => {
        tracing::trace!(request = name, request_id, "Waiting for pending request");
        return wait_for_pending(receiver).await;
      }
      RequestStart::Run {
        previous_result,
        sender,
      } => (previous_result, sender),
    };

    tracing::debug!(request = name, request_id, "Running request");

    let context = RunRequestContext {
      request_id: Some(request_id),
      previous_result,
      ..self.clone()
    };

    let result = request
      .run(context)
      .await
      .map_err(|error| QuarryError::from(&error));

    // Store first, then broadcast, so late callers find the stored result
    {
      let mut state = self.state.write().await;
      state.store_request(request_id, &result, &self.options, self.file_system.as_ref());
    }

    let result = result.map(|result| result.result);
    let _ = sender.send(Some(result.clone()));

    result.map_err(anyhow::Error::from)
  }

  /// Run a child request on another task, sending its result to `tx` when it completes
  pub fn queue_request<R: Request>(&self, request: R, tx: RequestResultSender) {
    let context = self.clone();

    tokio::spawn(async move {
      let request_id = request.id();
      let result = context.run_request(request).await;

      // The receiver may have given up, e.g. after an abort
      let _ = tx.send((request_id, result));
    });
  }

  /// Whether a request has a cached result that is still valid
  pub async fn is_valid(&self, request_id: RequestId) -> bool {
    self.state.read().await.is_valid(request_id)
  }

  /// The result of the previous run of the current request, if it ever succeeded
  pub fn previous_result(&self) -> Option<&Arc<RequestResult>> {
    self.previous_result.as_ref()
  }

  pub fn abort_signal(&self) -> &AbortSignal {
    &self.abort_signal
  }

  pub fn file_system(&self) -> &FileSystemRef {
    &self.file_system
  }

  pub fn feature_flags(&self) -> &FeatureFlags {
    &self.options.feature_flags
  }

  pub fn plugins(&self) -> &PluginsRef {
    &self.plugins
  }

  pub fn project_root(&self) -> &Path {
    &self.options.project_root
  }

  pub fn store(&self) -> &ContentStoreRef {
    &self.store
  }
}

async fn wait_for_pending(mut receiver: PendingRequest) -> anyhow::Result<Arc<RequestResult>> {
  loop {
    let current = receiver.borrow_and_update().clone();
    if let Some(result) = current {
      return result.map_err(anyhow::Error::from);
    }

    receiver
      .changed()
      .await
      .map_err(|_| anyhow!("Request stopped before producing a result"))?;
  }
}

/// How a call to `run_request` proceeds
pub(crate) enum RequestStart {
  Cached(Arc<RequestResult>),
  Pending(PendingRequest),
  Run {
    previous_result: Option<Arc<RequestResult>>,
    sender: watch::Sender<Option<Result<Arc<RequestResult>, QuarryError>>>,
  },
}

/// A memoised unit of work
///
/// The id of a request is derived from its type name and its hashed input, so it is stable
/// across processes.
#[async_trait]
pub trait Request: DynHash + Send + Sync + Debug + 'static {
  fn id(&self) -> RequestId {
    let mut hasher = IdentifierHasher::default();
    std::any::type_name::<Self>().hash(&mut hasher);
    self.dyn_hash(&mut hasher);
    hasher.finish()
  }

  /// Short name of the request type, used for logging and stats
  fn name(&self) -> &'static str {
    let name = std::any::type_name::<Self>();
    name.rsplit("::").next().unwrap_or(name)
  }

  async fn run(
    &self,
    request_context: RunRequestContext,
  ) -> Result<ResultAndInvalidations, RunRequestError>;
}

dyn_hash::hash_trait_object!(Request);

#[derive(Debug, Clone, PartialEq)]
pub struct ResultAndInvalidations {
  pub result: Arc<RequestResult>,
  pub invalidations: Vec<Invalidation>,
}

impl ResultAndInvalidations {
  pub fn new(result: RequestResult, invalidations: Vec<Invalidation>) -> Self {
    Self {
      result: Arc::new(result),
      invalidations,
    }
  }

  pub fn result(&self) -> &Arc<RequestResult> {
    &self.result
  }

  pub fn invalidations(&self) -> &[Invalidation] {
    &self.invalidations
  }
}
