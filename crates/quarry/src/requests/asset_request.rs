use std::hash::Hash;
use std::hash::Hasher;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use quarry_core::cache::ContentStoreRef;
use quarry_core::diagnostic_error;
use quarry_core::hash::hash_bytes;
use quarry_core::hash::hash_string;
use quarry_core::hash::IdentifierHasher;
use quarry_core::plugin::TransformContext;
use quarry_core::plugin::TransformInput;
use quarry_core::types::create_asset_id;
use quarry_core::types::Asset;
use quarry_core::types::CreateAssetIdParams;
use quarry_core::types::Dependency;
use quarry_core::types::Diagnostic;
use quarry_core::types::DiagnosticBuilder;
use quarry_core::types::Environment;
use quarry_core::types::ErrorKind;
use quarry_core::types::FileType;
use quarry_core::types::Invalidation;
use quarry_core::wire;
use xxhash_rust::xxh3::xxh3_64;

use crate::plugins::TransformerPipeline;
use crate::request_tracker::Request;
use crate::request_tracker::ResultAndInvalidations;
use crate::request_tracker::RunRequestContext;
use crate::request_tracker::RunRequestError;

use super::RequestResult;

/// The AssetRequest runs transformer plugins on discovered Assets.
/// - Decides which transformer pipeline to run from the asset path and named pipeline
/// - Runs the pipeline in series, each transformer receiving the output of the previous one
/// - Stores the final code and source map in the content store, for access in packaging
/// - Caches the transformed Asset by source content, so unchanged files skip the pipeline even
///   across restarts
#[derive(Clone, Debug, Hash, PartialEq)]
pub struct AssetRequest {
  /// Virtual code provided by the resolver, used instead of reading `file_path`
  pub code: Option<String>,
  pub env: Arc<Environment>,
  pub file_path: PathBuf,
  pub pipeline: Option<String>,
  pub query: Option<String>,
  pub side_effects: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetRequestOutput {
  pub asset: Arc<Asset>,
  pub dependencies: Vec<Dependency>,
  /// Warnings reported by transformers on a fresh transform
  pub diagnostics: Vec<Diagnostic>,
}

impl AssetRequest {
  /// Key of the transformed asset in the content store
  ///
  /// Changes whenever the source, the asset identity or the transformer configuration changes.
  fn cache_key(&self, source: &[u8], pipeline: &TransformerPipeline) -> String {
    let mut hasher = IdentifierHasher::default();

    self.file_path.hash(&mut hasher);
    self.env.id().hash(&mut hasher);
    self.pipeline.hash(&mut hasher);
    self.query.hash(&mut hasher);
    self.side_effects.hash(&mut hasher);
    xxh3_64(source).hash(&mut hasher);
    pipeline.id().hash(&mut hasher);
    pipeline.cache_key().hash(&mut hasher);

    format!("asset_request_{:016x}", hasher.finish())
  }

  fn read_source(&self, request_context: &RunRequestContext) -> anyhow::Result<Vec<u8>> {
    if let Some(code) = &self.code {
      return Ok(code.as_bytes().to_vec());
    }

    request_context
      .file_system()
      .read(&self.file_path)
      .map_err(|error| {
        diagnostic_error!(DiagnosticBuilder::default()
          .kind(ErrorKind::NotFound)
          .message(format!(
            "Failed to read {}: {}",
            self.file_path.display(),
            error
          )))
        .into()
      })
  }

  fn new_asset(&self) -> Asset {
    let file_path = self.file_path.to_string_lossy();
    let file_type = self
      .file_path
      .extension()
      .map(|extension| FileType::from_extension(&extension.to_string_lossy()))
      .unwrap_or_default();

    Asset {
      id: create_asset_id(CreateAssetIdParams {
        environment_id: &self.env.id(),
        file_path: &file_path,
        pipeline: self.pipeline.as_deref(),
        query: self.query.as_deref(),
        unique_key: None,
      }),
      env: self.env.clone(),
      file_path: self.file_path.clone(),
      file_type,
      pipeline: self.pipeline.clone(),
      query: self.query.clone(),
      side_effects: self.side_effects,
      is_source: !self
        .file_path
        .components()
        .any(|component| component.as_os_str() == "node_modules"),
      ..Asset::default()
    }
  }
}

/// A transformed asset and the invalidations its transformers reported
struct CachedAsset {
  asset: Asset,
  invalidations: Vec<Invalidation>,
}

fn invalidations_key(cache_key: &str) -> String {
  format!("{}_invalidations", cache_key)
}

fn load_cached_asset(store: &ContentStoreRef, cache_key: &str) -> anyhow::Result<CachedAsset> {
  let asset = wire::decode::<Asset>(&store.get(cache_key)?)?;
  let invalidations = serde_json::from_slice(&store.get(&invalidations_key(cache_key))?)?;

  Ok(CachedAsset {
    asset,
    invalidations,
  })
}

fn store_cached_asset(
  store: &ContentStoreRef,
  cache_key: &str,
  cached: &CachedAsset,
) -> anyhow::Result<()> {
  store.put(
    &invalidations_key(cache_key),
    &serde_json::to_vec(&cached.invalidations)?,
  )?;
  store.put(cache_key, &wire::encode(&cached.asset)?)?;
  Ok(())
}

fn transform_error(file_path: &Path, error: anyhow::Error) -> anyhow::Error {
  if error.downcast_ref::<Diagnostic>().is_some() {
    return error;
  }

  diagnostic_error!(DiagnosticBuilder::default()
    .kind(ErrorKind::TransformError)
    .message(format!(
      "Failed to transform {}: {:#}",
      file_path.display(),
      error
    )))
  .into()
}

#[async_trait]
impl Request for AssetRequest {
  #[tracing::instrument(level = "debug", skip_all, fields(path = %self.file_path.display()))]
  async fn run(
    &self,
    request_context: RunRequestContext,
  ) -> Result<ResultAndInvalidations, RunRequestError> {
    let mut invalidations = Vec::new();
    if self.code.is_none() {
      invalidations.push(Invalidation::FileChange(self.file_path.clone()));
    }

    let source = self.read_source(&request_context)?;
    let pipeline = request_context
      .plugins()
      .transformers(&self.file_path, self.pipeline.clone())?;

    let store = request_context.store();
    let cache_key = self.cache_key(&source, &pipeline);

    if store.has(&cache_key) {
      match load_cached_asset(store, &cache_key) {
        Ok(cached) => {
          tracing::debug!(key = %cache_key, "Using cached asset");
          invalidations.extend(cached.invalidations);

          return Ok(ResultAndInvalidations::new(
            RequestResult::Asset(AssetRequestOutput {
              dependencies: cached.asset.dependencies.values().cloned().collect(),
              asset: Arc::new(cached.asset),
              diagnostics: Vec::new(),
            }),
            invalidations,
          ));
        }
        Err(error) => {
          tracing::warn!(key = %cache_key, "Cache corruption, transforming again: {:#}", error);
        }
      }
    }

    tracing::trace!(key = %cache_key, transformers = pipeline.transformers().len(), "Transforming");

    let mut asset = self.new_asset();
    let mut code = source;
    let mut map = None;
    let mut dependencies = Vec::new();
    let mut diagnostics = Vec::new();
    let mut transform_invalidations = Vec::new();

    for transformer in pipeline.transformers() {
      let context = TransformContext {
        feature_flags: request_context.feature_flags().clone(),
        project_root: request_context.project_root().to_path_buf(),
      };

      let result = transformer
        .transform(context, TransformInput { asset, code, map })
        .await;

      let result = match result {
        Ok(result) => result,
        Err(error) => return Err(transform_error(&self.file_path, error)),
      };

      asset = result.asset;
      code = result.code;
      map = result.map;
      dependencies.extend(result.dependencies);
      diagnostics.extend(result.diagnostics);
      transform_invalidations.extend(result.invalidations);
    }

    let content_key = hash_bytes(&code);
    store.put(&content_key, &code)?;
    asset.output_hash = Some(content_key.clone());
    asset.content_key = content_key;

    if let Some(map) = map {
      let map_key = format!("{}_map", hash_string(&map));
      store.put(&map_key, map.as_bytes())?;
      asset.map_key = Some(map_key);
    }

    for dependency in dependencies {
      if dependency.source_asset_id.as_ref() != Some(&asset.id) {
        return Err(anyhow!(
          "Dependency '{}' of {} was created for another asset",
          dependency.specifier,
          asset.file_path.display()
        ));
      }

      asset.dependencies.insert(dependency.id.clone(), dependency);
    }

    let cached = CachedAsset {
      asset,
      invalidations: transform_invalidations,
    };
    store_cached_asset(store, &cache_key, &cached)?;

    invalidations.extend(cached.invalidations);

    Ok(ResultAndInvalidations::new(
      RequestResult::Asset(AssetRequestOutput {
        dependencies: cached.asset.dependencies.values().cloned().collect(),
        asset: Arc::new(cached.asset),
        diagnostics,
      }),
      invalidations,
    ))
  }
}
