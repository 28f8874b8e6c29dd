use std::fmt::Debug;
use std::hash::Hash;
use std::hash::Hasher;
use std::path::Path;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use quarry_core::hash::IdentifierHasher;
use quarry_core::plugin::ResolverPlugin;
use quarry_core::plugin::TransformerPlugin;

pub use self::plugin_registry::*;

mod plugin_registry;

pub type PluginsRef = Arc<dyn Plugins + Send + Sync>;

/// The resolvers and transformers a build runs
#[cfg_attr(test, automock)]
pub trait Plugins {
  /// Names that select a pipeline through a `name:` specifier prefix
  fn named_pipelines(&self) -> Vec<String>;

  fn resolvers(&self) -> Result<Vec<Arc<dyn ResolverPlugin>>, anyhow::Error>;

  fn transformers(
    &self,
    path: &Path,
    pipeline: Option<String>,
  ) -> Result<TransformerPipeline, anyhow::Error>;
}

/// The transformers that run in series over one asset
pub struct TransformerPipeline {
  transformers: Vec<Arc<dyn TransformerPlugin>>,
  pipeline_id: u64,
  cache_key: u64,
}

impl TransformerPipeline {
  pub fn new(transformers: Vec<Arc<dyn TransformerPlugin>>) -> Self {
    let mut id_hasher = IdentifierHasher::default();
    let mut cache_key_hasher = IdentifierHasher::default();

    for transformer in &transformers {
      transformer.id().hash(&mut id_hasher);
      transformer.id().hash(&mut cache_key_hasher);
      transformer.cache_key().hash(&mut cache_key_hasher);
    }

    Self {
      transformers,
      pipeline_id: id_hasher.finish(),
      cache_key: cache_key_hasher.finish(),
    }
  }

  pub fn id(&self) -> u64 {
    self.pipeline_id
  }

  /// Changes whenever a transformer or its configuration changes
  pub fn cache_key(&self) -> u64 {
    self.cache_key
  }

  pub fn transformers(&self) -> &[Arc<dyn TransformerPlugin>] {
    &self.transformers
  }

  pub fn is_empty(&self) -> bool {
    self.transformers.is_empty()
  }
}

impl Debug for TransformerPipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TransformerPipeline")
      .field("transformers", &self.transformers)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use quarry_core::plugin::MockTransformerPlugin;

  use super::*;

  fn transformer(id: u64, cache_key: u64) -> Arc<dyn TransformerPlugin> {
    let mut transformer = MockTransformerPlugin::new();
    transformer.expect_id().return_const(id);
    transformer.expect_cache_key().return_const(cache_key);
    Arc::new(transformer)
  }

  #[test]
  fn test_pipeline_id_follows_the_transformers() {
    let a = TransformerPipeline::new(vec![transformer(1, 0), transformer(2, 0)]);
    let b = TransformerPipeline::new(vec![transformer(1, 0), transformer(2, 0)]);
    let c = TransformerPipeline::new(vec![transformer(2, 0), transformer(1, 0)]);

    assert_eq!(a.id(), b.id());
    assert_ne!(a.id(), c.id());
  }

  #[test]
  fn test_cache_key_follows_transformer_configuration() {
    let a = TransformerPipeline::new(vec![transformer(1, 10)]);
    let b = TransformerPipeline::new(vec![transformer(1, 11)]);

    assert_eq!(a.id(), b.id());
    assert_ne!(a.cache_key(), b.cache_key());
  }
}
