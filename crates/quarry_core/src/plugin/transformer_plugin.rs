use std::fmt::Debug;
use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::hash::IdentifierHasher;
use crate::types::Asset;
use crate::types::Dependency;
use crate::types::Diagnostic;
use crate::types::FeatureFlags;
use crate::types::Invalidation;

pub struct TransformContext {
  pub feature_flags: FeatureFlags,
  pub project_root: PathBuf,
}

/// The asset handed to a transformer along with its current code
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformInput {
  pub asset: Asset,
  pub code: Vec<u8>,
  pub map: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformResult {
  pub asset: Asset,
  pub code: Vec<u8>,
  pub map: Option<String>,
  pub dependencies: Vec<Dependency>,
  /// Non-fatal diagnostics reported while transforming
  pub diagnostics: Vec<Diagnostic>,
  pub invalidations: Vec<Invalidation>,
}

/// Compile and analyse an asset, discovering its dependencies and exports
#[mockall::automock]
#[async_trait]
pub trait TransformerPlugin: Debug + Send + Sync {
  fn id(&self) -> u64 {
    let mut hasher = IdentifierHasher::new();
    std::any::type_name::<Self>().hash(&mut hasher);
    hasher.finish()
  }

  /// A hash of the transformer configuration, mixed into transform cache keys
  fn cache_key(&self) -> u64 {
    0
  }

  async fn transform(
    &self,
    context: TransformContext,
    input: TransformInput,
  ) -> Result<TransformResult, anyhow::Error>;
}
