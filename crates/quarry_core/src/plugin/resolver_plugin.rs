use std::fmt::Debug;
use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::hash::IdentifierHasher;
use crate::types::Dependency;
use crate::types::FeatureFlags;
use crate::types::Invalidation;
use crate::types::JSONObject;

pub struct ResolveContext {
  pub dependency: Arc<Dependency>,
  pub feature_flags: FeatureFlags,
  pub pipeline: Option<String>,
  pub specifier: String,
}

#[derive(Clone, Debug, Default, Deserialize, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedResolution {
  /// Whether this dependency can be deferred when none of its imports are used
  pub can_defer: bool,

  /// Virtual code of the resolved asset, used instead of reading `file_path`
  pub code: Option<String>,

  pub file_path: PathBuf,

  pub pipeline: Option<String>,

  pub query: Option<String>,

  /// Whether the resolved file may have side effects, usually from package.json#sideEffects
  pub side_effects: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Resolution {
  /// No resolver could resolve the specifier
  Unresolved,

  /// The dependency is intentionally left out of the graph
  Excluded,

  Resolved(ResolvedResolution),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolved {
  pub invalidations: Vec<Invalidation>,
  pub resolution: Resolution,
  #[serde(default, skip_serializing_if = "JSONObject::is_empty")]
  pub meta: JSONObject,
}

impl Resolved {
  pub fn unresolved(invalidations: Vec<Invalidation>) -> Self {
    Resolved {
      invalidations,
      resolution: Resolution::Unresolved,
      meta: JSONObject::new(),
    }
  }
}

/// Converts a dependency specifier into a file path that will be processed by transformers
///
/// Resolvers run in order until one returns something other than `Unresolved`.
#[mockall::automock]
#[async_trait]
pub trait ResolverPlugin: Debug + Send + Sync {
  fn id(&self) -> u64 {
    let mut hasher = IdentifierHasher::new();
    std::any::type_name::<Self>().hash(&mut hasher);
    hasher.finish()
  }

  async fn resolve(&self, ctx: ResolveContext) -> Result<Resolved, anyhow::Error>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Hash)]
  struct TestResolverPlugin {}

  #[async_trait]
  impl ResolverPlugin for TestResolverPlugin {
    async fn resolve(&self, _ctx: ResolveContext) -> Result<Resolved, anyhow::Error> {
      Ok(Resolved::unresolved(Vec::new()))
    }
  }

  #[test]
  fn test_resolvers_can_be_stored_as_trait_objects() {
    let resolvers: Vec<Arc<dyn ResolverPlugin>> = vec![Arc::new(TestResolverPlugin {})];

    assert_eq!(resolvers.len(), 1);
    assert_eq!(resolvers[0].id(), TestResolverPlugin {}.id());
  }
}
