use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::hash::IdentifierHasher;

use super::source::SourceLocation;

pub type EnvironmentRef = Arc<Environment>;

/// The environment the built code will run in
///
/// Environments are immutable and shared by id between targets, dependencies and assets.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
  /// The environment the output should run in
  pub context: EnvironmentContext,

  /// Treats the target as a library consumed by another tool, rather than used directly
  pub is_library: bool,

  pub loc: Option<SourceLocation>,

  /// Determines what type of module to output
  pub output_format: OutputFormat,

  pub should_optimize: bool,

  pub should_scope_hoist: bool,

  /// Configures source maps
  pub source_map: Option<TargetSourceMapOptions>,

  pub source_type: SourceType,
}

pub fn create_environment_id(
  context: &EnvironmentContext,
  output_format: &OutputFormat,
  source_type: &SourceType,
  is_library: &bool,
  should_optimize: &bool,
  should_scope_hoist: &bool,
  source_map: &Option<TargetSourceMapOptions>,
) -> String {
  let mut hasher = IdentifierHasher::new();
  context.hash(&mut hasher);
  output_format.hash(&mut hasher);
  source_type.hash(&mut hasher);
  is_library.hash(&mut hasher);
  should_optimize.hash(&mut hasher);
  should_scope_hoist.hash(&mut hasher);
  flatten_source_map(source_map).hash(&mut hasher);
  format!("{:016x}", hasher.finish())
}

impl Environment {
  /// The stable id of the environment, derived from every field except its location
  pub fn id(&self) -> String {
    create_environment_id(
      &self.context,
      &self.output_format,
      &self.source_type,
      &self.is_library,
      &self.should_optimize,
      &self.should_scope_hoist,
      &self.source_map,
    )
  }
}

/// The environment the output should run in
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentContext {
  #[default]
  Browser,
  WebWorker,
  ServiceWorker,
  Worklet,
  Node,
  ElectronMain,
  ElectronRenderer,
}

impl EnvironmentContext {
  pub fn is_node(&self) -> bool {
    use EnvironmentContext::*;
    matches!(self, Node | ElectronMain | ElectronRenderer)
  }

  pub fn is_browser(&self) -> bool {
    use EnvironmentContext::*;
    matches!(
      self,
      Browser | WebWorker | ServiceWorker | Worklet | ElectronRenderer
    )
  }

  pub fn is_worker(&self) -> bool {
    use EnvironmentContext::*;
    matches!(self, WebWorker | ServiceWorker)
  }
}

/// The module format of the output
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
  /// Bundles are concatenated scripts sharing the global scope
  #[default]
  Global,
  CommonJS,
  EsModule,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
  Script,
  #[default]
  Module,
}

/// Source map options for the target output
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSourceMapOptions {
  /// Inlines the source map as a data URL into the bundle
  #[serde(skip_serializing_if = "Option::is_none")]
  pub inline: Option<bool>,

  /// Inlines the original source code into the source map
  #[serde(skip_serializing_if = "Option::is_none")]
  pub inline_sources: Option<bool>,

  /// The URL to load the original source code from
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source_root: Option<String>,
}

/// `{ None, None, None }` is equal to `None` for all intents and purposes
pub fn flatten_source_map(source_map: &Option<TargetSourceMapOptions>) -> TargetSourceMapOptions {
  source_map.clone().unwrap_or_default()
}
