use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::environment::Environment;
use super::environment::EnvironmentRef;
use super::source::SourceLocation;

/// A target represents how and where source code is compiled
///
/// Targets are supplied by configuration before the graph is built and never change during a build.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
  /// The output folder for compiled bundles
  pub dist_dir: PathBuf,

  /// The output filename of the entry
  pub dist_entry: Option<PathBuf>,

  /// The environment the code will run in
  pub env: EnvironmentRef,

  /// The location that created the target
  pub loc: Option<SourceLocation>,

  pub name: String,

  /// The URL bundles will be loaded with at runtime
  pub public_url: String,
}

impl Default for Target {
  fn default() -> Self {
    Self {
      dist_dir: PathBuf::default(),
      dist_entry: None,
      env: Arc::new(Environment::default()),
      loc: None,
      name: String::from("default"),
      public_url: String::from("/"),
    }
  }
}
