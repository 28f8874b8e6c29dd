use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// Something a request read while running, which invalidates the request when it changes
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Invalidation {
  /// Invalidate when the file at this absolute path is created, updated or deleted
  FileChange(PathBuf),

  /// Invalidate when the environment variable changes value
  EnvChange(String),

  /// Invalidate when the top-level build option with this key changes value
  OptionChange(String),

  /// Re-run the request on every build
  Always,
}
