use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::source::SourceLocation;

/// An entry specifier resolved to a concrete file
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
  pub file_path: PathBuf,

  /// The directory of the closest package.json, or the project root
  pub package_path: PathBuf,

  /// Restricts the entry to the named target
  pub target: Option<String>,

  pub loc: Option<SourceLocation>,
}
