use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// A 1-based line and column position within a file
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Location {
  pub line: u32,
  pub column: u32,
}

impl From<[usize; 2]> for Location {
  fn from([line, column]: [usize; 2]) -> Self {
    Location {
      line: u32::try_from(line).unwrap_or(u32::MAX),
      column: u32::try_from(column).unwrap_or(u32::MAX),
    }
  }
}

/// Identifies a specific location in a source file
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
  /// The file containing the location
  pub file_path: PathBuf,

  /// The start location, inclusive
  pub start: Location,

  /// The end location, inclusive
  pub end: Location,
}
