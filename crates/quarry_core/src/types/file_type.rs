use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// The type of an asset, usually derived from its file extension
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
  Css,
  Html,
  #[default]
  Js,
  Json,
  Jsx,
  Ts,
  Tsx,
  #[serde(untagged)]
  Other(String),
}

impl FileType {
  pub fn extension(&self) -> &str {
    match self {
      FileType::Css => "css",
      FileType::Html => "html",
      FileType::Js => "js",
      FileType::Json => "json",
      FileType::Jsx => "jsx",
      FileType::Ts => "ts",
      FileType::Tsx => "tsx",
      FileType::Other(extension) => extension,
    }
  }

  pub fn from_extension(extension: &str) -> Self {
    match extension {
      "css" => FileType::Css,
      "html" | "htm" => FileType::Html,
      "js" | "mjs" | "cjs" => FileType::Js,
      "json" => FileType::Json,
      "jsx" => FileType::Jsx,
      "ts" | "mts" | "cts" => FileType::Ts,
      "tsx" => FileType::Tsx,
      other => FileType::Other(other.to_string()),
    }
  }
}

impl fmt::Display for FileType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.extension())
  }
}
