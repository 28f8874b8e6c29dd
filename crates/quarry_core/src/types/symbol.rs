use serde::Deserialize;
use serde::Serialize;

use super::json::JSONObject;
use super::source::SourceLocation;

/// The wildcard symbol name.
///
/// On a dependency it requests the whole namespace (`import * as x`), and when it is also the
/// local name it marks an `export * from` re-export.
pub const CHAR_STAR: &str = "*";

/// A symbol that an asset exports or that a dependency imports
///
/// Symbols are keyed by their exported name in the owning map. On an asset a weak symbol is one
/// the asset only re-exports; on a dependency a weak symbol is imported only to be re-exported.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
  /// The local name of the symbol within the owning asset
  pub local: String,

  /// The location of the symbol within the source file
  pub loc: Option<SourceLocation>,

  pub is_weak: bool,

  #[serde(default, skip_serializing_if = "JSONObject::is_empty")]
  pub meta: JSONObject,
}

impl Symbol {
  pub fn new(local: impl Into<String>) -> Self {
    Symbol {
      local: local.into(),
      ..Symbol::default()
    }
  }

  pub fn weak(local: impl Into<String>) -> Self {
    Symbol {
      local: local.into(),
      is_weak: true,
      ..Symbol::default()
    }
  }

  /// True for the `export * from` marker on a dependency
  pub fn is_namespace_reexport(&self) -> bool {
    self.local == CHAR_STAR
  }
}
