use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

use crate::hash::IdentifierHasher;

use super::dependency::BundleBehavior;
use super::dependency::Dependency;
use super::environment::Environment;
use super::file_type::FileType;
use super::json::JSONObject;
use super::symbol::Symbol;
use super::symbol::CHAR_STAR;

pub type AssetId = String;

pub type AssetRef = Arc<Asset>;

/// Symbols of an asset keyed by exported name
pub type AssetSymbols = IndexMap<String, Symbol>;

#[derive(Debug)]
pub struct CreateAssetIdParams<'a> {
  pub environment_id: &'a str,
  pub file_path: &'a str,
  pub pipeline: Option<&'a str>,
  pub query: Option<&'a str>,
  pub unique_key: Option<&'a str>,
}

/// The id of an asset is derived from its identity, not its content
///
/// Re-transforming a changed file yields a new asset record with the same id and a new
/// `content_key`, so the dependencies it declares keep their ids too.
pub fn create_asset_id(params: CreateAssetIdParams<'_>) -> AssetId {
  let CreateAssetIdParams {
    environment_id,
    file_path,
    pipeline,
    query,
    unique_key,
  } = params;

  let mut hasher = IdentifierHasher::default();

  environment_id.hash(&mut hasher);
  file_path.hash(&mut hasher);
  pipeline.hash(&mut hasher);
  query.hash(&mut hasher);
  unique_key.hash(&mut hasher);

  format!("{:016x}", hasher.finish())
}

/// An asset is a file or part of a file that may represent any data type including source code, binary data, etc.
///
/// Assets are never mutated once the transform that produced them completes. The transformed code,
/// source map and AST live in the content store behind the `*_key` fields.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
  pub id: AssetId,

  /// Controls which bundle the asset is placed into
  pub bundle_behavior: Option<BundleBehavior>,

  /// The environment of the asset
  pub env: Arc<Environment>,

  /// The file path to the asset
  pub file_path: PathBuf,

  /// The file type of the asset, which may change during transformation
  #[serde(rename = "type")]
  pub file_type: FileType,

  /// The dependencies declared by the asset, keyed by dependency id in source order
  pub dependencies: IndexMap<String, Dependency>,

  /// The symbols exported by the asset
  ///
  /// `None` when the exports could not be determined statically, e.g. CommonJS modules.
  pub symbols: Option<AssetSymbols>,

  /// Store key of the transformed code
  pub content_key: String,

  /// Store key of the source map, if one was produced
  pub map_key: Option<String>,

  /// Store key of a serialized AST, if one was produced
  pub ast_key: Option<String>,

  /// Hash of the transformed code
  pub output_hash: Option<String>,

  /// Identifies assets without a stable file path, e.g. inline assets
  pub unique_key: Option<String>,

  /// The named pipeline the asset was transformed with
  pub pipeline: Option<String>,

  /// The query string of the specifier that produced the asset
  pub query: Option<String>,

  /// Whether the asset may be elided when none of its exports are used
  pub side_effects: bool,

  pub is_bundle_splittable: bool,

  /// Whether the asset is project source rather than a node_modules dependency
  pub is_source: bool,

  #[serde(default, skip_serializing_if = "JSONObject::is_empty")]
  pub meta: JSONObject,
}

impl Asset {
  /// Whether the asset re-exports everything from at least one dependency
  pub fn has_namespace_reexports(&self) -> bool {
    self
      .dependencies
      .values()
      .any(|dependency| dependency.has_namespace_reexport())
  }

  /// True when the asset declares `symbol` itself, without forwarding it from a dependency
  pub fn declares_own_symbol(&self, symbol: &str) -> bool {
    self
      .symbols
      .as_ref()
      .and_then(|symbols| symbols.get(symbol))
      .is_some_and(|s| !s.is_weak)
  }

  /// Exported names that are not the namespace marker
  pub fn exported_symbol_names(&self) -> impl Iterator<Item = &String> {
    self
      .symbols
      .iter()
      .flat_map(|symbols| symbols.keys())
      .filter(|name| name.as_str() != CHAR_STAR)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_asset_id_ignores_content() {
    let params = || CreateAssetIdParams {
      environment_id: "env",
      file_path: "/app/a.js",
      pipeline: None,
      query: None,
      unique_key: None,
    };

    assert_eq!(create_asset_id(params()), create_asset_id(params()));
    assert_ne!(
      create_asset_id(params()),
      create_asset_id(CreateAssetIdParams {
        query: Some("raw"),
        ..params()
      })
    );
  }

  #[test]
  fn test_own_symbols_exclude_reexports() {
    let mut symbols = AssetSymbols::new();
    symbols.insert(String::from("x"), Symbol::new("x"));
    symbols.insert(String::from("y"), Symbol::weak("$re_y"));

    let asset = Asset {
      symbols: Some(symbols),
      ..Asset::default()
    };

    assert!(asset.declares_own_symbol("x"));
    assert!(!asset.declares_own_symbol("y"));
    assert_eq!(asset.exported_symbol_names().count(), 2);
  }
}
