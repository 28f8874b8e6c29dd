use std::path::PathBuf;
use std::sync::Arc;

use crate::types::create_asset_id;
use crate::types::Asset;
use crate::types::AssetSymbols;
use crate::types::CreateAssetIdParams;
use crate::types::Dependency;
use crate::types::DependencyBuilder;
use crate::types::DependencySymbols;
use crate::types::Entry;
use crate::types::Environment;
use crate::types::Priority;
use crate::types::SpecifierType;
use crate::types::Symbol;
use crate::types::Target;

use super::AssetGraph;
use super::NodeId;

pub fn asset_id(path: &str) -> String {
  create_asset_id(CreateAssetIdParams {
    environment_id: &Environment::default().id(),
    file_path: path,
    pipeline: None,
    query: None,
    unique_key: None,
  })
}

/// An asset declaring `exports` itself
pub fn asset_fixture(path: &str, exports: &[&str]) -> Asset {
  let symbols = exports
    .iter()
    .map(|name| (name.to_string(), Symbol::new(*name)))
    .collect::<AssetSymbols>();

  Asset {
    id: asset_id(path),
    file_path: PathBuf::from(path),
    symbols: Some(symbols),
    ..Asset::default()
  }
}

/// An asset that also re-exports `reexports` through locals named `$re_<name>`
pub fn reexporting_asset(path: &str, exports: &[&str], reexports: &[&str]) -> Asset {
  let mut asset = asset_fixture(path, exports);
  if let Some(symbols) = asset.symbols.as_mut() {
    for name in reexports {
      symbols.insert(name.to_string(), Symbol::weak(format!("$re_{}", name)));
    }
  }
  asset
}

fn dependency_builder(source_path: &str, specifier: &str) -> DependencyBuilder {
  DependencyBuilder::default()
    .env(Arc::new(Environment::default()))
    .specifier(specifier.to_string())
    .specifier_type(SpecifierType::Esm)
    .priority(Priority::Sync)
    .source_asset_id(asset_id(source_path))
    .source_path(PathBuf::from(source_path))
}

/// An `import { ...imports } from specifier` in `source_path`
pub fn dependency_from(source_path: &str, specifier: &str, imports: &[&str]) -> Dependency {
  let symbols = imports
    .iter()
    .map(|name| (name.to_string(), Symbol::new(*name)))
    .collect::<DependencySymbols>();

  dependency_builder(source_path, specifier)
    .symbols(symbols)
    .build()
    .unwrap()
}

/// An `export { ...names } from specifier` in `source_path`, matching `reexporting_asset`
pub fn reexport_from(source_path: &str, specifier: &str, names: &[&str]) -> Dependency {
  let symbols = names
    .iter()
    .map(|name| (name.to_string(), Symbol::weak(format!("$re_{}", name))))
    .collect::<DependencySymbols>();

  dependency_builder(source_path, specifier)
    .symbols(symbols)
    .build()
    .unwrap()
}

/// An `export * from specifier` in `source_path`
pub fn export_all_from(source_path: &str, specifier: &str) -> Dependency {
  let mut symbols = DependencySymbols::new();
  symbols.insert(String::from("*"), Symbol::weak("*"));

  dependency_builder(source_path, specifier)
    .symbols(symbols)
    .build()
    .unwrap()
}

/// A `require(specifier)` with no static symbol information
pub fn require_from(source_path: &str, specifier: &str) -> Dependency {
  dependency_builder(source_path, specifier)
    .specifier_type(SpecifierType::CommonJS)
    .build()
    .unwrap()
}

pub fn entry_dependency(path: &str) -> Dependency {
  Dependency::entry(
    &Entry {
      file_path: PathBuf::from(path),
      package_path: PathBuf::from("/"),
      ..Entry::default()
    },
    &Target::default(),
  )
}

/// Add an entry for the asset and resolve its entry dependency to it
pub fn add_entry_with_asset(graph: &mut AssetGraph, asset: Asset) -> (NodeId, NodeId) {
  let path = asset.file_path.clone();
  let specifier = graph.add_entry_specifier(path.to_string_lossy().into_owned());
  let entry_file = graph.add_entry_file(
    specifier,
    Entry {
      file_path: path.clone(),
      package_path: PathBuf::from("/"),
      ..Entry::default()
    },
  );
  let dependency = graph.add_entry_dependency(entry_file, entry_dependency(&path.to_string_lossy()));
  let asset = graph.add_asset(Arc::new(asset), None);
  graph.resolve_dependency(dependency, asset);
  (dependency, asset)
}

/// Add an asset with its dependencies, resolving the dependency `from` to it
pub fn add_resolved_asset(
  graph: &mut AssetGraph,
  from: NodeId,
  asset: Asset,
  dependencies: Vec<Dependency>,
) -> (NodeId, Vec<NodeId>) {
  let asset_id = graph.add_asset(Arc::new(asset), None);
  graph.resolve_dependency(from, asset_id);
  let dependency_ids = graph.set_asset_dependencies(asset_id, dependencies);
  (asset_id, dependency_ids)
}
