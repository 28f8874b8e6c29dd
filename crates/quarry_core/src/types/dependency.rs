use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::Arc;

use derive_builder::Builder;
use derive_builder::UninitializedFieldError;
use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use serde_repr::Deserialize_repr;
use serde_repr::Serialize_repr;

use crate::hash::IdentifierHasher;

use super::asset::AssetId;
use super::entry::Entry;
use super::environment::Environment;
use super::json::JSONObject;
use super::source::SourceLocation;
use super::symbol::Symbol;
use super::symbol::CHAR_STAR;
use super::target::Target;

pub type DependencyRef = Arc<Dependency>;

/// Symbols of a dependency keyed by the name imported from the resolved asset
pub type DependencySymbols = IndexMap<String, Symbol>;

#[allow(clippy::too_many_arguments)]
pub fn create_dependency_id(
  source_asset_id: Option<&AssetId>,
  specifier: &str,
  environment_id: &str,
  target: Option<&Target>,
  pipeline: Option<&str>,
  specifier_type: &SpecifierType,
  bundle_behavior: &Option<BundleBehavior>,
  priority: &Priority,
) -> String {
  let mut hasher = IdentifierHasher::new();

  source_asset_id.hash(&mut hasher);
  specifier.hash(&mut hasher);
  environment_id.hash(&mut hasher);
  target.hash(&mut hasher);
  pipeline.hash(&mut hasher);
  specifier_type.hash(&mut hasher);
  bundle_behavior.hash(&mut hasher);
  priority.hash(&mut hasher);

  format!("{:016x}", hasher.finish())
}

/// A dependency denotes a connection between two assets
///
/// Identical imports from identical contexts produce the same `id`, which is how the asset graph
/// collapses them into one node.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Builder)]
#[builder(build_fn(skip), pattern = "owned", setter(strip_option))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Dependency {
  /// Controls the behavior of the bundle the resolved asset is placed into
  pub bundle_behavior: Option<BundleBehavior>,

  /// The environment of the dependency
  pub env: Arc<Environment>,

  #[builder(setter(skip))]
  pub id: String,

  /// Whether the dependency is an entry
  pub is_entry: bool,

  /// Whether the dependency is optional
  ///
  /// If an optional dependency cannot be resolved, it will not fail the build.
  pub is_optional: bool,

  /// The location within the source file where the dependency was found
  pub loc: Option<SourceLocation>,

  /// Plugin-specific metadata for the dependency
  pub meta: JSONObject,

  /// Indicates that the name should be stable over time, even when the content of the bundle changes
  pub needs_stable_name: bool,

  /// The named pipeline the resolved asset should be transformed with
  pub pipeline: Option<String>,

  /// Determines when the dependency should be loaded
  pub priority: Priority,

  /// The file path where the dependency should be resolved from
  ///
  /// By default, this is the path of the source file where the dependency was specified.
  pub resolve_from: Option<PathBuf>,

  /// The id of the asset with this dependency
  pub source_asset_id: Option<AssetId>,

  /// The file path of the asset with this dependency
  pub source_path: Option<PathBuf>,

  /// The import or export specifier that connects two assets together
  pub specifier: String,

  /// How the specifier should be interpreted
  pub specifier_type: SpecifierType,

  /// The symbols imported through this dependency
  ///
  /// `None` means nothing is known statically about what is imported, which treats every export
  /// of the resolved asset as used.
  pub symbols: Option<DependencySymbols>,

  /// The target associated with an entry, if any
  pub target: Option<Box<Target>>,
}

impl DependencyBuilder {
  pub fn build(self) -> Result<Dependency, UninitializedFieldError> {
    // These properties are required to generate an ID
    let specifier = self
      .specifier
      .ok_or_else(|| UninitializedFieldError::new("specifier"))?;
    let env = self.env.ok_or_else(|| UninitializedFieldError::new("env"))?;
    let specifier_type = self
      .specifier_type
      .ok_or_else(|| UninitializedFieldError::new("specifier_type"))?;
    let priority = self
      .priority
      .ok_or_else(|| UninitializedFieldError::new("priority"))?;

    // These are part of ID generation, but can be optional
    let source_asset_id = self.source_asset_id.flatten();
    let target = self.target.flatten();
    let pipeline = self.pipeline.flatten();
    let bundle_behavior = self.bundle_behavior.flatten();

    let id = create_dependency_id(
      source_asset_id.as_ref(),
      &specifier,
      &env.id(),
      target.as_deref(),
      pipeline.as_deref(),
      &specifier_type,
      &bundle_behavior,
      &priority,
    );

    Ok(Dependency {
      id,
      specifier,
      env,
      specifier_type,
      priority,
      pipeline,
      source_asset_id,
      target,
      bundle_behavior,
      is_entry: self.is_entry.unwrap_or_default(),
      is_optional: self.is_optional.unwrap_or_default(),
      loc: self.loc.flatten(),
      meta: self.meta.unwrap_or_default(),
      needs_stable_name: self.needs_stable_name.unwrap_or_default(),
      resolve_from: self.resolve_from.flatten(),
      source_path: self.source_path.flatten(),
      symbols: self.symbols.flatten(),
    })
  }
}

impl Dependency {
  /// The dependency that connects an entry file to a target
  pub fn entry(entry: &Entry, target: &Target) -> Dependency {
    let is_library = target.env.is_library;
    let mut builder = DependencyBuilder::default()
      .env(target.env.clone())
      .specifier(entry.file_path.to_string_lossy().into_owned())
      .specifier_type(SpecifierType::Url)
      .priority(Priority::Sync)
      .is_entry(true)
      .needs_stable_name(true)
      .resolve_from(entry.package_path.clone())
      .target(Box::new(target.clone()));

    if let Some(loc) = entry.loc.clone() {
      builder = builder.loc(loc);
    }

    // Library entries expose their whole namespace, application entries use none of their exports
    let mut symbols = DependencySymbols::new();
    if is_library {
      symbols.insert(CHAR_STAR.to_string(), Symbol::new(CHAR_STAR));
    }
    builder = builder.symbols(symbols);

    // Every identity field is set above, so building cannot fail
    builder.build().unwrap_or_default()
  }

  /// True when the dependency re-exports every export of its target
  pub fn has_namespace_reexport(&self) -> bool {
    self
      .symbols
      .as_ref()
      .and_then(|symbols| symbols.get(CHAR_STAR))
      .is_some_and(|symbol| symbol.is_namespace_reexport())
  }

  /// The path that relative specifiers are resolved against
  pub fn resolve_from(&self) -> Option<&PathBuf> {
    self.resolve_from.as_ref().or(self.source_path.as_ref())
  }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleBehavior {
  /// Inline the resolved asset into the parent bundle
  Inline,
  /// Place the resolved asset in a bundle that does not share code with other bundles
  Isolated,
}

/// Determines when a dependency should load
#[derive(Clone, Copy, Debug, Default, Deserialize_repr, Eq, Hash, PartialEq, Serialize_repr)]
#[repr(u8)]
pub enum Priority {
  /// Resolves the dependency synchronously, placing the resolved asset in the same bundle as the parent or another bundle that is already on the page
  #[default]
  Sync = 0,
  /// Places the dependency in a separate bundle loaded in parallel with the current bundle
  Parallel = 1,
  /// The dependency should be placed in a separate bundle that is loaded later
  Lazy = 2,
  /// The dependency is loaded behind a runtime condition
  Conditional = 3,
}

/// The type of the import specifier
#[derive(Clone, Copy, Debug, Default, Deserialize_repr, Eq, Hash, PartialEq, Serialize_repr)]
#[repr(u8)]
pub enum SpecifierType {
  /// A CommonJS require call
  ///
  /// The specifier is interpreted as a bare name, relative or absolute path, with extensions
  /// optional and index files supported.
  CommonJS = 0,

  /// An ES Module specifier
  ///
  /// This is parsed as an URL, but bare specifiers are treated as node_modules.
  #[default]
  Esm = 1,

  /// A URL that works as in a browser
  ///
  /// Bare specifiers are treated as relative URLs.
  Url = 2,

  /// A custom specifier that must be handled by a custom resolver plugin
  Custom = 3,
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;

  fn builder(specifier: &str) -> DependencyBuilder {
    DependencyBuilder::default()
      .env(Arc::new(Environment::default()))
      .specifier(specifier.to_string())
      .specifier_type(SpecifierType::Esm)
      .priority(Priority::Sync)
      .source_asset_id(String::from("a"))
  }

  #[test]
  fn test_identical_dependencies_share_an_id() {
    let a = builder("./b.js")
      .source_path(PathBuf::from("/a.js"))
      .build()
      .unwrap();
    let b = builder("./b.js")
      .loc(SourceLocation::default())
      .build()
      .unwrap();

    assert_eq!(a.id, b.id);
  }

  #[test]
  fn test_identity_fields_change_the_id() {
    let sync = builder("./b.js").build().unwrap();
    let lazy = builder("./b.js").priority(Priority::Lazy).build().unwrap();
    let other = builder("./c.js").build().unwrap();

    assert_ne!(sync.id, lazy.id);
    assert_ne!(sync.id, other.id);
  }

  #[test]
  fn test_build_requires_a_specifier() {
    let error = DependencyBuilder::default()
      .env(Arc::new(Environment::default()))
      .specifier_type(SpecifierType::Esm)
      .priority(Priority::Sync)
      .build()
      .unwrap_err();

    assert_eq!(error.field_name(), "specifier");
  }

  #[test]
  fn test_library_entries_request_the_namespace() {
    let target = Target {
      env: Arc::new(Environment {
        is_library: true,
        ..Environment::default()
      }),
      ..Target::default()
    };
    let entry = Entry {
      file_path: PathBuf::from("/app/index.js"),
      package_path: PathBuf::from("/app"),
      ..Entry::default()
    };

    let dependency = Dependency::entry(&entry, &target);

    assert!(dependency.is_entry);
    assert_eq!(
      dependency.symbols.unwrap().keys().collect::<Vec<_>>(),
      vec!["*"]
    );
  }

  #[test]
  fn test_application_entries_request_nothing() {
    let entry = Entry {
      file_path: PathBuf::from("/app/index.js"),
      package_path: PathBuf::from("/app"),
      ..Entry::default()
    };

    let dependency = Dependency::entry(&entry, &Target::default());

    assert_eq!(dependency.symbols, Some(DependencySymbols::new()));
    assert_eq!(dependency.resolve_from(), Some(&PathBuf::from("/app")));
  }
}
