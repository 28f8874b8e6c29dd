use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::cache::ContentStoreRef;
use quarry_core::cache::InMemoryContentStore;
use quarry_core::plugin::Resolution;
use quarry_core::plugin::ResolveContext;
use quarry_core::plugin::Resolved;
use quarry_core::plugin::ResolvedResolution;
use quarry_core::plugin::ResolverPlugin;
use quarry_core::plugin::TransformContext;
use quarry_core::plugin::TransformInput;
use quarry_core::plugin::TransformResult;
use quarry_core::plugin::TransformerPlugin;
use quarry_core::types::Asset;
use quarry_core::types::AssetSymbols;
use quarry_core::types::Dependency;
use quarry_core::types::DependencyBuilder;
use quarry_core::types::DependencySymbols;
use quarry_core::types::Priority;
use quarry_core::types::QuarryOptions;
use quarry_core::types::SpecifierType;
use quarry_core::types::Symbol;
use quarry_core::types::CHAR_STAR;
use quarry_filesystem::in_memory_file_system::InMemoryFileSystem;
use quarry_filesystem::search::find_ancestor_file;
use quarry_filesystem::FileSystemRef;
use regex::Regex;
use serde::Deserialize;

use crate::plugins::PluginRegistry;
use crate::plugins::PluginsRef;
use crate::request_tracker::RequestTracker;

pub(crate) struct RequestTrackerTestOptions {
  pub(crate) fs: FileSystemRef,
  pub(crate) plugins: Option<PluginsRef>,
  pub(crate) options: QuarryOptions,
  pub(crate) store: Option<ContentStoreRef>,
}

impl Default for RequestTrackerTestOptions {
  fn default() -> Self {
    Self {
      fs: Arc::new(InMemoryFileSystem::default()),
      plugins: None,
      options: QuarryOptions::default(),
      store: None,
    }
  }
}

pub(crate) fn request_tracker(options: RequestTrackerTestOptions) -> RequestTracker {
  let RequestTrackerTestOptions {
    fs,
    plugins,
    options,
    store,
  } = options;

  let plugins = plugins.unwrap_or_else(|| Arc::new(PluginRegistry::default()));
  let store = store.unwrap_or_else(|| Arc::new(InMemoryContentStore::default()));

  RequestTracker::new(fs, Arc::new(options), plugins, store)
}

/// Plugins for end to end builds: the [`TestResolver`] and a [`RegexTransformer`] for `.js` files
pub(crate) fn test_plugins(fs: FileSystemRef, transformer: Arc<RegexTransformer>) -> PluginsRef {
  let transformers: Vec<Arc<dyn TransformerPlugin>> = vec![transformer];

  Arc::new(
    PluginRegistry::default()
      .with_resolver(Arc::new(TestResolver { fs }))
      .with_transformers(r"\.js$", transformers)
      .unwrap(),
  )
}

/// Resolves relative and absolute specifiers against the in-memory file system
///
/// A missing `.js` extension is added. Side effects come from the closest package.json.
#[derive(Debug)]
pub(crate) struct TestResolver {
  fs: FileSystemRef,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
  side_effects: Option<bool>,
}

impl TestResolver {
  fn side_effects(&self, file_path: &Path) -> bool {
    let Some(dir) = file_path.parent() else {
      return true;
    };

    find_ancestor_file(self.fs.as_ref(), &["package.json"], dir, Path::new("/"))
      .and_then(|package_json| self.fs.read_to_string(&package_json).ok())
      .and_then(|code| serde_json::from_str::<PackageJson>(&code).ok())
      .and_then(|package_json| package_json.side_effects)
      .unwrap_or(true)
  }
}

#[async_trait]
impl ResolverPlugin for TestResolver {
  async fn resolve(&self, ctx: ResolveContext) -> Result<Resolved, anyhow::Error> {
    let specifier = Path::new(&ctx.specifier);
    if !specifier.is_absolute() && !ctx.specifier.starts_with('.') {
      return Ok(Resolved::unresolved(Vec::new()));
    }

    let from = ctx
      .dependency
      .resolve_from()
      .cloned()
      .unwrap_or_else(|| PathBuf::from("/"));
    let base = if self.fs.is_dir(&from) {
      from
    } else {
      from.parent().map(Path::to_path_buf).unwrap_or_default()
    };

    let path = self.fs.canonicalize(&base.join(specifier))?;
    let candidates = [path.clone(), PathBuf::from(format!("{}.js", path.display()))];

    let Some(file_path) = candidates.into_iter().find(|path| self.fs.is_file(path)) else {
      return Ok(Resolved::unresolved(Vec::new()));
    };

    Ok(Resolved {
      invalidations: Vec::new(),
      resolution: Resolution::Resolved(ResolvedResolution {
        can_defer: true,
        side_effects: self.side_effects(&file_path),
        file_path,
        ..ResolvedResolution::default()
      }),
      meta: Default::default(),
    })
  }
}

/// Reads imports and exports of fixture modules line by line
///
/// Understands `import {a, b as c} from`, `import * as ns from`, bare imports,
/// `export {a} from`, `export * from`, `export const|function|class`, `require()`, a `require()`
/// inside `try` (optional) and `module.exports`, which drops static symbol information.
#[derive(Debug, Default)]
pub(crate) struct RegexTransformer {
  runs: AtomicUsize,
}

impl RegexTransformer {
  /// How many assets were transformed
  pub(crate) fn runs(&self) -> usize {
    self.runs.load(Ordering::SeqCst)
  }
}

struct Patterns {
  import_named: Regex,
  import_namespace: Regex,
  import_bare: Regex,
  reexport_named: Regex,
  reexport_all: Regex,
  export_declaration: Regex,
  optional_require: Regex,
  require: Regex,
}

impl Patterns {
  fn new() -> Result<Self, regex::Error> {
    Ok(Patterns {
      import_named: Regex::new(r#"^\s*import\s*\{([^}]*)\}\s*from\s*['"]([^'"]+)['"]"#)?,
      import_namespace: Regex::new(r#"^\s*import\s*\*\s*as\s+(\w+)\s+from\s*['"]([^'"]+)['"]"#)?,
      import_bare: Regex::new(r#"^\s*import\s*['"]([^'"]+)['"]"#)?,
      reexport_named: Regex::new(r#"^\s*export\s*\{([^}]*)\}\s*from\s*['"]([^'"]+)['"]"#)?,
      reexport_all: Regex::new(r#"^\s*export\s*\*\s*from\s*['"]([^'"]+)['"]"#)?,
      export_declaration: Regex::new(r"^\s*export\s+(?:const|let|var|function|class)\s+(\w+)")?,
      optional_require: Regex::new(r#"try\s*\{\s*require\(\s*['"]([^'"]+)['"]\s*\)"#)?,
      require: Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#)?,
    })
  }
}

/// `a, b as c` as `(imported, local)` pairs
fn specifiers(list: &str) -> Vec<(String, String)> {
  list
    .split(',')
    .map(str::trim)
    .filter(|item| !item.is_empty())
    .map(|item| match item.split_once(" as ") {
      Some((imported, local)) => (imported.trim().to_string(), local.trim().to_string()),
      None => (item.to_string(), item.to_string()),
    })
    .collect()
}

fn dependency(
  asset: &Asset,
  specifier: &str,
  specifier_type: SpecifierType,
  symbols: Option<DependencySymbols>,
  is_optional: bool,
) -> anyhow::Result<Dependency> {
  let mut builder = DependencyBuilder::default()
    .env(asset.env.clone())
    .specifier(specifier.to_string())
    .specifier_type(specifier_type)
    .priority(Priority::Sync)
    .is_optional(is_optional)
    .source_asset_id(asset.id.clone())
    .source_path(asset.file_path.clone());

  if let Some(symbols) = symbols {
    builder = builder.symbols(symbols);
  }

  Ok(builder.build()?)
}

#[async_trait]
impl TransformerPlugin for RegexTransformer {
  async fn transform(
    &self,
    _context: TransformContext,
    input: TransformInput,
  ) -> Result<TransformResult, anyhow::Error> {
    self.runs.fetch_add(1, Ordering::SeqCst);

    let patterns = Patterns::new()?;
    let code = String::from_utf8(input.code.clone())?;
    let mut asset = input.asset;
    let mut symbols = AssetSymbols::new();
    let mut dependencies = Vec::new();

    for line in code.lines() {
      if let Some(captures) = patterns.import_named.captures(line) {
        let imports = specifiers(&captures[1])
          .into_iter()
          .map(|(imported, local)| (imported, Symbol::new(local)))
          .collect::<DependencySymbols>();
        dependencies.push(dependency(&asset, &captures[2], SpecifierType::Esm, Some(imports), false)?);
      } else if let Some(captures) = patterns.import_namespace.captures(line) {
        let mut imports = DependencySymbols::new();
        imports.insert(CHAR_STAR.to_string(), Symbol::new(&captures[1]));
        dependencies.push(dependency(&asset, &captures[2], SpecifierType::Esm, Some(imports), false)?);
      } else if let Some(captures) = patterns.import_bare.captures(line) {
        let imports = DependencySymbols::new();
        dependencies.push(dependency(&asset, &captures[1], SpecifierType::Esm, Some(imports), false)?);
      } else if let Some(captures) = patterns.reexport_named.captures(line) {
        let mut imports = DependencySymbols::new();
        for (imported, exported) in specifiers(&captures[1]) {
          let local = format!("$re_{}", exported);
          imports.insert(imported, Symbol::weak(local.clone()));
          symbols.insert(exported, Symbol::weak(local));
        }
        dependencies.push(dependency(&asset, &captures[2], SpecifierType::Esm, Some(imports), false)?);
      } else if let Some(captures) = patterns.reexport_all.captures(line) {
        let mut imports = DependencySymbols::new();
        imports.insert(CHAR_STAR.to_string(), Symbol::weak(CHAR_STAR));
        dependencies.push(dependency(&asset, &captures[1], SpecifierType::Esm, Some(imports), false)?);
      } else if let Some(captures) = patterns.export_declaration.captures(line) {
        symbols.insert(captures[1].to_string(), Symbol::new(&captures[1]));
      } else if let Some(captures) = patterns.optional_require.captures(line) {
        dependencies.push(dependency(&asset, &captures[1], SpecifierType::CommonJS, None, true)?);
      } else if let Some(captures) = patterns.require.captures(line) {
        dependencies.push(dependency(&asset, &captures[1], SpecifierType::CommonJS, None, false)?);
      }
    }

    asset.symbols = if code.contains("module.exports") {
      None
    } else {
      Some(symbols)
    };

    Ok(TransformResult {
      asset,
      code: input.code,
      map: input.map,
      dependencies,
      ..TransformResult::default()
    })
  }
}
