use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use quarry_filesystem::FileSystem;
use serde::Deserialize;
use serde::Serialize;

use crate::diagnostic_error;

use super::diagnostic::CodeFrame;
use super::diagnostic::CodeHighlight;
use super::diagnostic::Diagnostic;
use super::diagnostic::DiagnosticBuilder;
use super::diagnostic::ErrorKind;
use super::feature_flags::FeatureFlags;
use super::target::Target;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
  #[default]
  Development,
  Production,
}

/// The options of a build
///
/// This is the single explicit configuration value of the engine. It is shared with every
/// request, which records `OptionChange` invalidations against its top-level keys.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QuarryOptions {
  pub project_root: PathBuf,

  /// Entry specifiers, relative to the project root
  pub entries: Vec<String>,

  /// Targets supplied by the configuration loader
  ///
  /// When empty a single browser target writing to `<project_root>/dist` is used.
  pub targets: Vec<Target>,

  /// Environment variables visible to requests
  pub env: BTreeMap<String, String>,

  pub mode: BuildMode,

  /// Directory of the on-disk content store
  pub cache_dir: Option<PathBuf>,

  /// Number of worker threads, defaults to the number of CPUs
  pub threads: Option<usize>,

  pub feature_flags: FeatureFlags,
}

impl QuarryOptions {
  /// Load options from a JSON file
  pub fn from_json(fs: &dyn FileSystem, path: &Path) -> Result<QuarryOptions, Diagnostic> {
    let code = fs.read_to_string(path).map_err(|error| {
      diagnostic_error!(DiagnosticBuilder::default()
        .kind(ErrorKind::NotFound)
        .message(format!("Unable to read {}: {}", path.display(), error)))
    })?;

    let mut options = serde_json::from_str::<QuarryOptions>(&code).map_err(|error| {
      diagnostic_error!(DiagnosticBuilder::default()
        .kind(ErrorKind::ParseError)
        .message(format!("Failed to parse {}", path.display()))
        .code_frames(vec![CodeFrame {
          file_path: Some(path.to_path_buf()),
          code: Some(code.clone()),
          code_highlights: vec![CodeHighlight::from([error.line(), error.column()])],
        }]))
    })?;

    if options.project_root.as_os_str().is_empty() {
      options.project_root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    }

    Ok(options)
  }

  /// The targets of the build, falling back to the default target
  pub fn targets(&self) -> Vec<Target> {
    if !self.targets.is_empty() {
      return self.targets.clone();
    }

    vec![Target {
      dist_dir: self.project_root.join("dist"),
      ..Target::default()
    }]
  }

  /// The serialized value of a top-level option, used to detect option changes between builds
  pub fn option_value(&self, key: &str) -> Option<serde_json::Value> {
    let value = serde_json::to_value(self).ok()?;
    value.get(key).cloned()
  }
}
