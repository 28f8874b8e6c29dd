use std::fmt::Display;
use std::fmt::Formatter;
use std::path::PathBuf;

use derive_builder::Builder;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use super::source::Location;

/// This is a user facing error.
///
/// Usually but not always this is linked to a source-code location.
#[derive(Builder, Clone, Debug, Default, Deserialize, Error, PartialEq, Serialize)]
#[builder(default, setter(into))]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
  /// A summary user-facing message
  pub message: String,

  /// Indicates where this diagnostic was emitted from
  pub origin: Option<String>,

  /// Name of the error (optional)
  pub name: Option<String>,

  pub kind: ErrorKind,

  pub severity: DiagnosticSeverity,

  /// A list of files with source-code highlights
  pub code_frames: Vec<CodeFrame>,

  /// Hints for the user
  pub hints: Vec<String>,

  /// URL for the user to refer to documentation
  #[serde(rename = "documentationURL")]
  pub documentation_url: Option<String>,
}

impl Display for Diagnostic {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.message)
  }
}

impl Diagnostic {
  pub fn is_error(&self) -> bool {
    self.severity == DiagnosticSeverity::Error
  }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ErrorKind {
  NotFound,
  ParseError,
  ResolutionError,
  TransformError,
  SymbolNotExported,
  #[default]
  Unknown,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
  #[default]
  Error,
  Warning,
}

/// Source code for a diagnostic along with the ranges to highlight
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFrame {
  pub file_path: Option<PathBuf>,

  /// The code, when it is not read from `file_path`
  pub code: Option<String>,

  pub code_highlights: Vec<CodeHighlight>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CodeHighlight {
  pub message: Option<String>,
  pub start: Location,
  pub end: Location,
}

impl From<[usize; 2]> for CodeHighlight {
  fn from(location: [usize; 2]) -> Self {
    CodeHighlight {
      message: None,
      start: Location::from(location),
      end: Location::from(location),
    }
  }
}

/// A list of diagnostics that travel together as one error
#[derive(Clone, Debug, Default, Deserialize, Error, PartialEq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
  pub fn as_ref(&self) -> &Vec<Diagnostic> {
    &self.0
  }

  pub fn as_mut(&mut self) -> &mut Vec<Diagnostic> {
    &mut self.0
  }

  pub fn into_inner(self) -> Vec<Diagnostic> {
    self.0
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }
}

impl Display for Diagnostics {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for diagnostic in &self.0 {
      writeln!(f, "{}", diagnostic)?;
    }
    Ok(())
  }
}

impl Serialize for Diagnostics {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    self.0.serialize(serializer)
  }
}

impl From<Vec<Diagnostic>> for Diagnostics {
  fn from(diagnostics: Vec<Diagnostic>) -> Self {
    Diagnostics(diagnostics)
  }
}

impl From<Diagnostic> for Diagnostics {
  fn from(diagnostic: Diagnostic) -> Self {
    Diagnostics(vec![diagnostic])
  }
}
