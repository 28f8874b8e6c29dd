use std::fmt::Display;
use std::fmt::Formatter;

use anyhow::anyhow;
use quarry_core::types::Diagnostic;
use quarry_core::types::Diagnostics;
use serde::Serialize;
use thiserror::Error;

/// An error that can be stored and handed out more than once
///
/// Failed requests are memoised as a `QuarryError`, and every waiter gets its own
/// `anyhow::Error` rebuilt from it.
///
/// Not a `std::error::Error`: converting into `anyhow::Error` unwraps the inner diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub enum QuarryError {
  Diagnostic(Diagnostic),
  Diagnostics(Diagnostics),
  Unknown(String),
}

impl Display for QuarryError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      QuarryError::Diagnostic(diagnostic) => write!(f, "{}", diagnostic),
      QuarryError::Diagnostics(diagnostics) => write!(f, "{}", diagnostics),
      QuarryError::Unknown(message) => write!(f, "{}", message),
    }
  }
}

impl QuarryError {
  /// The error as a list of diagnostics
  pub fn diagnostics(&self) -> Vec<Diagnostic> {
    match self {
      QuarryError::Diagnostic(diagnostic) => vec![diagnostic.clone()],
      QuarryError::Diagnostics(diagnostics) => diagnostics.as_ref().clone(),
      QuarryError::Unknown(message) => vec![Diagnostic {
        message: message.clone(),
        ..Diagnostic::default()
      }],
    }
  }
}

impl Serialize for QuarryError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    match self {
      QuarryError::Diagnostic(diagnostic) => diagnostic.serialize(serializer),
      QuarryError::Diagnostics(diagnostics) => diagnostics.serialize(serializer),
      QuarryError::Unknown(message) => message.serialize(serializer),
    }
  }
}

impl From<&anyhow::Error> for QuarryError {
  fn from(error: &anyhow::Error) -> Self {
    if let Some(diagnostic) = error.downcast_ref::<Diagnostic>() {
      Self::Diagnostic(diagnostic.clone())
    } else if let Some(diagnostics) = error.downcast_ref::<Diagnostics>() {
      Self::Diagnostics(diagnostics.clone())
    } else if let Some(error) = error.downcast_ref::<QuarryError>() {
      error.clone()
    } else {
      Self::Unknown(format!("{:#}", error))
    }
  }
}

impl From<QuarryError> for anyhow::Error {
  fn from(value: QuarryError) -> Self {
    match value {
      QuarryError::Diagnostic(diagnostic) => anyhow!(diagnostic),
      QuarryError::Diagnostics(diagnostics) => anyhow!(diagnostics),
      QuarryError::Unknown(message) => anyhow!(message),
    }
  }
}

/// Why a build did not produce an asset graph
#[derive(Debug, Error)]
pub enum BuildError {
  /// Nodes required by an entry failed
  #[error("Build failed with {} error(s)", .0.len())]
  Diagnostics(Diagnostics),

  #[error("The build was aborted")]
  Aborted,

  #[error("{0}")]
  Internal(QuarryError),
}

impl From<anyhow::Error> for BuildError {
  fn from(error: anyhow::Error) -> Self {
    BuildError::Internal(QuarryError::from(&error))
  }
}
