use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::diagnostic_error;
use quarry_core::plugin::Resolution;
use quarry_core::plugin::ResolveContext;
use quarry_core::plugin::ResolvedResolution;
use quarry_core::types::Dependency;
use quarry_core::types::Diagnostic;
use quarry_core::types::DiagnosticBuilder;
use quarry_core::types::DiagnosticSeverity;
use quarry_core::types::ErrorKind;

use crate::request_tracker::Request;
use crate::request_tracker::ResultAndInvalidations;
use crate::request_tracker::RunRequestContext;
use crate::request_tracker::RunRequestError;

use super::RequestResult;

/// Resolves a dependency to the file it points at
#[derive(Debug)]
pub struct PathRequest {
  pub dependency: Arc<Dependency>,
}

impl Hash for PathRequest {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.dependency.id.hash(state);
    self.dependency.pipeline.hash(state);
    self.dependency.resolve_from().hash(state);
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathRequestOutput {
  Excluded,
  Resolved {
    can_defer: bool,
    code: Option<String>,
    path: PathBuf,
    pipeline: Option<String>,
    query: Option<String>,
    side_effects: bool,
  },
  /// An optional dependency that could not be resolved, with the warning to report on it
  Unresolved(Diagnostic),
}

/// Split a `name:specifier` prefix off when `name` is a registered named pipeline
fn parse_pipeline<'a>(specifier: &'a str, named_pipelines: &[String]) -> (Option<String>, &'a str) {
  match specifier.split_once(':') {
    Some((pipeline, rest)) if named_pipelines.iter().any(|name| name == pipeline) => {
      (Some(pipeline.to_string()), rest)
    }
    _ => (None, specifier),
  }
}

#[async_trait]
impl Request for PathRequest {
  #[tracing::instrument(level = "trace", skip_all, fields(specifier = %self.dependency.specifier))]
  async fn run(
    &self,
    request_context: RunRequestContext,
  ) -> Result<ResultAndInvalidations, RunRequestError> {
    let plugins = request_context.plugins();
    let named_pipelines = plugins.named_pipelines();
    let (parsed_pipeline, specifier) = parse_pipeline(&self.dependency.specifier, &named_pipelines);

    let mut invalidations = Vec::new();
    let mut resolver_errors = Vec::new();

    for resolver in plugins.resolvers()?.iter() {
      let result = resolver
        .resolve(ResolveContext {
          dependency: Arc::clone(&self.dependency),
          feature_flags: request_context.feature_flags().clone(),
          pipeline: parsed_pipeline.clone(),
          specifier: String::from(specifier),
        })
        .await;

      let resolved = match result {
        Ok(result) => result,
        Err(error) => {
          tracing::info!("Resolver {:?} failed.\n{}", resolver, error);
          resolver_errors.push(error.to_string());
          continue;
        }
      };

      invalidations.extend(resolved.invalidations);

      match resolved.resolution {
        Resolution::Unresolved => continue,
        Resolution::Excluded => {
          return Ok(ResultAndInvalidations::new(
            RequestResult::Path(PathRequestOutput::Excluded),
            invalidations,
          ));
        }
        Resolution::Resolved(ResolvedResolution {
          can_defer,
          code,
          file_path,
          pipeline,
          query,
          side_effects,
        }) => {
          if !file_path.is_absolute() {
            return Err(
              diagnostic_error!(DiagnosticBuilder::default()
                .kind(ErrorKind::ResolutionError)
                .message(format!(
                  "{:?} must return an absolute path, but got {}",
                  resolver,
                  file_path.display()
                )))
              .into(),
            );
          }

          return Ok(ResultAndInvalidations::new(
            RequestResult::Path(PathRequestOutput::Resolved {
              can_defer,
              code,
              path: file_path,
              pipeline: pipeline
                .or(parsed_pipeline)
                .or(self.dependency.pipeline.clone()),
              query,
              side_effects,
            }),
            invalidations,
          ));
        }
      };
    }

    let message = match self.dependency.resolve_from() {
      None => format!("Failed to resolve '{}'", self.dependency.specifier),
      Some(from) => format!(
        "Failed to resolve '{}' from '{}'",
        self.dependency.specifier,
        from.display()
      ),
    };

    let severity = if self.dependency.is_optional {
      DiagnosticSeverity::Warning
    } else {
      DiagnosticSeverity::Error
    };

    let diagnostic = diagnostic_error!(DiagnosticBuilder::default()
      .kind(ErrorKind::ResolutionError)
      .severity(severity)
      .message(message)
      .hints(resolver_errors));

    if self.dependency.is_optional {
      tracing::debug!(specifier = %self.dependency.specifier, "Optional dependency is unresolved");

      return Ok(ResultAndInvalidations::new(
        RequestResult::Path(PathRequestOutput::Unresolved(diagnostic)),
        invalidations,
      ));
    }

    Err(diagnostic.into())
  }
}
