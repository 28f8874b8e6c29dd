use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use quarry_core::plugin::ResolverPlugin;
use quarry_core::plugin::TransformerPlugin;
use regex::Regex;

use super::Plugins;
use super::TransformerPipeline;

#[derive(Debug)]
struct TransformerRule {
  pattern: Regex,
  pipeline: Option<String>,
  transformers: Vec<Arc<dyn TransformerPlugin>>,
}

/// Plugins registered in code
///
/// Transformer rules are matched in registration order against the asset path and the named
/// pipeline it was requested with. Assets without a matching rule keep their source as is.
#[derive(Debug, Default)]
pub struct PluginRegistry {
  resolvers: Vec<Arc<dyn ResolverPlugin>>,
  rules: Vec<TransformerRule>,
}

impl PluginRegistry {
  pub fn with_resolver(mut self, resolver: Arc<dyn ResolverPlugin>) -> Self {
    self.resolvers.push(resolver);
    self
  }

  /// Run `transformers` for paths matching the `pattern` regex
  pub fn with_transformers(
    self,
    pattern: &str,
    transformers: Vec<Arc<dyn TransformerPlugin>>,
  ) -> Result<Self, regex::Error> {
    self.with_rule(pattern, None, transformers)
  }

  /// Run `transformers` for paths matching `pattern` that were requested as `name:<specifier>`
  pub fn with_named_pipeline(
    self,
    name: &str,
    pattern: &str,
    transformers: Vec<Arc<dyn TransformerPlugin>>,
  ) -> Result<Self, regex::Error> {
    self.with_rule(pattern, Some(name.to_string()), transformers)
  }

  fn with_rule(
    mut self,
    pattern: &str,
    pipeline: Option<String>,
    transformers: Vec<Arc<dyn TransformerPlugin>>,
  ) -> Result<Self, regex::Error> {
    self.rules.push(TransformerRule {
      pattern: Regex::new(pattern)?,
      pipeline,
      transformers,
    });
    Ok(self)
  }
}

impl Plugins for PluginRegistry {
  fn named_pipelines(&self) -> Vec<String> {
    let mut names = self
      .rules
      .iter()
      .filter_map(|rule| rule.pipeline.clone())
      .collect::<Vec<String>>();
    names.sort();
    names.dedup();
    names
  }

  fn resolvers(&self) -> Result<Vec<Arc<dyn ResolverPlugin>>, anyhow::Error> {
    if self.resolvers.is_empty() {
      return Err(anyhow!("No resolvers are registered"));
    }

    Ok(self.resolvers.clone())
  }

  fn transformers(
    &self,
    path: &Path,
    pipeline: Option<String>,
  ) -> Result<TransformerPipeline, anyhow::Error> {
    let path_str = path.to_string_lossy();
    let rule = self
      .rules
      .iter()
      .find(|rule| rule.pipeline == pipeline && rule.pattern.is_match(&path_str));

    match (rule, pipeline) {
      (Some(rule), _) => Ok(TransformerPipeline::new(rule.transformers.clone())),
      (None, Some(pipeline)) => Err(anyhow!(
        "No transformers found for {} with pipeline '{}'",
        path.display(),
        pipeline
      )),
      (None, None) => Ok(TransformerPipeline::new(Vec::new())),
    }
  }
}
