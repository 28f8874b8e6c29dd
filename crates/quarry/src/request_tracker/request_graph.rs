use std::sync::Arc;

use petgraph::stable_graph::StableDiGraph;

use crate::requests::RequestResult;
use crate::QuarryError;

pub type RequestGraph = StableDiGraph<RequestNode, RequestEdgeType>;

#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum RequestNode {
  Error(QuarryError),
  Root,
  /// Running, or about to run, along with the result of its previous run
  Incomplete(Option<Arc<RequestResult>>),
  Valid(Arc<RequestResult>),
  /// Needs to run again; the previous result is kept for incremental requests
  Invalid(Option<Arc<RequestResult>>),
  FileInvalidation,
  EnvInvalidation,
  OptionInvalidation,
}

impl RequestNode {
  pub fn is_request(&self) -> bool {
    matches!(
      self,
      RequestNode::Error(_)
        | RequestNode::Incomplete(_)
        | RequestNode::Valid(_)
        | RequestNode::Invalid(_)
    )
  }

  /// The last successful result, whether or not it is still valid
  pub fn previous_result(&self) -> Option<Arc<RequestResult>> {
    match self {
      RequestNode::Valid(result) => Some(result.clone()),
      RequestNode::Incomplete(result) | RequestNode::Invalid(result) => result.clone(),
      _ => None,
    }
  }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestEdgeType {
  SubRequest,
  FileChangeInvalidation,
  EnvChangeInvalidation,
  OptionChangeInvalidation,
}
