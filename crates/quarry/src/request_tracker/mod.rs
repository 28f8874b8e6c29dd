pub use self::request::*;
pub use self::request_graph::*;
pub use self::request_tracker::*;

mod request;
mod request_graph;

#[allow(clippy::module_inception)]
mod request_tracker;
