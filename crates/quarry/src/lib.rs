pub use error::*;
pub use quarry::*;
pub use quarry_filesystem as file_system;
pub use quarry_monitoring as monitoring;
pub use watch::*;

pub mod plugins;
pub mod quarry;
pub mod request_tracker;
pub mod requests;

mod error;
mod watch;

#[cfg(test)]
mod test_utils;
