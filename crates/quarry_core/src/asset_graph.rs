#[allow(clippy::module_inception)]
mod asset_graph;
mod deferral;
mod diagnostics;
mod requested_symbols;
mod symbol_propagation;
#[cfg(test)]
pub(crate) mod test_utils;
mod traversal;

pub use self::asset_graph::*;
pub use self::deferral::*;
pub use self::diagnostics::*;
pub use self::requested_symbols::*;
pub use self::symbol_propagation::*;
pub use self::traversal::*;
