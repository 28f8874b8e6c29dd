pub mod asset_graph;
pub mod cache;
pub mod hash;
mod macros;
pub mod plugin;
pub mod types;
pub mod wire;
