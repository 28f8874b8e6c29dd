pub use self::resolver_plugin::*;
pub use self::transformer_plugin::*;

mod resolver_plugin;
mod transformer_plugin;
