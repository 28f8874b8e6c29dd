pub use self::asset::*;
pub use self::dependency::*;
pub use self::diagnostic::*;
pub use self::entry::*;
pub use self::environment::*;
pub use self::feature_flags::*;
pub use self::file_type::*;
pub use self::invalidation::*;
pub use self::json::*;
pub use self::options::*;
pub use self::source::*;
pub use self::symbol::*;
pub use self::target::*;

mod asset;
mod dependency;
mod diagnostic;
mod entry;
mod environment;
mod feature_flags;
mod file_type;
mod invalidation;
mod json;
mod options;
mod source;
mod symbol;
mod target;
