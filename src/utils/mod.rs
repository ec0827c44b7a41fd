//! Commonly used utilities like handles, fast hashes and observer lists.

#[macro_use]
pub mod handle;
pub mod hash;
pub mod hash_value;
pub mod signal;

pub use self::handle::{Handle, HandleIndex};
pub use self::hash::{hash, FastHashMap, FastHashSet};
pub use self::hash_value::HashValue;
pub use self::signal::{ListenerId, Signal};

pub mod prelude {
    pub use super::handle::{Handle, HandleIndex};
    pub use super::hash::{FastHashMap, FastHashSet};
    pub use super::hash_value::HashValue;
    pub use super::signal::{ListenerId, Signal};
}
