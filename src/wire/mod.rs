//! Bit-exact call-region layout and the codec used to pack/unpack it (§3, §4.1, §6.1).

pub mod argument;
pub mod layout;
pub mod methods;
pub mod params;

pub use argument::{ArgumentReader, ArgumentWriter};
pub use layout::{Header, RegionLayout, LOCK_COMPLETED, LOCK_PENDING};
pub use methods::MethodId;
