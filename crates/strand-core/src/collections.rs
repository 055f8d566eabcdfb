//! Hash collection façade. The hook store and tracking maps go through
//! this module so the `std-hash` feature can swap `hashbrown` for the
//! standard library implementations.

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use hashbrown::{HashMap, HashSet};
}
