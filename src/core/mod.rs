//! Shared primitives: math algebra and the generational arena used to own runtime graph nodes.

pub mod math;
pub mod pool;

pub use math::{lerpf, wrapf, Transform};
pub use pool::{Handle, Pool};
