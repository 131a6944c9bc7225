pub mod aabb;
pub mod build;
pub mod bvh;
pub mod bvh_node;
pub mod error;

pub(crate) mod partitioning;

pub use aabb::*;
pub use build::*;
pub use bvh::*;
pub use bvh_node::*;
pub use error::{BuildError, Result};
