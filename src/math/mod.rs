//! Small math types that don't belong to any one subsystem.

mod bounds;
mod frustum;

pub use bounds::{Aabb, BoundingSphere};
pub use frustum::Frustum;
