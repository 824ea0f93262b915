//! Math utilities for 3D graphics

mod bounds;
mod color;
mod euler;
mod layers;
mod mat4;
mod ray;
mod vec;

pub use bounds::{BoundingBox, BoundingSphere, HitShape};
pub use color::Color;
pub use euler::Euler;
pub use layers::Layers;
pub use mat4::Mat4;
pub use ray::Ray;
pub use vec::{Vec2, Vec3, Vec4};
