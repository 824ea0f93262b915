//! Strand 3D
//!
//! A small retained-mode 3D object model for the Strand reconciler:
//!
//! - **Math**: vectors, colours, Euler angles, matrices, layer masks, rays
//! - **Objects**: shared property-bag objects with a parent/child scene graph
//! - **Values**: typed property values with per-family setter capabilities
//! - **Builtins**: constructors for meshes, cameras, lights, materials and more
//! - **Queries**: ray intersection against an explicit list of candidates
//! - **Rendering**: a [`Renderer`] trait and a recording [`HeadlessRenderer`]
//!
//! # Example
//!
//! ```rust
//! use strand_3d::{construct, Raycaster, Value, Vec2, Vec3};
//!
//! let scene = construct("Scene", &[]).unwrap().unwrap();
//! let mesh = construct("Mesh", &[]).unwrap().unwrap();
//! scene.add(&mesh).unwrap();
//!
//! let camera = construct("PerspectiveCamera", &[]).unwrap().unwrap();
//! camera.set("position", Value::Vec3(Vec3::new(0.0, 0.0, 5.0)));
//!
//! let mut raycaster = Raycaster::from_object(construct("Raycaster", &[]).unwrap().unwrap());
//! raycaster.set_from_camera(Vec2::ZERO, &camera);
//! let hits = raycaster.intersect_objects(&[scene], true);
//! assert_eq!(hits[0].object, mesh);
//! ```

pub mod builtins;
pub mod camera;
pub mod error;
pub mod math;
pub mod object;
pub mod raycaster;
pub mod renderer;
pub mod value;

pub use builtins::{builtins, construct, Constructor};
pub use camera::{fit_camera, ray_from_camera};
pub use error::{EngineError, Result};
pub use math::{
    BoundingBox, BoundingSphere, Color, Euler, HitShape, Layers, Mat4, Ray, Vec2, Vec3, Vec4,
};
pub use object::{ObjectId, ObjectRef, ObjectTraits};
pub use raycaster::{Intersection, Raycaster};
pub use renderer::{HeadlessRenderer, RenderPass, Renderer};
pub use value::{Setters, Value};
