//! Strand Fiber
//!
//! A reactive reconciler that projects a declarative element tree onto a
//! Strand 3D scene graph:
//!
//! - **Elements**: `el("mesh")` builders with static and reactive props,
//!   event handlers, attach paths and children
//! - **Instances**: arena records linking each engine object to its props,
//!   handlers and place in the tree
//! - **Props**: dashed paths (`material-color`) written with the setter each
//!   value family supports
//! - **Scene graph**: children attached by callback, slot path, object kind or
//!   child list, kept in declaration order
//! - **Events**: raycast pointer events with enter/leave derivation, bubbling
//!   and pointer capture
//! - **Roots**: canvas, camera, renderer and frame loop, plus the `use_three`,
//!   `use_frame` and `use_loader` hooks
//!
//! # Example
//!
//! ```rust
//! use strand_3d::Vec3;
//! use strand_core::create_signal;
//! use strand_fiber::{create_root, el, Canvas, RootConfig};
//!
//! let mut root = create_root(Canvas::new(800.0, 600.0), RootConfig::default()).unwrap();
//! let x = create_signal(0.0);
//! root.render(move || {
//!     el("mesh")
//!         .bind("position-x", move || x.get())
//!         .child(el("boxGeometry").args(vec![1.0.into(), 1.0.into(), 1.0.into()]))
//!         .child(el("meshStandardMaterial").prop("opacity", 0.5))
//! });
//! x.set(2.0);
//! let mesh = root.scene().children()[0].clone();
//! assert_eq!(mesh.get("position"), Some(Vec3::new(2.0, 0.0, 0.0).into()));
//! ```

pub mod catalogue;
pub mod config;
pub mod context;
mod dispatch;
pub mod element;
pub mod error;
pub mod events;
mod graph;
pub mod instance;
pub mod loader;
pub mod logging;
pub mod props;
mod render;
pub mod root;

pub use catalogue::{default_catalogue, extend, resolve_component, Catalogue, Component};
pub use config::{FrameLoop, RootConfig, ShadowMode};
pub use context::{use_frame, use_three, FrameInfo, ThreeContext, XrBridge};
pub use element::{component, dynamic, each, el, fragment, portal, primitive, Element, View};
pub use error::{FiberError, Result};
pub use events::{EventKind, Handler, NativeEvent, NativeKind, ThreeEvent};
pub use instance::{Attach, InstanceData, InstanceId, SceneStore};
pub use loader::{default_loader_cache, use_loader, LoadError, Loader, LoaderCache};
pub use logging::{init_logging, LoggingConfig};
pub use props::write_prop;
pub use root::{create_root, Canvas, Root};
