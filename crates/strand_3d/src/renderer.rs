//! Renderer boundary
//!
//! Rasterization belongs to whatever backend implements [`Renderer`]. The
//! bundled [`HeadlessRenderer`] records render passes instead of drawing,
//! which is what tests and offscreen hosts use.

use std::cell::RefCell;

use crate::math::Vec2;
use crate::object::{ObjectRef, ObjectTraits};
use crate::value::Value;

/// One recorded call to [`Renderer::render`]
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPass {
    pub scene: ObjectRef,
    pub camera: ObjectRef,
}

/// A backend that can draw a scene from a camera
pub trait Renderer {
    /// Settings object (`outputColorSpace`, `toneMapping`, `shadowMap`, ...)
    fn object(&self) -> ObjectRef;

    /// Resize the drawing buffer
    fn set_size(&self, width: f32, height: f32);

    fn set_pixel_ratio(&self, ratio: f32);

    /// Draw one frame
    fn render(&self, scene: &ObjectRef, camera: &ObjectRef);

    /// Release backend resources
    fn dispose(&self) {
        self.object().dispose();
    }
}

/// Renderer that records passes without drawing
#[derive(Debug)]
pub struct HeadlessRenderer {
    object: ObjectRef,
    passes: RefCell<Vec<RenderPass>>,
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        let shadow_map = ObjectRef::new("WebGLShadowMap", ObjectTraits::empty())
            .with_prop("enabled", false)
            .with_prop("type", 1)
            .with_prop("needsUpdate", false);
        let object = ObjectRef::new(
            "HeadlessRenderer",
            ObjectTraits::RENDERER | ObjectTraits::DISPOSABLE,
        )
        .with_prop("outputColorSpace", "srgb")
        .with_prop("toneMapping", 0)
        .with_prop("toneMappingExposure", 1.0)
        .with_prop("shadowMap", shadow_map)
        .with_prop("size", Vec2::ZERO)
        .with_prop("pixelRatio", 1.0);
        Self {
            object,
            passes: RefCell::new(Vec::new()),
        }
    }

    /// Number of frames rendered so far
    pub fn frame_count(&self) -> usize {
        self.passes.borrow().len()
    }

    /// Recorded passes
    pub fn passes(&self) -> Vec<RenderPass> {
        self.passes.borrow().clone()
    }
}

impl Renderer for HeadlessRenderer {
    fn object(&self) -> ObjectRef {
        self.object.clone()
    }

    fn set_size(&self, width: f32, height: f32) {
        self.object
            .set("size", Value::Vec2(Vec2::new(width, height)));
    }

    fn set_pixel_ratio(&self, ratio: f32) {
        self.object.set("pixelRatio", ratio.into());
    }

    fn render(&self, scene: &ObjectRef, camera: &ObjectRef) {
        self.passes.borrow_mut().push(RenderPass {
            scene: scene.clone(),
            camera: camera.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_passes() {
        let renderer = HeadlessRenderer::new();
        let scene = ObjectRef::new("Scene", ObjectTraits::NODE | ObjectTraits::SCENE);
        let camera = ObjectRef::new("PerspectiveCamera", ObjectTraits::NODE | ObjectTraits::CAMERA);
        renderer.render(&scene, &camera);
        renderer.render(&scene, &camera);
        assert_eq!(renderer.frame_count(), 2);
        assert_eq!(renderer.passes()[0].scene, scene);
    }

    #[test]
    fn test_dispose_runs_hook() {
        let renderer = HeadlessRenderer::new();
        renderer.dispose();
        assert_eq!(renderer.object().dispose_count(), 1);
    }
}
