//! Camera projection helpers

use crate::math::{Ray, Vec2, Vec3};
use crate::object::{ObjectRef, ObjectTraits};

fn number(object: &ObjectRef, key: &str, default: f32) -> f32 {
    object
        .get(key)
        .and_then(|v| v.as_f32())
        .unwrap_or(default)
}

/// World-space ray through a normalised device coordinate (`-1..=1` on both
/// axes, +Y up)
pub fn ray_from_camera(camera: &ObjectRef, ndc: Vec2) -> Ray {
    let world = camera.world_matrix();
    let zoom = number(camera, "zoom", 1.0).max(f32::EPSILON);

    if camera.is(ObjectTraits::ORTHOGRAPHIC) {
        let left = number(camera, "left", -1.0);
        let right = number(camera, "right", 1.0);
        let top = number(camera, "top", 1.0);
        let bottom = number(camera, "bottom", -1.0);
        let x = (ndc.x * (right - left) / 2.0 + (right + left) / 2.0) / zoom;
        let y = (ndc.y * (top - bottom) / 2.0 + (top + bottom) / 2.0) / zoom;
        let origin = world.transform_point(Vec3::new(x, y, 0.0));
        let direction = world.transform_vector(Vec3::FORWARD).normalize();
        return Ray::new(origin, direction);
    }

    let fov = number(camera, "fov", 50.0).to_radians();
    let aspect = number(camera, "aspect", 1.0);
    let half_height = (fov / 2.0).tan() / zoom;
    let local = Vec3::new(ndc.x * half_height * aspect, ndc.y * half_height, -1.0);
    Ray::new(
        world.position(),
        world.transform_vector(local).normalize(),
    )
}

/// Fit the camera frustum to a canvas of `width` x `height` pixels
pub fn fit_camera(camera: &ObjectRef, width: f32, height: f32) {
    if width <= 0.0 || height <= 0.0 {
        return;
    }
    if camera.is(ObjectTraits::ORTHOGRAPHIC) {
        camera.set("left", (-width as f64 / 2.0).into());
        camera.set("right", (width as f64 / 2.0).into());
        camera.set("top", (height as f64 / 2.0).into());
        camera.set("bottom", (-height as f64 / 2.0).into());
    } else if camera.is(ObjectTraits::PERSPECTIVE) {
        camera.set("aspect", (width as f64 / height as f64).into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::construct;
    use crate::value::Value;

    #[test]
    fn test_center_ray_looks_down_negative_z() {
        let camera = construct("PerspectiveCamera", &[]).unwrap().unwrap();
        camera.set("position", Value::Vec3(Vec3::new(0.0, 0.0, 5.0)));
        let ray = ray_from_camera(&camera, Vec2::ZERO);
        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, 5.0));
        assert!((ray.direction - Vec3::FORWARD).length() < 1e-6);
    }

    #[test]
    fn test_orthographic_ray_is_parallel() {
        let camera = construct("OrthographicCamera", &[]).unwrap().unwrap();
        fit_camera(&camera, 200.0, 100.0);
        camera.set("zoom", Value::Number(100.0));
        let ray = ray_from_camera(&camera, Vec2::new(1.0, 0.0));
        assert!((ray.origin.x - 1.0).abs() < 1e-6);
        assert!((ray.direction - Vec3::FORWARD).length() < 1e-6);
    }

    #[test]
    fn test_fit_perspective_aspect() {
        let camera = construct("PerspectiveCamera", &[]).unwrap().unwrap();
        fit_camera(&camera, 800.0, 400.0);
        assert_eq!(camera.get("aspect"), Some(Value::Number(2.0)));
    }
}
