//! Ray intersection queries against an explicit candidate list

use rustc_hash::FxHashSet;

use crate::camera::ray_from_camera;
use crate::math::{Layers, Ray, Vec2, Vec3};
use crate::object::{ObjectId, ObjectRef};
use crate::value::Value;

/// Raycast hit result
#[derive(Clone, Debug)]
pub struct Intersection {
    /// Distance from ray origin
    pub distance: f32,
    /// Hit position in world space
    pub point: Vec3,
    /// Object that was hit
    pub object: ObjectRef,
}

/// Casts rays into the scene graph
///
/// Settings (`near`, `far`, `layers`) live on a backing engine object so they
/// can be configured through ordinary property writes.
#[derive(Clone, Debug)]
pub struct Raycaster {
    object: ObjectRef,
    ray: Ray,
}

impl Raycaster {
    /// Wrap a `Raycaster` engine object
    pub fn from_object(object: ObjectRef) -> Self {
        Self {
            object,
            ray: Ray::default(),
        }
    }

    /// Backing settings object
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn ray(&self) -> Ray {
        self.ray
    }

    pub fn set_ray(&mut self, ray: Ray) {
        self.ray = ray;
    }

    /// Aim the ray through a normalised device coordinate
    pub fn set_from_camera(&mut self, ndc: Vec2, camera: &ObjectRef) {
        self.ray = ray_from_camera(camera, ndc);
    }

    pub fn near(&self) -> f32 {
        self.object.get("near").and_then(|v| v.as_f32()).unwrap_or(0.0)
    }

    pub fn far(&self) -> f32 {
        self.object
            .get("far")
            .and_then(|v| v.as_f32())
            .unwrap_or(f32::INFINITY)
    }

    pub fn layers(&self) -> Layers {
        self.object
            .get("layers")
            .and_then(|v| v.as_layers())
            .unwrap_or_default()
    }

    /// Intersect the ray with `objects` (and their descendants when
    /// `recursive`), nearest first. Each object is reported at most once.
    pub fn intersect_objects(&self, objects: &[ObjectRef], recursive: bool) -> Vec<Intersection> {
        let mut seen = FxHashSet::default();
        let mut hits = Vec::new();
        for object in objects {
            self.collect(object, recursive, &mut seen, &mut hits);
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    fn collect(
        &self,
        object: &ObjectRef,
        recursive: bool,
        seen: &mut FxHashSet<ObjectId>,
        hits: &mut Vec<Intersection>,
    ) {
        // Hidden subtrees are not hit-testable
        if object.get("visible") == Some(Value::Bool(false)) {
            return;
        }
        if seen.insert(object.id()) {
            let on_layer = object
                .get("layers")
                .and_then(|v| v.as_layers())
                .map_or(true, |l| l.test(self.layers()));
            if on_layer {
                if let Some(hit) = self.intersect_one(object) {
                    hits.push(hit);
                }
            }
        }
        if recursive {
            for child in object.children() {
                self.collect(&child, true, seen, hits);
            }
        }
    }

    fn intersect_one(&self, object: &ObjectRef) -> Option<Intersection> {
        let shape = object.hit_shape()?;
        let inverse = object.world_matrix().inverse()?;
        let t = self.ray.transformed(&inverse).intersect_shape(&shape)?;
        if t < self.near() || t > self.far() {
            return None;
        }
        Some(Intersection {
            distance: t,
            point: self.ray.point_at(t),
            object: object.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::construct;

    fn mesh_at(z: f32) -> ObjectRef {
        let mesh = construct("Mesh", &[]).unwrap().unwrap();
        mesh.set("position", Value::Vec3(Vec3::new(0.0, 0.0, z)));
        mesh
    }

    fn raycaster() -> Raycaster {
        let mut raycaster = Raycaster::from_object(construct("Raycaster", &[]).unwrap().unwrap());
        raycaster.set_ray(Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::FORWARD));
        raycaster
    }

    #[test]
    fn test_sorted_nearest_first() {
        let back = mesh_at(-2.0);
        let front = mesh_at(2.0);
        let hits = raycaster().intersect_objects(&[back.clone(), front.clone()], false);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].object, front);
        assert_eq!(hits[1].object, back);
        assert!((hits[0].distance - 7.5).abs() < 1e-5);
    }

    #[test]
    fn test_recursive_finds_descendants_once() {
        let group = construct("Group", &[]).unwrap().unwrap();
        let child = mesh_at(0.0);
        group.add(&child).unwrap();
        let hits = raycaster().intersect_objects(&[group.clone(), child.clone()], true);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].object, child);
    }

    #[test]
    fn test_scaled_and_offset_parent() {
        let group = construct("Group", &[]).unwrap().unwrap();
        group.set("position", Value::Vec3(Vec3::new(3.0, 0.0, 0.0)));
        let child = mesh_at(0.0);
        group.add(&child).unwrap();
        assert!(raycaster().intersect_objects(&[group.clone()], true).is_empty());

        group.set("scale", Value::Vec3(Vec3::splat(8.0)));
        assert_eq!(raycaster().intersect_objects(&[group], true).len(), 1);
    }

    #[test]
    fn test_layers_and_visibility_filter() {
        let mesh = mesh_at(0.0);
        let mut layers = Layers::DEFAULT;
        layers.set(2);
        mesh.set("layers", Value::Layers(layers));
        assert!(raycaster().intersect_objects(&[mesh.clone()], false).is_empty());

        mesh.set("layers", Value::Layers(Layers::DEFAULT));
        mesh.set("visible", Value::Bool(false));
        assert!(raycaster().intersect_objects(&[mesh], false).is_empty());
    }
}
