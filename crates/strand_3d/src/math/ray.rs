//! Rays and ray/shape intersection

use super::{BoundingBox, BoundingSphere, HitShape, Mat4, Vec3};

/// Ray for raycasting
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Ray origin
    pub origin: Vec3,
    /// Ray direction (normalized in world space, possibly scaled in local space)
    pub direction: Vec3,
}

impl Default for Ray {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::FORWARD)
    }
}

impl Ray {
    /// Create a new ray
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Get point along ray at parameter t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Map the ray through `m` without renormalising, so parameters are
    /// preserved between the two spaces
    pub fn transformed(&self, m: &Mat4) -> Ray {
        Ray::new(m.transform_point(self.origin), m.transform_vector(self.direction))
    }

    /// Slab test; returns the nearest non-negative parameter
    pub fn intersect_box(&self, bounds: &BoundingBox) -> Option<f32> {
        let origin = self.origin.to_array();
        let direction = self.direction.to_array();
        let min = bounds.min.to_array();
        let max = bounds.max.to_array();

        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            if direction[axis].abs() < 1e-8 {
                if origin[axis] < min[axis] || origin[axis] > max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / direction[axis];
            let mut t0 = (min[axis] - origin[axis]) * inv;
            let mut t1 = (max[axis] - origin[axis]) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        if t_max < 0.0 {
            None
        } else if t_min >= 0.0 {
            Some(t_min)
        } else {
            Some(t_max)
        }
    }

    /// Ray/sphere test; returns the nearest non-negative parameter
    pub fn intersect_sphere(&self, sphere: &BoundingSphere) -> Option<f32> {
        let oc = self.origin - sphere.center;
        let a = self.direction.dot(self.direction);
        if a == 0.0 {
            return None;
        }
        let b = 2.0 * oc.dot(self.direction);
        let c = oc.dot(oc) - sphere.radius * sphere.radius;
        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let near = (-b - root) / (2.0 * a);
        let far = (-b + root) / (2.0 * a);
        if near >= 0.0 {
            Some(near)
        } else if far >= 0.0 {
            Some(far)
        } else {
            None
        }
    }

    pub fn intersect_shape(&self, shape: &HitShape) -> Option<f32> {
        match shape {
            HitShape::Box(bounds) => self.intersect_box(bounds),
            HitShape::Sphere(sphere) => self.intersect_sphere(sphere),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_hit_and_miss() {
        let bounds = BoundingBox::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.5));
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::FORWARD);
        assert_eq!(ray.intersect_box(&bounds), Some(4.5));

        let miss = Ray::new(Vec3::new(2.0, 0.0, 5.0), Vec3::FORWARD);
        assert_eq!(miss.intersect_box(&bounds), None);

        let behind = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::FORWARD);
        assert_eq!(behind.intersect_box(&bounds), None);
    }

    #[test]
    fn test_flat_box_hit() {
        let plane = BoundingBox::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 0.0));
        let ray = Ray::new(Vec3::new(0.0, 0.0, 3.0), Vec3::FORWARD);
        assert_eq!(ray.intersect_box(&plane), Some(3.0));
    }

    #[test]
    fn test_sphere_hit() {
        let sphere = BoundingSphere::new(Vec3::ZERO, 1.0);
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::FORWARD);
        let t = ray.intersect_sphere(&sphere).unwrap();
        assert!((t - 4.0).abs() < 1e-5);
    }
}
