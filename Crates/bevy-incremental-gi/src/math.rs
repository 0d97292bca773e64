// bevy-incremental-gi/Crates/bevy-incremental-gi/src/math.rs

//! Geometric and sampling helpers shared by the baking kernels.

use bevy::math::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// An axis-aligned bounding box.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

/// A ray with a normalized direction.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl BoundingBox {
    /// A box that contains nothing. Merging anything into it yields that thing.
    pub const EMPTY: BoundingBox = BoundingBox {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    pub fn new(min: Vec3, max: Vec3) -> BoundingBox {
        BoundingBox { min, max }
    }

    /// Returns the smallest box containing all the given points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> BoundingBox {
        let mut bounding_box = BoundingBox::EMPTY;
        for point in points {
            bounding_box.merge_point(*point);
        }
        bounding_box
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn merge_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn merge(&mut self, other: &BoundingBox) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Returns this box grown by `padding` on every side.
    pub fn padded(&self, padding: f32) -> BoundingBox {
        BoundingBox {
            min: self.min - Vec3::splat(padding),
            max: self.max + Vec3::splat(padding),
        }
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && (self.min.cmple(other.max) & self.max.cmpge(other.min)).all()
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        (point.cmpge(self.min) & point.cmple(self.max)).all()
    }

    /// Returns true if the sphere overlaps this box.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        !self.is_empty() && closest.distance_squared(center) <= radius * radius
    }

    /// Slab test. Returns true if the ray enters the box before `max_distance`.
    pub fn intersects_ray(&self, ray: &Ray, max_distance: f32) -> bool {
        let (mut t_near, mut t_far) = (0.0f32, max_distance);
        for axis in 0..3 {
            let (origin, direction) = (ray.origin[axis], ray.direction[axis]);
            let (min, max) = (self.min[axis], self.max[axis]);
            if direction == 0.0 {
                if origin < min || origin > max {
                    return false;
                }
                continue;
            }
            let (t0, t1) = ((min - origin) / direction, (max - origin) / direction);
            t_near = t_near.max(t0.min(t1));
            t_far = t_far.min(t0.max(t1));
        }
        t_near <= t_far
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        BoundingBox::EMPTY
    }
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Ray {
        Ray { origin, direction }
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

/// Converts a single linear color channel to sRGB gamma space.
pub fn linear_to_gamma(value: f32) -> f32 {
    let value = value.max(0.0);
    if value <= 0.0031308 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

/// Rec. 709 luminance of a linear color.
pub fn luminance(color: Vec3) -> f32 {
    color.dot(Vec3::new(0.2126, 0.7152, 0.0722))
}

/// https://en.wikipedia.org/wiki/Smoothstep
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let k = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    k * k * (3.0 - 2.0 * k)
}

/// A 32-bit integer hash with good avalanche behavior.
pub fn hash_u32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

fn unit_float(bits: u32) -> f32 {
    (bits >> 8) as f32 * (1.0 / 16_777_216.0)
}

/// Returns the `index`-th point of a `count`-point Hammersley set on the unit
/// square, rotated by an offset derived from `seed`.
///
/// Identical arguments always produce identical points, which keeps baking
/// reproducible no matter how the work is split between tasks.
pub fn sample_point(seed: u32, index: u32, count: u32) -> Vec2 {
    let rotation = Vec2::new(
        unit_float(hash_u32(seed)),
        unit_float(hash_u32(seed ^ 0x9e37_79b9)),
    );
    let point = Vec2::new(
        (index as f32 + 0.5) / count.max(1) as f32,
        index.reverse_bits() as f32 * 2.328_306_4e-10,
    ) + rotation;
    point - point.floor()
}

/// Builds two tangents that form an orthonormal basis with `normal`.
///
/// Duff et al., "Building an Orthonormal Basis, Revisited".
pub fn orthonormal_basis(normal: Vec3) -> (Vec3, Vec3) {
    let sign = 1.0f32.copysign(normal.z);
    let a = -1.0 / (sign + normal.z);
    let b = normal.x * normal.y * a;
    (
        Vec3::new(1.0 + sign * normal.x * normal.x * a, sign * b, -sign * normal.x),
        Vec3::new(b, sign + normal.y * normal.y * a, -normal.y),
    )
}

/// Maps a point on the unit square to a cosine-weighted direction around
/// `normal`.
pub fn cosine_hemisphere(normal: Vec3, sample: Vec2) -> Vec3 {
    let radius = sample.x.sqrt();
    let phi = 2.0 * PI * sample.y;
    let (tangent, bitangent) = orthonormal_basis(normal);
    let direction = tangent * (radius * phi.cos())
        + bitangent * (radius * phi.sin())
        + normal * (1.0 - sample.x).max(0.0).sqrt();
    direction.normalize_or_zero()
}

/// Maps a point on the unit square to a uniformly distributed direction.
pub fn uniform_sphere(sample: Vec2) -> Vec3 {
    let z = 1.0 - 2.0 * sample.x;
    let radius = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * sample.y;
    Vec3::new(radius * phi.cos(), radius * phi.sin(), z)
}
