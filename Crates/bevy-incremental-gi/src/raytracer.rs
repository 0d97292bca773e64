// bevy-incremental-gi/Crates/bevy-incremental-gi/src/raytracer.rs

//! The ray tracing capability the baking kernels are written against.

use crate::math::{BoundingBox, Ray};
use crate::scene::{GeometryId, SceneGeometry};
use bevy::math::{Vec2, Vec3, Vec4};
use std::sync::Arc;

/// Hits closer than this are treated as self-intersections.
const MIN_HIT_DISTANCE: f32 = 1.0e-6;

/// A geometry as seen by the ray tracer.
#[derive(Clone, Debug)]
pub struct RaytracerGeometry {
    pub geometry_id: GeometryId,
    /// The lightmap this geometry is baked into, if any.
    pub lightmap_index: Option<u32>,
    pub lightmap_scale_offset: Vec4,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub lightmap_uvs: Vec<Vec2>,
    pub indices: Vec<[u32; 3]>,
    pub albedo: Vec3,
    pub emission: Vec3,
    pub cast_shadows: bool,
    pub bounding_box: BoundingBox,
}

/// The closest intersection of a ray with a scene.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct RayHit {
    /// Index into [RaytracerScene::geometries].
    pub geometry_index: usize,
    pub triangle_index: usize,
    /// Weights of the second and third triangle corners.
    pub barycentric: Vec2,
    pub distance: f32,
}

/// A set of geometries that rays can be traced against.
pub trait RaytracerScene: Send + Sync {
    fn geometries(&self) -> &[RaytracerGeometry];

    /// Returns the closest hit within `max_distance`, if any.
    fn intersect(&self, ray: &Ray, max_distance: f32) -> Option<RayHit>;

    /// Returns true if any shadow-casting geometry lies along the ray within
    /// `max_distance`.
    fn is_occluded(&self, ray: &Ray, max_distance: f32) -> bool;
}

/// Builds ray tracing scenes.
pub trait RaytracerBackend {
    fn create_scene(&self, geometries: Vec<RaytracerGeometry>) -> Arc<dyn RaytracerScene>;
}

/// Tests every triangle of every geometry whose bounds the ray passes through.
#[derive(Clone, Copy, Default, Debug)]
pub struct BruteForceRaytracer;

/// The scene built by [BruteForceRaytracer].
pub struct BruteForceRaytracerScene {
    geometries: Vec<RaytracerGeometry>,
}

impl RaytracerGeometry {
    pub fn from_scene_geometry(geometry_id: GeometryId, geometry: &SceneGeometry) -> Self {
        let lightmap = geometry.lightmap.filter(|_| geometry.bake_lightmap);
        RaytracerGeometry {
            geometry_id,
            lightmap_index: lightmap.map(|lightmap| lightmap.index),
            lightmap_scale_offset: lightmap
                .map(|lightmap| lightmap.scale_offset)
                .unwrap_or(Vec4::new(1.0, 1.0, 0.0, 0.0)),
            positions: geometry.positions.clone(),
            normals: geometry.normals.clone(),
            lightmap_uvs: geometry.lightmap_uvs.clone(),
            indices: geometry.indices.clone(),
            albedo: geometry.albedo,
            emission: geometry.emission,
            cast_shadows: geometry.cast_shadows,
            bounding_box: geometry.bounding_box(),
        }
    }

    fn corners<T: Copy + Default>(&self, data: &[T], triangle_index: usize) -> [T; 3] {
        let Some(triangle) = self.indices.get(triangle_index) else {
            return [T::default(); 3];
        };
        triangle.map(|index| data.get(index as usize).copied().unwrap_or_default())
    }

    /// Interpolates the lightmap UV at a hit and maps it into this geometry's
    /// lightmap region.
    pub fn lightmap_uv(&self, triangle_index: usize, barycentric: Vec2) -> Vec2 {
        let [a, b, c] = self.corners(&self.lightmap_uvs, triangle_index);
        let uv = a * (1.0 - barycentric.x - barycentric.y) + b * barycentric.x + c * barycentric.y;
        uv * self.lightmap_scale_offset.truncate().truncate()
            + Vec2::new(self.lightmap_scale_offset.z, self.lightmap_scale_offset.w)
    }

    /// Interpolates the smooth normal at a hit.
    pub fn normal(&self, triangle_index: usize, barycentric: Vec2) -> Vec3 {
        let [a, b, c] = self.corners(&self.normals, triangle_index);
        (a * (1.0 - barycentric.x - barycentric.y) + b * barycentric.x + c * barycentric.y)
            .normalize_or_zero()
    }

    fn intersect_triangle(&self, ray: &Ray, triangle_index: usize) -> Option<(Vec2, f32)> {
        let [a, b, c] = self.corners(&self.positions, triangle_index);
        intersect_triangle(ray, a, b, c)
    }
}

/// Möller–Trumbore ray/triangle intersection. Triangles are two-sided.
pub fn intersect_triangle(ray: &Ray, a: Vec3, b: Vec3, c: Vec3) -> Option<(Vec2, f32)> {
    let edge_1 = b - a;
    let edge_2 = c - a;
    let p = ray.direction.cross(edge_2);
    let determinant = edge_1.dot(p);
    if determinant.abs() < f32::EPSILON {
        return None;
    }
    let inverse_determinant = 1.0 / determinant;

    let t = ray.origin - a;
    let u = t.dot(p) * inverse_determinant;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = t.cross(edge_1);
    let v = ray.direction.dot(q) * inverse_determinant;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let distance = edge_2.dot(q) * inverse_determinant;
    (distance > MIN_HIT_DISTANCE).then_some((Vec2::new(u, v), distance))
}

impl RaytracerBackend for BruteForceRaytracer {
    fn create_scene(&self, geometries: Vec<RaytracerGeometry>) -> Arc<dyn RaytracerScene> {
        Arc::new(BruteForceRaytracerScene { geometries })
    }
}

impl RaytracerScene for BruteForceRaytracerScene {
    fn geometries(&self) -> &[RaytracerGeometry] {
        &self.geometries
    }

    fn intersect(&self, ray: &Ray, max_distance: f32) -> Option<RayHit> {
        let mut closest: Option<RayHit> = None;
        for (geometry_index, geometry) in self.geometries.iter().enumerate() {
            let max_distance = closest.map_or(max_distance, |hit| hit.distance);
            if !geometry.bounding_box.intersects_ray(ray, max_distance) {
                continue;
            }
            for triangle_index in 0..geometry.indices.len() {
                let Some((barycentric, distance)) =
                    geometry.intersect_triangle(ray, triangle_index)
                else {
                    continue;
                };
                if distance < closest.map_or(max_distance, |hit| hit.distance) {
                    closest = Some(RayHit {
                        geometry_index,
                        triangle_index,
                        barycentric,
                        distance,
                    });
                }
            }
        }
        closest
    }

    fn is_occluded(&self, ray: &Ray, max_distance: f32) -> bool {
        self.geometries
            .iter()
            .filter(|geometry| {
                geometry.cast_shadows && geometry.bounding_box.intersects_ray(ray, max_distance)
            })
            .any(|geometry| {
                (0..geometry.indices.len()).any(|triangle_index| {
                    geometry
                        .intersect_triangle(ray, triangle_index)
                        .is_some_and(|(_, distance)| distance < max_distance)
                })
            })
    }
}
