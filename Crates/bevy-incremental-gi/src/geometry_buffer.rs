// bevy-incremental-gi/Crates/bevy-incremental-gi/src/geometry_buffer.rs

//! Rasterized surface attributes of lightmap charts.

use crate::scene::{GeometryId, SceneGeometry};
use crate::settings::GeometryBufferSettings;
use bevy::math::{Vec2, Vec3};

/// Lightmap UVs closer than this are considered equal when detecting seams.
const SEAM_UV_TOLERANCE: f32 = 1.0e-5;
/// World positions are snapped to this grid when matching edges.
const SEAM_POSITION_QUANTUM: f32 = 1.0e-4;

/// Per-texel surface attributes of one lightmap, indexed by `y * size + x`.
#[derive(Clone, Debug)]
pub struct LightmapChartGeometryBuffer {
    /// The global lightmap index.
    pub index: u32,
    pub lightmap_size: u32,
    pub positions: Vec<Vec3>,
    pub smooth_normals: Vec<Vec3>,
    pub face_normals: Vec<Vec3>,
    /// The geometry covering each texel, if any.
    pub geometry_ids: Vec<Option<GeometryId>>,
    pub albedo: Vec<Vec3>,
    pub emission: Vec<Vec3>,
    pub seams: Vec<LightmapSeam>,
}

/// A mesh edge that appears twice in a lightmap with different UVs.
///
/// Both sides are given in normalized lightmap UVs, with corresponding
/// endpoints at the same world position.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct LightmapSeam {
    pub edges: [[Vec2; 2]; 2],
}

impl LightmapChartGeometryBuffer {
    pub fn new(index: u32, lightmap_size: u32) -> Self {
        let texel_count = lightmap_size as usize * lightmap_size as usize;
        LightmapChartGeometryBuffer {
            index,
            lightmap_size,
            positions: vec![Vec3::ZERO; texel_count],
            smooth_normals: vec![Vec3::ZERO; texel_count],
            face_normals: vec![Vec3::ZERO; texel_count],
            geometry_ids: vec![None; texel_count],
            albedo: vec![Vec3::ZERO; texel_count],
            emission: vec![Vec3::ZERO; texel_count],
            seams: vec![],
        }
    }

    pub fn texel_count(&self) -> usize {
        self.geometry_ids.len()
    }

    /// Returns true if some geometry covers the texel.
    pub fn is_covered(&self, texel_index: usize) -> bool {
        self.geometry_ids
            .get(texel_index)
            .is_some_and(|geometry_id| geometry_id.is_some())
    }

    fn rasterize_geometry(
        &mut self,
        geometry_id: GeometryId,
        geometry: &SceneGeometry,
        settings: &GeometryBufferSettings,
    ) {
        let Some(assignment) = geometry.lightmap else {
            return;
        };
        let size = self.lightmap_size as f32;

        for &triangle in &geometry.indices {
            let Some(positions) = geometry.triangle_positions(triangle) else {
                continue;
            };
            let Some(uvs) = triangle_attribute(&geometry.lightmap_uvs, triangle) else {
                continue;
            };
            let texel_uvs = uvs.map(|uv| assignment.transform_uv(uv) * size);
            let face_normal = (positions[1] - positions[0])
                .cross(positions[2] - positions[0])
                .normalize_or_zero();
            let normals = triangle_attribute(&geometry.normals, triangle)
                .unwrap_or([face_normal; 3]);

            let min = texel_uvs[0].min(texel_uvs[1]).min(texel_uvs[2]).floor().max(Vec2::ZERO);
            let max = texel_uvs[0].max(texel_uvs[1]).max(texel_uvs[2]).ceil().min(Vec2::splat(size));
            for y in min.y as u32..max.y as u32 {
                for x in min.x as u32..max.x as u32 {
                    let center = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                    let Some(weights) = barycentric(center, texel_uvs) else {
                        continue;
                    };
                    if weights.min_element() < -settings.coverage_epsilon {
                        continue;
                    }

                    let texel_index = (y * self.lightmap_size + x) as usize;
                    let smooth_normal = (normals[0] * weights.x
                        + normals[1] * weights.y
                        + normals[2] * weights.z)
                        .try_normalize()
                        .unwrap_or(face_normal);
                    self.positions[texel_index] = positions[0] * weights.x
                        + positions[1] * weights.y
                        + positions[2] * weights.z;
                    self.smooth_normals[texel_index] = smooth_normal;
                    self.face_normals[texel_index] = face_normal;
                    self.geometry_ids[texel_index] = Some(geometry_id);
                    self.albedo[texel_index] = geometry.albedo;
                    self.emission[texel_index] = geometry.emission;
                }
            }
        }
    }
}

fn triangle_attribute<T: Copy>(data: &[T], triangle: [u32; 3]) -> Option<[T; 3]> {
    Some([
        *data.get(triangle[0] as usize)?,
        *data.get(triangle[1] as usize)?,
        *data.get(triangle[2] as usize)?,
    ])
}

/// Returns the barycentric weights of `point` in a 2D triangle, or `None` if
/// the triangle is degenerate.
fn barycentric(point: Vec2, [a, b, c]: [Vec2; 3]) -> Option<Vec3> {
    let (v0, v1, v2) = (b - a, c - a, point - a);
    let denominator = v0.perp_dot(v1);
    if denominator.abs() < f32::EPSILON {
        return None;
    }
    let w1 = v2.perp_dot(v1) / denominator;
    let w2 = v0.perp_dot(v2) / denominator;
    Some(Vec3::new(1.0 - w1 - w2, w1, w2))
}

fn quantize(position: Vec3) -> [i64; 3] {
    (position / SEAM_POSITION_QUANTUM).round().to_array().map(|value| value as i64)
}

/// Finds edges that are shared in world space but split in lightmap space.
fn find_seams(geometries: &[(GeometryId, &SceneGeometry)]) -> Vec<LightmapSeam> {
    let mut edges = vec![];
    for (_, geometry) in geometries {
        let Some(assignment) = geometry.lightmap else {
            continue;
        };
        for &triangle in &geometry.indices {
            let (Some(positions), Some(uvs)) = (
                geometry.triangle_positions(triangle),
                triangle_attribute(&geometry.lightmap_uvs, triangle),
            ) else {
                continue;
            };
            let uvs = uvs.map(|uv| assignment.transform_uv(uv));
            for corner in 0..3 {
                let (start, end) = (corner, (corner + 1) % 3);
                let (key_start, key_end) = (quantize(positions[start]), quantize(positions[end]));
                let (key, edge) = if key_start <= key_end {
                    ((key_start, key_end), [uvs[start], uvs[end]])
                } else {
                    ((key_end, key_start), [uvs[end], uvs[start]])
                };
                edges.push((key, edge));
            }
        }
    }
    edges.sort_by(|a, b| a.0.cmp(&b.0));

    let mut seams = vec![];
    let mut group_start = 0;
    while group_start < edges.len() {
        let group_key = edges[group_start].0;
        let group_end = edges[group_start..]
            .iter()
            .position(|(key, _)| *key != group_key)
            .map_or(edges.len(), |length| group_start + length);
        let group = &edges[group_start..group_end];
        group_start = group_end;

        for (i, (_, first)) in group.iter().enumerate() {
            for (_, second) in &group[i + 1..] {
                let same_uvs = first[0].abs_diff_eq(second[0], SEAM_UV_TOLERANCE)
                    && first[1].abs_diff_eq(second[1], SEAM_UV_TOLERANCE);
                if !same_uvs {
                    seams.push(LightmapSeam {
                        edges: [*first, *second],
                    });
                }
            }
        }
    }
    seams
}

/// Builds the geometry buffer of each listed lightmap from the geometries
/// assigned to it.
pub fn bake_lightmap_geometry_buffers(
    geometries: &[(GeometryId, &SceneGeometry)],
    lightmaps: &[u32],
    lightmap_size: u32,
    settings: &GeometryBufferSettings,
) -> Vec<LightmapChartGeometryBuffer> {
    lightmaps
        .iter()
        .map(|&lightmap_index| {
            let chart_geometries = geometries
                .iter()
                .filter(|(_, geometry)| {
                    geometry.bake_lightmap
                        && geometry
                            .lightmap
                            .is_some_and(|lightmap| lightmap.index == lightmap_index)
                })
                .copied()
                .collect::<Vec<_>>();

            let mut buffer = LightmapChartGeometryBuffer::new(lightmap_index, lightmap_size);
            for &(geometry_id, geometry) in &chart_geometries {
                buffer.rasterize_geometry(geometry_id, geometry, settings);
            }
            buffer.seams = find_seams(&chart_geometries);
            buffer
        })
        .collect()
}
