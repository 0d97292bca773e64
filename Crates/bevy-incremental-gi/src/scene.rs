// bevy-incremental-gi/Crates/bevy-incremental-gi/src/scene.rs

//! The scene description that light baking reads from and writes back to.
//!
//! A [Scene] is a flat list of static geometries, lights and light probe
//! groups, all in world space. Items are identified by their index in the
//! corresponding list.

use crate::charts::LightmapChart;
use crate::math::BoundingBox;
use bevy::math::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Index of a geometry in [Scene::geometries].
pub type GeometryId = usize;
/// Index of a light in [Scene::lights].
pub type LightId = usize;
/// Index of a light probe group in [Scene::light_probe_groups].
pub type LightProbeGroupId = usize;

/// A scene to bake.
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    /// Where the scene was loaded from, if anywhere.
    pub file_path: Option<PathBuf>,
    pub geometries: Vec<SceneGeometry>,
    pub lights: Vec<SceneLight>,
    pub light_probe_groups: Vec<LightProbeGroup>,
    /// Lightmap textures, indexed by lightmap index.
    pub lightmaps: Vec<PathBuf>,
    /// The GI data file the scene refers to.
    pub gi_data_file: Option<PathBuf>,
}

/// A static triangle mesh in world space.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneGeometry {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Lightmap UVs, unwrapped into the unit square.
    pub lightmap_uvs: Vec<Vec2>,
    pub indices: Vec<[u32; 3]>,
    /// Diffuse reflectance in linear space.
    pub albedo: Vec3,
    /// Emitted radiance in linear space.
    pub emission: Vec3,
    /// Whether this geometry receives a lightmap. Geometry without one still
    /// occludes and reflects light.
    pub bake_lightmap: bool,
    pub cast_shadows: bool,
    /// The region of the lightmap assigned to this geometry.
    pub lightmap: Option<LightmapAssignment>,
}

/// Where a geometry's lightmap UVs land in a lightmap.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct LightmapAssignment {
    /// The global lightmap index.
    pub index: u32,
    /// Scale in *x* and *y*, offset in *z* and *w*.
    pub scale_offset: Vec4,
}

/// A light source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneLight {
    #[serde(default)]
    pub name: String,
    pub kind: LightKind,
    /// Linear color.
    pub color: Vec3,
    pub intensity: f32,
}

/// The shape of a light source.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub enum LightKind {
    /// Parallel rays. `direction` is the direction the light travels in.
    Directional { direction: Vec3 },
    /// A point emitting in every direction, fading out at `radius`.
    Point { position: Vec3, radius: f32 },
    /// A cone. Angles are full cone apertures in radians.
    Spot {
        position: Vec3,
        direction: Vec3,
        radius: f32,
        outer_cone_angle: f32,
        inner_cone_angle: f32,
    },
}

/// A set of light probes baked and saved together.
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LightProbeGroup {
    pub name: String,
    /// World-space probe positions.
    pub probe_positions: Vec<Vec3>,
    /// The file that receives the baked probe data.
    pub baked_data_file: Option<PathBuf>,
}

impl Scene {
    /// Forgets every lightmap texture.
    pub fn reset_lightmaps(&mut self) {
        self.lightmaps.clear();
    }

    /// Appends a lightmap texture. Its index is the previous lightmap count.
    pub fn add_lightmap(&mut self, path: PathBuf) {
        self.lightmaps.push(path);
    }

    pub fn set_gi_data_file(&mut self, path: PathBuf) {
        self.gi_data_file = Some(path);
    }

    /// Writes the chart assignment of every element back onto its geometry.
    pub fn apply_lightmap_charts(&mut self, charts: &[LightmapChart]) {
        for chart in charts {
            for element in &chart.elements {
                if let Some(geometry) = self.geometries.get_mut(element.geometry_id) {
                    geometry.lightmap = Some(LightmapAssignment {
                        index: chart.index,
                        scale_offset: element.scale_offset,
                    });
                }
            }
        }
    }
}

impl SceneGeometry {
    /// Creates a single-sided quad spanning `edge_u` and `edge_v` from
    /// `origin`, facing `edge_u × edge_v`, with lightmap UVs covering the
    /// unit square.
    pub fn quad(name: impl Into<String>, origin: Vec3, edge_u: Vec3, edge_v: Vec3) -> Self {
        let normal = edge_u.cross(edge_v).normalize_or_zero();
        SceneGeometry {
            name: name.into(),
            positions: vec![
                origin,
                origin + edge_u,
                origin + edge_u + edge_v,
                origin + edge_v,
            ],
            normals: vec![normal; 4],
            lightmap_uvs: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ],
            indices: vec![[0, 1, 2], [0, 2, 3]],
            ..SceneGeometry::default()
        }
    }

    pub fn with_albedo(mut self, albedo: Vec3) -> Self {
        self.albedo = albedo;
        self
    }

    pub fn with_emission(mut self, emission: Vec3) -> Self {
        self.emission = emission;
        self
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.positions)
    }

    /// Total area of all triangles, in square world units.
    pub fn surface_area(&self) -> f32 {
        self.indices
            .iter()
            .filter_map(|triangle| self.triangle_positions(*triangle))
            .map(|[a, b, c]| (b - a).cross(c - a).length() * 0.5)
            .sum()
    }

    /// Returns the corner positions of a triangle, or `None` if an index is
    /// out of bounds.
    pub fn triangle_positions(&self, triangle: [u32; 3]) -> Option<[Vec3; 3]> {
        Some([
            *self.positions.get(triangle[0] as usize)?,
            *self.positions.get(triangle[1] as usize)?,
            *self.positions.get(triangle[2] as usize)?,
        ])
    }
}

impl Default for SceneGeometry {
    fn default() -> Self {
        SceneGeometry {
            name: String::new(),
            positions: vec![],
            normals: vec![],
            lightmap_uvs: vec![],
            indices: vec![],
            albedo: Vec3::splat(0.8),
            emission: Vec3::ZERO,
            bake_lightmap: true,
            cast_shadows: true,
            lightmap: None,
        }
    }
}

impl LightmapAssignment {
    /// Maps a unit-square lightmap UV into this geometry's lightmap region.
    pub fn transform_uv(&self, uv: Vec2) -> Vec2 {
        Vec2::new(
            uv.x * self.scale_offset.x + self.scale_offset.z,
            uv.y * self.scale_offset.y + self.scale_offset.w,
        )
    }
}

impl SceneLight {
    pub fn new(kind: LightKind, color: Vec3, intensity: f32) -> Self {
        SceneLight {
            name: String::new(),
            kind,
            color,
            intensity,
        }
    }

    /// Returns the region this light can reach, or `None` if it reaches
    /// everywhere.
    pub fn influence_sphere(&self) -> Option<(Vec3, f32)> {
        match self.kind {
            LightKind::Directional { .. } => None,
            LightKind::Point { position, radius } | LightKind::Spot { position, radius, .. } => {
                Some((position, radius))
            }
        }
    }
}

impl LightProbeGroup {
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.probe_positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::LightmapChartElement;
    use bevy::math::{uvec2, vec4};

    #[test]
    fn quad_faces_the_cross_product() {
        let quad = SceneGeometry::quad("floor", Vec3::ZERO, Vec3::X * 2.0, -Vec3::Z * 3.0);
        assert_eq!(quad.normals[0], Vec3::Y);
        assert!((quad.surface_area() - 6.0).abs() < 1.0e-5);
        assert_eq!(quad.bounding_box().size(), Vec3::new(2.0, 0.0, 3.0));
    }

    #[test]
    fn applying_charts_assigns_lightmaps() {
        let mut scene = Scene {
            geometries: vec![SceneGeometry::default(), SceneGeometry::default()],
            ..Scene::default()
        };
        scene.apply_lightmap_charts(&[LightmapChart {
            index: 3,
            size: 16,
            elements: vec![LightmapChartElement {
                geometry_id: 1,
                position: uvec2(2, 2),
                size: uvec2(4, 4),
                scale_offset: vec4(0.25, 0.25, 0.125, 0.125),
            }],
        }]);

        assert_eq!(scene.geometries[0].lightmap, None);
        let assignment = scene.geometries[1].lightmap.unwrap();
        assert_eq!(assignment.index, 3);
        assert_eq!(assignment.transform_uv(Vec2::ONE), Vec2::splat(0.375));
    }
}
