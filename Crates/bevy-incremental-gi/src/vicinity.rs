// bevy-incremental-gi/Crates/bevy-incremental-gi/src/vicinity.rs

//! The self-contained unit of work baked for one chunk.

use crate::collector::BakedSceneCollector;
use crate::geometry_buffer::{bake_lightmap_geometry_buffers, LightmapChartGeometryBuffer};
use crate::light_probes::LightProbeCollection;
use crate::math::{smoothstep, BoundingBox};
use crate::raytracer::{RaytracerBackend, RaytracerGeometry, RaytracerScene};
use crate::scene::{LightId, LightKind, SceneLight};
use crate::settings::LightBakingSettings;
use bevy::log::debug;
use bevy::math::{IVec3, Vec3};
use std::sync::Arc;

/// Everything needed to bake the lightmaps and light probes of one chunk.
///
/// Besides the chunk's own geometry, the ray tracing scene holds every
/// neighboring geometry that can shadow the chunk or bounce light into it.
pub struct BakedChunkVicinity {
    pub chunk: IVec3,
    /// The lightmaps of the geometries this chunk owns, in ascending order.
    pub lightmaps: Vec<u32>,
    /// One buffer per entry of `lightmaps`, in the same order.
    pub geometry_buffers: Vec<LightmapChartGeometryBuffer>,
    pub raytracer_scene: Arc<dyn RaytracerScene>,
    pub baked_lights: Vec<BakedLight>,
    /// The chunk's own light probes followed by those of its neighbors.
    pub light_probes_collection: LightProbeCollection,
    /// The number of leading probes in `light_probes_collection` that this
    /// chunk owns.
    pub num_unique_light_probes: usize,
}

/// A light prepared for baking.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct BakedLight {
    pub light_id: LightId,
    pub kind: LightKind,
    /// Color times intensity.
    pub light: Vec3,
}

/// Light arriving at a point from one light source.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct IncidentLight {
    pub direction_to_light: Vec3,
    /// Distance to the light, or `None` for directional lights.
    pub distance: Option<f32>,
    /// Light arriving perpendicular to the surface.
    pub light: Vec3,
}

impl BakedLight {
    pub fn new(light_id: LightId, light: &SceneLight) -> BakedLight {
        BakedLight {
            light_id,
            kind: light.kind,
            light: light.color * light.intensity,
        }
    }

    /// Returns the light this source delivers to `position`, ignoring
    /// occlusion, or `None` if it doesn't reach it.
    pub fn incident(&self, position: Vec3) -> Option<IncidentLight> {
        match self.kind {
            LightKind::Directional { direction } => Some(IncidentLight {
                direction_to_light: -direction.try_normalize()?,
                distance: None,
                light: self.light,
            }),
            LightKind::Point { position: origin, radius } => {
                let (direction_to_light, distance, attenuation) =
                    point_attenuation(origin, radius, position)?;
                Some(IncidentLight {
                    direction_to_light,
                    distance: Some(distance),
                    light: self.light * attenuation,
                })
            }
            LightKind::Spot {
                position: origin,
                direction,
                radius,
                outer_cone_angle,
                inner_cone_angle,
            } => {
                let (direction_to_light, distance, attenuation) =
                    point_attenuation(origin, radius, position)?;
                let cos_angle = (-direction_to_light).dot(direction.try_normalize()?);
                let outer = (outer_cone_angle * 0.5).cos();
                let inner = (inner_cone_angle.min(outer_cone_angle) * 0.5).cos();
                let cone = if inner > outer {
                    smoothstep(outer, inner, cos_angle)
                } else if cos_angle >= outer {
                    1.0
                } else {
                    0.0
                };
                (cone > 0.0).then_some(IncidentLight {
                    direction_to_light,
                    distance: Some(distance),
                    light: self.light * attenuation * cone,
                })
            }
        }
    }
}

fn point_attenuation(origin: Vec3, radius: f32, position: Vec3) -> Option<(Vec3, f32, f32)> {
    let to_light = origin - position;
    let distance = to_light.length();
    if distance <= f32::EPSILON || distance >= radius {
        return None;
    }
    let falloff = 1.0 - (distance / radius).powi(2);
    Some((to_light / distance, distance, falloff * falloff))
}

/// Gathers the chunk's lights, geometry and light probes.
pub fn create_baked_chunk_vicinity(
    collector: &dyn BakedSceneCollector,
    chunk: IVec3,
    settings: &LightBakingSettings,
    raytracer: &dyn RaytracerBackend,
) -> BakedChunkVicinity {
    let incremental = &settings.incremental;
    let chunk_bounding_box = collector.chunk_bounding_box(chunk);

    let baked_lights = collector
        .lights_in_bounding_box(&chunk_bounding_box)
        .into_iter()
        .filter_map(|light_id| Some(BakedLight::new(light_id, collector.light(light_id)?)))
        .collect::<Vec<_>>();

    let mut raytracing_bounding_box = chunk_bounding_box.padded(incremental.indirect_padding);
    for light in &baked_lights {
        match light.kind {
            LightKind::Directional { .. } => raytracing_bounding_box.merge(
                &chunk_bounding_box.padded(incremental.directional_light_shadow_distance),
            ),
            LightKind::Point { position, .. } | LightKind::Spot { position, .. } => {
                let mut light_bounding_box = chunk_bounding_box;
                light_bounding_box.merge_point(position);
                raytracing_bounding_box.merge(&light_bounding_box);
            }
        }
    }

    let raytracer_geometries = collector
        .geometries_in_bounding_box(&raytracing_bounding_box)
        .into_iter()
        .filter_map(|geometry_id| {
            let geometry = collector.geometry(geometry_id)?;
            Some(RaytracerGeometry::from_scene_geometry(geometry_id, geometry))
        })
        .collect::<Vec<_>>();

    let unique_geometries = collector
        .unique_geometries(chunk)
        .into_iter()
        .filter_map(|geometry_id| Some((geometry_id, collector.geometry(geometry_id)?)))
        .collect::<Vec<_>>();
    let mut lightmaps = unique_geometries
        .iter()
        .filter(|(_, geometry)| geometry.bake_lightmap)
        .filter_map(|(_, geometry)| geometry.lightmap.map(|lightmap| lightmap.index))
        .collect::<Vec<_>>();
    lightmaps.sort_unstable();
    lightmaps.dedup();
    let geometry_buffers = bake_lightmap_geometry_buffers(
        &unique_geometries,
        &lightmaps,
        settings.charting.lightmap_size,
        &settings.geometry_buffer,
    );

    let mut light_probes_collection = LightProbeCollection::default();
    let unique_groups = collector.unique_light_probe_groups(chunk);
    for &group_id in &unique_groups {
        if let Some(group) = collector.light_probe_group(group_id) {
            light_probes_collection.add_group(group_id, group);
        }
    }
    let num_unique_light_probes = light_probes_collection.len();
    let probes_bounding_box: BoundingBox = chunk_bounding_box.padded(incremental.indirect_padding);
    for group_id in collector.light_probe_groups_in_bounding_box(&probes_bounding_box) {
        if unique_groups.contains(&group_id) {
            continue;
        }
        if let Some(group) = collector.light_probe_group(group_id) {
            light_probes_collection.add_group(group_id, group);
        }
    }

    debug!(
        "Chunk {}: {} lightmaps, {} lights, {} ray traced geometries, {} light probes",
        chunk,
        lightmaps.len(),
        baked_lights.len(),
        raytracer_geometries.len(),
        light_probes_collection.len()
    );

    BakedChunkVicinity {
        chunk,
        lightmaps,
        geometry_buffers,
        raytracer_scene: raytracer.create_scene(raytracer_geometries),
        baked_lights,
        light_probes_collection,
        num_unique_light_probes,
    }
}
