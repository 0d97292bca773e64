// bevy-incremental-gi/Crates/bevy-incremental-gi/src/baking.rs

//! The light tracing kernels.
//!
//! Every kernel computes its per-texel or per-probe results independently of
//! the others, seeded by the texel or probe index, and only then adds them
//! into the output. The output is therefore bit-identical regardless of the
//! number of tasks.

use crate::geometry_buffer::LightmapChartGeometryBuffer;
use crate::light_probes::{
    LightProbeCollection, LightProbeCollectionBakedData, SphericalHarmonicsL1,
};
use crate::lightmaps::{LightmapChartBakedDirect, LightmapChartBakedIndirect};
use crate::math::{cosine_hemisphere, hash_u32, sample_point, uniform_sphere, Ray};
use crate::parallel::LightBakingTaskPool;
use crate::raytracer::RaytracerScene;
use crate::settings::{
    DirectLightTracingSettings, EmissionLightTracingSettings, IndirectLightTracingSettings,
};
use crate::tetrahedral_mesh::TetrahedralMesh;
use crate::vicinity::BakedLight;
use bevy::math::{Vec3, Vec4};
use bevy::utils::HashMap;
use std::f32::consts::PI;
use std::sync::Arc;

/// Mixed into probe seeds so that probes and texels with the same index
/// don't share sample sequences.
const LIGHT_PROBE_SEED: u32 = 0x5bd1_e995;

/// Where bounce rays find their light.
pub struct IndirectLightSources<'a> {
    pub raytracer_scene: &'a dyn RaytracerScene,
    /// Direct light of every lightmap that geometry in the scene refers to.
    pub direct_light: &'a HashMap<u32, Arc<LightmapChartBakedDirect>>,
    /// Light probes lighting geometry without a lightmap, if baked yet.
    pub light_probes: Option<(&'a TetrahedralMesh, &'a [SphericalHarmonicsL1])>,
}

impl IndirectLightSources<'_> {
    /// Returns the light traveling back along `ray`.
    fn incoming_light(&self, ray: &Ray, max_distance: f32) -> Vec3 {
        let Some(hit) = self.raytracer_scene.intersect(ray, max_distance) else {
            return Vec3::ZERO;
        };
        let Some(geometry) = self.raytracer_scene.geometries().get(hit.geometry_index) else {
            return Vec3::ZERO;
        };

        if let Some(direct) = geometry
            .lightmap_index
            .and_then(|lightmap_index| self.direct_light.get(&lightmap_index))
        {
            let uv = geometry.lightmap_uv(hit.triangle_index, hit.barycentric);
            return direct.sample_surface_light(uv);
        }

        let probe_light = match self.light_probes {
            Some((mesh, light_probes)) if !light_probes.is_empty() => {
                let normal = geometry.normal(hit.triangle_index, hit.barycentric);
                mesh.sample(ray.at(hit.distance), light_probes)
                    .evaluate(normal)
                    .max(Vec3::ZERO)
            }
            _ => Vec3::ZERO,
        };
        geometry.albedo * probe_light + geometry.emission
    }
}

fn texel_seed(lightmap_index: u32, texel_index: usize) -> u32 {
    hash_u32(lightmap_index).wrapping_add(texel_index as u32)
}

fn light_probe_seed(probe_index: usize) -> u32 {
    LIGHT_PROBE_SEED.wrapping_add(probe_index as u32)
}

/// Returns the light `light` delivers to a surface point, accounting for
/// shadows, or zero.
fn direct_light_at(
    raytracer_scene: &dyn RaytracerScene,
    light: &BakedLight,
    position: Vec3,
    normal: Option<(Vec3, Vec3)>,
    ray_bias: f32,
    shadow_distance: f32,
) -> Option<(Vec3, Vec3)> {
    let incident = light.incident(position)?;
    let (origin, cosine) = match normal {
        Some((smooth_normal, face_normal)) => {
            if face_normal.dot(incident.direction_to_light) <= 0.0 {
                return None;
            }
            let cosine = smooth_normal.dot(incident.direction_to_light);
            if cosine <= 0.0 {
                return None;
            }
            (position + face_normal * ray_bias, cosine)
        }
        None => (position, 1.0),
    };

    let max_distance = incident
        .distance
        .map_or(shadow_distance, |distance| (distance - ray_bias).max(0.0));
    let shadow_ray = Ray::new(origin, incident.direction_to_light);
    if raytracer_scene.is_occluded(&shadow_ray, max_distance) {
        return None;
    }
    Some((incident.direction_to_light, incident.light * cosine))
}

/// Adds the emission of every covered texel and records its albedo.
pub fn bake_emission_light(
    direct: &mut LightmapChartBakedDirect,
    geometry_buffer: &LightmapChartGeometryBuffer,
    settings: &EmissionLightTracingSettings,
) {
    for texel_index in 0..geometry_buffer.texel_count() {
        if !geometry_buffer.is_covered(texel_index) {
            continue;
        }
        let emission = geometry_buffer.emission[texel_index] * settings.emission_brightness;
        direct.direct_light[texel_index] += emission;
        direct.surface_light[texel_index] += emission;
        direct.albedo[texel_index] = geometry_buffer.albedo[texel_index];
    }
}

/// Adds the light of one light source to every covered texel.
pub fn bake_direct_light_for_charts(
    direct: &mut LightmapChartBakedDirect,
    geometry_buffer: &LightmapChartGeometryBuffer,
    raytracer_scene: &dyn RaytracerScene,
    light: &BakedLight,
    settings: &DirectLightTracingSettings,
    shadow_distance: f32,
    pool: &LightBakingTaskPool,
) {
    let contributions = pool.map(geometry_buffer.texel_count(), |texel_index| {
        if !geometry_buffer.is_covered(texel_index) {
            return Vec3::ZERO;
        }
        direct_light_at(
            raytracer_scene,
            light,
            geometry_buffer.positions[texel_index],
            Some((
                geometry_buffer.smooth_normals[texel_index],
                geometry_buffer.face_normals[texel_index],
            )),
            settings.ray_bias,
            shadow_distance,
        )
        .map_or(Vec3::ZERO, |(_, light)| light)
    });

    for (texel_index, light) in contributions.into_iter().enumerate() {
        direct.direct_light[texel_index] += light;
        direct.surface_light[texel_index] += light * direct.albedo[texel_index];
    }
}

/// Accumulates bounced light for every covered texel.
///
/// Every covered texel receives `max_samples` samples, counted in *w*.
pub fn bake_indirect_light_for_charts(
    indirect: &mut LightmapChartBakedIndirect,
    geometry_buffer: &LightmapChartGeometryBuffer,
    sources: &IndirectLightSources,
    settings: &IndirectLightTracingSettings,
    pool: &LightBakingTaskPool,
) {
    let num_samples = settings.max_samples;
    let contributions = pool.map(geometry_buffer.texel_count(), |texel_index| {
        if !geometry_buffer.is_covered(texel_index) {
            return Vec4::ZERO;
        }
        let seed = texel_seed(geometry_buffer.index, texel_index);
        let smooth_normal = geometry_buffer.smooth_normals[texel_index];
        let face_normal = geometry_buffer.face_normals[texel_index];
        let origin = geometry_buffer.positions[texel_index] + face_normal * settings.ray_bias;

        let mut light = Vec3::ZERO;
        for sample_index in 0..num_samples {
            let direction =
                cosine_hemisphere(smooth_normal, sample_point(seed, sample_index, num_samples));
            if direction.dot(face_normal) <= 0.0 {
                continue;
            }
            light += sources.incoming_light(&Ray::new(origin, direction), settings.max_distance);
        }
        light.extend(num_samples as f32)
    });

    for (texel, contribution) in indirect.light.iter_mut().zip(contributions) {
        *texel += contribution;
    }
}

/// Adds light arriving from every direction to every probe.
pub fn bake_indirect_light_for_light_probes(
    baked_data: &mut LightProbeCollectionBakedData,
    collection: &LightProbeCollection,
    sources: &IndirectLightSources,
    settings: &IndirectLightTracingSettings,
    pool: &LightBakingTaskPool,
) {
    let num_samples = settings.max_samples;
    let weight = 4.0 * PI / num_samples.max(1) as f32;
    let contributions = pool.map(collection.len(), |probe_index| {
        let seed = light_probe_seed(probe_index);
        let position = collection.world_positions[probe_index];
        let mut sh = SphericalHarmonicsL1::ZERO;
        for sample_index in 0..num_samples {
            let direction = uniform_sphere(sample_point(seed, sample_index, num_samples));
            let light = sources.incoming_light(&Ray::new(position, direction), settings.max_distance);
            sh.add_radiance(direction, light, weight);
        }
        sh
    });

    for (light_probe, contribution) in baked_data.light_probes.iter_mut().zip(contributions) {
        *light_probe += contribution;
    }
}

/// Adds the light of one light source to every probe.
pub fn bake_direct_light_for_light_probes(
    baked_data: &mut LightProbeCollectionBakedData,
    collection: &LightProbeCollection,
    raytracer_scene: &dyn RaytracerScene,
    light: &BakedLight,
    settings: &DirectLightTracingSettings,
    shadow_distance: f32,
    pool: &LightBakingTaskPool,
) {
    let contributions = pool.map(collection.len(), |probe_index| {
        let mut sh = SphericalHarmonicsL1::ZERO;
        if let Some((direction_to_light, light)) = direct_light_at(
            raytracer_scene,
            light,
            collection.world_positions[probe_index],
            None,
            settings.ray_bias,
            shadow_distance,
        ) {
            sh.add_directional_light(direction_to_light, light);
        }
        sh
    });

    for (light_probe, contribution) in baked_data.light_probes.iter_mut().zip(contributions) {
        *light_probe += contribution;
    }
}
