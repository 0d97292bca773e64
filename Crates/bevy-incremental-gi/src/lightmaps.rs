// bevy-incremental-gi/Crates/bevy-incremental-gi/src/lightmaps.rs

//! Per-texel light buffers produced while baking.

use bevy::math::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Direct light baked into one lightmap.
///
/// Produced once per lightmap by the direct pass and read, possibly by many
/// chunks, during the indirect pass. Indexed by `y * lightmap_size + x`.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct LightmapChartBakedDirect {
    pub lightmap_size: u32,
    /// Emission plus light from every light source, before albedo.
    pub direct_light: Vec<Vec3>,
    /// Light leaving the surface: `albedo * direct_light + emission`.
    pub surface_light: Vec<Vec3>,
    pub albedo: Vec<Vec3>,
}

/// Indirect light accumulated for one lightmap.
///
/// The *w* component of every texel counts the samples taken, so the color
/// is only meaningful after [LightmapChartBakedIndirect::normalize_light].
#[derive(Clone, PartialEq, Debug)]
pub struct LightmapChartBakedIndirect {
    pub lightmap_size: u32,
    pub light: Vec<Vec4>,
    normalized: bool,
}

/// The final light of one lightmap, ready for stitching.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct BakedLightmap {
    pub lightmap_size: u32,
    /// Linear color in *xyz*. *w* is unused.
    pub lightmap: Vec<Vec4>,
}

fn texel_count(lightmap_size: u32) -> usize {
    lightmap_size as usize * lightmap_size as usize
}

/// Returns the nearest texel to a normalized lightmap UV.
pub fn texel_index_at(lightmap_size: u32, uv: Vec2) -> usize {
    let max = lightmap_size.saturating_sub(1) as f32;
    let texel = (uv * lightmap_size as f32).floor().clamp(Vec2::ZERO, Vec2::splat(max));
    texel.y as usize * lightmap_size as usize + texel.x as usize
}

impl LightmapChartBakedDirect {
    pub fn new(lightmap_size: u32) -> LightmapChartBakedDirect {
        let texel_count = texel_count(lightmap_size);
        LightmapChartBakedDirect {
            lightmap_size,
            direct_light: vec![Vec3::ZERO; texel_count],
            surface_light: vec![Vec3::ZERO; texel_count],
            albedo: vec![Vec3::ZERO; texel_count],
        }
    }

    /// Returns the light leaving the surface at a normalized lightmap UV.
    pub fn sample_surface_light(&self, uv: Vec2) -> Vec3 {
        self.surface_light
            .get(texel_index_at(self.lightmap_size, uv))
            .copied()
            .unwrap_or(Vec3::ZERO)
    }
}

impl LightmapChartBakedIndirect {
    pub fn new(lightmap_size: u32) -> LightmapChartBakedIndirect {
        LightmapChartBakedIndirect {
            lightmap_size,
            light: vec![Vec4::ZERO; texel_count(lightmap_size)],
            normalized: false,
        }
    }

    /// Divides every texel by its sample count. Must be called exactly once.
    pub fn normalize_light(&mut self) {
        debug_assert!(!self.normalized, "indirect light normalized twice");
        for texel in &mut self.light {
            if texel.w > 0.0 {
                *texel = (texel.truncate() / texel.w).extend(1.0);
            }
        }
        self.normalized = true;
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }
}

impl BakedLightmap {
    /// Combines the two passes, clamping each to non-negative values first.
    pub fn from_direct_and_indirect(
        direct: &LightmapChartBakedDirect,
        indirect: &LightmapChartBakedIndirect,
    ) -> BakedLightmap {
        let lightmap = direct
            .direct_light
            .iter()
            .zip(&indirect.light)
            .map(|(direct, indirect)| {
                (direct.max(Vec3::ZERO) + indirect.truncate().max(Vec3::ZERO)).extend(1.0)
            })
            .collect();
        BakedLightmap {
            lightmap_size: direct.lightmap_size,
            lightmap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::{vec2, vec3, vec4};

    #[test]
    fn normalizing_divides_by_the_sample_count() {
        let mut indirect = LightmapChartBakedIndirect::new(2);
        indirect.light[0] = vec4(2.0, 4.0, 6.0, 2.0);
        indirect.normalize_light();
        assert!(indirect.is_normalized());
        assert_eq!(indirect.light[0], vec4(1.0, 2.0, 3.0, 1.0));
        assert_eq!(indirect.light[1], Vec4::ZERO);
    }

    #[test]
    fn combining_clamps_both_inputs() {
        let mut direct = LightmapChartBakedDirect::new(1);
        direct.direct_light[0] = vec3(-1.0, 0.5, 2.0);
        let mut indirect = LightmapChartBakedIndirect::new(1);
        indirect.light[0] = vec4(0.25, -3.0, -1.0, 1.0);

        let lightmap = BakedLightmap::from_direct_and_indirect(&direct, &indirect);
        assert_eq!(lightmap.lightmap, vec![vec4(0.25, 0.5, 2.0, 1.0)]);
    }

    #[test]
    fn samples_the_nearest_texel() {
        let mut direct = LightmapChartBakedDirect::new(4);
        direct.surface_light[4 + 2] = Vec3::ONE;
        assert_eq!(direct.sample_surface_light(vec2(0.6, 0.3)), Vec3::ONE);
        assert_eq!(direct.sample_surface_light(vec2(0.1, 0.1)), Vec3::ZERO);
        assert_eq!(texel_index_at(4, vec2(1.0, 1.0)), 15);
    }
}
