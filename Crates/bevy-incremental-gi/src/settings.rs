// bevy-incremental-gi/Crates/bevy-incremental-gi/src/settings.rs

//! Configuration for incremental light baking.
//!
//! Every settings struct implements [Default] and deserializes with missing
//! fields filled from that default, so a settings file only needs to mention
//! the values it overrides.

use bevy::math::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All the settings used by [crate::IncrementalLightBaker].
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LightBakingSettings {
    /// Chunking, output naming and vicinity padding.
    pub incremental: IncrementalBakingSettings,
    /// Lightmap chart allocation.
    pub charting: LightmapChartingSettings,
    /// Rasterization of chart geometry.
    pub geometry_buffer: GeometryBufferSettings,
    /// Emissive surfaces.
    pub emission_tracing: EmissionLightTracingSettings,
    /// Direct light for lightmap charts.
    pub direct_chart_tracing: DirectLightTracingSettings,
    /// Direct light for light probes.
    pub direct_probes_tracing: DirectLightTracingSettings,
    /// Indirect light for lightmap charts.
    pub indirect_chart_tracing: IndirectLightTracingSettings,
    /// Indirect light for light probes.
    pub indirect_probes_tracing: IndirectLightTracingSettings,
    /// Denoising of baked direct light.
    pub direct_filter: EdgeStoppingGaussFilterParameters,
    /// Denoising of baked indirect light.
    pub indirect_filter: EdgeStoppingGaussFilterParameters,
    /// Blending across UV seams.
    pub stitching: LightmapStitchingSettings,
}

/// Settings that control how the scene is split into chunks and where the
/// results end up.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementalBakingSettings {
    /// The directory that receives lightmaps, light probe data and the GI
    /// data file.
    ///
    /// If this is `None`, the scene file path with its extension removed is
    /// used instead.
    pub output_directory: Option<PathBuf>,
    /// The size of a single chunk, in world units.
    pub chunk_size: Vec3,
    /// How far beyond the chunk bounds geometry and light probes still
    /// contribute indirect light.
    pub indirect_padding: f32,
    /// How far beyond the chunk bounds geometry can cast directional shadows
    /// into the chunk.
    pub directional_light_shadow_distance: f32,
    /// Prepended to the lightmap index to form the lightmap file name.
    pub lightmap_name_prefix: String,
    /// Appended to the lightmap index to form the lightmap file name.
    pub lightmap_name_suffix: String,
    /// Prepended to the chunk coordinates to form the light probe data file
    /// name.
    pub light_probe_group_name_prefix: String,
    /// Appended to the group index to form the light probe data file name.
    pub light_probe_group_name_suffix: String,
    /// The name of the GI data file, relative to the output directory.
    pub gi_data_file_name: String,
    /// Directories that resource paths written into the scene are made
    /// relative to.
    pub resource_dirs: Vec<PathBuf>,
}

/// Settings for lightmap chart allocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LightmapChartingSettings {
    /// The width and height of every lightmap texture, in texels.
    pub lightmap_size: u32,
    /// Empty texels kept around every chart region.
    pub padding: u32,
    /// Texels per world unit.
    pub texel_density: f32,
    /// The smallest region side a geometry receives, in texels.
    pub min_chart_size: u32,
}

/// Settings for rasterizing chart geometry into geometry buffers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryBufferSettings {
    /// Tolerance, in texels, used when testing whether a texel center lies
    /// inside a triangle.
    pub coverage_epsilon: f32,
}

/// Settings for baking emissive surfaces.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionLightTracingSettings {
    /// Scale applied to the emission of every surface.
    pub emission_brightness: f32,
}

/// Settings for tracing direct light.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectLightTracingSettings {
    /// Number of tasks the work is split across.
    pub num_tasks: usize,
    /// Offset applied to shadow ray origins along the surface normal.
    pub ray_bias: f32,
}

/// Settings for tracing indirect light.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndirectLightTracingSettings {
    /// Number of tasks the work is split across.
    pub num_tasks: usize,
    /// Rays traced per texel or per light probe.
    pub max_samples: u32,
    /// Maximum length of a bounce ray.
    pub max_distance: f32,
    /// Offset applied to ray origins along the surface normal.
    pub ray_bias: f32,
}

/// Parameters of the edge-stopping Gaussian filter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeStoppingGaussFilterParameters {
    /// Radius of the kernel in texels. Zero disables filtering.
    pub kernel_radius: u32,
    /// Spacing between kernel taps, in texels.
    pub upscale: u32,
    /// Luminance difference at which neighbors stop contributing.
    pub luminance_sigma: f32,
    /// Exponent applied to the normal similarity.
    pub normal_power: f32,
    /// World-space distance at which neighbors stop contributing.
    pub position_sigma: f32,
}

/// Settings for blending lightmaps across UV seams.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LightmapStitchingSettings {
    /// Number of blending passes. Zero disables stitching.
    pub num_iterations: u32,
    /// How far each pass moves seam texels toward the shared value.
    pub blend_factor: f32,
}

/// Properties of the rendering backend that the baked data will be used
/// with.
#[derive(Clone, Copy, Default, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsCapabilities {
    /// Offset of texel centers from half-integer coordinates.
    ///
    /// The tracer places texel centers at `(x + 0.5, y + 0.5)`; backends
    /// that use any other convention can't consume the baked lightmaps.
    pub pixel_uv_offset: Vec2,
}

impl Default for IncrementalBakingSettings {
    fn default() -> Self {
        IncrementalBakingSettings {
            output_directory: None,
            chunk_size: Vec3::splat(64.0),
            indirect_padding: 32.0,
            directional_light_shadow_distance: 128.0,
            lightmap_name_prefix: "Textures/Lightmap-".to_owned(),
            lightmap_name_suffix: ".png".to_owned(),
            light_probe_group_name_prefix: "Binary/LightProbeGroup-".to_owned(),
            light_probe_group_name_suffix: ".bin".to_owned(),
            gi_data_file_name: "GlobalIllumination.json".to_owned(),
            resource_dirs: vec![],
        }
    }
}

impl Default for LightmapChartingSettings {
    fn default() -> Self {
        LightmapChartingSettings {
            lightmap_size: 512,
            padding: 1,
            texel_density: 10.0,
            min_chart_size: 1,
        }
    }
}

impl Default for GeometryBufferSettings {
    fn default() -> Self {
        GeometryBufferSettings {
            coverage_epsilon: 1.0e-4,
        }
    }
}

impl Default for EmissionLightTracingSettings {
    fn default() -> Self {
        EmissionLightTracingSettings {
            emission_brightness: 1.0,
        }
    }
}

impl Default for DirectLightTracingSettings {
    fn default() -> Self {
        DirectLightTracingSettings {
            num_tasks: 1,
            ray_bias: 1.0e-3,
        }
    }
}

impl Default for IndirectLightTracingSettings {
    fn default() -> Self {
        IndirectLightTracingSettings {
            num_tasks: 1,
            max_samples: 64,
            max_distance: 1000.0,
            ray_bias: 1.0e-3,
        }
    }
}

impl Default for EdgeStoppingGaussFilterParameters {
    fn default() -> Self {
        EdgeStoppingGaussFilterParameters {
            kernel_radius: 2,
            upscale: 1,
            luminance_sigma: 10.0,
            normal_power: 4.0,
            position_sigma: 1.0,
        }
    }
}

impl Default for LightmapStitchingSettings {
    fn default() -> Self {
        LightmapStitchingSettings {
            num_iterations: 8,
            blend_factor: 0.5,
        }
    }
}

impl LightBakingSettings {
    /// Returns the number of texels in a single lightmap.
    pub fn lightmap_texel_count(&self) -> usize {
        let lightmap_size = self.charting.lightmap_size as usize;
        lightmap_size * lightmap_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fall_back_to_defaults() {
        let settings: LightBakingSettings = ron::from_str(
            "(charting: (lightmap_size: 64), stitching: (num_iterations: 0))",
        )
        .unwrap();
        assert_eq!(settings.charting.lightmap_size, 64);
        assert_eq!(settings.charting.padding, 1);
        assert_eq!(settings.stitching.num_iterations, 0);
        assert_eq!(settings.incremental.chunk_size, Vec3::splat(64.0));
        assert_eq!(settings.lightmap_texel_count(), 64 * 64);
    }
}
