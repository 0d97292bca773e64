// bevy-incremental-gi/Crates/bevy-incremental-gi/src/filter.rs

//! Edge-stopping Gaussian denoising of baked light.

use crate::geometry_buffer::LightmapChartGeometryBuffer;
use crate::lightmaps::{LightmapChartBakedDirect, LightmapChartBakedIndirect};
use crate::math::luminance;
use crate::parallel::LightBakingTaskPool;
use crate::settings::EdgeStoppingGaussFilterParameters;
use bevy::math::{Vec3, Vec4};
use std::ops::{Add, Mul};

/// A texel value that can be filtered.
pub trait FilterTexel:
    Copy + Default + Add<Output = Self> + Mul<f32, Output = Self> + Send + Sync
{
    fn luminance(&self) -> f32;
}

impl FilterTexel for Vec3 {
    fn luminance(&self) -> f32 {
        luminance(*self)
    }
}

impl FilterTexel for Vec4 {
    fn luminance(&self) -> f32 {
        luminance(self.truncate())
    }
}

/// Blurs `light` across texels of similar brightness, orientation and
/// position.
///
/// Results are written to `scratch` and then copied back over all of
/// `light`. Texels without geometry keep their value. `scratch` is resized
/// to the texel count if needed.
pub fn filter_light<T: FilterTexel>(
    light: &mut [T],
    scratch: &mut Vec<T>,
    geometry_buffer: &LightmapChartGeometryBuffer,
    parameters: &EdgeStoppingGaussFilterParameters,
    pool: &LightBakingTaskPool,
) {
    scratch.resize(light.len(), T::default());

    let size = geometry_buffer.lightmap_size as i32;
    let radius = parameters.kernel_radius as i32;
    let step = parameters.upscale.max(1) as i32;
    let sigma = (parameters.kernel_radius as f32 * 0.5).max(0.5);
    let source = &*light;

    pool.fill(scratch, |texel_index| {
        let center = source[texel_index];
        if !geometry_buffer.is_covered(texel_index) {
            return center;
        }
        let (x, y) = (texel_index as i32 % size, texel_index as i32 / size);
        let center_luminance = center.luminance();
        let center_normal = geometry_buffer.smooth_normals[texel_index];
        let center_position = geometry_buffer.positions[texel_index];

        let mut sum = T::default();
        let mut total_weight = 0.0;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let (other_x, other_y) = (x + dx * step, y + dy * step);
                if other_x < 0 || other_y < 0 || other_x >= size || other_y >= size {
                    continue;
                }
                let other_index = (other_y * size + other_x) as usize;
                if !geometry_buffer.is_covered(other_index) {
                    continue;
                }

                let other = source[other_index];
                let kernel_weight = (-((dx * dx + dy * dy) as f32) / (2.0 * sigma * sigma)).exp();
                let luminance_weight = (-(center_luminance - other.luminance()).abs()
                    / parameters.luminance_sigma.max(f32::EPSILON))
                .exp();
                let normal_weight = center_normal
                    .dot(geometry_buffer.smooth_normals[other_index])
                    .max(0.0)
                    .powf(parameters.normal_power);
                let position_weight = (-center_position
                    .distance(geometry_buffer.positions[other_index])
                    / parameters.position_sigma.max(f32::EPSILON))
                .exp();

                let weight = kernel_weight * luminance_weight * normal_weight * position_weight;
                sum = sum + other * weight;
                total_weight += weight;
            }
        }

        if total_weight > 0.0 {
            sum * (1.0 / total_weight)
        } else {
            center
        }
    });

    light.copy_from_slice(scratch);
}

/// Filters the direct light of a lightmap.
pub fn filter_direct_light(
    direct: &mut LightmapChartBakedDirect,
    scratch: &mut Vec<Vec3>,
    geometry_buffer: &LightmapChartGeometryBuffer,
    parameters: &EdgeStoppingGaussFilterParameters,
    pool: &LightBakingTaskPool,
) {
    filter_light(&mut direct.direct_light, scratch, geometry_buffer, parameters, pool);
}

/// Filters normalized indirect light.
pub fn filter_indirect_light(
    indirect: &mut LightmapChartBakedIndirect,
    scratch: &mut Vec<Vec4>,
    geometry_buffer: &LightmapChartGeometryBuffer,
    parameters: &EdgeStoppingGaussFilterParameters,
    pool: &LightBakingTaskPool,
) {
    debug_assert!(indirect.is_normalized());
    filter_light(&mut indirect.light, scratch, geometry_buffer, parameters, pool);
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: u32 = 4;

    /// A 4×4 buffer whose left half faces up and right half faces sideways.
    /// The top row is empty.
    fn geometry_buffer() -> LightmapChartGeometryBuffer {
        let mut buffer = LightmapChartGeometryBuffer::new(0, SIZE);
        for texel_index in SIZE as usize..buffer.texel_count() {
            let (x, y) = (texel_index as u32 % SIZE, texel_index as u32 / SIZE);
            buffer.geometry_ids[texel_index] = Some(0);
            buffer.positions[texel_index] = Vec3::new(x as f32, 0.0, y as f32) * 0.1;
            buffer.smooth_normals[texel_index] = if x < 2 { Vec3::Y } else { Vec3::X };
        }
        buffer
    }

    #[test]
    fn uniform_light_is_unchanged() {
        let buffer = geometry_buffer();
        let mut light = vec![Vec3::splat(0.5); buffer.texel_count()];
        light[0] = Vec3::splat(9.0);
        let mut scratch = vec![];
        filter_light(
            &mut light,
            &mut scratch,
            &buffer,
            &Default::default(),
            &LightBakingTaskPool::inline(),
        );

        assert_eq!(scratch.len(), buffer.texel_count());
        assert_eq!(light[0], Vec3::splat(9.0));
        for value in &light[SIZE as usize..] {
            assert!(value.abs_diff_eq(Vec3::splat(0.5), 1.0e-6));
        }
    }

    #[test]
    fn noise_is_smoothed_but_edges_are_kept() {
        let buffer = geometry_buffer();
        let mut light = vec![Vec4::ZERO; buffer.texel_count()];
        light[5] = Vec4::ONE;
        let mut scratch = vec![];
        let parameters = EdgeStoppingGaussFilterParameters {
            kernel_radius: 1,
            ..Default::default()
        };
        let pool = LightBakingTaskPool::new(2, "Test");
        filter_light(&mut light, &mut scratch, &buffer, &parameters, &pool);

        assert!(light[5].x < 1.0);
        assert!(light[4].x > 0.0);
        assert!(light[9].x > 0.0);
        // Perpendicular normals don't blend.
        assert_eq!(light[6], Vec4::ZERO);
        assert_eq!(light[0], Vec4::ZERO);
    }
}
