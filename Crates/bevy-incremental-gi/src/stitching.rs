// bevy-incremental-gi/Crates/bevy-incremental-gi/src/stitching.rs

//! Seam blending and export of finished lightmaps.

use crate::geometry_buffer::LightmapSeam;
use crate::math::linear_to_gamma;
use crate::settings::LightmapStitchingSettings;
use bevy::math::{Vec2, Vec4};
use image::{ImageError, Rgba, RgbaImage};
use std::fs;
use std::path::Path;

/// Brightness scale applied to every lightmap on export, after gamma
/// encoding.
pub const POST_BAKE_INTENSITY_SCALE: f32 = 0.5;

/// Scratch state for stitching, sized for one lightmap and reused across
/// lightmaps.
pub struct LightmapStitchingContext {
    lightmap_size: u32,
    ping: Vec<Vec4>,
    pong: Vec<Vec4>,
}

impl LightmapStitchingContext {
    pub fn new(lightmap_size: u32) -> LightmapStitchingContext {
        let texel_count = lightmap_size as usize * lightmap_size as usize;
        LightmapStitchingContext {
            lightmap_size,
            ping: vec![Vec4::ZERO; texel_count],
            pong: vec![Vec4::ZERO; texel_count],
        }
    }

    fn texel(&self, x: i32, y: i32) -> usize {
        let max = (self.lightmap_size as i32 - 1).max(0);
        (y.clamp(0, max) * self.lightmap_size as i32 + x.clamp(0, max)) as usize
    }

    fn nearest_texel(&self, uv: Vec2) -> usize {
        let texel = (uv * self.lightmap_size as f32).floor();
        self.texel(texel.x as i32, texel.y as i32)
    }

    /// Samples `ping` bilinearly between texel centers.
    fn sample(&self, uv: Vec2) -> Vec4 {
        let position = uv * self.lightmap_size as f32 - 0.5;
        let base = position.floor();
        let fraction = position - base;
        let (x, y) = (base.x as i32, base.y as i32);
        let top = self.ping[self.texel(x, y)].lerp(self.ping[self.texel(x + 1, y)], fraction.x);
        let bottom =
            self.ping[self.texel(x, y + 1)].lerp(self.ping[self.texel(x + 1, y + 1)], fraction.x);
        top.lerp(bottom, fraction.y)
    }
}

/// Copies a lightmap into `output`, forcing alpha to one.
pub fn copy_lightmap(lightmap: &[Vec4], output: &mut Vec<Vec4>) {
    output.clear();
    output.extend(lightmap.iter().map(|texel| texel.truncate().extend(1.0)));
}

/// Blends texels on both sides of every seam toward their average and writes
/// the result, with alpha forced to one, to `output`.
pub fn stitch_lightmap_seams(
    context: &mut LightmapStitchingContext,
    lightmap: &[Vec4],
    output: &mut Vec<Vec4>,
    seams: &[LightmapSeam],
    settings: &LightmapStitchingSettings,
) {
    copy_lightmap(lightmap, &mut context.ping);
    let size = context.lightmap_size as f32;

    // Seams can only be sampled in a lightmap of the context's size.
    let texel_count = context.lightmap_size as usize * context.lightmap_size as usize;
    let num_iterations = if texel_count > 0 && context.ping.len() == texel_count {
        settings.num_iterations
    } else {
        0
    };
    for _ in 0..num_iterations {
        context.pong.clone_from(&context.ping);
        for seam in seams {
            let [first, second] = seam.edges;
            let length = ((first[1] - first[0]).length().max((second[1] - second[0]).length())
                * size)
                .ceil() as u32;
            let num_samples = length * 2 + 1;
            for sample_index in 0..num_samples {
                let t = sample_index as f32 / (num_samples - 1).max(1) as f32;
                let first_uv = first[0].lerp(first[1], t);
                let second_uv = second[0].lerp(second[1], t);
                let average = (context.sample(first_uv) + context.sample(second_uv)) * 0.5;

                for uv in [first_uv, second_uv] {
                    let texel_index = context.nearest_texel(uv);
                    context.pong[texel_index] =
                        context.pong[texel_index].lerp(average, settings.blend_factor);
                }
            }
        }
        std::mem::swap(&mut context.ping, &mut context.pong);
    }

    output.clear();
    output.extend_from_slice(&context.ping);
}

/// Converts linear light to the exported 8-bit form: gamma encoding, then
/// [POST_BAKE_INTENSITY_SCALE].
pub fn encode_lightmap_texel(texel: Vec4) -> Rgba<u8> {
    let encode = |value: f32| {
        (linear_to_gamma(value) * POST_BAKE_INTENSITY_SCALE * 255.0)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Rgba([encode(texel.x), encode(texel.y), encode(texel.z), 255])
}

/// Overwrites every pixel of `image` with the encoded lightmap.
pub fn write_lightmap_image(lightmap: &[Vec4], image: &mut RgbaImage) {
    let width = image.width() as usize;
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let texel = lightmap
            .get(y as usize * width + x as usize)
            .copied()
            .unwrap_or(Vec4::ZERO);
        *pixel = encode_lightmap_texel(texel);
    }
}

/// Saves an image, creating parent directories as needed. The format follows
/// the file extension.
pub fn save_lightmap_image(image: &RgbaImage, path: &Path) -> Result<(), ImageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(ImageError::IoError)?;
    }
    image.save(path)
}
