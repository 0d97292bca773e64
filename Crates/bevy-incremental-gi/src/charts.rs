// bevy-incremental-gi/Crates/bevy-incremental-gi/src/charts.rs

//! Allocation of lightmap regions to geometries.

use crate::scene::{GeometryId, SceneGeometry};
use crate::settings::LightmapChartingSettings;
use bevy::math::{UVec2, Vec4};
use serde::{Deserialize, Serialize};

/// A single lightmap texture and the geometries packed into it.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct LightmapChart {
    /// The global lightmap index.
    pub index: u32,
    /// Width and height in texels.
    pub size: u32,
    pub elements: Vec<LightmapChartElement>,
}

/// The region of a chart that one geometry occupies.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct LightmapChartElement {
    pub geometry_id: GeometryId,
    /// Top-left texel of the region.
    pub position: UVec2,
    /// Size of the region in texels.
    pub size: UVec2,
    /// Maps unit-square lightmap UVs into the region: scale in *x* and *y*,
    /// offset in *z* and *w*.
    pub scale_offset: Vec4,
}

/// Packs geometries into lightmap charts.
pub trait LightmapChartGenerator {
    /// Packs `geometries` into as many charts as needed, numbering them
    /// consecutively from `base_index`.
    ///
    /// Geometries that don't bake a lightmap are left out.
    fn generate_charts(
        &self,
        geometries: &[(GeometryId, &SceneGeometry)],
        settings: &LightmapChartingSettings,
        base_index: u32,
    ) -> Vec<LightmapChart>;
}

/// Gives every geometry a square region sized by its surface area and packs
/// the regions into rows.
#[derive(Clone, Copy, Default, Debug)]
pub struct ShelfChartGenerator;

struct Shelf {
    cursor_x: u32,
    y: u32,
    height: u32,
}

impl ShelfChartGenerator {
    fn region_size(geometry: &SceneGeometry, settings: &LightmapChartingSettings) -> u32 {
        let max_size = settings
            .lightmap_size
            .saturating_sub(settings.padding * 2)
            .max(1);
        let size = (geometry.surface_area().sqrt() * settings.texel_density).ceil() as u32;
        size.max(settings.min_chart_size).clamp(1, max_size)
    }
}

impl LightmapChartGenerator for ShelfChartGenerator {
    fn generate_charts(
        &self,
        geometries: &[(GeometryId, &SceneGeometry)],
        settings: &LightmapChartingSettings,
        base_index: u32,
    ) -> Vec<LightmapChart> {
        let mut regions = geometries
            .iter()
            .filter(|(_, geometry)| geometry.bake_lightmap)
            .map(|&(geometry_id, geometry)| {
                (geometry_id, ShelfChartGenerator::region_size(geometry, settings))
            })
            .collect::<Vec<_>>();
        regions.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let lightmap_size = settings.lightmap_size;
        let padding = settings.padding;
        let mut charts: Vec<LightmapChart> = vec![];
        let mut shelf = Shelf {
            cursor_x: padding,
            y: padding,
            height: 0,
        };

        for (geometry_id, size) in regions {
            if shelf.cursor_x + size + padding > lightmap_size {
                shelf = Shelf {
                    cursor_x: padding,
                    y: shelf.y + shelf.height + padding * 2,
                    height: 0,
                };
            }
            if charts.is_empty() || shelf.y + size + padding > lightmap_size {
                charts.push(LightmapChart {
                    index: base_index + charts.len() as u32,
                    size: lightmap_size,
                    elements: vec![],
                });
                shelf = Shelf {
                    cursor_x: padding,
                    y: padding,
                    height: 0,
                };
            }

            let position = UVec2::new(shelf.cursor_x, shelf.y);
            let texel_scale = 1.0 / lightmap_size as f32;
            if let Some(chart) = charts.last_mut() {
                chart.elements.push(LightmapChartElement {
                    geometry_id,
                    position,
                    size: UVec2::splat(size),
                    scale_offset: Vec4::new(
                        size as f32 * texel_scale,
                        size as f32 * texel_scale,
                        position.x as f32 * texel_scale,
                        position.y as f32 * texel_scale,
                    ),
                });
            }

            shelf.cursor_x += size + padding * 2;
            shelf.height = shelf.height.max(size);
        }

        charts
    }
}
