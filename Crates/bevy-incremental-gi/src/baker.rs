// bevy-incremental-gi/Crates/bevy-incremental-gi/src/baker.rs

//! The incremental light baker: drives every phase of a bake over the chunks
//! of a scene.
//!
//! A bake runs [IncrementalLightBaker::initialize],
//! [IncrementalLightBaker::process_scene], [IncrementalLightBaker::bake] and
//! [IncrementalLightBaker::commit_scene], in that order. Phases and chunks
//! only exchange data through the [BakedLightCache].

use crate::baking::{
    bake_direct_light_for_charts, bake_direct_light_for_light_probes, bake_emission_light,
    bake_indirect_light_for_charts, bake_indirect_light_for_light_probes, IndirectLightSources,
};
use crate::cache::BakedLightCache;
use crate::charts::{LightmapChartGenerator, ShelfChartGenerator};
use crate::chunks::sort_chunks_by_locality;
use crate::collector::BakedSceneCollector;
use crate::filter::{filter_direct_light, filter_indirect_light};
use crate::gi_data::GiData;
use crate::light_probes::{save_light_probe_group_baked_data, LightProbeCollectionBakedData};
use crate::lightmaps::{BakedLightmap, LightmapChartBakedDirect, LightmapChartBakedIndirect};
use crate::parallel::LightBakingTaskPool;
use crate::raytracer::{BruteForceRaytracer, RaytracerBackend};
use crate::scene::{GeometryId, LightProbeGroupId, Scene, SceneGeometry};
use crate::settings::{GraphicsCapabilities, LightBakingSettings};
use crate::stitching::{
    copy_lightmap, save_lightmap_image, stitch_lightmap_seams, write_lightmap_image,
    LightmapStitchingContext,
};
use crate::tetrahedral_mesh::TetrahedralMesh;
use crate::vicinity::{create_baked_chunk_vicinity, BakedChunkVicinity};
use crate::{BakeOutcome, CancellationToken, LightBakingError};
use bevy::log::{debug, error, info, warn};
use bevy::math::{IVec3, Vec2, Vec3};
use bevy::utils::HashMap;
use image::RgbaImage;
use std::env;
use std::fs;
use std::io::Error as IoError;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Where a baker is in its sequence of phases.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BakingPhase {
    Uninitialized,
    Initialized,
    ScenesProcessed,
    DirectBaked,
    IndirectBakedAndFiltered,
    Committed,
}

/// Bakes lightmaps and light probes for a scene one chunk at a time.
pub struct IncrementalLightBaker<'a> {
    settings: LightBakingSettings,
    capabilities: GraphicsCapabilities,
    scene: &'a mut Scene,
    collector: &'a mut dyn BakedSceneCollector,
    cache: &'a dyn BakedLightCache,
    chart_generator: Box<dyn LightmapChartGenerator>,
    raytracer: Box<dyn RaytracerBackend>,

    phase: BakingPhase,
    output_directory: PathBuf,
    resource_dirs: Vec<PathBuf>,
    gi_data_path: PathBuf,
    chunks: Vec<IVec3>,
    num_lightmap_charts: u32,
    /// Where each chunk saves the baked data of the light probe groups it
    /// owns.
    light_probe_group_files: HashMap<IVec3, Vec<(LightProbeGroupId, PathBuf)>>,
}

impl<'a> IncrementalLightBaker<'a> {
    /// Creates a baker that charts with [ShelfChartGenerator] and traces with
    /// [BruteForceRaytracer].
    pub fn new(
        settings: LightBakingSettings,
        scene: &'a mut Scene,
        collector: &'a mut dyn BakedSceneCollector,
        cache: &'a dyn BakedLightCache,
    ) -> IncrementalLightBaker<'a> {
        IncrementalLightBaker {
            settings,
            capabilities: GraphicsCapabilities::default(),
            scene,
            collector,
            cache,
            chart_generator: Box::new(ShelfChartGenerator),
            raytracer: Box::new(BruteForceRaytracer),
            phase: BakingPhase::Uninitialized,
            output_directory: PathBuf::new(),
            resource_dirs: vec![],
            gi_data_path: PathBuf::new(),
            chunks: vec![],
            num_lightmap_charts: 0,
            light_probe_group_files: HashMap::default(),
        }
    }

    pub fn with_chart_generator(
        mut self,
        chart_generator: Box<dyn LightmapChartGenerator>,
    ) -> IncrementalLightBaker<'a> {
        self.chart_generator = chart_generator;
        self
    }

    pub fn with_raytracer(mut self, raytracer: Box<dyn RaytracerBackend>) -> IncrementalLightBaker<'a> {
        self.raytracer = raytracer;
        self
    }

    pub fn with_graphics_capabilities(
        mut self,
        capabilities: GraphicsCapabilities,
    ) -> IncrementalLightBaker<'a> {
        self.capabilities = capabilities;
        self
    }

    pub fn phase(&self) -> BakingPhase {
        self.phase
    }

    /// The chunks of the scene, in baking order. Empty until initialized.
    pub fn chunks(&self) -> &[IVec3] {
        &self.chunks
    }

    pub fn num_lightmap_charts(&self) -> u32 {
        self.num_lightmap_charts
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Returns the path that the image of a lightmap is saved to.
    pub fn lightmap_path(&self, lightmap_index: u32) -> PathBuf {
        let incremental = &self.settings.incremental;
        self.output_directory.join(format!(
            "{}{}{}",
            incremental.lightmap_name_prefix, lightmap_index, incremental.lightmap_name_suffix
        ))
    }

    fn expect_phase(
        &self,
        operation: &'static str,
        expected: BakingPhase,
    ) -> Result<(), LightBakingError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(LightBakingError::PhaseOrder {
                operation,
                expected,
                actual: self.phase,
            })
        }
    }

    /// Validates the settings, creates the output directory and the GI data
    /// file, and splits the scene into chunks.
    pub fn initialize(&mut self) -> Result<(), LightBakingError> {
        self.expect_phase("initialize", BakingPhase::Uninitialized)?;

        let pixel_uv_offset = self.capabilities.pixel_uv_offset;
        if pixel_uv_offset != Vec2::ZERO {
            return Err(LightBakingError::UnsupportedBackend(pixel_uv_offset));
        }
        let chunk_size = self.settings.incremental.chunk_size;
        if !chunk_size.cmpgt(Vec3::ZERO).all() || !chunk_size.is_finite() {
            return Err(LightBakingError::InvalidChunkSize(chunk_size));
        }
        if self.settings.charting.lightmap_size == 0 {
            return Err(LightBakingError::InvalidLightmapSize);
        }

        let output_directory = match self.settings.incremental.output_directory {
            Some(ref output_directory) => output_directory.clone(),
            None => {
                let file_path = self
                    .scene
                    .file_path
                    .as_ref()
                    .ok_or(LightBakingError::UndefinedSceneFileName)?;
                if file_path.extension().is_none() {
                    return Err(LightBakingError::SceneFileNameWithoutExtension(
                        file_path.clone(),
                    ));
                }
                file_path.with_extension("")
            }
        };
        let create_output_directory = |source| LightBakingError::CreateOutputDirectory {
            path: output_directory.clone(),
            source,
        };
        let output_directory = absolute_path(&output_directory).map_err(create_output_directory)?;
        fs::create_dir_all(&output_directory).map_err(create_output_directory)?;

        self.resource_dirs = self
            .settings
            .incremental
            .resource_dirs
            .iter()
            .filter_map(|resource_dir| absolute_path(resource_dir).ok())
            .collect();

        let gi_data_path = output_directory.join(&self.settings.incremental.gi_data_file_name);
        if let Some(parent) = gi_data_path.parent() {
            fs::create_dir_all(parent).map_err(|source| {
                LightBakingError::CreateGiDataDirectory {
                    path: parent.to_owned(),
                    source,
                }
            })?;
        }
        GiData::default()
            .save(&gi_data_path)
            .map_err(|source| LightBakingError::CreateGiDataFile {
                path: gi_data_path.clone(),
                source,
            })?;

        self.collector.lock_scene(&*self.scene, chunk_size);
        let mut chunks = self.collector.chunks();
        if let Err(err) = sort_chunks_by_locality(&mut chunks) {
            self.collector.unlock_scene();
            return Err(err.into());
        }

        self.scene
            .set_gi_data_file(resource_name(&gi_data_path, &self.resource_dirs));
        info!(
            "Baking {} chunks into {:?}",
            chunks.len(),
            output_directory
        );

        self.output_directory = output_directory;
        self.gi_data_path = gi_data_path;
        self.chunks = chunks;
        self.phase = BakingPhase::Initialized;
        Ok(())
    }

    /// Charts every chunk's geometry, assigns light probe data files and
    /// builds the vicinity of every chunk.
    ///
    /// Chart indices continue from one chunk to the next, so lightmaps are
    /// numbered contiguously from zero across the whole scene.
    pub fn process_scene(&mut self) -> Result<(), LightBakingError> {
        self.expect_phase("process_scene", BakingPhase::Initialized)?;

        let incremental = &self.settings.incremental;
        let mut num_lightmap_charts = 0;
        let mut light_probe_group_files = HashMap::default();
        for &chunk in &self.chunks {
            let charts = {
                let geometries = self
                    .collector
                    .unique_geometries(chunk)
                    .into_iter()
                    .filter_map(|geometry_id| {
                        Some((geometry_id, self.scene.geometries.get(geometry_id)?))
                    })
                    .collect::<Vec<(GeometryId, &SceneGeometry)>>();
                self.chart_generator.generate_charts(
                    &geometries,
                    &self.settings.charting,
                    num_lightmap_charts,
                )
            };
            num_lightmap_charts += charts.len() as u32;
            self.scene.apply_lightmap_charts(&charts);
            self.collector.commit_geometries(&*self.scene, chunk);

            let mut files = vec![];
            for (group_index, group_id) in self
                .collector
                .unique_light_probe_groups(chunk)
                .into_iter()
                .enumerate()
            {
                let path = self.output_directory.join(format!(
                    "{}{}-{}-{}-{}{}",
                    incremental.light_probe_group_name_prefix,
                    chunk.x,
                    chunk.y,
                    chunk.z,
                    group_index,
                    incremental.light_probe_group_name_suffix
                ));
                if let Some(group) = self.scene.light_probe_groups.get_mut(group_id) {
                    group.baked_data_file = Some(resource_name(&path, &self.resource_dirs));
                }
                files.push((group_id, path));
            }
            light_probe_group_files.insert(chunk, files);

            debug!("Chunk {}: {} lightmap charts", chunk, charts.len());
        }

        self.scene.reset_lightmaps();
        for lightmap_index in 0..num_lightmap_charts {
            let path = self.lightmap_path(lightmap_index);
            self.scene
                .add_lightmap(resource_name(&path, &self.resource_dirs));
        }
        self.num_lightmap_charts = num_lightmap_charts;
        self.light_probe_group_files = light_probe_group_files;
        info!("Allocated {} lightmap charts", num_lightmap_charts);

        self.generate_baking_chunks();
        self.phase = BakingPhase::ScenesProcessed;
        Ok(())
    }

    /// Builds the vicinity of every chunk and hands it to the cache.
    fn generate_baking_chunks(&self) {
        for &chunk in &self.chunks {
            let vicinity = create_baked_chunk_vicinity(
                &*self.collector,
                chunk,
                &self.settings,
                &*self.raytracer,
            );
            self.cache.store_chunk_vicinity(chunk, vicinity);
        }
        info!("Built {} chunk vicinities", self.chunks.len());
    }

    /// Bakes direct light, then indirect light, for every chunk.
    pub fn bake(&mut self, cancellation: &CancellationToken) -> Result<BakeOutcome, LightBakingError> {
        self.expect_phase("bake", BakingPhase::ScenesProcessed)?;
        if self.bake_direct_charts(cancellation)? == BakeOutcome::Cancelled {
            return Ok(BakeOutcome::Cancelled);
        }
        self.bake_indirect_and_filter(cancellation)
    }

    /// Bakes emission and the light of every light source into every
    /// lightmap and stores the results in the cache.
    ///
    /// Cancellation is checked before each lightmap. A lightmap being baked
    /// when cancellation is observed is never stored.
    pub fn bake_direct_charts(
        &mut self,
        cancellation: &CancellationToken,
    ) -> Result<BakeOutcome, LightBakingError> {
        self.expect_phase("bake_direct_charts", BakingPhase::ScenesProcessed)?;

        let lightmap_size = self.settings.charting.lightmap_size;
        let shadow_distance = self.settings.incremental.directional_light_shadow_distance;
        let pool = LightBakingTaskPool::new(
            self.settings.direct_chart_tracing.num_tasks,
            "Direct Light Baking",
        );
        for &chunk in &self.chunks {
            let vicinity = self.load_chunk_vicinity(chunk)?;
            for (&lightmap_index, geometry_buffer) in
                vicinity.lightmaps.iter().zip(&vicinity.geometry_buffers)
            {
                if cancellation.is_cancelled() {
                    info!("Direct light baking cancelled");
                    return Ok(BakeOutcome::Cancelled);
                }

                let mut direct = LightmapChartBakedDirect::new(lightmap_size);
                bake_emission_light(&mut direct, geometry_buffer, &self.settings.emission_tracing);
                for light in &vicinity.baked_lights {
                    bake_direct_light_for_charts(
                        &mut direct,
                        geometry_buffer,
                        &*vicinity.raytracer_scene,
                        light,
                        &self.settings.direct_chart_tracing,
                        shadow_distance,
                        &pool,
                    );
                }
                self.cache.store_direct_light(lightmap_index, direct);
            }
            debug!(
                "Chunk {}: baked direct light for {} lightmaps",
                chunk,
                vicinity.lightmaps.len()
            );
        }

        info!("Baked direct light for {} lightmaps", self.num_lightmap_charts);
        self.phase = BakingPhase::DirectBaked;
        Ok(BakeOutcome::Completed)
    }

    /// Bakes indirect light into light probes and lightmaps, filters both
    /// passes, stores the combined lightmaps and saves the light probes.
    ///
    /// Cancellation is checked before each lightmap. Light probes of a chunk
    /// are only saved once all of its lightmaps are done.
    pub fn bake_indirect_and_filter(
        &mut self,
        cancellation: &CancellationToken,
    ) -> Result<BakeOutcome, LightBakingError> {
        self.expect_phase("bake_indirect_and_filter", BakingPhase::DirectBaked)?;

        let settings = &self.settings;
        let lightmap_size = settings.charting.lightmap_size;
        let shadow_distance = settings.incremental.directional_light_shadow_distance;
        let mut direct_scratch = Vec::with_capacity(settings.lightmap_texel_count());
        let mut indirect_scratch = Vec::with_capacity(settings.lightmap_texel_count());
        let direct_chart_pool = LightBakingTaskPool::new(
            settings.direct_chart_tracing.num_tasks,
            "Direct Light Filtering",
        );
        let indirect_chart_pool = LightBakingTaskPool::new(
            settings.indirect_chart_tracing.num_tasks,
            "Indirect Light Baking",
        );
        let direct_probes_pool = LightBakingTaskPool::new(
            settings.direct_probes_tracing.num_tasks,
            "Direct Light Probe Baking",
        );
        let indirect_probes_pool = LightBakingTaskPool::new(
            settings.indirect_probes_tracing.num_tasks,
            "Indirect Light Probe Baking",
        );

        for &chunk in &self.chunks {
            let vicinity = self.load_chunk_vicinity(chunk)?;
            let direct_light = self.load_referenced_direct_light(&vicinity)?;
            let raytracer_scene = &*vicinity.raytracer_scene;
            let collection = &vicinity.light_probes_collection;

            let mut light_probes = LightProbeCollectionBakedData::default();
            light_probes.reset(collection.len());
            bake_indirect_light_for_light_probes(
                &mut light_probes,
                collection,
                &IndirectLightSources {
                    raytracer_scene,
                    direct_light: &direct_light,
                    light_probes: None,
                },
                &settings.indirect_probes_tracing,
                &indirect_probes_pool,
            );

            let mesh = TetrahedralMesh::new(&collection.world_positions);
            let sources = IndirectLightSources {
                raytracer_scene,
                direct_light: &direct_light,
                light_probes: Some((&mesh, light_probes.light_probes.as_slice())),
            };
            for (&lightmap_index, geometry_buffer) in
                vicinity.lightmaps.iter().zip(&vicinity.geometry_buffers)
            {
                if cancellation.is_cancelled() {
                    info!("Indirect light baking cancelled");
                    return Ok(BakeOutcome::Cancelled);
                }

                let mut indirect = LightmapChartBakedIndirect::new(lightmap_size);
                bake_indirect_light_for_charts(
                    &mut indirect,
                    geometry_buffer,
                    &sources,
                    &settings.indirect_chart_tracing,
                    &indirect_chart_pool,
                );
                indirect.normalize_light();

                // The cached direct light is shared with other chunks, so
                // filter a copy.
                let mut direct = LightmapChartBakedDirect::clone(
                    direct_light
                        .get(&lightmap_index)
                        .ok_or(LightBakingError::MissingDirectLight(lightmap_index))?,
                );
                if settings.direct_filter.kernel_radius > 0 {
                    filter_direct_light(
                        &mut direct,
                        &mut direct_scratch,
                        geometry_buffer,
                        &settings.direct_filter,
                        &direct_chart_pool,
                    );
                }
                if settings.indirect_filter.kernel_radius > 0 {
                    filter_indirect_light(
                        &mut indirect,
                        &mut indirect_scratch,
                        geometry_buffer,
                        &settings.indirect_filter,
                        &indirect_chart_pool,
                    );
                }

                self.cache.store_lightmap(
                    lightmap_index,
                    BakedLightmap::from_direct_and_indirect(&direct, &indirect),
                );
            }

            for light in &vicinity.baked_lights {
                bake_direct_light_for_light_probes(
                    &mut light_probes,
                    collection,
                    raytracer_scene,
                    light,
                    &settings.direct_probes_tracing,
                    shadow_distance,
                    &direct_probes_pool,
                );
            }
            self.save_light_probes(chunk, &vicinity, &light_probes);

            debug!(
                "Chunk {}: baked indirect light for {} lightmaps and {} light probes",
                chunk,
                vicinity.lightmaps.len(),
                vicinity.num_unique_light_probes
            );
        }

        info!("Baked indirect light for {} lightmaps", self.num_lightmap_charts);
        self.phase = BakingPhase::IndirectBakedAndFiltered;
        Ok(BakeOutcome::Completed)
    }

    /// Stitches seams, saves every lightmap image and the GI data file, and
    /// releases the scene.
    ///
    /// A lightmap that fails to save is logged and skipped; once everything
    /// else is written, the failures are reported as
    /// [LightBakingError::SaveLightmaps].
    pub fn commit_scene(&mut self) -> Result<(), LightBakingError> {
        self.expect_phase("commit_scene", BakingPhase::IndirectBakedAndFiltered)?;

        let lightmap_size = self.settings.charting.lightmap_size;
        let stitching = &self.settings.stitching;
        let mut context = LightmapStitchingContext::new(lightmap_size);
        let mut lightmap_buffer = Vec::with_capacity(self.settings.lightmap_texel_count());
        let mut image = RgbaImage::new(lightmap_size, lightmap_size);
        let mut failed = vec![];

        for &chunk in &self.chunks {
            let vicinity = self.load_chunk_vicinity(chunk)?;
            for (&lightmap_index, geometry_buffer) in
                vicinity.lightmaps.iter().zip(&vicinity.geometry_buffers)
            {
                let lightmap = self
                    .cache
                    .load_lightmap(lightmap_index)
                    .ok_or(LightBakingError::MissingLightmap(lightmap_index))?;
                if stitching.num_iterations > 0 && !geometry_buffer.seams.is_empty() {
                    stitch_lightmap_seams(
                        &mut context,
                        &lightmap.lightmap,
                        &mut lightmap_buffer,
                        &geometry_buffer.seams,
                        stitching,
                    );
                } else {
                    copy_lightmap(&lightmap.lightmap, &mut lightmap_buffer);
                }
                write_lightmap_image(&lightmap_buffer, &mut image);

                let path = self.lightmap_path(lightmap_index);
                match save_lightmap_image(&image, &path) {
                    Ok(()) => debug!("Saved lightmap {:?}", path),
                    Err(err) => {
                        error!("Cannot save lightmap {:?}: {}", path, err);
                        failed.push(path);
                    }
                }
            }
        }

        GiData::from_scene(&*self.scene)
            .save(&self.gi_data_path)
            .map_err(|source| LightBakingError::WriteGiData {
                path: self.gi_data_path.clone(),
                source,
            })?;
        self.collector.unlock_scene();
        self.phase = BakingPhase::Committed;
        info!(
            "Committed {} lightmaps to {:?}",
            (self.num_lightmap_charts as usize).saturating_sub(failed.len()),
            self.output_directory
        );

        if failed.is_empty() {
            Ok(())
        } else {
            Err(LightBakingError::SaveLightmaps { failed })
        }
    }

    fn load_chunk_vicinity(&self, chunk: IVec3) -> Result<Arc<BakedChunkVicinity>, LightBakingError> {
        self.cache
            .load_chunk_vicinity(chunk)
            .ok_or(LightBakingError::MissingChunkVicinity(chunk))
    }

    /// Loads the direct light of the chunk's own lightmaps and of every
    /// lightmap that ray traced geometry in its vicinity refers to.
    fn load_referenced_direct_light(
        &self,
        vicinity: &BakedChunkVicinity,
    ) -> Result<HashMap<u32, Arc<LightmapChartBakedDirect>>, LightBakingError> {
        let mut lightmap_indices = vicinity
            .raytracer_scene
            .geometries()
            .iter()
            .filter_map(|geometry| geometry.lightmap_index)
            .chain(vicinity.lightmaps.iter().copied())
            .collect::<Vec<_>>();
        lightmap_indices.sort_unstable();
        lightmap_indices.dedup();

        lightmap_indices
            .into_iter()
            .map(|lightmap_index| {
                let direct = self
                    .cache
                    .load_direct_light(lightmap_index)
                    .ok_or(LightBakingError::MissingDirectLight(lightmap_index))?;
                Ok((lightmap_index, direct))
            })
            .collect()
    }

    fn save_light_probes(
        &self,
        chunk: IVec3,
        vicinity: &BakedChunkVicinity,
        light_probes: &LightProbeCollectionBakedData,
    ) {
        let Some(files) = self.light_probe_group_files.get(&chunk) else {
            return;
        };
        let collection = &vicinity.light_probes_collection;
        for (group_id, path) in files {
            let Some(group) = collection
                .group_ids
                .iter()
                .position(|collected_id| collected_id == group_id)
            else {
                continue;
            };
            if let Err(err) =
                save_light_probe_group_baked_data(collection, light_probes, group, path)
            {
                error!(
                    "Cannot save light probes for group '{}' in chunk {}: {}",
                    collection.names[group], chunk, err
                );
            }
        }
    }
}

fn absolute_path(path: &Path) -> Result<PathBuf, IoError> {
    if path.is_absolute() {
        Ok(path.to_owned())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

/// Returns `path` relative to the first resource directory that contains
/// it, or `path` itself with a warning if none does.
fn resource_name(path: &Path, resource_dirs: &[PathBuf]) -> PathBuf {
    for resource_dir in resource_dirs {
        if let Some(relative) = pathdiff::diff_paths(path, resource_dir) {
            if relative.is_relative()
                && !relative
                    .components()
                    .any(|component| component == Component::ParentDir)
            {
                return relative;
            }
        }
    }
    warn!(
        "{:?} isn't inside any resource directory; referring to it by absolute path",
        path
    );
    path.to_owned()
}
