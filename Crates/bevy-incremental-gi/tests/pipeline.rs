// bevy-incremental-gi/Crates/bevy-incremental-gi/tests/pipeline.rs

use bevy::math::{vec2, vec3, IVec3, Vec3, Vec4};
use bevy_incremental_gi::baker::BakingPhase;
use bevy_incremental_gi::gi_data::GiData;
use bevy_incremental_gi::light_probes::{
    load_light_probe_group_baked_data, SphericalHarmonicsL1,
};
use bevy_incremental_gi::lightmaps::{BakedLightmap, LightmapChartBakedDirect};
use bevy_incremental_gi::math::Ray;
use bevy_incremental_gi::raytracer::{RayHit, RaytracerBackend, RaytracerGeometry, RaytracerScene};
use bevy_incremental_gi::scene::{LightKind, LightProbeGroup, SceneGeometry, SceneLight};
use bevy_incremental_gi::vicinity::BakedChunkVicinity;
use bevy_incremental_gi::{
    BakeOutcome, BakedLightCache, BakedLightMemoryCache, CancellationToken, GraphicsCapabilities,
    IncrementalLightBaker, LightBakingError, LightBakingSettings, Scene, StandardSceneCollector,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Texels covered by a 1×1 quad charted into a 4×4 lightmap with one texel
/// of padding.
const COVERED_TEXELS: [usize; 4] = [5, 6, 9, 10];

fn settings(output_directory: &Path) -> LightBakingSettings {
    let mut settings = LightBakingSettings::default();
    settings.incremental.output_directory = Some(output_directory.to_owned());
    settings.incremental.chunk_size = Vec3::splat(10.0);
    settings.charting.lightmap_size = 4;
    settings.indirect_chart_tracing.max_samples = 8;
    settings.indirect_probes_tracing.max_samples = 16;
    settings
}

/// A lightmapped 1×1 floor tile facing up, with its corner at `(x, 0, 0)`.
fn tile(name: &str, x: f32) -> SceneGeometry {
    SceneGeometry::quad(name, vec3(x, 0.0, 0.0), Vec3::Z, Vec3::X)
}

/// An emissive 10×10 floor without a lightmap.
fn emissive_floor(name: &str, x: f32) -> SceneGeometry {
    let mut floor =
        SceneGeometry::quad(name, vec3(x, 0.0, 0.0), Vec3::Z * 10.0, Vec3::X * 10.0)
            .with_emission(Vec3::ONE);
    floor.bake_lightmap = false;
    floor
}

fn sun(intensity: f32) -> SceneLight {
    SceneLight::new(
        LightKind::Directional {
            direction: vec3(-0.3, -1.0, -0.2),
        },
        Vec3::ONE,
        intensity,
    )
}

fn probe_group(name: &str, position: Vec3) -> LightProbeGroup {
    LightProbeGroup {
        name: name.to_owned(),
        probe_positions: vec![position],
        baked_data_file: None,
    }
}

/// Runs every phase to completion.
fn bake_scene(scene: &mut Scene, settings: LightBakingSettings, cache: &dyn BakedLightCache) {
    let mut collector = StandardSceneCollector::new();
    let mut baker = IncrementalLightBaker::new(settings, scene, &mut collector, cache);
    baker.initialize().unwrap();
    baker.process_scene().unwrap();
    assert_eq!(
        baker.bake(&CancellationToken::new()).unwrap(),
        BakeOutcome::Completed
    );
    baker.commit_scene().unwrap();
    assert_eq!(baker.phase(), BakingPhase::Committed);
}

fn load_light_probes(scene: &Scene, group: usize) -> Vec<SphericalHarmonicsL1> {
    let path = scene.light_probe_groups[group]
        .baked_data_file
        .as_ref()
        .unwrap();
    load_light_probe_group_baked_data(path).unwrap().light_probes
}

#[test]
fn emissive_quad_bakes_into_one_lightmap_image() {
    let directory = tempfile::tempdir().unwrap();
    let output_directory = directory.path().join("out");
    let mut settings = settings(&output_directory);
    settings.direct_filter.kernel_radius = 0;
    settings.indirect_filter.kernel_radius = 0;

    let mut scene = Scene {
        geometries: vec![tile("glow", 0.0).with_emission(Vec3::ONE)],
        ..Scene::default()
    };
    let cache = BakedLightMemoryCache::new();
    bake_scene(&mut scene, settings, &cache);

    let direct = cache.load_direct_light(0).unwrap();
    let lightmap = cache.load_lightmap(0).unwrap();
    for texel_index in 0..16 {
        if COVERED_TEXELS.contains(&texel_index) {
            assert_eq!(direct.direct_light[texel_index], Vec3::ONE);
            // Nothing bounces the emission back.
            assert_eq!(lightmap.lightmap[texel_index], Vec4::ONE);
        } else {
            assert_eq!(direct.direct_light[texel_index], Vec3::ZERO);
            assert_eq!(lightmap.lightmap[texel_index], Vec4::new(0.0, 0.0, 0.0, 1.0));
        }
    }

    let images = fs::read_dir(output_directory.join("Textures"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect::<Vec<_>>();
    let image_path = output_directory.join("Textures/Lightmap-0.png");
    assert_eq!(images, vec![image_path.clone()]);
    let image = image::open(&image_path).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (4, 4));
    assert!((127..=128).contains(&image.get_pixel(1, 1)[0]));
    assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 255]);

    assert_eq!(scene.lightmaps, vec![image_path.clone()]);
    let gi_data = GiData::load(&output_directory.join("GlobalIllumination.json")).unwrap();
    assert_eq!(gi_data.lightmaps, vec![image_path]);
}

#[test]
fn light_probes_accumulate_direct_and_indirect_light() {
    let bake_probes = |lights: Vec<SceneLight>| {
        let directory = tempfile::tempdir().unwrap();
        let mut scene = Scene {
            geometries: vec![emissive_floor("west", 0.0), emissive_floor("east", 10.0)],
            lights,
            light_probe_groups: vec![
                probe_group("west", vec3(5.0, 1.0, 5.0)),
                probe_group("east", vec3(15.0, 1.0, 5.0)),
            ],
            ..Scene::default()
        };
        let cache = BakedLightMemoryCache::new();
        bake_scene(&mut scene, settings(directory.path()), &cache);
        (0..2)
            .map(|group| load_light_probes(&scene, group))
            .collect::<Vec<_>>()
    };

    let overhead_sun = SceneLight::new(
        LightKind::Directional { direction: -Vec3::Y },
        Vec3::ONE,
        2.0,
    );
    let indirect_only = bake_probes(vec![]);
    let combined = bake_probes(vec![overhead_sun]);

    let mut direct_only = SphericalHarmonicsL1::ZERO;
    direct_only.add_directional_light(Vec3::Y, Vec3::splat(2.0));

    for group in 0..2 {
        assert_eq!(indirect_only[group].len(), 1);
        assert_eq!(combined[group].len(), 1);
        let (indirect, baked) = (indirect_only[group][0], combined[group][0]);
        assert!(indirect.coefficients[0].x > 0.0);
        for (index, value) in baked.coefficients.iter().enumerate() {
            let expected = indirect.coefficients[index] + direct_only.coefficients[index];
            assert!(value.abs_diff_eq(expected, 1.0e-4));
        }
    }
}

/// Cancels a token once a given number of direct light buffers are stored.
struct CancellingCache {
    inner: BakedLightMemoryCache,
    cancellation: CancellationToken,
    remaining_stores: AtomicUsize,
}

impl BakedLightCache for CancellingCache {
    fn store_chunk_vicinity(&self, chunk: IVec3, vicinity: BakedChunkVicinity) {
        self.inner.store_chunk_vicinity(chunk, vicinity)
    }

    fn load_chunk_vicinity(&self, chunk: IVec3) -> Option<Arc<BakedChunkVicinity>> {
        self.inner.load_chunk_vicinity(chunk)
    }

    fn store_direct_light(&self, lightmap_index: u32, direct: LightmapChartBakedDirect) {
        self.inner.store_direct_light(lightmap_index, direct);
        if self.remaining_stores.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.cancellation.cancel();
        }
    }

    fn load_direct_light(&self, lightmap_index: u32) -> Option<Arc<LightmapChartBakedDirect>> {
        self.inner.load_direct_light(lightmap_index)
    }

    fn store_lightmap(&self, lightmap_index: u32, lightmap: BakedLightmap) {
        self.inner.store_lightmap(lightmap_index, lightmap)
    }

    fn load_lightmap(&self, lightmap_index: u32) -> Option<Arc<BakedLightmap>> {
        self.inner.load_lightmap(lightmap_index)
    }
}

#[test]
fn cancellation_keeps_only_complete_direct_light() {
    let directory = tempfile::tempdir().unwrap();
    let mut scene = Scene {
        geometries: vec![tile("a", 0.0), tile("b", 10.0), tile("c", 20.0)],
        lights: vec![sun(1.0)],
        ..Scene::default()
    };
    let cancellation = CancellationToken::new();
    let cache = CancellingCache {
        inner: BakedLightMemoryCache::new(),
        cancellation: cancellation.clone(),
        remaining_stores: AtomicUsize::new(2),
    };
    let mut collector = StandardSceneCollector::new();
    let mut baker =
        IncrementalLightBaker::new(settings(directory.path()), &mut scene, &mut collector, &cache);
    baker.initialize().unwrap();
    baker.process_scene().unwrap();
    assert_eq!(baker.num_lightmap_charts(), 3);

    assert_eq!(baker.bake(&cancellation).unwrap(), BakeOutcome::Cancelled);
    assert_eq!(baker.phase(), BakingPhase::ScenesProcessed);
    assert_eq!(cache.inner.num_direct_light(), 2);
    assert_eq!(cache.inner.num_lightmaps(), 0);
    for lightmap_index in 0..3 {
        if let Some(direct) = cache.inner.load_direct_light(lightmap_index) {
            assert_eq!(direct.direct_light.len(), 16);
            assert!(COVERED_TEXELS
                .iter()
                .all(|&texel_index| direct.direct_light[texel_index].x > 0.0));
        }
    }

    assert!(matches!(
        baker.commit_scene(),
        Err(LightBakingError::PhaseOrder {
            actual: BakingPhase::ScenesProcessed,
            ..
        })
    ));
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum CacheLoad {
    ChunkVicinity(IVec3),
    DirectLight(u32),
}

/// Records every load of a chunk vicinity or of direct light, in order.
#[derive(Default)]
struct RecordingCache {
    inner: BakedLightMemoryCache,
    loads: Mutex<Vec<CacheLoad>>,
}

impl RecordingCache {
    /// Lightmap indices whose direct light was loaded while `chunk` was
    /// being baked.
    fn direct_light_loaded_for(&self, chunk: IVec3) -> Vec<u32> {
        let loads = self.loads.lock().unwrap();
        let mut indices = loads
            .iter()
            .skip_while(|&&load| load != CacheLoad::ChunkVicinity(chunk))
            .skip(1)
            .map_while(|&load| match load {
                CacheLoad::DirectLight(lightmap_index) => Some(lightmap_index),
                CacheLoad::ChunkVicinity(_) => None,
            })
            .collect::<Vec<_>>();
        indices.sort_unstable();
        indices
    }
}

impl BakedLightCache for RecordingCache {
    fn store_chunk_vicinity(&self, chunk: IVec3, vicinity: BakedChunkVicinity) {
        self.inner.store_chunk_vicinity(chunk, vicinity)
    }

    fn load_chunk_vicinity(&self, chunk: IVec3) -> Option<Arc<BakedChunkVicinity>> {
        self.loads.lock().unwrap().push(CacheLoad::ChunkVicinity(chunk));
        self.inner.load_chunk_vicinity(chunk)
    }

    fn store_direct_light(&self, lightmap_index: u32, direct: LightmapChartBakedDirect) {
        self.inner.store_direct_light(lightmap_index, direct)
    }

    fn load_direct_light(&self, lightmap_index: u32) -> Option<Arc<LightmapChartBakedDirect>> {
        self.loads.lock().unwrap().push(CacheLoad::DirectLight(lightmap_index));
        self.inner.load_direct_light(lightmap_index)
    }

    fn store_lightmap(&self, lightmap_index: u32, lightmap: BakedLightmap) {
        self.inner.store_lightmap(lightmap_index, lightmap)
    }

    fn load_lightmap(&self, lightmap_index: u32) -> Option<Arc<BakedLightmap>> {
        self.inner.load_lightmap(lightmap_index)
    }
}

#[test]
fn indirect_light_reads_direct_light_baked_by_a_neighboring_chunk() {
    let directory = tempfile::tempdir().unwrap();
    let mut settings = settings(directory.path());
    settings.indirect_chart_tracing.max_samples = 64;
    settings.direct_filter.kernel_radius = 0;
    settings.indirect_filter.kernel_radius = 0;

    // The floor ends at the chunk border; the glowing wall just past it
    // faces back toward the floor.
    let wall = SceneGeometry::quad("wall", vec3(10.2, 0.0, 0.0), Vec3::Z, Vec3::Y)
        .with_emission(Vec3::ONE);
    let mut scene = Scene {
        geometries: vec![tile("floor", 9.0), wall],
        ..Scene::default()
    };
    let cache = RecordingCache::default();
    let mut collector = StandardSceneCollector::new();
    let mut baker = IncrementalLightBaker::new(settings, &mut scene, &mut collector, &cache);
    baker.initialize().unwrap();
    baker.process_scene().unwrap();
    assert_eq!(baker.chunks(), &[IVec3::ZERO, IVec3::X]);
    assert_eq!(
        baker.bake_direct_charts(&CancellationToken::new()).unwrap(),
        BakeOutcome::Completed
    );
    cache.loads.lock().unwrap().clear();
    assert_eq!(
        baker.bake_indirect_and_filter(&CancellationToken::new()).unwrap(),
        BakeOutcome::Completed
    );
    baker.commit_scene().unwrap();

    let floor_lightmap = scene.geometries[0].lightmap.unwrap().index;
    let wall_lightmap = scene.geometries[1].lightmap.unwrap().index;
    assert_ne!(floor_lightmap, wall_lightmap);

    let loaded = cache.direct_light_loaded_for(IVec3::ZERO);
    assert!(loaded.contains(&floor_lightmap));
    assert!(loaded.contains(&wall_lightmap));

    // The floor has neither lights nor emission of its own, so everything in
    // its lightmap bounced off the wall.
    let lightmap = cache.inner.load_lightmap(floor_lightmap).unwrap();
    let brightest = COVERED_TEXELS
        .iter()
        .map(|&texel_index| lightmap.lightmap[texel_index].x)
        .fold(0.0, f32::max);
    assert!(brightest > 0.0);
    assert_eq!(lightmap.lightmap[0], Vec4::new(0.0, 0.0, 0.0, 1.0));
}

#[test]
fn phases_must_run_in_order() {
    let directory = tempfile::tempdir().unwrap();
    let mut scene = Scene::default();
    let mut collector = StandardSceneCollector::new();
    let cache = BakedLightMemoryCache::new();
    let mut baker =
        IncrementalLightBaker::new(settings(directory.path()), &mut scene, &mut collector, &cache);

    assert!(matches!(
        baker.bake(&CancellationToken::new()),
        Err(LightBakingError::PhaseOrder {
            operation: "bake",
            expected: BakingPhase::ScenesProcessed,
            actual: BakingPhase::Uninitialized,
        })
    ));
    baker.initialize().unwrap();
    assert!(matches!(
        baker.initialize(),
        Err(LightBakingError::PhaseOrder { .. })
    ));
    assert!(matches!(
        baker.commit_scene(),
        Err(LightBakingError::PhaseOrder {
            actual: BakingPhase::Initialized,
            ..
        })
    ));
}

#[test]
fn initialize_reports_configuration_errors() {
    let directory = tempfile::tempdir().unwrap();
    let cache = BakedLightMemoryCache::new();
    let initialize = |file_path: Option<PathBuf>, capabilities: GraphicsCapabilities| {
        let mut scene = Scene {
            file_path,
            ..Scene::default()
        };
        let mut collector = StandardSceneCollector::new();
        let mut settings = settings(directory.path());
        settings.incremental.output_directory = None;
        let mut baker = IncrementalLightBaker::new(settings, &mut scene, &mut collector, &cache)
            .with_graphics_capabilities(capabilities);
        let result = baker.initialize();
        let output_directory = baker.output_directory().to_owned();
        let phase = baker.phase();
        (result, output_directory, phase)
    };

    let (result, _, phase) = initialize(None, GraphicsCapabilities::default());
    assert!(matches!(result, Err(LightBakingError::UndefinedSceneFileName)));
    assert_eq!(phase, BakingPhase::Uninitialized);

    let (result, _, _) = initialize(
        Some(directory.path().join("level")),
        GraphicsCapabilities::default(),
    );
    assert!(matches!(
        result,
        Err(LightBakingError::SceneFileNameWithoutExtension(_))
    ));

    let (result, _, _) = initialize(
        Some(directory.path().join("level.ron")),
        GraphicsCapabilities {
            pixel_uv_offset: vec2(0.5, 0.5),
        },
    );
    assert!(matches!(result, Err(LightBakingError::UnsupportedBackend(_))));

    {
        let mut scene = Scene {
            geometries: vec![tile("floor", 0.0)],
            ..Scene::default()
        };
        let mut collector = StandardSceneCollector::new();
        let mut settings = settings(&directory.path().join("empty"));
        settings.charting.lightmap_size = 0;
        let mut baker = IncrementalLightBaker::new(settings, &mut scene, &mut collector, &cache);
        assert!(matches!(
            baker.initialize(),
            Err(LightBakingError::InvalidLightmapSize)
        ));
        assert_eq!(baker.phase(), BakingPhase::Uninitialized);
    }

    let (result, output_directory, phase) = initialize(
        Some(directory.path().join("level.ron")),
        GraphicsCapabilities::default(),
    );
    result.unwrap();
    assert_eq!(phase, BakingPhase::Initialized);
    assert_eq!(output_directory, directory.path().join("level"));
    assert!(output_directory.join("GlobalIllumination.json").is_file());
}

#[test]
fn chart_indices_are_contiguous_across_chunks() {
    let directory = tempfile::tempdir().unwrap();
    let mut unlit = tile("unlit", 5.0);
    unlit.bake_lightmap = false;
    let mut scene = Scene {
        geometries: vec![tile("a", 20.0), unlit, tile("b", 0.0), tile("c", 10.0)],
        ..Scene::default()
    };
    let mut collector = StandardSceneCollector::new();
    let cache = BakedLightMemoryCache::new();
    let mut baker =
        IncrementalLightBaker::new(settings(directory.path()), &mut scene, &mut collector, &cache);
    baker.initialize().unwrap();
    assert_eq!(baker.chunks().len(), 3);
    baker.process_scene().unwrap();
    assert_eq!(baker.num_lightmap_charts(), 3);
    assert_eq!(cache.num_chunk_vicinities(), 3);
    drop(baker);

    let mut indices = scene
        .geometries
        .iter()
        .filter_map(|geometry| geometry.lightmap.map(|lightmap| lightmap.index))
        .collect::<Vec<_>>();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(scene.geometries[1].lightmap.is_none());
    assert_eq!(scene.lightmaps.len(), 3);
}

#[test]
fn output_files_are_named_relative_to_resource_directories() {
    let directory = tempfile::tempdir().unwrap();
    let mut settings = settings(&directory.path().join("Level"));
    settings.incremental.resource_dirs = vec![directory.path().to_owned()];
    let mut scene = Scene {
        geometries: vec![tile("a", 0.0)],
        light_probe_groups: vec![probe_group("probes", vec3(0.5, 1.0, 0.5))],
        ..Scene::default()
    };
    let cache = BakedLightMemoryCache::new();
    bake_scene(&mut scene, settings, &cache);

    assert_eq!(
        scene.lightmaps,
        vec![PathBuf::from("Level/Textures/Lightmap-0.png")]
    );
    assert_eq!(
        scene.gi_data_file,
        Some(PathBuf::from("Level/GlobalIllumination.json"))
    );
    assert_eq!(
        scene.light_probe_groups[0].baked_data_file,
        Some(PathBuf::from("Level/Binary/LightProbeGroup-0-0-0-0.bin"))
    );
    assert!(directory
        .path()
        .join("Level/Binary/LightProbeGroup-0-0-0-0.bin")
        .is_file());
}

#[test]
fn baking_is_deterministic_for_any_task_count() {
    let bake = |num_tasks: usize| {
        let directory = tempfile::tempdir().unwrap();
        let mut settings = settings(directory.path());
        settings.direct_chart_tracing.num_tasks = num_tasks;
        settings.direct_probes_tracing.num_tasks = num_tasks;
        settings.indirect_chart_tracing.num_tasks = num_tasks;
        settings.indirect_probes_tracing.num_tasks = num_tasks;

        let mut wall = SceneGeometry::quad("wall", vec3(2.0, 0.0, 0.0), Vec3::Y, Vec3::Z)
            .with_emission(Vec3::ONE);
        wall.bake_lightmap = false;
        let mut scene = Scene {
            geometries: vec![
                tile("floor", 0.0).with_albedo(Vec3::splat(0.5)),
                tile("step", 1.0),
                wall,
            ],
            lights: vec![sun(1.5)],
            light_probe_groups: vec![probe_group("probes", vec3(0.5, 0.5, 0.5))],
            ..Scene::default()
        };
        let cache = BakedLightMemoryCache::new();
        bake_scene(&mut scene, settings, &cache);

        let lightmaps = (0..2)
            .map(|lightmap_index| cache.load_lightmap(lightmap_index).unwrap())
            .collect::<Vec<_>>();
        (lightmaps, load_light_probes(&scene, 0))
    };

    let (lightmaps, light_probes) = bake(1);
    assert!(lightmaps[0].lightmap[COVERED_TEXELS[0]].x > 0.0);
    for num_tasks in [1, 3] {
        let (other_lightmaps, other_light_probes) = bake(num_tasks);
        assert_eq!(lightmaps, other_lightmaps);
        assert_eq!(light_probes, other_light_probes);
    }
}

/// A tracer that blocks every shadow ray and never hits anything.
struct OpaqueRaytracer;

struct OpaqueRaytracerScene {
    geometries: Vec<RaytracerGeometry>,
}

impl RaytracerScene for OpaqueRaytracerScene {
    fn geometries(&self) -> &[RaytracerGeometry] {
        &self.geometries
    }

    fn intersect(&self, _: &Ray, _: f32) -> Option<RayHit> {
        None
    }

    fn is_occluded(&self, _: &Ray, _: f32) -> bool {
        true
    }
}

impl RaytracerBackend for OpaqueRaytracer {
    fn create_scene(&self, geometries: Vec<RaytracerGeometry>) -> Arc<dyn RaytracerScene> {
        Arc::new(OpaqueRaytracerScene { geometries })
    }
}

#[test]
fn baking_only_sees_the_raytracer_interface() {
    let directory = tempfile::tempdir().unwrap();
    let mut scene = Scene {
        geometries: vec![tile("floor", 0.0)],
        lights: vec![sun(1.0)],
        ..Scene::default()
    };
    let mut collector = StandardSceneCollector::new();
    let cache = BakedLightMemoryCache::new();
    let mut baker =
        IncrementalLightBaker::new(settings(directory.path()), &mut scene, &mut collector, &cache)
            .with_raytracer(Box::new(OpaqueRaytracer));
    baker.initialize().unwrap();
    baker.process_scene().unwrap();
    assert_eq!(
        baker.bake(&CancellationToken::new()).unwrap(),
        BakeOutcome::Completed
    );

    let lightmap = cache.load_lightmap(0).unwrap();
    assert!(lightmap
        .lightmap
        .iter()
        .all(|texel| texel.truncate() == Vec3::ZERO && texel.w == 1.0));
}
