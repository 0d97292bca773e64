// bevy-incremental-gi/Crates/bevy-incremental-gi/examples/cornell-box.rs

//! Bakes a Cornell box into lightmaps and a grid of light probes.
//!
//! Usage: `cargo run --release --example cornell-box -- [OUTPUT-DIR]`

use bevy::math::{vec3, Vec3};
use bevy_incremental_gi::scene::{LightKind, LightProbeGroup, SceneGeometry, SceneLight};
use bevy_incremental_gi::{
    BakeOutcome, BakedLightMemoryCache, CancellationToken, IncrementalLightBaker,
    LightBakingSettings, Scene, StandardSceneCollector,
};
use std::env;
use std::path::PathBuf;
use std::process;

const BOX_SIZE: f32 = 5.0;

fn main() {
    let output_directory = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("cornell-box"));

    let mut settings = LightBakingSettings::default();
    settings.incremental.output_directory = Some(output_directory);
    settings.incremental.chunk_size = Vec3::splat(BOX_SIZE * 2.0);
    settings.charting.lightmap_size = 128;
    settings.charting.texel_density = 12.0;
    settings.indirect_chart_tracing.num_tasks = 8;
    settings.indirect_probes_tracing.num_tasks = 8;

    let mut scene = cornell_box();
    let cache = BakedLightMemoryCache::new();
    let mut collector = StandardSceneCollector::new();
    let mut baker = IncrementalLightBaker::new(settings, &mut scene, &mut collector, &cache);

    let result = baker.initialize().and_then(|()| baker.process_scene());
    if let Err(err) = result {
        die(format!("Failed to prepare the scene: {}", err));
    }
    match baker.bake(&CancellationToken::new()) {
        Ok(BakeOutcome::Completed) => {}
        Ok(BakeOutcome::Cancelled) => die("Baking was cancelled"),
        Err(err) => die(format!("Failed to bake: {}", err)),
    }
    if let Err(err) = baker.commit_scene() {
        die(format!("Failed to save the baked light: {}", err));
    }

    println!(
        "Baked {} lightmaps into {:?}",
        baker.num_lightmap_charts(),
        baker.output_directory()
    );
}

fn cornell_box() -> Scene {
    let white = Vec3::splat(0.73);
    let s = BOX_SIZE;

    let mut lamp = SceneGeometry::quad(
        "lamp",
        vec3(s * 0.4, s - 0.01, s * 0.4),
        Vec3::X * s * 0.2,
        Vec3::Z * s * 0.2,
    )
    .with_emission(Vec3::splat(15.0));
    lamp.bake_lightmap = false;
    lamp.cast_shadows = false;

    let probe_positions = (1..4)
        .flat_map(|x| {
            (1..4).flat_map(move |y| {
                (1..4).map(move |z| vec3(x as f32, y as f32, z as f32) * s / 4.0)
            })
        })
        .collect();

    Scene {
        geometries: vec![
            SceneGeometry::quad("floor", Vec3::ZERO, Vec3::Z * s, Vec3::X * s).with_albedo(white),
            SceneGeometry::quad("ceiling", Vec3::Y * s, Vec3::X * s, Vec3::Z * s)
                .with_albedo(white),
            SceneGeometry::quad("back", Vec3::ZERO, Vec3::X * s, Vec3::Y * s).with_albedo(white),
            SceneGeometry::quad("left", Vec3::ZERO, Vec3::Y * s, Vec3::Z * s)
                .with_albedo(vec3(0.65, 0.05, 0.05)),
            SceneGeometry::quad("right", Vec3::X * s, Vec3::Z * s, Vec3::Y * s)
                .with_albedo(vec3(0.12, 0.45, 0.15)),
            lamp,
        ],
        lights: vec![SceneLight::new(
            LightKind::Point {
                position: vec3(s * 0.5, s * 0.9, s * 0.5),
                radius: s * 2.0,
            },
            Vec3::ONE,
            8.0,
        )],
        light_probe_groups: vec![LightProbeGroup {
            name: "interior".to_owned(),
            probe_positions,
            baked_data_file: None,
        }],
        ..Scene::default()
    }
}

fn die(message: impl AsRef<str>) -> ! {
    eprintln!("Error: {}", message.as_ref());
    process::exit(1)
}
