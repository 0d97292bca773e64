// bevy-incremental-gi/Crates/bake-incremental-gi/src/main.rs

use anyhow::{bail, Context, Result};
use bevy::math::Vec3;
use bevy_incremental_gi::{
    BakeOutcome, BakedLightMemoryCache, CancellationToken, IncrementalLightBaker,
    LightBakingSettings, Scene, StandardSceneCollector,
};
use clap::Parser;
use ron::ser::PrettyConfig;
use serde::de::DeserializeOwned;
use std::env;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;

/// Bakes lightmaps and light probes for a scene, one chunk at a time.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// The scene to bake, in RON format.
    #[arg()]
    input: PathBuf,

    /// Light baking settings in RON format. Missing fields use their defaults.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Where to put lightmaps, light probe data and the GI data file.
    /// Defaults to the scene path without its extension.
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    #[arg(long)]
    lightmap_size: Option<u32>,

    /// The edge length of a chunk, in world units.
    #[arg(long)]
    chunk_size: Option<f32>,

    /// Worker count for every tracing phase.
    #[arg(long)]
    num_tasks: Option<usize>,

    /// Where to write the baked scene.
    #[arg(long)]
    output_scene: Option<PathBuf>,
}

fn main() {
    color_backtrace::install();
    pretty_env_logger::formatted_builder()
        .parse_filters(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();

    let args = Args::parse();
    if let Err(err) = bake(&args) {
        die(format!("{:?}", err));
    }
}

fn bake(args: &Args) -> Result<()> {
    let mut scene: Scene = load_ron(&args.input).context("Failed to load the scene")?;
    scene.file_path = Some(args.input.clone());

    let mut settings = match args.settings {
        Some(ref path) => load_ron(path).context("Failed to load the light baking settings")?,
        None => LightBakingSettings::default(),
    };
    apply_overrides(&mut settings, args);

    let cache = BakedLightMemoryCache::new();
    let mut collector = StandardSceneCollector::new();
    let output_directory = {
        let mut baker = IncrementalLightBaker::new(settings, &mut scene, &mut collector, &cache);
        baker
            .initialize()
            .context("Failed to initialize light baking")?;
        baker
            .process_scene()
            .context("Failed to process the scene")?;
        info!(
            "Baking {} lightmaps in {} chunks",
            baker.num_lightmap_charts(),
            baker.chunks().len()
        );

        match baker
            .bake(&CancellationToken::new())
            .context("Failed to bake light")?
        {
            BakeOutcome::Completed => {}
            BakeOutcome::Cancelled => bail!("Light baking was cancelled"),
        }
        baker
            .commit_scene()
            .context("Failed to save the baked light")?;
        baker.output_directory().to_owned()
    };

    let output_scene = args
        .output_scene
        .clone()
        .unwrap_or_else(|| output_directory.join(baked_scene_file_name(&args.input)));
    let scene_ron = ron::ser::to_string_pretty(&scene, PrettyConfig::default())
        .context("Failed to serialize the baked scene")?;
    fs::write(&output_scene, scene_ron)
        .with_context(|| format!("Failed to write the baked scene to {:?}", output_scene))?;
    info!("Wrote the baked scene to {:?}", output_scene);
    Ok(())
}

fn apply_overrides(settings: &mut LightBakingSettings, args: &Args) {
    if let Some(ref out_dir) = args.out_dir {
        settings.incremental.output_directory = Some(out_dir.clone());
    }
    if let Some(lightmap_size) = args.lightmap_size {
        settings.charting.lightmap_size = lightmap_size;
    }
    if let Some(chunk_size) = args.chunk_size {
        settings.incremental.chunk_size = Vec3::splat(chunk_size);
    }
    if let Some(num_tasks) = args.num_tasks {
        settings.direct_chart_tracing.num_tasks = num_tasks;
        settings.direct_probes_tracing.num_tasks = num_tasks;
        settings.indirect_chart_tracing.num_tasks = num_tasks;
        settings.indirect_probes_tracing.num_tasks = num_tasks;
    }

    // Refer to baked files relative to the scene unless told otherwise.
    if settings.incremental.resource_dirs.is_empty() {
        let scene_dir = args
            .input
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        settings.incremental.resource_dirs.push(scene_dir.to_owned());
    }
}

/// `Level.scn.ron` becomes `Level.baked.scn.ron`.
fn baked_scene_file_name(input: &Path) -> String {
    let name = input
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("scene");
    format!("{}.baked.scn.ron", name)
}

fn load_ron<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    ron::de::from_reader(BufReader::new(file)).with_context(|| format!("Failed to parse {:?}", path))
}

fn die(message: impl AsRef<str>) -> ! {
    eprintln!("Error: {}", message.as_ref());
    process::exit(1)
}
