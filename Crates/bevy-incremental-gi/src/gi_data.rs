// bevy-incremental-gi/Crates/bevy-incremental-gi/src/gi_data.rs

//! The global illumination metadata file that a baked scene refers to.

use crate::scene::Scene;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use std::fs::File;
use std::io::{BufReader, BufWriter, Error as IoError, Write};
use std::path::{Path, PathBuf};
use thiserror::Error as Thiserror;

/// Lists every file produced by a bake.
#[derive(Clone, Default, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GiData {
    /// Lightmap textures, indexed by lightmap index.
    pub lightmaps: Vec<PathBuf>,
    pub light_probe_groups: Vec<GiDataLightProbeGroup>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GiDataLightProbeGroup {
    pub name: String,
    pub baked_data_file: Option<PathBuf>,
}

#[derive(Thiserror, Debug)]
pub enum GiDataError {
    #[error("Failed to access the GI data file")]
    Io(#[from] IoError),
    #[error("The GI data file isn't valid JSON")]
    Json(#[from] SerdeJsonError),
}

impl GiData {
    /// Collects the lightmaps and light probe data files of a scene.
    pub fn from_scene(scene: &Scene) -> GiData {
        GiData {
            lightmaps: scene.lightmaps.clone(),
            light_probe_groups: scene
                .light_probe_groups
                .iter()
                .map(|group| GiDataLightProbeGroup {
                    name: group.name.clone(),
                    baked_data_file: group.baked_data_file.clone(),
                })
                .collect(),
        }
    }

    /// Writes this data as pretty-printed JSON, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), GiDataError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<GiData, GiDataError> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }
}
