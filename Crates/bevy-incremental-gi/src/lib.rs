// bevy-incremental-gi/Crates/bevy-incremental-gi/src/lib.rs

#![doc = include_str!("../../../README.md")]
#![allow(clippy::type_complexity)]

use crate::baker::BakingPhase;
use crate::chunks::ChunkRangeError;
use crate::gi_data::GiDataError;
use bevy::math::{IVec3, Vec2, Vec3};
use std::io::Error as IoError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error as Thiserror;

pub mod baker;
pub mod baking;
pub mod cache;
pub mod charts;
pub mod chunks;
pub mod collector;
pub mod filter;
pub mod geometry_buffer;
pub mod gi_data;
pub mod light_probes;
pub mod lightmaps;
pub mod math;
pub mod parallel;
pub mod raytracer;
pub mod scene;
pub mod settings;
pub mod stitching;
pub mod tetrahedral_mesh;
pub mod vicinity;

pub use crate::baker::IncrementalLightBaker;
pub use crate::cache::{BakedLightCache, BakedLightMemoryCache};
pub use crate::collector::{BakedSceneCollector, StandardSceneCollector};
pub use crate::scene::Scene;
pub use crate::settings::{GraphicsCapabilities, LightBakingSettings};

/// A cooperative stop signal for [IncrementalLightBaker::bake].
///
/// Clones share the same signal, so one clone can be handed to another
/// thread and cancelled there.
#[derive(Clone, Default, Debug)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How a cancellable phase ended.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BakeOutcome {
    /// Every chunk was processed.
    Completed,
    /// Cancellation was observed. Everything stored in the cache so far is
    /// complete; the remaining work was skipped.
    Cancelled,
}

/// Errors that can occur while baking.
#[derive(Thiserror, Debug)]
pub enum LightBakingError {
    #[error("The rendering backend offsets texel centers by {0}, which the light tracer doesn't support")]
    UnsupportedBackend(Vec2),
    #[error("No output directory was given and the scene has no file name to derive one from")]
    UndefinedSceneFileName,
    #[error("Can't derive an output directory from the scene file name {0:?}, which has no extension")]
    SceneFileNameWithoutExtension(PathBuf),
    #[error("Failed to create the output directory {path:?}")]
    CreateOutputDirectory {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("Failed to create the directory {path:?} for the GI data file")]
    CreateGiDataDirectory {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("Failed to create the GI data file {path:?}")]
    CreateGiDataFile {
        path: PathBuf,
        #[source]
        source: GiDataError,
    },
    #[error("The chunk size {0} isn't positive along every axis")]
    InvalidChunkSize(Vec3),
    #[error("The lightmap size must be at least one texel")]
    InvalidLightmapSize,
    #[error(transparent)]
    ChunkRange(#[from] ChunkRangeError),
    #[error("`{operation}` requires the {expected:?} phase, but the baker is in the {actual:?} phase")]
    PhaseOrder {
        operation: &'static str,
        expected: BakingPhase,
        actual: BakingPhase,
    },
    #[error("The cache has no vicinity for chunk {0}")]
    MissingChunkVicinity(IVec3),
    #[error("The cache has no direct light for lightmap {0}")]
    MissingDirectLight(u32),
    #[error("The cache has no baked lightmap {0}")]
    MissingLightmap(u32),
    #[error("Failed to save {} lightmaps: {failed:?}", failed.len())]
    SaveLightmaps { failed: Vec<PathBuf> },
    #[error("Failed to write the GI data file {path:?}")]
    WriteGiData {
        path: PathBuf,
        #[source]
        source: GiDataError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
