// bevy-incremental-gi/Crates/bevy-incremental-gi/src/light_probes.rs

//! Baked point samples of incoming light.

use crate::scene::{LightProbeGroup, LightProbeGroupId};
use bevy::math::Vec3;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Error as IoError, Write};
use std::ops::{Add, AddAssign, Range};
use std::path::Path;
use thiserror::Error as Thiserror;

/// The constant band of the real spherical harmonics basis.
pub const SH_Y00: f32 = 0.282_095;
/// The scale of the linear band of the real spherical harmonics basis.
pub const SH_Y1: f32 = 0.488_603;

/// Incoming light at a point, projected onto the first two bands of the
/// spherical harmonics.
///
/// Coefficients are stored in the order `Y00, Y1-1, Y10, Y11`, i.e. constant,
/// then *y*, *z* and *x*. Each one is an RGB triple.
#[derive(Clone, Copy, Default, PartialEq, Debug, Serialize, Deserialize)]
pub struct SphericalHarmonicsL1 {
    pub coefficients: [Vec3; 4],
}

/// The light probes of several groups, flattened into one list.
#[derive(Clone, Default, Debug)]
pub struct LightProbeCollection {
    /// World-space position of every probe.
    pub world_positions: Vec<Vec3>,
    /// The scene id of every group.
    pub group_ids: Vec<LightProbeGroupId>,
    pub names: Vec<String>,
    /// Index of the first probe of every group.
    pub offsets: Vec<usize>,
    /// Number of probes in every group.
    pub counts: Vec<usize>,
}

/// Baked light of every probe in a [LightProbeCollection].
#[derive(Clone, Default, Debug)]
pub struct LightProbeCollectionBakedData {
    pub light_probes: Vec<SphericalHarmonicsL1>,
}

/// The saved form of one light probe group.
#[derive(Clone, Default, PartialEq, Debug, Serialize, Deserialize)]
pub struct LightProbeGroupBakedData {
    pub light_probes: Vec<SphericalHarmonicsL1>,
}

/// Errors that can occur when saving or loading baked light probe data.
#[derive(Thiserror, Debug)]
pub enum LightProbeSaveError {
    #[error("Light probe group {group} doesn't exist; the collection has {count} groups")]
    GroupOutOfRange { group: usize, count: usize },
    #[error("Failed to access the light probe data file")]
    Io(#[from] IoError),
    #[error("Failed to encode or decode light probe data")]
    Bincode(#[from] bincode::Error),
}

fn basis(direction: Vec3) -> [f32; 4] {
    [
        SH_Y00,
        SH_Y1 * direction.y,
        SH_Y1 * direction.z,
        SH_Y1 * direction.x,
    ]
}

impl SphericalHarmonicsL1 {
    pub const ZERO: SphericalHarmonicsL1 = SphericalHarmonicsL1 {
        coefficients: [Vec3::ZERO; 4],
    };

    /// Accumulates radiance arriving from `direction`, weighted by the solid
    /// angle it stands for.
    pub fn add_radiance(&mut self, direction: Vec3, radiance: Vec3, weight: f32) {
        for (coefficient, basis) in self.coefficients.iter_mut().zip(basis(direction)) {
            *coefficient += radiance * (basis * weight);
        }
    }

    /// Accumulates light arriving from a single direction, such as a
    /// directional or point light.
    pub fn add_directional_light(&mut self, direction: Vec3, light: Vec3) {
        self.add_radiance(direction, light, PI);
    }

    /// Returns the light received by a diffuse surface facing `normal`.
    ///
    /// Light arriving uniformly from every direction with radiance `L`
    /// evaluates to `L` for every normal.
    pub fn evaluate(&self, normal: Vec3) -> Vec3 {
        let basis = basis(normal);
        self.coefficients[0] * basis[0]
            + (self.coefficients[1] * basis[1]
                + self.coefficients[2] * basis[2]
                + self.coefficients[3] * basis[3])
                * (2.0 / 3.0)
    }

    /// Returns the light averaged over all normals.
    pub fn ambient(&self) -> Vec3 {
        self.coefficients[0] * SH_Y00
    }

    pub fn scaled(&self, factor: f32) -> SphericalHarmonicsL1 {
        SphericalHarmonicsL1 {
            coefficients: self.coefficients.map(|coefficient| coefficient * factor),
        }
    }
}

impl Add for SphericalHarmonicsL1 {
    type Output = SphericalHarmonicsL1;

    fn add(mut self, other: SphericalHarmonicsL1) -> SphericalHarmonicsL1 {
        self += other;
        self
    }
}

impl AddAssign for SphericalHarmonicsL1 {
    fn add_assign(&mut self, other: SphericalHarmonicsL1) {
        for (coefficient, other) in self.coefficients.iter_mut().zip(other.coefficients) {
            *coefficient += other;
        }
    }
}

impl LightProbeCollection {
    /// Appends all probes of a group.
    pub fn add_group(&mut self, group_id: LightProbeGroupId, group: &LightProbeGroup) {
        self.group_ids.push(group_id);
        self.names.push(group.name.clone());
        self.offsets.push(self.world_positions.len());
        self.counts.push(group.probe_positions.len());
        self.world_positions.extend_from_slice(&group.probe_positions);
    }

    /// Returns the total number of probes.
    pub fn len(&self) -> usize {
        self.world_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.world_positions.is_empty()
    }

    pub fn num_groups(&self) -> usize {
        self.group_ids.len()
    }

    /// Returns the probe indices belonging to a group.
    pub fn group_range(&self, group: usize) -> Option<Range<usize>> {
        let offset = *self.offsets.get(group)?;
        Some(offset..offset + *self.counts.get(group)?)
    }
}

impl LightProbeCollectionBakedData {
    /// Resizes to `len` probes and clears all of them.
    pub fn reset(&mut self, len: usize) {
        self.light_probes.clear();
        self.light_probes.resize(len, SphericalHarmonicsL1::ZERO);
    }

    pub fn len(&self) -> usize {
        self.light_probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.light_probes.is_empty()
    }
}

/// Writes the baked data of one group of a collection to `path`, creating
/// parent directories as needed.
pub fn save_light_probe_group_baked_data(
    collection: &LightProbeCollection,
    baked_data: &LightProbeCollectionBakedData,
    group: usize,
    path: &Path,
) -> Result<(), LightProbeSaveError> {
    let range = collection
        .group_range(group)
        .filter(|range| range.end <= baked_data.len())
        .ok_or(LightProbeSaveError::GroupOutOfRange {
            group,
            count: collection.num_groups(),
        })?;
    let group_data = LightProbeGroupBakedData {
        light_probes: baked_data.light_probes[range].to_vec(),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, &group_data)?;
    writer.flush()?;
    Ok(())
}

pub fn load_light_probe_group_baked_data(
    path: &Path,
) -> Result<LightProbeGroupBakedData, LightProbeSaveError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}
