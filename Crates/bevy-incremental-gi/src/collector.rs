// bevy-incremental-gi/Crates/bevy-incremental-gi/src/collector.rs

//! Splits a scene into chunks and answers spatial queries about it.

use crate::math::BoundingBox;
use crate::scene::{
    GeometryId, LightId, LightProbeGroup, LightProbeGroupId, Scene, SceneGeometry, SceneLight,
};
use bevy::math::{IVec3, Vec3};
use bevy::utils::HashMap;

/// Supplies the baker with per-chunk views of a scene.
///
/// Between [lock_scene](BakedSceneCollector::lock_scene) and
/// [unlock_scene](BakedSceneCollector::unlock_scene), the set of chunks is
/// fixed and every geometry and light probe group belongs to exactly one
/// chunk.
pub trait BakedSceneCollector {
    /// Partitions the scene into chunks of the given size.
    fn lock_scene(&mut self, scene: &Scene, chunk_size: Vec3);

    /// Returns every chunk that owns at least one geometry or light probe
    /// group.
    fn chunks(&self) -> Vec<IVec3>;

    /// Returns the geometries owned by `chunk`, in ascending id order.
    fn unique_geometries(&self, chunk: IVec3) -> Vec<GeometryId>;

    /// Returns the light probe groups owned by `chunk`, in ascending id
    /// order.
    fn unique_light_probe_groups(&self, chunk: IVec3) -> Vec<LightProbeGroupId>;

    /// Pulls the lightmap assignments of the geometries owned by `chunk` from
    /// the scene.
    fn commit_geometries(&mut self, scene: &Scene, chunk: IVec3);

    /// Returns the bounds of `chunk`, including everything it owns.
    fn chunk_bounding_box(&self, chunk: IVec3) -> BoundingBox;

    fn geometries_in_bounding_box(&self, bounding_box: &BoundingBox) -> Vec<GeometryId>;

    /// Returns the lights that can illuminate anything inside the box.
    fn lights_in_bounding_box(&self, bounding_box: &BoundingBox) -> Vec<LightId>;

    fn light_probe_groups_in_bounding_box(
        &self,
        bounding_box: &BoundingBox,
    ) -> Vec<LightProbeGroupId>;

    fn geometry(&self, id: GeometryId) -> Option<&SceneGeometry>;
    fn light(&self, id: LightId) -> Option<&SceneLight>;
    fn light_probe_group(&self, id: LightProbeGroupId) -> Option<&LightProbeGroup>;

    /// Releases the chunk partition.
    fn unlock_scene(&mut self);
}

/// A collector that assigns everything to the chunk containing the center of
/// its bounding box.
///
/// The collector works on a snapshot of the scene taken when it's locked.
/// Lightmap assignments made afterward become visible once the owning chunk
/// is committed.
#[derive(Default)]
pub struct StandardSceneCollector {
    chunk_size: Vec3,
    geometries: Vec<CollectedGeometry>,
    lights: Vec<SceneLight>,
    light_probe_groups: Vec<CollectedLightProbeGroup>,
    chunks: HashMap<IVec3, CollectedChunk>,
}

struct CollectedGeometry {
    geometry: SceneGeometry,
    bounding_box: BoundingBox,
}

struct CollectedLightProbeGroup {
    group: LightProbeGroup,
    bounding_box: BoundingBox,
}

#[derive(Default)]
struct CollectedChunk {
    geometries: Vec<GeometryId>,
    light_probe_groups: Vec<LightProbeGroupId>,
    bounding_box: BoundingBox,
}

impl StandardSceneCollector {
    pub fn new() -> StandardSceneCollector {
        StandardSceneCollector::default()
    }

    fn chunk_of(&self, bounding_box: &BoundingBox) -> IVec3 {
        (bounding_box.center() / self.chunk_size).floor().as_ivec3()
    }

    fn grid_cell(&self, chunk: IVec3) -> BoundingBox {
        let min = chunk.as_vec3() * self.chunk_size;
        BoundingBox::new(min, min + self.chunk_size)
    }
}

impl BakedSceneCollector for StandardSceneCollector {
    fn lock_scene(&mut self, scene: &Scene, chunk_size: Vec3) {
        self.chunk_size = chunk_size;
        self.lights = scene.lights.clone();
        self.chunks.clear();

        self.geometries = scene
            .geometries
            .iter()
            .map(|geometry| CollectedGeometry {
                bounding_box: geometry.bounding_box(),
                geometry: geometry.clone(),
            })
            .collect();
        self.light_probe_groups = scene
            .light_probe_groups
            .iter()
            .map(|group| CollectedLightProbeGroup {
                bounding_box: group.bounding_box(),
                group: group.clone(),
            })
            .collect();

        for (geometry_id, collected) in self.geometries.iter().enumerate() {
            if collected.bounding_box.is_empty() {
                continue;
            }
            let chunk = self.chunk_of(&collected.bounding_box);
            let entry = self.chunks.entry(chunk).or_default();
            entry.geometries.push(geometry_id);
            entry.bounding_box.merge(&collected.bounding_box);
        }
        for (group_id, collected) in self.light_probe_groups.iter().enumerate() {
            if collected.bounding_box.is_empty() {
                continue;
            }
            let chunk = self.chunk_of(&collected.bounding_box);
            let entry = self.chunks.entry(chunk).or_default();
            entry.light_probe_groups.push(group_id);
            entry.bounding_box.merge(&collected.bounding_box);
        }

        let cells = self
            .chunks
            .keys()
            .map(|&chunk| (chunk, self.grid_cell(chunk)))
            .collect::<Vec<_>>();
        for (chunk, cell) in cells {
            if let Some(entry) = self.chunks.get_mut(&chunk) {
                entry.bounding_box.merge(&cell);
            }
        }
    }

    fn chunks(&self) -> Vec<IVec3> {
        self.chunks.keys().copied().collect()
    }

    fn unique_geometries(&self, chunk: IVec3) -> Vec<GeometryId> {
        self.chunks
            .get(&chunk)
            .map(|entry| entry.geometries.clone())
            .unwrap_or_default()
    }

    fn unique_light_probe_groups(&self, chunk: IVec3) -> Vec<LightProbeGroupId> {
        self.chunks
            .get(&chunk)
            .map(|entry| entry.light_probe_groups.clone())
            .unwrap_or_default()
    }

    fn commit_geometries(&mut self, scene: &Scene, chunk: IVec3) {
        let Some(entry) = self.chunks.get(&chunk) else {
            return;
        };
        for &geometry_id in &entry.geometries {
            if let (Some(collected), Some(source)) = (
                self.geometries.get_mut(geometry_id),
                scene.geometries.get(geometry_id),
            ) {
                collected.geometry.lightmap = source.lightmap;
            }
        }
    }

    fn chunk_bounding_box(&self, chunk: IVec3) -> BoundingBox {
        match self.chunks.get(&chunk) {
            Some(entry) => entry.bounding_box,
            None => self.grid_cell(chunk),
        }
    }

    fn geometries_in_bounding_box(&self, bounding_box: &BoundingBox) -> Vec<GeometryId> {
        self.geometries
            .iter()
            .enumerate()
            .filter(|(_, collected)| collected.bounding_box.intersects(bounding_box))
            .map(|(geometry_id, _)| geometry_id)
            .collect()
    }

    fn lights_in_bounding_box(&self, bounding_box: &BoundingBox) -> Vec<LightId> {
        self.lights
            .iter()
            .enumerate()
            .filter(|(_, light)| match light.influence_sphere() {
                None => true,
                Some((center, radius)) => bounding_box.intersects_sphere(center, radius),
            })
            .map(|(light_id, _)| light_id)
            .collect()
    }

    fn light_probe_groups_in_bounding_box(
        &self,
        bounding_box: &BoundingBox,
    ) -> Vec<LightProbeGroupId> {
        self.light_probe_groups
            .iter()
            .enumerate()
            .filter(|(_, collected)| collected.bounding_box.intersects(bounding_box))
            .map(|(group_id, _)| group_id)
            .collect()
    }

    fn geometry(&self, id: GeometryId) -> Option<&SceneGeometry> {
        self.geometries.get(id).map(|collected| &collected.geometry)
    }

    fn light(&self, id: LightId) -> Option<&SceneLight> {
        self.lights.get(id)
    }

    fn light_probe_group(&self, id: LightProbeGroupId) -> Option<&LightProbeGroup> {
        self.light_probe_groups
            .get(id)
            .map(|collected| &collected.group)
    }

    fn unlock_scene(&mut self) {
        self.geometries.clear();
        self.lights.clear();
        self.light_probe_groups.clear();
        self.chunks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{LightKind, LightmapAssignment};
    use bevy::math::{ivec3, vec3, vec4};

    fn scene() -> Scene {
        Scene {
            geometries: vec![
                SceneGeometry::quad("a", vec3(1.0, 0.0, 1.0), Vec3::X, Vec3::Z),
                SceneGeometry::quad("b", vec3(5.0, 0.0, 1.0), Vec3::X, Vec3::Z),
                SceneGeometry::quad("c", vec3(2.0, 0.0, 2.0), Vec3::X, Vec3::Z),
            ],
            lights: vec![
                SceneLight::new(LightKind::Directional { direction: -Vec3::Y }, Vec3::ONE, 1.0),
                SceneLight::new(
                    LightKind::Point {
                        position: vec3(20.0, 0.0, 0.0),
                        radius: 2.0,
                    },
                    Vec3::ONE,
                    1.0,
                ),
            ],
            light_probe_groups: vec![LightProbeGroup {
                name: "probes".to_owned(),
                probe_positions: vec![vec3(6.0, 1.0, 1.0)],
                baked_data_file: None,
            }],
            ..Scene::default()
        }
    }

    #[test]
    fn assigns_ownership_by_bounding_box_center() {
        let scene = scene();
        let mut collector = StandardSceneCollector::new();
        collector.lock_scene(&scene, Vec3::splat(4.0));

        let mut chunks = collector.chunks();
        chunks.sort_by_key(|chunk| chunk.x);
        assert_eq!(chunks, vec![ivec3(0, 0, 0), ivec3(1, 0, 0)]);
        assert_eq!(collector.unique_geometries(ivec3(0, 0, 0)), vec![0, 2]);
        assert_eq!(collector.unique_geometries(ivec3(1, 0, 0)), vec![1]);
        assert_eq!(collector.unique_light_probe_groups(ivec3(1, 0, 0)), vec![0]);
        assert!(collector.unique_geometries(ivec3(9, 9, 9)).is_empty());

        let bounds = collector.chunk_bounding_box(ivec3(1, 0, 0));
        assert_eq!(bounds.min, vec3(4.0, 0.0, 0.0));
        assert_eq!(bounds.max, vec3(8.0, 4.0, 4.0));
    }

    #[test]
    fn spatial_queries() {
        let scene = scene();
        let mut collector = StandardSceneCollector::new();
        collector.lock_scene(&scene, Vec3::splat(4.0));

        let near_origin = BoundingBox::new(Vec3::ZERO, Vec3::splat(2.5));
        assert_eq!(collector.geometries_in_bounding_box(&near_origin), vec![0, 2]);
        assert_eq!(collector.lights_in_bounding_box(&near_origin), vec![0]);
        assert_eq!(
            collector.lights_in_bounding_box(&near_origin.padded(20.0)),
            vec![0, 1]
        );
        assert!(collector
            .light_probe_groups_in_bounding_box(&near_origin)
            .is_empty());
    }

    #[test]
    fn commit_refreshes_lightmap_assignments() {
        let mut scene = scene();
        let mut collector = StandardSceneCollector::new();
        collector.lock_scene(&scene, Vec3::splat(4.0));

        let assignment = LightmapAssignment {
            index: 0,
            scale_offset: vec4(0.5, 0.5, 0.0, 0.0),
        };
        scene.geometries[0].lightmap = Some(assignment);
        scene.geometries[1].lightmap = Some(assignment);
        assert_eq!(collector.geometry(0).unwrap().lightmap, None);

        collector.commit_geometries(&scene, ivec3(0, 0, 0));
        assert_eq!(collector.geometry(0).unwrap().lightmap, Some(assignment));
        assert_eq!(collector.geometry(1).unwrap().lightmap, None);

        collector.unlock_scene();
        assert!(collector.chunks().is_empty());
        assert!(collector.geometry(0).is_none());
    }
}
