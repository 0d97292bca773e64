// bevy-incremental-gi/Crates/bevy-incremental-gi/src/tetrahedral_mesh.rs

//! Interpolation of baked light probes through a Delaunay tetrahedralization.

use crate::light_probes::SphericalHarmonicsL1;
use arrayvec::ArrayVec;
use bevy::math::{DMat3, DVec3, Vec3};
use bevy::utils::HashMap;

/// Points closer together than this are merged.
const DUPLICATE_DISTANCE: f64 = 1.0e-6;
/// Tetrahedra with less volume than this are dropped.
const DEGENERATE_VOLUME: f64 = 1.0e-12;
/// Barycentric weights down to this value still count as inside.
const INSIDE_EPSILON: f64 = 1.0e-6;

/// A tetrahedralization of light probe positions.
///
/// Vertex indices are probe indices. Points outside the convex hull of the
/// probes, or any point when the probes don't span a volume, take the value
/// of the nearest probe.
#[derive(Clone, Default, Debug)]
pub struct TetrahedralMesh {
    vertices: Vec<Vec3>,
    tetrahedra: Vec<Tetrahedron>,
}

#[derive(Clone, Debug)]
struct Tetrahedron {
    indices: [usize; 4],
    origin: DVec3,
    /// Maps `position - origin` to the weights of the last three vertices.
    inverse_basis: DMat3,
}

#[derive(Clone, Copy)]
struct DelaunayTetrahedron {
    indices: [usize; 4],
    circumcenter: DVec3,
    circumradius_squared: f64,
}

impl DelaunayTetrahedron {
    fn new(indices: [usize; 4], points: &[DVec3]) -> Option<DelaunayTetrahedron> {
        let a = points[indices[0]];
        let (ab, ac, ad) = (
            points[indices[1]] - a,
            points[indices[2]] - a,
            points[indices[3]] - a,
        );
        let denominator = 2.0 * ab.dot(ac.cross(ad));
        if denominator.abs() < DEGENERATE_VOLUME {
            return None;
        }
        let offset = (ac.cross(ad) * ab.length_squared()
            + ad.cross(ab) * ac.length_squared()
            + ab.cross(ac) * ad.length_squared())
            / denominator;
        Some(DelaunayTetrahedron {
            indices,
            circumcenter: a + offset,
            circumradius_squared: offset.length_squared(),
        })
    }

    fn faces(&self) -> [[usize; 3]; 4] {
        let [a, b, c, d] = self.indices;
        [[a, b, c], [a, b, d], [a, c, d], [b, c, d]]
    }
}

fn face_key(mut face: [usize; 3]) -> [usize; 3] {
    face.sort_unstable();
    face
}

impl TetrahedralMesh {
    /// Tetrahedralizes the given points with the Bowyer–Watson algorithm.
    pub fn new(positions: &[Vec3]) -> TetrahedralMesh {
        let mut mesh = TetrahedralMesh {
            vertices: positions.to_vec(),
            tetrahedra: vec![],
        };
        if positions.len() < 4 {
            return mesh;
        }

        let mut points = positions
            .iter()
            .map(|position| position.as_dvec3())
            .collect::<Vec<_>>();
        let (min, max) = points.iter().fold(
            (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
            |(min, max), &point| (min.min(point), max.max(point)),
        );
        let center = (min + max) * 0.5;
        let scale = ((max - min).length() + 1.0) * 20.0;
        let super_base = points.len();
        for corner in [
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(1.0, -1.0, -1.0),
            DVec3::new(-1.0, 1.0, -1.0),
            DVec3::new(-1.0, -1.0, 1.0),
        ] {
            points.push(center + corner * scale);
        }

        let Some(super_tetrahedron) = DelaunayTetrahedron::new(
            [super_base, super_base + 1, super_base + 2, super_base + 3],
            &points,
        ) else {
            return mesh;
        };
        let mut tetrahedra = vec![super_tetrahedron];

        for point_index in 0..super_base {
            let point = points[point_index];
            let is_duplicate = points[..point_index]
                .iter()
                .any(|other| other.distance(point) < DUPLICATE_DISTANCE);
            if is_duplicate {
                continue;
            }

            let (bad, good): (Vec<_>, Vec<_>) = tetrahedra.into_iter().partition(|tetrahedron| {
                tetrahedron.circumcenter.distance_squared(point)
                    < tetrahedron.circumradius_squared
            });
            tetrahedra = good;

            let mut face_counts: HashMap<[usize; 3], usize> = HashMap::default();
            for tetrahedron in &bad {
                for face in tetrahedron.faces() {
                    *face_counts.entry(face_key(face)).or_default() += 1;
                }
            }
            for tetrahedron in &bad {
                for face in tetrahedron.faces() {
                    if face_counts.get(&face_key(face)) != Some(&1) {
                        continue;
                    }
                    let indices = [face[0], face[1], face[2], point_index];
                    if let Some(tetrahedron) = DelaunayTetrahedron::new(indices, &points) {
                        tetrahedra.push(tetrahedron);
                    }
                }
            }
        }

        mesh.tetrahedra = tetrahedra
            .into_iter()
            .filter(|tetrahedron| tetrahedron.indices.iter().all(|&index| index < super_base))
            .filter_map(|tetrahedron| {
                let [a, b, c, d] = tetrahedron.indices.map(|index| points[index]);
                let basis = DMat3::from_cols(b - a, c - a, d - a);
                (basis.determinant().abs() >= DEGENERATE_VOLUME).then(|| Tetrahedron {
                    indices: tetrahedron.indices,
                    origin: a,
                    inverse_basis: basis.inverse(),
                })
            })
            .collect();
        mesh
    }

    pub fn num_tetrahedra(&self) -> usize {
        self.tetrahedra.len()
    }

    /// Returns the probes that contribute to `position` and their weights.
    ///
    /// The weights are non-negative and sum to one. The result is empty only
    /// if the mesh has no vertices.
    pub fn interpolation_weights(&self, position: Vec3) -> ArrayVec<(usize, f32), 4> {
        let mut weights = ArrayVec::new();
        let point = position.as_dvec3();

        for tetrahedron in &self.tetrahedra {
            let local = tetrahedron.inverse_basis * (point - tetrahedron.origin);
            let barycentric = [1.0 - local.x - local.y - local.z, local.x, local.y, local.z];
            if barycentric.iter().all(|&weight| weight >= -INSIDE_EPSILON) {
                for (index, weight) in tetrahedron.indices.into_iter().zip(barycentric) {
                    weights.push((index, weight.max(0.0) as f32));
                }
                return weights;
            }
        }

        let nearest = self
            .vertices
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.distance_squared(position)
                    .total_cmp(&b.distance_squared(position))
            })
            .map(|(index, _)| index);
        if let Some(nearest) = nearest {
            weights.push((nearest, 1.0));
        }
        weights
    }

    /// Interpolates baked probe data at `position`.
    pub fn sample(&self, position: Vec3, light_probes: &[SphericalHarmonicsL1]) -> SphericalHarmonicsL1 {
        let mut result = SphericalHarmonicsL1::ZERO;
        for (index, weight) in self.interpolation_weights(position) {
            if let Some(light_probe) = light_probes.get(index) {
                result += light_probe.scaled(weight);
            }
        }
        result
    }
}
