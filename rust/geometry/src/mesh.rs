// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh data structures

use nalgebra::Point3;

use crate::polygon::{bounds, Polygon};

/// Triangles smaller than this (twice the area) are skipped as degenerate.
const MIN_TRIANGLE_AREA: f64 = 1e-10;

/// Triangle mesh of one building element in world coordinates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Vertex positions
    pub vertices: Vec<Point3<f64>>,
    /// Triangle vertex indices
    pub indices: Vec<[u32; 3]>,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an indexed mesh from loose triangles (no vertex sharing).
    pub fn from_triangles(triangles: impl IntoIterator<Item = [Point3<f64>; 3]>) -> Self {
        let mut mesh = Self::new();
        for tri in triangles {
            mesh.add_triangle(tri);
        }
        mesh
    }

    pub fn add_triangle(&mut self, tri: [Point3<f64>; 3]) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&tri);
        self.indices.push([base, base + 1, base + 2]);
    }

    /// Appends another mesh, re-basing its indices.
    pub fn merge(&mut self, other: &Mesh) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices
            .extend(other.indices.iter().map(|t| [t[0] + base, t[1] + base, t[2] + base]));
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Vertex triples of every triangle whose indices are in range.
    pub fn triangles(&self) -> impl Iterator<Item = [Point3<f64>; 3]> + '_ {
        self.indices.iter().filter_map(|t| {
            Some([
                *self.vertices.get(t[0] as usize)?,
                *self.vertices.get(t[1] as usize)?,
                *self.vertices.get(t[2] as usize)?,
            ])
        })
    }

    /// Non-degenerate triangles as three-vertex polygons.
    pub fn triangle_polygons(&self) -> impl Iterator<Item = Polygon> + '_ {
        self.triangles().filter_map(triangle_polygon)
    }

    /// Applies a point mapping (e.g. georeferencing) to every vertex.
    pub fn transformed(&self, f: impl Fn(Point3<f64>) -> Point3<f64>) -> Mesh {
        Mesh {
            vertices: self.vertices.iter().map(|p| f(*p)).collect(),
            indices: self.indices.clone(),
        }
    }

    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        bounds(self.vertices.iter())
    }
}

/// Polygon of a single triangle, `None` when it has no area.
pub fn triangle_polygon(tri: [Point3<f64>; 3]) -> Option<Polygon> {
    let doubled = (tri[1] - tri[0]).cross(&(tri[2] - tri[0])).norm();
    (doubled > MIN_TRIANGLE_AREA).then(|| Polygon::new(tri.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri(z: f64) -> [Point3<f64>; 3] {
        [
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(0.0, 1.0, z),
        ]
    }

    #[test]
    fn merge_rebases_indices() {
        let mut a = Mesh::from_triangles([tri(0.0)]);
        let b = Mesh::from_triangles([tri(1.0)]);
        a.merge(&b);
        assert_eq!(a.indices[1], [3, 4, 5]);
        let last = a.triangles().last().unwrap();
        assert_eq!(last[0].z, 1.0);
    }

    #[test]
    fn degenerate_and_out_of_range_triangles_are_skipped() {
        let mut mesh = Mesh::from_triangles([
            tri(0.0),
            [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)],
        ]);
        mesh.indices.push([0, 1, 99]);
        assert_eq!(mesh.triangle_count(), 3);
        assert_eq!(mesh.triangles().count(), 2);
        assert_eq!(mesh.triangle_polygons().count(), 1);
    }

    #[test]
    fn transformed_moves_vertices() {
        let mesh = Mesh::from_triangles([tri(0.0)]);
        let moved = mesh.transformed(|p| Point3::new(p.x + 10.0, p.y, p.z));
        let (lo, hi) = moved.bounds().unwrap();
        assert_eq!(lo.x, 10.0);
        assert_eq!(hi.x, 11.0);
    }
}
