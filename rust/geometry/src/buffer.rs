// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Horizontal offsetting of rings (mitred corners, heights untouched).

use nalgebra::{Point3, Vector3};

use crate::plane::{intersect_plane_line, Line3, Plane};
use crate::polygon::{open_ring, signed_area_xy, Polygon, Ring};

/// Offsets a ring in the XY plane.
///
/// Positive distances grow the enclosed region, negative ones shrink it,
/// whatever the ring's winding. Every vertex moves to the intersection of
/// its two offset edges and keeps its original z. Returns `None` when the
/// ring (or its XY projection) is degenerate.
pub fn buffer_2d(ring: &[Point3<f64>], distance: f64) -> Option<Ring> {
    let ring = open_ring(ring.to_vec());
    if ring.len() < 3 {
        return None;
    }
    if distance == 0.0 {
        return Some(ring);
    }

    let area = signed_area_xy(&ring);
    if area.abs() < 1e-12 {
        return None;
    }
    // outward side of a counter-clockwise ring is to the right of each edge
    let side = area.signum();

    let n = ring.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let curr = ring[i];
        let next = ring[(i + 1) % n];

        let e1 = horizontal(curr - prev);
        let e2 = horizontal(next - curr);
        let moved = match (outward(&e1, side), outward(&e2, side)) {
            (Some(n1), Some(n2)) => {
                let on_first = curr + n1 * distance;
                let on_second = curr + n2 * distance;
                let first = Line3 {
                    point: on_first,
                    direction: e1,
                };
                Plane::vertical_through(on_second, e2)
                    .ok()
                    .and_then(|second| intersect_plane_line(&second, &first))
                    // collinear neighbours: the offset lines coincide
                    .unwrap_or(on_first)
            }
            (Some(normal), None) | (None, Some(normal)) => curr + normal * distance,
            (None, None) => continue,
        };
        out.push(Point3::new(moved.x, moved.y, curr.z));
    }

    let out = open_ring(out);
    (out.len() >= 3).then_some(out)
}

/// Offsets a polygon: the outer ring by `distance`, holes the opposite way.
pub fn buffer_polygon(polygon: &Polygon, distance: f64) -> Option<Polygon> {
    let outer = buffer_2d(&polygon.outer, distance)?;
    let holes = polygon
        .holes
        .iter()
        .filter_map(|h| buffer_2d(h, -distance))
        .collect();
    Some(Polygon { outer, holes })
}

#[inline]
fn horizontal(v: Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.x, v.y, 0.0)
}

fn outward(edge: &Vector3<f64>, side: f64) -> Option<Vector3<f64>> {
    let len = edge.norm();
    if len < 1e-12 {
        return None;
    }
    Some(Vector3::new(edge.y, -edge.x, 0.0) * (side / len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(size: f64, z: f64) -> Ring {
        vec![
            Point3::new(0.0, 0.0, z),
            Point3::new(size, 0.0, z),
            Point3::new(size, size, z),
            Point3::new(0.0, size, z),
        ]
    }

    #[test]
    fn zero_distance_is_identity() {
        let ring = square(10.0, 2.0);
        assert_eq!(buffer_2d(&ring, 0.0).unwrap(), ring);
    }

    #[test]
    fn positive_distance_grows_ccw_ring() {
        let out = buffer_2d(&square(10.0, 2.0), 1.0).unwrap();
        assert_relative_eq!(out[0].x, -1.0, epsilon = 1e-9);
        assert_relative_eq!(out[0].y, -1.0, epsilon = 1e-9);
        assert_relative_eq!(out[2].x, 11.0, epsilon = 1e-9);
        assert_relative_eq!(out[2].y, 11.0, epsilon = 1e-9);
        assert!(out.iter().all(|p| p.z == 2.0));
    }

    #[test]
    fn winding_does_not_change_direction() {
        let cw: Ring = square(10.0, 0.0).into_iter().rev().collect();
        let out = buffer_2d(&cw, 1.0).unwrap();
        assert_relative_eq!(signed_area_xy(&out).abs(), 144.0, epsilon = 1e-9);
    }

    #[test]
    fn negative_distance_undoes_positive() {
        let ring = square(10.0, 0.0);
        let grown = buffer_2d(&ring, 0.05).unwrap();
        let back = buffer_2d(&grown, -0.05).unwrap();
        for (a, b) in back.iter().zip(&ring) {
            assert_relative_eq!(a.x, b.x, epsilon = 1e-9);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn collinear_vertex_moves_along_edge_normal() {
        let mut ring = square(10.0, 0.0);
        ring.insert(1, Point3::new(5.0, 0.0, 0.0));
        let out = buffer_2d(&ring, 1.0).unwrap();
        assert_relative_eq!(out[1].x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(out[1].y, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_ring_has_no_buffer() {
        let line = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        assert!(buffer_2d(&line, 1.0).is_none());
        let flat = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        assert!(buffer_2d(&flat, 1.0).is_none());
    }

    #[test]
    fn polygon_holes_shrink_when_outer_grows() {
        let hole: Ring = vec![
            Point3::new(4.0, 4.0, 0.0),
            Point3::new(4.0, 6.0, 0.0),
            Point3::new(6.0, 6.0, 0.0),
            Point3::new(6.0, 4.0, 0.0),
        ];
        let poly = Polygon::with_holes(square(10.0, 0.0), vec![hole]);
        let out = buffer_polygon(&poly, 0.5).unwrap();
        assert_relative_eq!(signed_area_xy(&out.holes[0]).abs(), 1.0, epsilon = 1e-9);
    }
}
