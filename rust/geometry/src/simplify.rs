// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Vertex reduction for rings, polylines and segment chains.
//!
//! A vertex survives only if it is far enough from the previously kept vertex
//! and the path actually turns there. The turn test runs independently in the
//! XY, XZ and YZ projections and a vertex is dropped only when all three agree
//! that the path is straight, which keeps corners of vertical walls whose XY
//! projection degenerates to a line.
//!
//! Passes repeat until a pass removes nothing, so the result is a fixed point:
//! simplifying twice gives the same ring as simplifying once.

use std::f64::consts::PI;

use nalgebra::Point3;

use crate::polygon::{open_ring, points_coincide, Polygon, Ring};

/// A projected direction shorter than this carries no angle information.
const PROJECTION_EPSILON: f64 = 1e-9;

/// Distance and turn-angle thresholds for one simplification call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// Vertices closer than this to the last kept vertex are dropped.
    pub distance: f64,
    /// Maximum direction change (radians) still treated as straight.
    pub angle: f64,
    /// Measure the distance in the horizontal plane only.
    pub xy_only: bool,
}

impl Tolerances {
    pub const fn new(distance: f64, angle: f64) -> Self {
        Self {
            distance,
            angle,
            xy_only: false,
        }
    }

    /// Same thresholds, distances measured in XY only.
    pub const fn xy_only(self) -> Self {
        Self {
            xy_only: true,
            ..self
        }
    }
}

/// Result of simplifying a polygon.
#[derive(Debug, Clone, PartialEq)]
pub enum Simplified {
    Polygon(Polygon),
    /// The outer ring collapsed below three vertices.
    Line(Vec<Point3<f64>>),
}

impl Simplified {
    pub fn into_polygon(self) -> Option<Polygon> {
        match self {
            Simplified::Polygon(p) => Some(p),
            Simplified::Line(_) => None,
        }
    }

    pub fn as_polygon(&self) -> Option<&Polygon> {
        match self {
            Simplified::Polygon(p) => Some(p),
            Simplified::Line(_) => None,
        }
    }

    /// Vertex count over all rings (or the line).
    pub fn point_count(&self) -> usize {
        match self {
            Simplified::Polygon(p) => p.outer.len() + p.holes.iter().map(Vec::len).sum::<usize>(),
            Simplified::Line(line) => line.len(),
        }
    }
}

/// Simplifies the outer ring and every hole of a polygon.
///
/// Holes that collapse are dropped. An outer ring that collapses turns the
/// whole polygon into a two-point [`Simplified::Line`].
pub fn simplify_polygon(polygon: &Polygon, tolerances: Tolerances) -> Simplified {
    let outer = simplify_ring(&polygon.outer, tolerances);
    if outer.len() < 3 {
        return Simplified::Line(collapse_to_segment(&outer, &polygon.outer));
    }
    let holes = polygon
        .holes
        .iter()
        .map(|h| simplify_ring(h, tolerances))
        .filter(|h| h.len() >= 3)
        .collect();
    Simplified::Polygon(Polygon { outer, holes })
}

/// Simplifies a closed ring to its fixed point. May return fewer than 3 vertices.
pub fn simplify_ring(ring: &[Point3<f64>], tolerances: Tolerances) -> Ring {
    let mut current = open_ring(ring.to_vec());
    // every reducing pass removes at least one vertex
    for _ in 0..=current.len() {
        if current.len() < 3 {
            break;
        }
        let next = ring_pass(&current, tolerances);
        if next.len() == current.len() {
            break;
        }
        current = next;
    }
    current
}

/// Simplifies an open polyline; both end points are always kept.
pub fn simplify_line(points: &[Point3<f64>], tolerances: Tolerances) -> Vec<Point3<f64>> {
    let mut current = points.to_vec();
    for _ in 0..=current.len() {
        if current.len() < 3 {
            break;
        }
        let next = line_pass(&current, tolerances);
        if next.len() == current.len() {
            break;
        }
        current = next;
    }
    current
}

/// Joins polylines whose end touches another's start into longer chains.
///
/// Direction is preserved; a chain whose end meets its own start is left
/// as is so callers can close it into a ring.
pub fn merge_chain(segments: &[Vec<Point3<f64>>], tolerance: f64) -> Vec<Vec<Point3<f64>>> {
    let mut chains: Vec<Vec<Point3<f64>>> = segments
        .iter()
        .filter(|s| s.len() >= 2)
        .cloned()
        .collect();

    loop {
        let mut joined = false;
        'search: for i in 0..chains.len() {
            for j in 0..chains.len() {
                if i == j {
                    continue;
                }
                let (Some(end), Some(start)) = (chains[i].last(), chains[j].first()) else {
                    continue;
                };
                if points_coincide(end, start, tolerance) {
                    let tail = chains.remove(j);
                    let target = if j < i { i - 1 } else { i };
                    chains[target].extend(tail.into_iter().skip(1));
                    joined = true;
                    break 'search;
                }
            }
        }
        if !joined {
            return chains;
        }
    }
}

/// [`merge_chain`] followed by [`simplify_line`] on every chain.
pub fn simplify_chain(
    segments: &[Vec<Point3<f64>>],
    contact_tolerance: f64,
    tolerances: Tolerances,
) -> Vec<Vec<Point3<f64>>> {
    merge_chain(segments, contact_tolerance)
        .into_iter()
        .map(|chain| simplify_line(&chain, tolerances))
        .collect()
}

fn ring_pass(ring: &[Point3<f64>], tol: Tolerances) -> Ring {
    let n = ring.len();
    let mut kept: Ring = Vec::with_capacity(n);
    kept.push(ring[0]);

    for i in 1..n {
        let mid = ring[i];
        let next = ring[(i + 1) % n];
        let last = kept[kept.len() - 1];
        if too_close(&last, &mid, tol) || is_straight(&last, &mid, &next, tol.angle) {
            continue;
        }
        kept.push(mid);
    }

    // the walk never tests its own start vertex
    if kept.len() >= 3 {
        let last = kept[kept.len() - 1];
        if too_close(&last, &kept[0], tol) || is_straight(&last, &kept[0], &kept[1], tol.angle) {
            kept.remove(0);
        }
    }
    kept
}

fn line_pass(points: &[Point3<f64>], tol: Tolerances) -> Vec<Point3<f64>> {
    let n = points.len();
    let mut kept = Vec::with_capacity(n);
    kept.push(points[0]);
    for i in 1..n - 1 {
        let mid = points[i];
        let last = kept[kept.len() - 1];
        if too_close(&last, &mid, tol) || is_straight(&last, &mid, &points[i + 1], tol.angle) {
            continue;
        }
        kept.push(mid);
    }
    kept.push(points[n - 1]);
    kept
}

fn collapse_to_segment(simplified: &[Point3<f64>], original: &[Point3<f64>]) -> Vec<Point3<f64>> {
    let source = if simplified.len() >= 2 {
        simplified
    } else {
        original
    };
    match source {
        [] => Vec::new(),
        [only] => vec![*only, *only],
        [first, second, ..] => vec![*first, *second],
    }
}

#[inline]
fn too_close(a: &Point3<f64>, b: &Point3<f64>, tol: Tolerances) -> bool {
    let d = b - a;
    let dist = if tol.xy_only {
        d.x.hypot(d.y)
    } else {
        d.norm()
    };
    dist < tol.distance
}

/// True when `from → mid → to` is straight in all three axis projections.
fn is_straight(from: &Point3<f64>, mid: &Point3<f64>, to: &Point3<f64>, angle_tol: f64) -> bool {
    let a = mid - from;
    let b = to - mid;
    same_direction((a.x, a.y), (b.x, b.y), angle_tol)
        && same_direction((a.x, a.z), (b.x, b.z), angle_tol)
        && same_direction((a.y, a.z), (b.y, b.z), angle_tol)
}

/// Compares undirected 2D directions; reversals count as straight.
fn same_direction(a: (f64, f64), b: (f64, f64), angle_tol: f64) -> bool {
    if a.0.hypot(a.1) < PROJECTION_EPSILON || b.0.hypot(b.1) < PROJECTION_EPSILON {
        return true;
    }
    let diff = (a.1.atan2(a.0) - b.1.atan2(b.0)).rem_euclid(PI);
    diff.min(PI - diff) <= angle_tol
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINE: Tolerances = Tolerances::new(0.001, 0.0001);
    const COARSE: Tolerances = Tolerances::new(0.1, 0.05);

    fn p(x: f64, y: f64, z: f64) -> Point3<f64> {
        Point3::new(x, y, z)
    }

    #[test]
    fn removes_collinear_midpoints() {
        let ring = vec![
            p(0.0, 0.0, 0.0),
            p(5.0, 0.0, 0.0),
            p(10.0, 0.0, 0.0),
            p(10.0, 10.0, 0.0),
            p(0.0, 10.0, 0.0),
        ];
        let out = simplify_ring(&ring, FINE);
        assert_eq!(out.len(), 4);
        assert!(!out.contains(&p(5.0, 0.0, 0.0)));
    }

    #[test]
    fn removes_collinear_start_vertex() {
        let ring = vec![
            p(5.0, 0.0, 0.0),
            p(10.0, 0.0, 0.0),
            p(10.0, 10.0, 0.0),
            p(0.0, 10.0, 0.0),
            p(0.0, 0.0, 0.0),
        ];
        let out = simplify_ring(&ring, FINE);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], p(10.0, 0.0, 0.0));
    }

    #[test]
    fn removes_near_duplicate_vertices() {
        let ring = vec![
            p(0.0, 0.0, 0.0),
            p(0.05, 0.01, 0.0),
            p(10.0, 0.0, 0.0),
            p(10.0, 10.0, 0.0),
            p(0.0, 10.0, 0.0),
        ];
        assert_eq!(simplify_ring(&ring, COARSE).len(), 4);
    }

    #[test]
    fn keeps_vertical_wall_corners() {
        let ring = vec![
            p(0.0, 0.0, 0.0),
            p(0.0, 10.0, 0.0),
            p(0.0, 10.0, 5.0),
            p(0.0, 5.0, 5.0),
            p(0.0, 0.0, 5.0),
        ];
        let out = simplify_ring(&ring, FINE);
        assert_eq!(out.len(), 4);
        assert!(!out.contains(&p(0.0, 5.0, 5.0)));
    }

    #[test]
    fn removes_spikes() {
        let ring = vec![
            p(0.0, 0.0, 0.0),
            p(2.0, 0.0, 0.0),
            p(2.0, 2.0, 0.0),
            p(0.0, 2.0, 0.0),
            p(1.0, 2.0, 0.0),
            p(1.0, 0.0, 0.0),
        ];
        let out = simplify_ring(&ring, FINE);
        let poly = Polygon::new(out);
        assert_eq!(poly.outer.len(), 4);
        approx::assert_relative_eq!(poly.area(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn idempotent_and_never_grows() {
        let poly = Polygon::with_holes(
            vec![
                p(0.0, 0.0, 0.0),
                p(3.0, 0.02, 0.0),
                p(6.0, 0.0, 0.0),
                p(6.0, 4.0, 0.0),
                p(6.01, 4.0, 0.0),
                p(3.0, 4.0, 0.0),
                p(0.0, 4.0, 0.0),
            ],
            vec![vec![
                p(1.0, 1.0, 0.0),
                p(1.0, 2.0, 0.0),
                p(2.0, 2.0, 0.0),
                p(2.0, 1.5, 0.0),
                p(2.0, 1.0, 0.0),
            ]],
        );
        let once = simplify_polygon(&poly, COARSE);
        let twice = simplify_polygon(once.as_polygon().unwrap(), COARSE);
        assert_eq!(once, twice);
        assert!(once.point_count() <= poly.outer.len() + poly.holes[0].len());
    }

    #[test]
    fn collapsed_ring_becomes_segment() {
        let sliver = Polygon::new(vec![p(0.0, 0.0, 0.0), p(5.0, 0.0, 0.0), p(10.0, 0.0, 0.0)]);
        match simplify_polygon(&sliver, FINE) {
            Simplified::Line(line) => assert_eq!(line.len(), 2),
            other => panic!("expected line, got {other:?}"),
        }
    }

    #[test]
    fn collapsed_hole_is_dropped() {
        let poly = Polygon::with_holes(
            vec![p(0.0, 0.0, 0.0), p(4.0, 0.0, 0.0), p(4.0, 4.0, 0.0), p(0.0, 4.0, 0.0)],
            vec![vec![p(1.0, 1.0, 0.0), p(1.02, 1.0, 0.0), p(1.0, 1.02, 0.0)]],
        );
        let out = simplify_polygon(&poly, COARSE).into_polygon().unwrap();
        assert!(out.holes.is_empty());
    }

    #[test]
    fn xy_only_ignores_height_difference() {
        let ring = vec![
            p(0.0, 0.0, 0.0),
            p(0.0, 0.0, 3.0),
            p(10.0, 0.0, 0.0),
            p(10.0, 10.0, 0.0),
            p(0.0, 10.0, 0.0),
        ];
        assert_eq!(simplify_ring(&ring, COARSE).len(), 5);
        assert_eq!(simplify_ring(&ring, COARSE.xy_only()).len(), 4);
    }

    #[test]
    fn line_keeps_end_points() {
        let line = vec![p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(2.0, 0.0, 0.0), p(2.0, 1.0, 0.0)];
        let out = simplify_line(&line, FINE);
        assert_eq!(out, vec![p(0.0, 0.0, 0.0), p(2.0, 0.0, 0.0), p(2.0, 1.0, 0.0)]);
    }

    #[test]
    fn chain_merges_touching_segments() {
        let segments = vec![
            vec![p(1.0, 0.0, 3.0), p(2.0, 0.0, 3.0)],
            vec![p(0.0, 0.0, 3.0), p(1.0, 0.0, 3.0)],
            vec![p(2.0, 0.0, 3.0), p(2.0, 1.0, 3.0)],
            vec![p(8.0, 8.0, 3.0), p(9.0, 8.0, 3.0)],
        ];
        let chains = simplify_chain(&segments, 1e-6, FINE);
        assert_eq!(chains.len(), 2);
        let long = chains.iter().find(|c| c.len() == 3).unwrap();
        assert_eq!(long[0], p(0.0, 0.0, 3.0));
        assert_eq!(long[2], p(2.0, 1.0, 3.0));
    }
}
