// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar rings and polygons in 3D.
//!
//! Rings are implicitly closed: the first vertex is never repeated at the end.
//! Outer rings of envelope surfaces are wound so that Newell's normal points
//! out of the building; holes run the opposite way.

use nalgebra::{Point3, Vector3};

use crate::error::Result;
use crate::plane::Plane;

/// Implicitly closed ring of vertices.
pub type Ring = Vec<Point3<f64>>;

/// Coordinates closer than this are treated as the same vertex when cleaning rings.
pub const VERTEX_EPSILON: f64 = 1e-9;

/// A planar polygon: one outer ring and zero or more holes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    pub outer: Ring,
    pub holes: Vec<Ring>,
}

impl Polygon {
    /// Creates a polygon without holes. A repeated closing vertex is dropped.
    pub fn new(outer: Ring) -> Self {
        Self {
            outer: open_ring(outer),
            holes: Vec::new(),
        }
    }

    pub fn with_holes(outer: Ring, holes: Vec<Ring>) -> Self {
        Self {
            outer: open_ring(outer),
            holes: holes.into_iter().map(open_ring).collect(),
        }
    }

    /// True when the outer ring spans at least a triangle.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.outer.len() >= 3
    }

    /// Unit normal of the outer ring (Newell's method), or `None` when degenerate.
    pub fn normal(&self) -> Option<Vector3<f64>> {
        unit_normal(&self.outer)
    }

    /// Supporting plane of the outer ring.
    pub fn plane(&self) -> Result<Plane> {
        Plane::from_ring(&self.outer)
    }

    /// Surface area in 3D (outer minus holes).
    pub fn area(&self) -> f64 {
        crate::plane::area_3d(std::slice::from_ref(self))
    }

    /// Iterates all vertices, outer ring first.
    pub fn vertices(&self) -> impl Iterator<Item = &Point3<f64>> {
        self.outer.iter().chain(self.holes.iter().flatten())
    }

    pub fn min_z(&self) -> f64 {
        self.outer.iter().map(|p| p.z).fold(f64::INFINITY, f64::min)
    }

    pub fn max_z(&self) -> f64 {
        self.outer.iter().map(|p| p.z).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Same polygon with every ring traversed backwards (normal flipped).
    pub fn reversed(&self) -> Polygon {
        Polygon {
            outer: self.outer.iter().rev().copied().collect(),
            holes: self
                .holes
                .iter()
                .map(|h| h.iter().rev().copied().collect())
                .collect(),
        }
    }

    /// Edges of the outer ring as consecutive vertex pairs, closing edge included.
    pub fn outer_edges(&self) -> impl Iterator<Item = (Point3<f64>, Point3<f64>)> + '_ {
        let n = self.outer.len();
        (0..n).map(move |i| (self.outer[i], self.outer[(i + 1) % n]))
    }

    /// Axis-aligned bounds of the outer ring.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        bounds(self.outer.iter())
    }
}

/// Drops an explicit closing vertex and consecutive duplicates.
pub fn open_ring(points: Vec<Point3<f64>>) -> Ring {
    let mut ring: Ring = Vec::with_capacity(points.len());
    for p in points {
        if ring
            .last()
            .map_or(true, |last| !points_coincide(last, &p, VERTEX_EPSILON))
        {
            ring.push(p);
        }
    }
    while ring.len() > 1 && points_coincide(&ring[0], &ring[ring.len() - 1], VERTEX_EPSILON) {
        ring.pop();
    }
    ring
}

/// Per-coordinate coincidence test.
#[inline]
pub fn points_coincide(a: &Point3<f64>, b: &Point3<f64>, tolerance: f64) -> bool {
    (a.x - b.x).abs() <= tolerance && (a.y - b.y).abs() <= tolerance && (a.z - b.z).abs() <= tolerance
}

/// Per-coordinate coincidence in the horizontal plane only.
#[inline]
pub fn points_coincide_xy(a: &Point3<f64>, b: &Point3<f64>, tolerance: f64) -> bool {
    (a.x - b.x).abs() <= tolerance && (a.y - b.y).abs() <= tolerance
}

/// Area-weighted normal of a ring using Newell's method (not normalized).
///
/// Collinear and repeated vertices do not change the result, which makes it
/// the preferred normal for rings straight out of a merge.
pub fn newell_normal(ring: &[Point3<f64>]) -> Vector3<f64> {
    let mut normal = Vector3::zeros();
    let n = ring.len();
    for i in 0..n {
        let curr = &ring[i];
        let next = &ring[(i + 1) % n];
        normal.x += (curr.y - next.y) * (curr.z + next.z);
        normal.y += (curr.z - next.z) * (curr.x + next.x);
        normal.z += (curr.x - next.x) * (curr.y + next.y);
    }
    normal
}

/// Unit Newell normal, `None` for degenerate rings.
pub fn unit_normal(ring: &[Point3<f64>]) -> Option<Vector3<f64>> {
    if ring.len() < 3 {
        return None;
    }
    let normal = newell_normal(ring);
    let len = normal.norm();
    if len < 1e-12 {
        return None;
    }
    Some(normal / len)
}

/// Perimeter of a closed ring.
pub fn ring_length(ring: &[Point3<f64>]) -> f64 {
    let n = ring.len();
    if n < 2 {
        return 0.0;
    }
    (0..n).map(|i| (ring[(i + 1) % n] - ring[i]).norm()).sum()
}

/// Signed area of the ring's XY projection (positive = counter-clockwise from above).
pub fn signed_area_xy(ring: &[Point3<f64>]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += ring[i].x * ring[j].y - ring[j].x * ring[i].y;
    }
    area * 0.5
}

/// Axis-aligned bounds of a point set.
pub fn bounds<'a>(
    points: impl IntoIterator<Item = &'a Point3<f64>>,
) -> Option<(Point3<f64>, Point3<f64>)> {
    let mut iter = points.into_iter();
    let first = *iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), p| {
        (
            Point3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
            Point3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
        )
    }))
}

/// Vertex average of a ring.
pub fn centroid(ring: &[Point3<f64>]) -> Option<Point3<f64>> {
    if ring.is_empty() {
        return None;
    }
    let sum = ring.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Some(Point3::from(sum / ring.len() as f64))
}
