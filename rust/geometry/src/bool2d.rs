// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 2D Boolean Operations on Projected Footprints
//!
//! Roof/base clipping, roof overlap removal, footprint unions and opening cuts
//! all happen on 2D projections of planar polygons. This module wraps the
//! i_overlay crate for the area operations and adds the segment-level queries
//! (clipping a wall foot against a roof outline, finding shared ridge lines)
//! that i_overlay does not cover.

use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;
use nalgebra::{Point2, Point3, Vector3};

use crate::buffer::buffer_polygon;
use crate::plane::Plane;
use crate::polygon::{unit_normal, Polygon};

/// Epsilon for floating point comparisons in 2D operations
const EPSILON_2D: f64 = 1e-9;

/// Minimum area threshold - regions smaller than this are considered degenerate
const MIN_AREA_THRESHOLD: f64 = 1e-8;

/// Implicitly closed 2D contour.
pub type Contour = Vec<Point2<f64>>;

/// A 2D area: counter-clockwise outer contour and clockwise holes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Region2D {
    pub outer: Contour,
    pub holes: Vec<Contour>,
}

impl Region2D {
    pub fn new(outer: Contour) -> Self {
        Self {
            outer: ensure_ccw(&outer),
            holes: Vec::new(),
        }
    }

    pub fn with_holes(outer: Contour, holes: Vec<Contour>) -> Self {
        Self {
            outer: ensure_ccw(&outer),
            holes: holes.iter().map(|h| ensure_cw(h)).collect(),
        }
    }

    /// Horizontal footprint of a polygon (z dropped).
    pub fn footprint(polygon: &Polygon) -> Self {
        let flat = |ring: &[Point3<f64>]| ring.iter().map(|p| Point2::new(p.x, p.y)).collect();
        Self::with_holes(flat(&polygon.outer), polygon.holes.iter().map(|h| flat(h)).collect())
    }

    /// Enclosed area (outer minus holes).
    pub fn area(&self) -> f64 {
        compute_signed_area(&self.outer).abs()
            - self
                .holes
                .iter()
                .map(|h| compute_signed_area(h).abs())
                .sum::<f64>()
    }

    /// True when `point` is on the boundary of any contour within `tolerance`.
    pub fn on_boundary(&self, point: &Point2<f64>, tolerance: f64) -> bool {
        std::iter::once(&self.outer)
            .chain(&self.holes)
            .any(|c| distance_to_contour(point, c) <= tolerance)
    }

    /// Boundary-inclusive containment test.
    pub fn contains(&self, point: &Point2<f64>, tolerance: f64) -> bool {
        if self.on_boundary(point, tolerance) {
            return true;
        }
        point_in_contour(point, &self.outer) && !self.holes.iter().any(|h| point_in_contour(point, h))
    }

    /// Moves every vertex within `tolerance` of a reference point onto it.
    ///
    /// Boolean results are rounded internally; snapping restores the exact
    /// source coordinates so shared edges keep matching vertex for vertex.
    pub fn snap_to(&mut self, references: &[Point2<f64>], tolerance: f64) {
        let snap = |p: &mut Point2<f64>| {
            if let Some(r) = references
                .iter()
                .find(|r| (r.x - p.x).abs() <= tolerance && (r.y - p.y).abs() <= tolerance)
            {
                *p = *r;
            }
        };
        self.outer.iter_mut().for_each(snap);
        self.holes.iter_mut().flatten().for_each(snap);
    }

    /// Grows the region by `distance` (holes shrink); negative values erode.
    pub fn buffered(&self, distance: f64) -> Option<Region2D> {
        let lift = |c: &Contour| c.iter().map(|p| Point3::new(p.x, p.y, 0.0)).collect::<Vec<_>>();
        let polygon = Polygon::with_holes(lift(&self.outer), self.holes.iter().map(lift).collect());
        buffer_polygon(&polygon, distance).map(|grown| Region2D::footprint(&grown))
    }

    /// All vertices, outer contour first.
    pub fn vertices(&self) -> impl Iterator<Item = &Point2<f64>> {
        self.outer.iter().chain(self.holes.iter().flatten())
    }
}

/// Drops one coordinate axis of a plane and recovers it again on lifting.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    plane: Plane,
    u: usize,
    v: usize,
    w: usize,
}

impl Projection {
    /// Projection onto XY, valid for any non-vertical plane.
    pub fn xy(plane: Plane) -> Self {
        Self {
            plane,
            u: 0,
            v: 1,
            w: 2,
        }
    }

    /// Projection that drops the axis the plane normal points along most.
    pub fn dominant(plane: Plane) -> Self {
        let n = plane.normal;
        let (ax, ay, az) = (n.x.abs(), n.y.abs(), n.z.abs());
        let (u, v, w) = if az >= ax && az >= ay {
            (0, 1, 2)
        } else if ay >= ax {
            (2, 0, 1)
        } else {
            (1, 2, 0)
        };
        Self { plane, u, v, w }
    }

    pub fn plane(&self) -> &Plane {
        &self.plane
    }

    #[inline]
    pub fn to_2d(&self, p: &Point3<f64>) -> Point2<f64> {
        Point2::new(p[self.u], p[self.v])
    }

    /// Point on the plane above the 2D position; `None` if the plane is
    /// parallel to the dropped axis.
    pub fn lift(&self, p: &Point2<f64>) -> Option<Point3<f64>> {
        let n = &self.plane.normal;
        let o = &self.plane.point;
        if n[self.w].abs() < EPSILON_2D {
            return None;
        }
        let mut out = Point3::origin();
        out[self.u] = p.x;
        out[self.v] = p.y;
        out[self.w] = o[self.w] - (n[self.u] * (p.x - o[self.u]) + n[self.v] * (p.y - o[self.v])) / n[self.w];
        Some(out)
    }

    pub fn region(&self, polygon: &Polygon) -> Region2D {
        let flat = |ring: &[Point3<f64>]| ring.iter().map(|p| self.to_2d(p)).collect::<Contour>();
        Region2D::with_holes(flat(&polygon.outer), polygon.holes.iter().map(|h| flat(h)).collect())
    }

    /// Lifts a region back onto the plane, wound to agree with the plane normal.
    pub fn lift_region(&self, region: &Region2D) -> Option<Polygon> {
        let lift_all = |c: &Contour| c.iter().map(|p| self.lift(p)).collect::<Option<Vec<_>>>();
        let outer = lift_all(&region.outer)?;
        let holes = region
            .holes
            .iter()
            .map(lift_all)
            .collect::<Option<Vec<_>>>()?;
        let polygon = Polygon::with_holes(outer, holes);
        Some(orient_to(polygon, &self.plane.normal))
    }
}

/// Reverses the polygon if its outer ring winds against `normal`.
pub fn orient_to(polygon: Polygon, normal: &Vector3<f64>) -> Polygon {
    match unit_normal(&polygon.outer) {
        Some(n) if n.dot(normal) < 0.0 => polygon.reversed(),
        _ => polygon,
    }
}

/// Intersection of two regions.
pub fn intersect_regions(a: &Region2D, b: &Region2D) -> Vec<Region2D> {
    let subject = region_paths(a);
    let clip = region_paths(b);
    let result = subject.overlay(&clip, OverlayRule::Intersect, FillRule::EvenOdd);
    shapes_to_regions(result)
}

/// `a` minus `b`; several pieces when `b` cuts `a` apart.
pub fn subtract_regions(a: &Region2D, b: &Region2D) -> Vec<Region2D> {
    let subject = region_paths(a);
    let clip = region_paths(b);
    let result = subject.overlay(&clip, OverlayRule::Difference, FillRule::EvenOdd);
    shapes_to_regions(result)
}

/// Union of any number of regions.
pub fn union_regions(regions: &[Region2D]) -> Vec<Region2D> {
    let Some((first, rest)) = regions.split_first() else {
        return Vec::new();
    };
    if rest.is_empty() {
        return vec![first.clone()];
    }
    let subject = region_paths(first);
    let clip: Vec<Vec<[f64; 2]>> = rest.iter().flat_map(region_paths).collect();
    let result = subject.overlay(&clip, OverlayRule::Union, FillRule::NonZero);
    shapes_to_regions(result)
}

/// Parameter intervals `[t0, t1] ⊂ [0, 1]` of segment `a → b` lying inside the
/// region (boundary included).
pub fn clip_segment(
    a: &Point2<f64>,
    b: &Point2<f64>,
    region: &Region2D,
    tolerance: f64,
) -> Vec<(f64, f64)> {
    let r = b - a;
    let len_sq = r.norm_squared();
    if len_sq < EPSILON_2D {
        return Vec::new();
    }

    let mut params = vec![0.0, 1.0];
    for contour in std::iter::once(&region.outer).chain(&region.holes) {
        let n = contour.len();
        for i in 0..n {
            let c = contour[i];
            let e = contour[(i + 1) % n];
            let s = e - c;
            let denom = cross(&r, &s);
            if denom.abs() <= EPSILON_2D * r.norm() * s.norm() {
                // parallel: only collinear edges contribute their end points
                if distance_to_line(&c, a, b) <= tolerance {
                    params.push((c - a).dot(&r) / len_sq);
                    params.push((e - a).dot(&r) / len_sq);
                }
                continue;
            }
            let t = cross(&(c - a), &s) / denom;
            let u = cross(&(c - a), &r) / denom;
            if (-EPSILON_2D..=1.0 + EPSILON_2D).contains(&u) {
                params.push(t);
            }
        }
    }

    params.retain(|t| (0.0..=1.0).contains(t));
    params.sort_by(f64::total_cmp);
    params.dedup_by(|x, y| (*x - *y).abs() < EPSILON_2D);

    let mut intervals: Vec<(f64, f64)> = Vec::new();
    for pair in params.windows(2) {
        let (t0, t1) = (pair[0], pair[1]);
        let mid = a + r * ((t0 + t1) * 0.5);
        if !region.contains(&mid, tolerance) {
            continue;
        }
        match intervals.last_mut() {
            Some(last) if (last.1 - t0).abs() < EPSILON_2D => last.1 = t1,
            _ => intervals.push((t0, t1)),
        }
    }
    intervals
}

/// Overlapping collinear stretches of the edges of two contours.
pub fn shared_segments(
    a: &[Point2<f64>],
    b: &[Point2<f64>],
    tolerance: f64,
) -> Vec<(Point2<f64>, Point2<f64>)> {
    let mut shared = Vec::new();
    let (na, nb) = (a.len(), b.len());
    for i in 0..na {
        let a0 = a[i];
        let a1 = a[(i + 1) % na];
        let r = a1 - a0;
        let len_sq = r.norm_squared();
        if len_sq < EPSILON_2D {
            continue;
        }
        for j in 0..nb {
            let b0 = b[j];
            let b1 = b[(j + 1) % nb];
            if distance_to_line(&b0, &a0, &a1) > tolerance || distance_to_line(&b1, &a0, &a1) > tolerance {
                continue;
            }
            let t0 = (b0 - a0).dot(&r) / len_sq;
            let t1 = (b1 - a0).dot(&r) / len_sq;
            let lo = t0.min(t1).max(0.0);
            let hi = t0.max(t1).min(1.0);
            if (hi - lo) * len_sq.sqrt() > tolerance {
                shared.push((a0 + r * lo, a0 + r * hi));
            }
        }
    }
    shared
}

/// Compute the signed area of a 2D contour
/// Positive = counter-clockwise, Negative = clockwise
pub fn compute_signed_area(contour: &[Point2<f64>]) -> f64 {
    if contour.len() < 3 {
        return 0.0;
    }

    let mut area = 0.0;
    let n = contour.len();

    for i in 0..n {
        let j = (i + 1) % n;
        area += contour[i].x * contour[j].y;
        area -= contour[j].x * contour[i].y;
    }

    area * 0.5
}

/// Ensure contour has counter-clockwise winding (positive area)
pub fn ensure_ccw(contour: &[Point2<f64>]) -> Contour {
    if compute_signed_area(contour) < 0.0 {
        contour.iter().rev().cloned().collect()
    } else {
        contour.to_vec()
    }
}

/// Ensure contour has clockwise winding (for holes)
pub fn ensure_cw(contour: &[Point2<f64>]) -> Contour {
    if compute_signed_area(contour) > 0.0 {
        contour.iter().rev().cloned().collect()
    } else {
        contour.to_vec()
    }
}

/// Check if a point is inside a contour using ray casting
pub fn point_in_contour(point: &Point2<f64>, contour: &[Point2<f64>]) -> bool {
    if contour.len() < 3 {
        return false;
    }

    let mut inside = false;
    let n = contour.len();

    let mut j = n - 1;
    for i in 0..n {
        let pi = &contour[i];
        let pj = &contour[j];

        if ((pi.y > point.y) != (pj.y > point.y))
            && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Distance from a point to the segment `a → b`.
pub fn distance_to_segment(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let r = b - a;
    let len_sq = r.norm_squared();
    if len_sq < EPSILON_2D * EPSILON_2D {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&r) / len_sq).clamp(0.0, 1.0);
    (p - (a + r * t)).norm()
}

fn distance_to_contour(p: &Point2<f64>, contour: &[Point2<f64>]) -> f64 {
    let n = contour.len();
    (0..n)
        .map(|i| distance_to_segment(p, &contour[i], &contour[(i + 1) % n]))
        .fold(f64::INFINITY, f64::min)
}

fn distance_to_line(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let r = b - a;
    let len = r.norm();
    if len < EPSILON_2D {
        return (p - a).norm();
    }
    cross(&r, &(p - a)).abs() / len
}

#[inline]
fn cross(a: &nalgebra::Vector2<f64>, b: &nalgebra::Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

fn region_paths(region: &Region2D) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(ensure_ccw(&region.outer))
        .chain(region.holes.iter().map(|h| ensure_cw(h)))
        .filter(|c| c.len() >= 3)
        .map(|c| c.iter().map(|p| [p.x, p.y]).collect())
        .collect()
}

fn shapes_to_regions(shapes: Vec<Vec<Vec<[f64; 2]>>>) -> Vec<Region2D> {
    shapes
        .into_iter()
        .filter_map(|shape| {
            let mut contours = shape
                .into_iter()
                .map(|c| c.into_iter().map(|p| Point2::new(p[0], p[1])).collect::<Contour>())
                .filter(|c| c.len() >= 3);
            let outer = contours.next()?;
            let region = Region2D::with_holes(
                outer,
                contours
                    .filter(|h| compute_signed_area(h).abs() > MIN_AREA_THRESHOLD)
                    .collect(),
            );
            (region.area() > MIN_AREA_THRESHOLD).then_some(region)
        })
        .collect()
}
