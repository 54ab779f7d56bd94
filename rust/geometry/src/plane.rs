// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planes, lines and the angle/area queries built on them.
//!
//! A polygon's plane is never stored; it is derived on demand from the ring
//! and discarded. Heights on sloped roofs are always taken from exact
//! plane/line intersections, never from interpolated vertex values.

use std::f64::consts::FRAC_PI_2;

use nalgebra::{Point3, Vector3};

use crate::error::{Error, Result};
use crate::polygon::{centroid, signed_area_xy, unit_normal, Polygon, Ring};

/// Below this the cross product of two directions is treated as zero.
const PARALLEL_EPSILON: f64 = 1e-12;

/// Half-width of the band around vertical in which areas are computed on
/// rotated axes instead of the XY projection.
const VERTICAL_BAND: f64 = 0.005;

/// An infinite plane through `point` with unit `normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub point: Point3<f64>,
    pub normal: Vector3<f64>,
}

impl Plane {
    /// Builds a plane from a point and any non-zero normal.
    pub fn new(point: Point3<f64>, normal: Vector3<f64>) -> Result<Self> {
        let len = normal.norm();
        if len < PARALLEL_EPSILON {
            return Err(Error::DegeneratePlane);
        }
        Ok(Self {
            point,
            normal: normal / len,
        })
    }

    /// Plane through three points; fails when they are collinear.
    pub fn from_points(p1: Point3<f64>, p2: Point3<f64>, p3: Point3<f64>) -> Result<Self> {
        let normal = (p2 - p1).cross(&(p3 - p1));
        let scale = (p2 - p1).norm() * (p3 - p1).norm();
        if scale < PARALLEL_EPSILON || normal.norm() <= scale * 1e-10 {
            return Err(Error::DegeneratePlane);
        }
        Self::new(p1, normal)
    }

    /// Best-fit plane of a ring: Newell normal through the vertex average.
    pub fn from_ring(ring: &[Point3<f64>]) -> Result<Self> {
        let normal = unit_normal(ring).ok_or(Error::DegeneratePlane)?;
        let point = centroid(ring).ok_or(Error::DegeneratePlane)?;
        Ok(Self { point, normal })
    }

    /// A vertical plane containing the horizontal direction `along` through `point`.
    pub fn vertical_through(point: Point3<f64>, along: Vector3<f64>) -> Result<Self> {
        Self::new(point, Vector3::new(along.y, -along.x, 0.0))
    }

    #[inline]
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&(p - self.point))
    }

    /// Orthogonal projection of `p` onto the plane.
    #[inline]
    pub fn project(&self, p: &Point3<f64>) -> Point3<f64> {
        p - self.normal * self.signed_distance(p)
    }

    /// Height of the plane above (x, y); `None` for vertical planes.
    pub fn z_at(&self, x: f64, y: f64) -> Option<f64> {
        intersect_plane_line(self, &Line3::vertical(x, y)).map(|p| p.z)
    }

    /// True when the normal is (nearly) horizontal.
    #[inline]
    pub fn is_vertical(&self, tolerance: f64) -> bool {
        self.normal.z.abs() < tolerance
    }
}

/// An infinite line through `point` along `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line3 {
    pub point: Point3<f64>,
    pub direction: Vector3<f64>,
}

impl Line3 {
    /// Line through two distinct points.
    pub fn through(a: Point3<f64>, b: Point3<f64>) -> Option<Self> {
        let direction = b - a;
        if direction.norm() < PARALLEL_EPSILON {
            return None;
        }
        Some(Self {
            point: a,
            direction,
        })
    }

    /// Vertical line through (x, y).
    pub fn vertical(x: f64, y: f64) -> Self {
        Self {
            point: Point3::new(x, y, 0.0),
            direction: Vector3::z(),
        }
    }

    #[inline]
    pub fn point_at(&self, t: f64) -> Point3<f64> {
        self.point + self.direction * t
    }

    /// Point on the line whose horizontal position is closest to (x, y).
    ///
    /// Returns `None` for vertical lines, which have no unique answer.
    pub fn point_at_xy(&self, x: f64, y: f64) -> Option<Point3<f64>> {
        let dx = self.direction.x;
        let dy = self.direction.y;
        let len_sq = dx * dx + dy * dy;
        if len_sq < PARALLEL_EPSILON {
            return None;
        }
        let t = ((x - self.point.x) * dx + (y - self.point.y) * dy) / len_sq;
        Some(self.point_at(t))
    }
}

/// Plane through three points.
pub fn plane_from_points(p1: Point3<f64>, p2: Point3<f64>, p3: Point3<f64>) -> Result<Plane> {
    Plane::from_points(p1, p2, p3)
}

/// Intersection line of two planes, `None` when they are parallel.
pub fn intersect_planes(a: &Plane, b: &Plane) -> Option<Line3> {
    let direction = a.normal.cross(&b.normal);
    if direction.norm() < 1e-9 {
        return None;
    }
    let d1 = a.normal.dot(&a.point.coords);
    let d2 = b.normal.dot(&b.point.coords);
    let n11 = a.normal.dot(&a.normal);
    let n22 = b.normal.dot(&b.normal);
    let n12 = a.normal.dot(&b.normal);
    let det = n11 * n22 - n12 * n12;
    let c1 = (d1 * n22 - d2 * n12) / det;
    let c2 = (d2 * n11 - d1 * n12) / det;
    Some(Line3 {
        point: Point3::from(a.normal * c1 + b.normal * c2),
        direction,
    })
}

/// Intersection point of a plane and a line, `None` when they are parallel.
pub fn intersect_plane_line(plane: &Plane, line: &Line3) -> Option<Point3<f64>> {
    let denom = plane.normal.dot(&line.direction);
    if denom.abs() < PARALLEL_EPSILON * line.direction.norm().max(1.0) {
        return None;
    }
    let t = plane.normal.dot(&(plane.point - line.point)) / denom;
    Some(line.point_at(t))
}

/// Angle in `[0, π]` between the polygon's plane and the horizontal plane.
///
/// Horizontal polygons facing up give 0, facing down π, vertical ones π/2.
pub fn inclination(polygon: &Polygon) -> Result<f64> {
    let normal = polygon.normal().ok_or(Error::DegeneratePlane)?;
    Ok(normal.z.clamp(-1.0, 1.0).acos())
}

/// Compass direction of the polygon's normal in degrees, `[0, 360)`.
pub fn azimuth(polygon: &Polygon) -> Result<f64> {
    let normal = polygon.normal().ok_or(Error::DegeneratePlane)?;
    Ok(azimuth_of(&normal))
}

pub(crate) fn azimuth_of(normal: &Vector3<f64>) -> f64 {
    if normal.x.abs() < PARALLEL_EPSILON {
        return if normal.y > 0.001 {
            90.0
        } else if normal.y < -0.001 {
            270.0
        } else {
            0.0
        };
    }
    let degrees = normal.y.atan2(normal.x).to_degrees();
    if degrees < 0.0 {
        degrees + 360.0
    } else {
        degrees
    }
}

/// True surface area of a set of planar polygons.
///
/// The XY-projected area (outer minus holes) is divided by the cosine of the
/// inclination. Near-vertical polygons have a vanishing projection, so their
/// axes are rotated (x, y, z) → (y, z, x) until the projection is usable.
pub fn area_3d(polygons: &[Polygon]) -> f64 {
    polygons.iter().map(polygon_area).sum()
}

fn polygon_area(polygon: &Polygon) -> f64 {
    let mut outer = polygon.outer.clone();
    let mut holes = polygon.holes.clone();

    for _ in 0..3 {
        let Some(normal) = unit_normal(&outer) else {
            return 0.0;
        };
        let tilt = normal.z.clamp(-1.0, 1.0).acos();
        if (tilt - FRAC_PI_2).abs() < VERTICAL_BAND {
            outer = rotate_axes(&outer);
            holes = holes.iter().map(|h| rotate_axes(h)).collect();
            continue;
        }
        let projected = signed_area_xy(&outer).abs()
            - holes.iter().map(|h| signed_area_xy(h).abs()).sum::<f64>();
        return projected / tilt.cos().abs();
    }
    0.0
}

fn rotate_axes(ring: &[Point3<f64>]) -> Ring {
    ring.iter().map(|p| Point3::new(p.y, p.z, p.x)).collect()
}
