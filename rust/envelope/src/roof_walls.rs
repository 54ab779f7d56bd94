// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Walls between roofs at different heights.
//!
//! Two roofs that share a boundary line at different heights are joined by a
//! vertical wall along that line. A roof that overhangs another one in plan
//! gets walls along its own outline inside the lower roof, and the covered
//! part is cut out of the lower roof.

use ifc2citygml_geometry::bool2d::{intersect_regions, shared_segments, subtract_regions, Contour, Projection, Region2D};
use ifc2citygml_geometry::{Point2, Point3, Polygon};

use crate::config::ReconstructionConfig;
use crate::context::{Phase, Progress};
use crate::error::Result;
use crate::extract::Patch;

/// Overlaps below this area (m²) are touching roofs, not overlapping ones.
const MIN_OVERLAP_AREA: f64 = 1e-6;

/// Distance of the point probed to find the upper roof's side of a wall.
const SIDE_PROBE: f64 = 1e-3;

const MIN_WALL_AREA: f64 = 1e-6;

/// A vertical quadrilateral between two roofs, heights linear along its foot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StepWall {
    pub start: Point2<f64>,
    pub end: Point2<f64>,
    /// Bottom heights at start and end.
    pub bottom: [f64; 2],
    /// Top heights at start and end.
    pub top: [f64; 2],
}

impl StepWall {
    /// Wall polygon facing to the right of `start → end`.
    pub fn polygon(&self) -> Option<Polygon> {
        let at = |p: &Point2<f64>, z: f64| Point3::new(p.x, p.y, z);
        let polygon = Polygon::new(vec![
            at(&self.start, self.bottom[0]),
            at(&self.end, self.bottom[1]),
            at(&self.end, self.top[1]),
            at(&self.start, self.top[0]),
        ]);
        (polygon.is_valid() && polygon.area() > MIN_WALL_AREA).then_some(polygon)
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    pub fn low(&self) -> f64 {
        self.bottom[0].min(self.bottom[1])
    }

    pub fn high(&self) -> f64 {
        self.top[0].max(self.top[1])
    }

    /// The part between parameters `u0 < u1` along the foot.
    pub fn slice(&self, u0: f64, u1: f64) -> StepWall {
        let lerp = |a: f64, b: f64, u: f64| a + (b - a) * u;
        let point = |u: f64| self.start + (self.end - self.start) * u;
        StepWall {
            start: point(u0),
            end: point(u1),
            bottom: [lerp(self.bottom[0], self.bottom[1], u0), lerp(self.bottom[0], self.bottom[1], u1)],
            top: [lerp(self.top[0], self.top[1], u0), lerp(self.top[0], self.top[1], u1)],
        }
    }

    fn reversed(self) -> StepWall {
        StepWall {
            start: self.end,
            end: self.start,
            bottom: [self.bottom[1], self.bottom[0]],
            top: [self.top[1], self.top[0]],
        }
    }

    /// Orients the wall so the upper roof lies on its back (left) side.
    fn facing_away_from(self, upper: &Region2D) -> StepWall {
        let dir = self.end - self.start;
        let len = dir.norm();
        if len < f64::EPSILON {
            return self;
        }
        let left = nalgebra::Vector2::new(-dir.y, dir.x) / len;
        let mid = self.start + dir * 0.5;
        if upper.contains(&(mid + left * SIDE_PROBE), 0.0) {
            self
        } else {
            self.reversed()
        }
    }
}

/// Builds walls between every pair of roofs and removes hidden roof parts.
///
/// Roof pieces split off by an overlap are appended to `roofs`; roofs that
/// end up fully covered are removed.
pub(crate) fn inter_roof_walls(
    roofs: &mut Vec<Patch>,
    config: &ReconstructionConfig,
    progress: &mut Progress,
) -> Result<Vec<StepWall>> {
    progress.begin(Phase::InterRoofWalls)?;

    let n = roofs.len();
    if n < 2 {
        progress.finish(Phase::InterRoofWalls);
        return Ok(Vec::new());
    }
    let step = 1.0 / (n * n.saturating_sub(1) / 2).max(1) as f64;
    let mut hidden = vec![false; n];
    let mut walls = Vec::new();

    for i in 0..n {
        for j in i + 1..n {
            progress.checkpoint()?;
            if hidden[i] || hidden[j] {
                progress.step(Phase::InterRoofWalls, step);
                continue;
            }
            let fa = roofs[i].footprint();
            let fb = roofs[j].footprint();
            let overlaps: Vec<Region2D> = intersect_regions(&fa, &fb)
                .into_iter()
                .filter(|r| r.area() > MIN_OVERLAP_AREA)
                .collect();

            if overlaps.is_empty() {
                walls.extend(ridge_walls((&roofs[i], &fa), (&roofs[j], &fb), config));
            }
            for overlap in &overlaps {
                let (upper, lower) = if mean_height(&roofs[i], overlap) >= mean_height(&roofs[j], overlap) {
                    (i, j)
                } else {
                    (j, i)
                };
                let (fu, fl) = if upper == i { (&fa, &fb) } else { (&fb, &fa) };
                walls.extend(overlap_walls(overlap, (&roofs[upper], fu), (&roofs[lower], fl), config));
                if !cut_out(roofs, lower, overlap, config) {
                    hidden[lower] = true;
                }
            }
            progress.step(Phase::InterRoofWalls, step);
        }
    }

    let mut index = 0;
    roofs.retain(|_| {
        let keep = !hidden.get(index).copied().unwrap_or(false);
        index += 1;
        keep
    });

    tracing::debug!(
        walls = walls.len(),
        hidden = hidden.iter().filter(|h| **h).count(),
        roofs = roofs.len(),
        "inter-roof walls generated"
    );
    Ok(walls)
}

/// Walls along boundary lines two non-overlapping roofs share.
fn ridge_walls(a: (&Patch, &Region2D), b: (&Patch, &Region2D), config: &ReconstructionConfig) -> Vec<StepWall> {
    let (roof_a, fa) = a;
    let (roof_b, fb) = b;
    let mut walls = Vec::new();
    for ca in contours(fa) {
        for cb in contours(fb) {
            for (p, q) in shared_segments(ca, cb, config.contact_tolerance) {
                let heights = (roof_a.z_at(&p), roof_a.z_at(&q), roof_b.z_at(&p), roof_b.z_at(&q));
                let (Some(a0), Some(a1), Some(b0), Some(b1)) = heights else {
                    continue;
                };
                if (a0 - b0).abs().max((a1 - b1).abs()) <= config.step_tolerance {
                    continue;
                }
                let upper = if a0 + a1 >= b0 + b1 { fa } else { fb };
                let wall = StepWall {
                    start: p,
                    end: q,
                    bottom: [a0.min(b0), a1.min(b1)],
                    top: [a0.max(b0), a1.max(b1)],
                };
                walls.push(wall.facing_away_from(upper));
            }
        }
    }
    walls
}

/// Walls along the parts of the overlap outline that belong to the upper
/// roof's outline only.
fn overlap_walls(
    overlap: &Region2D,
    upper: (&Patch, &Region2D),
    lower: (&Patch, &Region2D),
    config: &ReconstructionConfig,
) -> Vec<StepWall> {
    let (upper_roof, fu) = upper;
    let (lower_roof, fl) = lower;
    let tol = config.contact_tolerance;
    let mut walls = Vec::new();
    for contour in contours(overlap) {
        let n = contour.len();
        for k in 0..n {
            let (p, q) = (contour[k], contour[(k + 1) % n]);
            let mid = Point2::from((p.coords + q.coords) * 0.5);
            if !fu.on_boundary(&mid, tol) || fl.on_boundary(&mid, tol) {
                continue;
            }
            let heights = (upper_roof.z_at(&p), upper_roof.z_at(&q), lower_roof.z_at(&p), lower_roof.z_at(&q));
            let (Some(u0), Some(u1), Some(l0), Some(l1)) = heights else {
                continue;
            };
            if (u0 - l0).abs().max((u1 - l1).abs()) <= config.step_tolerance {
                continue;
            }
            let wall = StepWall {
                start: p,
                end: q,
                bottom: [u0.min(l0), u1.min(l1)],
                top: [u0.max(l0), u1.max(l1)],
            };
            walls.push(wall.facing_away_from(fu));
        }
    }
    walls
}

/// Removes `overlap` from roof `index`. Returns false when nothing is left.
fn cut_out(roofs: &mut Vec<Patch>, index: usize, overlap: &Region2D, config: &ReconstructionConfig) -> bool {
    let roof = &roofs[index];
    let footprint = roof.footprint();
    let references: Vec<Point2<f64>> = footprint.vertices().chain(overlap.vertices()).copied().collect();
    let projection = Projection::xy(roof.plane);
    let source = roof.source;

    let mut pieces: Vec<Polygon> = subtract_regions(&footprint, overlap)
        .into_iter()
        .filter_map(|mut piece| {
            piece.snap_to(&references, config.contact_tolerance);
            projection.lift_region(&piece)
        })
        .collect();
    if pieces.is_empty() {
        return false;
    }

    pieces.sort_by(|a, b| b.area().total_cmp(&a.area()));
    let mut pieces = pieces.into_iter().filter_map(|p| Patch::new(p, source));
    match pieces.next() {
        Some(largest) => roofs[index] = largest,
        None => return false,
    }
    roofs.extend(pieces);
    true
}

fn contours(region: &Region2D) -> impl Iterator<Item = &Contour> {
    std::iter::once(&region.outer).chain(&region.holes)
}

fn mean_height(roof: &Patch, region: &Region2D) -> f64 {
    let heights: Vec<f64> = region.vertices().filter_map(|p| roof.z_at(p)).collect();
    if heights.is_empty() {
        return f64::NEG_INFINITY;
    }
    heights.iter().sum::<f64>() / heights.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SilentContext;
    use approx::assert_relative_eq;

    fn flat(x0: f64, y0: f64, x1: f64, y1: f64, z: f64) -> Patch {
        Patch::new(
            Polygon::new(vec![
                Point3::new(x0, y0, z),
                Point3::new(x1, y0, z),
                Point3::new(x1, y1, z),
                Point3::new(x0, y1, z),
            ]),
            None,
        )
        .unwrap()
    }

    fn run(roofs: &mut Vec<Patch>) -> Vec<StepWall> {
        let mut ctx = SilentContext;
        let mut progress = Progress::new(&mut ctx, 1, false);
        inter_roof_walls(roofs, &ReconstructionConfig::default(), &mut progress).unwrap()
    }

    #[test]
    fn adjacent_roofs_at_two_heights_get_a_step_wall() {
        let mut roofs = vec![flat(0.0, 0.0, 5.0, 10.0, 5.0), flat(5.0, 0.0, 10.0, 10.0, 3.0)];
        let walls = run(&mut roofs);
        assert_eq!(walls.len(), 1);
        let wall = walls[0].polygon().unwrap();
        assert_relative_eq!(wall.area(), 20.0, epsilon = 1e-9);
        // faces the lower roof
        assert!(wall.normal().unwrap().x > 0.99);
        assert_eq!(roofs.len(), 2);
    }

    #[test]
    fn gable_ridge_needs_no_wall() {
        let slope = |y0: f64, y1: f64, z0: f64, z1: f64| {
            Patch::new(
                Polygon::new(vec![
                    Point3::new(0.0, y0, z0),
                    Point3::new(10.0, y0, z0),
                    Point3::new(10.0, y1, z1),
                    Point3::new(0.0, y1, z1),
                ]),
                None,
            )
            .unwrap()
        };
        let mut roofs = vec![slope(0.0, 5.0, 3.0, 6.0), slope(5.0, 10.0, 6.0, 3.0)];
        assert!(run(&mut roofs).is_empty());
    }

    #[test]
    fn overlapping_roof_is_walled_and_cut_out() {
        let mut roofs = vec![flat(0.0, 0.0, 10.0, 10.0, 3.0), flat(2.0, 2.0, 4.0, 4.0, 5.0)];
        let walls = run(&mut roofs);
        assert_eq!(walls.len(), 4);
        for wall in &walls {
            let polygon = wall.polygon().unwrap();
            assert_relative_eq!(polygon.area(), 4.0, epsilon = 1e-6);
            // every wall faces out of the raised part
            let n = polygon.normal().unwrap();
            let centre = Point2::new(3.0, 3.0);
            let outward = Point2::new(wall.start.x, wall.start.y) - centre;
            assert!(n.x * outward.x + n.y * outward.y > 0.0);
        }
        assert_eq!(roofs.len(), 2);
        assert_eq!(roofs[0].polygon.holes.len(), 1);
        assert_relative_eq!(roofs[0].polygon.area(), 96.0, epsilon = 1e-6);
        assert_relative_eq!(roofs[0].polygon.max_z(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn fully_covered_roof_is_dropped() {
        let mut roofs = vec![flat(0.0, 0.0, 4.0, 4.0, 3.0), flat(0.0, 0.0, 4.0, 4.0, 5.0)];
        let walls = run(&mut roofs);
        assert!(walls.is_empty());
        assert_eq!(roofs.len(), 1);
        assert_relative_eq!(roofs[0].polygon.max_z(), 5.0);
    }

    #[test]
    fn slicing_interpolates_heights() {
        let wall = StepWall {
            start: Point2::new(0.0, 0.0),
            end: Point2::new(10.0, 0.0),
            bottom: [0.0, 2.0],
            top: [4.0, 8.0],
        };
        let part = wall.slice(0.5, 1.0);
        assert_relative_eq!(part.start.x, 5.0);
        assert_relative_eq!(part.bottom[0], 1.0);
        assert_relative_eq!(part.top[0], 6.0);
        assert_relative_eq!(part.length(), 5.0);
        assert_relative_eq!(part.low(), 1.0);
        assert_relative_eq!(part.high(), 8.0);
    }
}
