// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Walls along the base outline.
//!
//! Every base edge is clipped against the roof footprints. Each covered
//! stretch takes its height from the line where the vertical wall plane meets
//! the roof plane, and the wall top follows the highest roof above every
//! point of the edge, steps included. Stretches without a roof borrow a
//! height from their neighbourhood and are collected into flat filler roofs
//! so the shell stays closed.

use ifc2citygml_geometry::bool2d::{clip_segment, orient_to, Region2D};
use ifc2citygml_geometry::polygon::open_ring;
use ifc2citygml_geometry::simplify::merge_chain;
use ifc2citygml_geometry::{intersect_planes, simplify_polygon, Plane, Point2, Point3, Polygon, Vector3};
use rustc_hash::FxHashMap;

use crate::config::ReconstructionConfig;
use crate::context::{Phase, Progress};
use crate::error::{Error, Result};
use crate::extract::Patch;

/// Parameters closer than this are the same position along an edge.
const PARAM_EPSILON: f64 = 1e-9;

/// Wall polygons with less area are dropped.
const MIN_WALL_AREA: f64 = 1e-6;

#[derive(Debug, Default)]
pub(crate) struct WallOutput {
    pub walls: Vec<Polygon>,
    /// Flat roofs closing the stretches that had no roof above them.
    pub fillers: Vec<Patch>,
}

/// A base edge, counter-clockwise around the building seen from above.
#[derive(Debug, Clone, Copy)]
struct Edge {
    a: Point3<f64>,
    b: Point3<f64>,
}

impl Edge {
    fn at(&self, t: f64, z: f64) -> Point3<f64> {
        let p = self.a + (self.b - self.a) * t;
        Point3::new(p.x, p.y, z)
    }
}

/// Height of one roof along a covered stretch `[t0, t1]` of an edge.
#[derive(Debug, Clone, Copy)]
struct RoofSegment {
    t0: f64,
    t1: f64,
    z0: f64,
    z1: f64,
}

impl RoofSegment {
    fn z(&self, t: f64) -> f64 {
        let span = self.t1 - self.t0;
        if span.abs() < PARAM_EPSILON {
            return self.z0.max(self.z1);
        }
        self.z0 + (self.z1 - self.z0) * (t - self.t0) / span
    }

    fn covers(&self, t: f64) -> bool {
        t >= self.t0 - PARAM_EPSILON && t <= self.t1 + PARAM_EPSILON
    }
}

/// Stretch of the wall top with linear height; `covered` is false where no
/// roof is above the edge.
#[derive(Debug, Clone, Copy)]
struct Piece {
    t0: f64,
    t1: f64,
    z0: f64,
    z1: f64,
    covered: bool,
}

/// Highest resolved wall top per corner position.
struct CornerHeights {
    grid: f64,
    heights: FxHashMap<(i64, i64), f64>,
}

impl CornerHeights {
    fn new(grid: f64) -> Self {
        Self {
            grid,
            heights: FxHashMap::default(),
        }
    }

    fn key(&self, p: &Point3<f64>) -> (i64, i64) {
        ((p.x / self.grid).round() as i64, (p.y / self.grid).round() as i64)
    }

    fn record(&mut self, p: &Point3<f64>, z: f64) {
        let key = self.key(p);
        let entry = self.heights.entry(key).or_insert(z);
        *entry = entry.max(z);
    }

    fn get(&self, p: &Point3<f64>) -> Option<f64> {
        self.heights.get(&self.key(p)).copied()
    }
}

pub(crate) fn generate_walls(
    bases: &[Patch],
    roofs: &[Patch],
    nominal_top: Option<f64>,
    config: &ReconstructionConfig,
    progress: &mut Progress,
) -> Result<WallOutput> {
    progress.begin(Phase::Walls)?;

    let footprints: Vec<Region2D> = roofs.iter().map(Patch::footprint).collect();
    let edges: Vec<Edge> = bases
        .iter()
        .flat_map(|base| std::iter::once(&base.polygon.outer).chain(&base.polygon.holes))
        .flat_map(|ring| {
            let n = ring.len();
            (0..n).map(move |i| Edge {
                a: ring[i],
                b: ring[(i + 1) % n],
            })
        })
        .collect();

    let tolerances = config.wall_simplify.tolerances();
    let mut corners = CornerHeights::new(config.contact_tolerance);
    let mut walls = Vec::new();
    let mut missing: Vec<Vec<Point3<f64>>> = Vec::new();
    let mut uncovered = Vec::new();

    let step = 1.0 / edges.len().max(1) as f64;
    for edge in &edges {
        progress.checkpoint()?;
        let segments = roof_segments(edge, roofs, &footprints, config.contact_tolerance);
        match resolve(top_profile(&segments)) {
            Some(pieces) => {
                if let (Some(first), Some(last)) = (pieces.first(), pieces.last()) {
                    corners.record(&edge.a, first.z0);
                    corners.record(&edge.b, last.z1);
                }
                missing.extend(
                    pieces
                        .iter()
                        .filter(|p| !p.covered)
                        .map(|p| vec![edge.at(p.t0, p.z0), edge.at(p.t1, p.z1)]),
                );
                walls.extend(wall_polygon(edge, &pieces, tolerances));
            }
            None => uncovered.push(*edge),
        }
        progress.step(Phase::Walls, step);
    }

    // edges without any roof take the corner heights of their neighbours
    for edge in &uncovered {
        let za = corners.get(&edge.a).or(nominal_top);
        let zb = corners.get(&edge.b).or(nominal_top);
        let (Some(za), Some(zb)) = (za, zb) else {
            progress.report(Error::missing(format!(
                "no roof or height for the wall at ({:.3}, {:.3})",
                edge.a.x, edge.a.y
            )));
            continue;
        };
        let piece = Piece {
            t0: 0.0,
            t1: 1.0,
            z0: za,
            z1: zb,
            covered: false,
        };
        missing.push(vec![edge.at(0.0, za), edge.at(1.0, zb)]);
        walls.extend(wall_polygon(edge, &[piece], tolerances));
    }

    let fillers = filler_roofs(&missing, config);
    if !missing.is_empty() {
        progress.log(&format!(
            "{} wall stretches without roof, {} filler roofs added",
            missing.len(),
            fillers.len()
        ));
    }
    tracing::debug!(
        edges = edges.len(),
        uncovered = uncovered.len(),
        walls = walls.len(),
        fillers = fillers.len(),
        "walls generated"
    );
    Ok(WallOutput { walls, fillers })
}

/// Roof heights over the covered stretches of an edge.
fn roof_segments(edge: &Edge, roofs: &[Patch], footprints: &[Region2D], tolerance: f64) -> Vec<RoofSegment> {
    let a = Point2::new(edge.a.x, edge.a.y);
    let b = Point2::new(edge.b.x, edge.b.y);
    let Ok(wall_plane) = Plane::vertical_through(edge.a, edge.b - edge.a) else {
        return Vec::new();
    };

    let mut segments = Vec::new();
    for (roof, footprint) in roofs.iter().zip(footprints) {
        let line = intersect_planes(&wall_plane, &roof.plane);
        let z = |t: f64| {
            let q = a + (b - a) * t;
            line.and_then(|l| l.point_at_xy(q.x, q.y))
                .map(|p| p.z)
                .or_else(|| roof.z_at(&q))
        };
        for (t0, t1) in clip_segment(&a, &b, footprint, tolerance) {
            if t1 - t0 < PARAM_EPSILON {
                continue;
            }
            if let (Some(z0), Some(z1)) = (z(t0), z(t1)) {
                segments.push(RoofSegment { t0, t1, z0, z1 });
            }
        }
    }
    segments
}

/// Upper envelope of the roof segments over `[0, 1]`.
fn top_profile(segments: &[RoofSegment]) -> Vec<Piece> {
    let mut ts = vec![0.0, 1.0];
    for s in segments {
        ts.push(s.t0);
        ts.push(s.t1);
    }
    // where two sloped segments cross, the envelope switches between them
    for (i, s) in segments.iter().enumerate() {
        for o in &segments[i + 1..] {
            let lo = s.t0.max(o.t0);
            let hi = s.t1.min(o.t1);
            if hi - lo <= PARAM_EPSILON {
                continue;
            }
            let d0 = s.z(lo) - o.z(lo);
            let d1 = s.z(hi) - o.z(hi);
            if d0 * d1 < 0.0 {
                ts.push(lo + (hi - lo) * d0 / (d0 - d1));
            }
        }
    }
    ts.retain(|t| (0.0..=1.0).contains(t));
    ts.sort_by(f64::total_cmp);
    ts.dedup_by(|x, y| (*x - *y).abs() < PARAM_EPSILON);

    ts.windows(2)
        .map(|w| {
            let (t0, t1) = (w[0], w[1]);
            let mid = (t0 + t1) * 0.5;
            let top = segments
                .iter()
                .filter(|s| s.covers(mid))
                .max_by(|x, y| x.z(mid).total_cmp(&y.z(mid)));
            match top {
                Some(s) => Piece {
                    t0,
                    t1,
                    z0: s.z(t0),
                    z1: s.z(t1),
                    covered: true,
                },
                None => Piece {
                    t0,
                    t1,
                    z0: f64::NAN,
                    z1: f64::NAN,
                    covered: false,
                },
            }
        })
        .collect()
}

/// Gives uncovered pieces the height of the nearest covered one before them,
/// else after them. `None` when nothing covers the edge.
fn resolve(mut pieces: Vec<Piece>) -> Option<Vec<Piece>> {
    if !pieces.iter().any(|p| p.covered) {
        return None;
    }
    let mut before: Option<f64> = None;
    for piece in pieces.iter_mut() {
        if piece.covered {
            before = Some(piece.z1);
        } else if let Some(z) = before {
            piece.z0 = z;
            piece.z1 = z;
        }
    }
    let mut after: Option<f64> = None;
    for piece in pieces.iter_mut().rev() {
        if piece.covered {
            after = Some(piece.z0);
        } else if piece.z0.is_nan() {
            if let Some(z) = after {
                piece.z0 = z;
                piece.z1 = z;
            }
        }
    }
    Some(pieces)
}

/// Bottom along the edge, top along the pieces walked backwards.
fn wall_polygon(
    edge: &Edge,
    pieces: &[Piece],
    tolerances: ifc2citygml_geometry::Tolerances,
) -> Option<Polygon> {
    let mut ring = vec![edge.a, edge.b];
    for piece in pieces.iter().rev() {
        ring.push(edge.at(piece.t1, piece.z1));
        ring.push(edge.at(piece.t0, piece.z0));
    }
    let polygon = simplify_polygon(&Polygon::new(ring), tolerances).into_polygon()?;
    (polygon.area() > MIN_WALL_AREA).then_some(polygon)
}

/// Closes chains of roofless wall tops into flat roofs.
fn filler_roofs(missing: &[Vec<Point3<f64>>], config: &ReconstructionConfig) -> Vec<Patch> {
    merge_chain(missing, config.contact_tolerance)
        .into_iter()
        .filter_map(|chain| {
            let ring = open_ring(chain);
            if ring.len() < 3 {
                return None;
            }
            let polygon =
                simplify_polygon(&Polygon::new(ring), config.merge_simplify.tolerances()).into_polygon()?;
            Patch::new(orient_to(polygon, &Vector3::z()), None)
        })
        .collect()
}
