// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Post-processing of walls and roofs before surfaces are assembled.

use ifc2citygml_geometry::bool2d::{intersect_regions, union_regions, Projection, Region2D};
use ifc2citygml_geometry::{simplify_polygon, Point2, Polygon};

use crate::config::ReconstructionConfig;
use crate::context::{Phase, Progress};
use crate::error::Result;
use crate::extract::Patch;
use crate::roof_walls::StepWall;

/// Sine of the largest angle between two feet still taken as collinear.
const COLLINEAR_SINE: f64 = 1e-6;

const MIN_PIECE_AREA: f64 = 1e-6;

/// Foot of `other` in the length coordinate of `wall`, if both lie on one line.
fn interval_on(wall: &StepWall, other: &StepWall, tolerance: f64) -> Option<(f64, f64)> {
    let len = wall.length();
    let other_len = other.length();
    if len < tolerance || other_len < tolerance {
        return None;
    }
    let d = (wall.end - wall.start) / len;
    let e = (other.end - other.start) / other_len;
    if (d.x * e.y - d.y * e.x).abs() > COLLINEAR_SINE {
        return None;
    }
    let offset = other.start - wall.start;
    if (d.x * offset.y - d.y * offset.x).abs() > tolerance {
        return None;
    }
    let u0 = offset.dot(&d);
    let u1 = (other.end - wall.start).dot(&d);
    Some((u0.min(u1), u0.max(u1)))
}

fn eclipses(reference: &StepWall, wall: &StepWall, tolerance: f64) -> bool {
    match interval_on(wall, reference, tolerance) {
        Some((lo, hi)) => {
            lo <= tolerance
                && hi >= wall.length() - tolerance
                && reference.low() <= wall.low() + tolerance
                && reference.high() >= wall.high() - tolerance
        }
        None => false,
    }
}

/// The single part of `wall` outside a collinear `reference`, if the two
/// overlap partially.
fn trimmed(wall: &StepWall, reference: &StepWall, tolerance: f64) -> Option<StepWall> {
    let (lo, hi) = interval_on(wall, reference, tolerance)?;
    let len = wall.length();
    let heights_overlap = reference.low() < wall.high() - tolerance && wall.low() < reference.high() - tolerance;
    if !heights_overlap || hi <= tolerance || lo >= len - tolerance {
        return None;
    }
    let before = lo > tolerance;
    let after = hi < len - tolerance;
    match (before, after) {
        (true, false) => Some(wall.slice(0.0, lo / len)),
        (false, true) => Some(wall.slice(hi / len, 1.0)),
        _ => None,
    }
}

/// Removes eclipsed and overlapping step walls, drops the ones not standing
/// under any roof and merges all walls plane by plane.
pub(crate) fn clean_walls(
    base_walls: Vec<Polygon>,
    mut step_walls: Vec<StepWall>,
    roofs: &[Patch],
    config: &ReconstructionConfig,
    progress: &mut Progress,
) -> Result<Vec<Polygon>> {
    progress.begin(Phase::Cleanup)?;
    let tol = config.contact_tolerance;
    let received = step_walls.len();

    let mut keep = vec![true; step_walls.len()];
    for i in 0..step_walls.len() {
        for j in 0..step_walls.len() {
            if i == j || !keep[j] || !keep[i] {
                continue;
            }
            let (wall, reference) = (&step_walls[i], &step_walls[j]);
            // of two identical fragments the earlier one stays
            let mutual = eclipses(wall, reference, tol);
            if eclipses(reference, wall, tol) && (!mutual || j < i) {
                keep[i] = false;
            }
        }
    }
    let mut index = 0;
    step_walls.retain(|_| {
        let kept = keep[index];
        index += 1;
        kept
    });
    let eclipsed = received - step_walls.len();

    for i in 1..step_walls.len() {
        for j in 0..i {
            if let Some(rest) = trimmed(&step_walls[i], &step_walls[j], tol) {
                step_walls[i] = rest;
            }
        }
    }
    progress.checkpoint()?;

    let footprints: Vec<Region2D> = roofs.iter().map(Patch::footprint).collect();
    let under_roof = |wall: &StepWall| {
        let mid = Point2::from((wall.start.coords + wall.end.coords) * 0.5);
        footprints.iter().any(|f| f.contains(&mid, tol))
    };
    let before_roof_check = step_walls.len();
    step_walls.retain(under_roof);
    let uncovered = before_roof_check - step_walls.len();

    let tolerances = config.wall_simplify.tolerances();
    let polygons: Vec<Polygon> = base_walls
        .into_iter()
        .chain(step_walls.iter().filter_map(StepWall::polygon))
        .filter_map(|p| simplify_polygon(&p, tolerances).into_polygon())
        .collect();
    progress.step(Phase::Cleanup, 0.5);

    let outcome = config.merger().merge(polygons);
    tracing::debug!(
        eclipsed,
        uncovered,
        merges = outcome.merges,
        walls = outcome.polygons.len(),
        "walls cleaned"
    );
    Ok(outcome.polygons)
}

/// Clips every roof to the union of the base footprints and puts the cut
/// outline back onto the roof plane.
pub(crate) fn clip_roofs_to_base(roofs: Vec<Patch>, bases: &[Patch], config: &ReconstructionConfig) -> Vec<Patch> {
    if bases.is_empty() {
        return roofs;
    }
    let tol = config.contact_tolerance;
    let base_regions: Vec<Region2D> = bases.iter().map(Patch::footprint).collect();
    let outline = union_regions(&base_regions);
    let base_vertices: Vec<Point2<f64>> = base_regions.iter().flat_map(|r| r.vertices()).copied().collect();
    let tolerances = config.roof_simplify.tolerances();

    let mut clipped = Vec::with_capacity(roofs.len());
    for roof in roofs {
        let footprint = roof.footprint();
        let references: Vec<Point2<f64>> = footprint
            .vertices()
            .chain(base_vertices.iter())
            .copied()
            .collect();
        let projection = Projection::xy(roof.plane);
        for zone in &outline {
            for mut piece in intersect_regions(&footprint, zone) {
                if piece.area() <= MIN_PIECE_AREA {
                    continue;
                }
                piece.snap_to(&references, tol);
                let Some(polygon) = projection.lift_region(&piece) else {
                    continue;
                };
                let Some(polygon) = simplify_polygon(&polygon, tolerances).into_polygon() else {
                    continue;
                };
                if let Some(patch) = Patch::new(polygon, roof.source) {
                    clipped.push(patch);
                }
            }
        }
    }
    tracing::debug!(roofs = clipped.len(), "roofs clipped to footprint");
    clipped
}
