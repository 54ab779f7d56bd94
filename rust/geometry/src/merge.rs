// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Union of coplanar polygons that touch along shared vertices.
//!
//! Triangulated element faces arrive as many small polygons whose edges share
//! vertex coordinates. Two coplanar polygons are merged by walking their
//! boundaries through the shared vertices ("contacts"):
//!
//! - one contiguous contact run: the polygons share an edge chain and the
//!   non-shared part of the second ring is spliced into the first;
//! - several runs: the polygons enclose gaps between the runs; every gap
//!   yields a candidate ring, the longest becomes the outer boundary and the
//!   others become holes;
//! - no outer contact: the second polygon may sit inside a hole of the first,
//!   in which case the hole shrinks to whatever the second polygon leaves
//!   uncovered.
//!
//! Merging never simplifies, because collinear vertices are the contact points
//! of later merges. Callers simplify once the merge has settled.

use nalgebra::Vector3;
use smallvec::SmallVec;

use crate::polygon::{points_coincide, ring_length, unit_normal, Polygon, Ring};
use crate::simplify::{simplify_ring, Tolerances};

/// Remainder rings below this (doubled) area are treated as fully covered.
const MIN_RING_AREA: f64 = 1e-10;

/// Maximal stretch of consecutive contacts, as indices into the first ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    start: usize,
    end: usize,
}

enum ContactRuns {
    /// Every vertex is a contact and the rings coincide.
    Full,
    Runs(SmallVec<[Run; 4]>),
}

/// Settings for [`PlanarMerger::merge`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarMerger {
    /// Component-wise tolerance on unit normals for the coplanarity test.
    pub coplanar_tolerance: f64,
    /// Per-coordinate tolerance for two vertices to count as shared.
    pub contact_tolerance: f64,
    /// Upper bound on merge passes.
    pub max_passes: usize,
    /// Height change along a merged edge that, together with
    /// `suspicious_run`, marks the merge as implausible.
    pub suspicious_rise: f64,
    /// Horizontal length of such an edge.
    pub suspicious_run: f64,
    /// Simplification applied to the rings a partly filled hole leaves behind.
    pub remainder_tolerances: Tolerances,
}

impl Default for PlanarMerger {
    fn default() -> Self {
        Self {
            coplanar_tolerance: 1e-3,
            contact_tolerance: 1e-4,
            max_passes: 3,
            suspicious_rise: 2.3,
            suspicious_run: 10.0,
            remainder_tolerances: Tolerances::new(1e-4, 1e-6),
        }
    }
}

/// Result of a merge run.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub polygons: Vec<Polygon>,
    /// Passes actually executed.
    pub passes: usize,
    /// Successful pairwise merges.
    pub merges: usize,
    /// Merges flagged by the plausibility check (kept, only reported).
    pub suspicious: usize,
    /// Inputs left out because their outer ring has fewer than 3 points.
    pub discarded: usize,
}

impl MergeOutcome {
    /// True when everything collapsed into one polygon.
    pub fn is_single(&self) -> bool {
        self.polygons.len() == 1
    }
}

impl PlanarMerger {
    pub fn new(coplanar_tolerance: f64, contact_tolerance: f64, max_passes: usize) -> Self {
        Self {
            coplanar_tolerance,
            contact_tolerance,
            max_passes,
            ..Self::default()
        }
    }

    /// Merges coplanar polygons sharing vertices until a pass brings no
    /// reduction or `max_passes` is reached.
    ///
    /// Every valid input polygon ends up in exactly one output polygon.
    /// Polygons without a usable normal pass through untouched; rings with
    /// fewer than 3 points are counted in [`MergeOutcome::discarded`].
    pub fn merge(&self, polygons: Vec<Polygon>) -> MergeOutcome {
        let total = polygons.len();
        let mut outcome = MergeOutcome {
            polygons: polygons.into_iter().filter(Polygon::is_valid).collect(),
            ..MergeOutcome::default()
        };
        outcome.discarded = total - outcome.polygons.len();
        if outcome.discarded > 0 {
            tracing::warn!(discarded = outcome.discarded, "degenerate polygons left out of the merge");
        }

        while outcome.passes < self.max_passes && outcome.polygons.len() > 1 {
            let before = outcome.polygons.len();
            let input = std::mem::take(&mut outcome.polygons);
            outcome.polygons = self.merge_pass(input, &mut outcome);
            outcome.passes += 1;
            if outcome.polygons.len() == before {
                break;
            }
        }

        tracing::debug!(
            polygons = outcome.polygons.len(),
            passes = outcome.passes,
            merges = outcome.merges,
            "planar merge finished"
        );
        outcome
    }

    fn merge_pass(&self, polygons: Vec<Polygon>, outcome: &mut MergeOutcome) -> Vec<Polygon> {
        let normals: Vec<Option<Vector3<f64>>> = polygons.iter().map(Polygon::normal).collect();
        let mut consumed = vec![false; polygons.len()];
        let mut out = Vec::with_capacity(polygons.len());

        for i in 0..polygons.len() {
            if consumed[i] {
                continue;
            }
            consumed[i] = true;
            let mut acc = polygons[i].clone();
            let Some(normal) = normals[i] else {
                out.push(acc);
                continue;
            };

            // absorb greedily until nothing else attaches
            loop {
                let mut absorbed = false;
                for j in (i + 1)..polygons.len() {
                    if consumed[j] {
                        continue;
                    }
                    let Some(other_normal) = normals[j] else {
                        continue;
                    };
                    if !self.coplanar(&normal, &other_normal) {
                        continue;
                    }
                    let Some(merged) = self.merge_pair(&acc, &normal, &polygons[j], &other_normal)
                    else {
                        continue;
                    };
                    #[cfg(feature = "debug_geometry")]
                    tracing::trace!(first = i, second = j, vertices = merged.outer.len(), "merged pair");
                    if self.is_suspicious(&merged) {
                        outcome.suspicious += 1;
                        tracing::warn!(
                            vertices = merged.outer.len(),
                            "suspicious merge: steep edge over a long horizontal run"
                        );
                    }
                    acc = merged;
                    consumed[j] = true;
                    absorbed = true;
                    outcome.merges += 1;
                }
                if !absorbed {
                    break;
                }
            }
            out.push(acc);
        }
        out
    }

    /// Normals equal or opposite within tolerance.
    pub fn coplanar(&self, a: &Vector3<f64>, b: &Vector3<f64>) -> bool {
        (a - b).amax() <= self.coplanar_tolerance || (a + b).amax() <= self.coplanar_tolerance
    }

    /// Merges two coplanar polygons, or `None` when they do not connect.
    fn merge_pair(
        &self,
        a: &Polygon,
        a_normal: &Vector3<f64>,
        b: &Polygon,
        b_normal: &Vector3<f64>,
    ) -> Option<Polygon> {
        // shared edges are only walked consistently with matching windings
        let b = if a_normal.dot(b_normal) < 0.0 {
            b.reversed()
        } else {
            b.clone()
        };

        let shared = self
            .contacts(&a.outer, &b.outer)
            .iter()
            .filter(|c| c.is_some())
            .count();
        if shared >= 2 {
            return self.merge_outer(a, &b, a_normal);
        }
        self.fill_hole(a, &b).or_else(|| self.fill_hole(&b, a))
    }

    /// Edge-sharing and enclosed-gap cases.
    fn merge_outer(&self, a: &Polygon, b: &Polygon, normal: &Vector3<f64>) -> Option<Polygon> {
        // the taller polygon leads the walk
        let (primary, secondary) = if b.max_z() > a.max_z() { (b, a) } else { (a, b) };
        let contacts = self.contacts(&primary.outer, &secondary.outer);
        let shared = contacts.iter().filter(|c| c.is_some()).count();

        let identical = shared == primary.outer.len() && shared == secondary.outer.len();
        let runs = match contact_runs(&contacts, secondary.outer.len(), -1) {
            ContactRuns::Full => None,
            ContactRuns::Runs(_) if identical => None,
            ContactRuns::Runs(runs) => Some(runs),
        };
        let Some(runs) = runs else {
            // identical outlines: the second polygon adds nothing
            let mut merged = primary.clone();
            merged.holes.extend(secondary.holes.iter().cloned());
            return Some(merged);
        };

        let mut holes: Vec<Ring> = primary
            .holes
            .iter()
            .chain(&secondary.holes)
            .cloned()
            .collect();

        match runs.len() {
            0 => None,
            1 => {
                let run = runs[0];
                if run.start == run.end {
                    return None;
                }
                let outer = gap_ring(&primary.outer, &secondary.outer, &contacts, run, run, 1)?;
                (outer.len() >= 3).then(|| Polygon { outer, holes })
            }
            _ if shared > 3 => {
                let mut candidates = Vec::with_capacity(runs.len());
                for k in 0..runs.len() {
                    let from = runs[k];
                    let to = runs[(k + 1) % runs.len()];
                    candidates.push(gap_ring(&primary.outer, &secondary.outer, &contacts, from, to, 1)?);
                }
                candidates.retain(|ring| ring.len() >= 3 && !is_flat(ring));
                let longest = candidates
                    .iter()
                    .enumerate()
                    .max_by(|x, y| ring_length(x.1).total_cmp(&ring_length(y.1)))
                    .map(|(idx, _)| idx)?;
                let outer = candidates.swap_remove(longest);
                for ring in candidates {
                    holes.push(wind_against(ring, normal));
                }
                Some(Polygon { outer, holes })
            }
            _ => None,
        }
    }

    /// Shrinks a hole of `host` by a `guest` polygon sitting inside it.
    fn fill_hole(&self, host: &Polygon, guest: &Polygon) -> Option<Polygon> {
        let guest_len = guest.outer.len();
        for (idx, hole) in host.holes.iter().enumerate() {
            // the hole as an area wound like the host outline
            let area: Ring = hole.iter().rev().copied().collect();
            let contacts = self.contacts(&area, &guest.outer);
            if contacts.iter().filter(|c| c.is_some()).count() < 2 {
                continue;
            }

            let remainders = match contact_runs(&contacts, guest_len, 1) {
                ContactRuns::Full => Vec::new(),
                ContactRuns::Runs(runs) if runs.is_empty() => continue,
                ContactRuns::Runs(runs) => {
                    let mut rings = Vec::with_capacity(runs.len());
                    for k in 0..runs.len() {
                        let from = runs[k];
                        let to = runs[(k + 1) % runs.len()];
                        let Some(ring) = gap_ring(&area, &guest.outer, &contacts, from, to, -1) else {
                            return None;
                        };
                        // T-junctions leave spikes along the shared boundary
                        let ring = simplify_ring(&ring, self.remainder_tolerances);
                        if ring.len() >= 3 && !is_flat(&ring) {
                            rings.push(ring.into_iter().rev().collect::<Ring>());
                        }
                    }
                    rings
                }
            };

            let mut holes: Vec<Ring> = host
                .holes
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, h)| h.clone())
                .collect();
            holes.extend(remainders);
            holes.extend(guest.holes.iter().cloned());
            return Some(Polygon {
                outer: host.outer.clone(),
                holes,
            });
        }
        None
    }

    /// For each vertex of `a`, the index of the first coincident vertex of `b`.
    fn contacts(&self, a: &[nalgebra::Point3<f64>], b: &[nalgebra::Point3<f64>]) -> Vec<Option<usize>> {
        a.iter()
            .map(|p| b.iter().position(|q| points_coincide(p, q, self.contact_tolerance)))
            .collect()
    }

    fn is_suspicious(&self, polygon: &Polygon) -> bool {
        polygon.outer_edges().any(|(p, q)| {
            let rise = (q.z - p.z).abs();
            let run = (q.x - p.x).hypot(q.y - p.y);
            rise > self.suspicious_rise && run > self.suspicious_run
        })
    }
}

/// Splits the contacts into runs that are contiguous on both rings.
///
/// `b_step` is the direction the second ring must advance while the first
/// advances by one: `-1` for neighbours (shared edges run opposite), `+1`
/// for a polygon lying inside a hole wound like its host.
fn contact_runs(contacts: &[Option<usize>], b_len: usize, b_step: isize) -> ContactRuns {
    let n = contacts.len();
    let linked = |i: usize| -> bool {
        match (contacts[i], contacts[(i + 1) % n]) {
            (Some(x), Some(y)) => y == step(x, b_step, b_len),
            _ => false,
        }
    };

    if (0..n).all(linked) {
        return if n == b_len {
            ContactRuns::Full
        } else {
            ContactRuns::Runs(SmallVec::new())
        };
    }

    let mut runs = SmallVec::new();
    for start in 0..n {
        if contacts[start].is_none() || linked((start + n - 1) % n) {
            continue;
        }
        let mut end = start;
        while linked(end) {
            end = (end + 1) % n;
        }
        runs.push(Run { start, end });
    }
    ContactRuns::Runs(runs)
}

/// Ring around the gap between two runs: the first ring from `from.end` up to
/// `to.start`, then the second ring strictly between the matching vertices,
/// walked in direction `b_walk`.
fn gap_ring(
    a: &[nalgebra::Point3<f64>],
    b: &[nalgebra::Point3<f64>],
    contacts: &[Option<usize>],
    from: Run,
    to: Run,
    b_walk: isize,
) -> Option<Ring> {
    let n = a.len();
    let m = b.len();
    let mut ring = Vec::with_capacity(n + m);

    let mut i = from.end;
    loop {
        ring.push(a[i]);
        if i == to.start {
            break;
        }
        i = (i + 1) % n;
    }

    let matched: Vec<bool> = {
        let mut flags = vec![false; m];
        for j in contacts.iter().flatten() {
            flags[*j] = true;
        }
        flags
    };

    let b_from = contacts[to.start]?;
    let b_to = contacts[from.end]?;
    let mut j = step(b_from, b_walk, m);
    let mut guard = 0;
    while j != b_to {
        if matched[j] || guard > m {
            return None;
        }
        ring.push(b[j]);
        j = step(j, b_walk, m);
        guard += 1;
    }
    Some(ring)
}

#[inline]
fn step(index: usize, delta: isize, len: usize) -> usize {
    (index as isize + delta).rem_euclid(len as isize) as usize
}

fn is_flat(ring: &[nalgebra::Point3<f64>]) -> bool {
    crate::polygon::newell_normal(ring).norm() < MIN_RING_AREA
}

fn wind_against(ring: Ring, normal: &Vector3<f64>) -> Ring {
    match unit_normal(&ring) {
        Some(n) if n.dot(normal) > 0.0 => ring.into_iter().rev().collect(),
        _ => ring,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn sq(x: f64, y: f64) -> Polygon {
        Polygon::new(vec![
            Point3::new(x, y, 0.0),
            Point3::new(x + 1.0, y, 0.0),
            Point3::new(x + 1.0, y + 1.0, 0.0),
            Point3::new(x, y + 1.0, 0.0),
        ])
    }

    #[test]
    fn triangle_pair_becomes_quad() {
        let t1 = Polygon::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ]);
        let t2 = Polygon::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        let out = PlanarMerger::default().merge(vec![t1, t2]);
        assert!(out.is_single());
        assert_eq!(out.polygons[0].outer.len(), 4);
        assert_relative_eq!(out.polygons[0].area(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn contact_runs_wrap_around() {
        let contacts = vec![Some(0), None, Some(1)];
        match contact_runs(&contacts, 3, -1) {
            ContactRuns::Runs(runs) => assert_eq!(runs.as_slice(), &[Run { start: 2, end: 0 }]),
            ContactRuns::Full => panic!("not a full cover"),
        }
    }

    #[test]
    fn opposite_winding_is_aligned_first() {
        let out = PlanarMerger::default().merge(vec![sq(0.0, 0.0), sq(1.0, 0.0).reversed()]);
        assert!(out.is_single());
        assert_relative_eq!(out.polygons[0].area(), 2.0, epsilon = 1e-12);
        assert!(out.polygons[0].normal().unwrap().z > 0.0);
    }

    #[test]
    fn tilted_polygons_are_not_merged() {
        let tilted = Polygon::new(vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 1.0),
            Point3::new(2.0, 1.0, 1.0),
            Point3::new(1.0, 1.0, 0.0),
        ]);
        let out = PlanarMerger::default().merge(vec![sq(0.0, 0.0), tilted]);
        assert_eq!(out.polygons.len(), 2);
        assert_eq!(out.merges, 0);
    }

    #[test]
    fn single_vertex_contact_does_not_merge() {
        let out = PlanarMerger::default().merge(vec![sq(0.0, 0.0), sq(1.0, 1.0)]);
        assert_eq!(out.polygons.len(), 2);
    }

    #[test]
    fn duplicate_polygon_is_absorbed() {
        let out = PlanarMerger::default().merge(vec![sq(0.0, 0.0), sq(0.0, 0.0)]);
        assert!(out.is_single());
        assert_relative_eq!(out.polygons[0].area(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn steep_long_edge_is_flagged() {
        let a = Polygon::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(12.0, 0.0, 0.0),
            Point3::new(12.0, 0.0, 3.0),
        ]);
        let b = Polygon::new(vec![
            Point3::new(12.0, 0.0, 0.0),
            Point3::new(14.0, 0.0, 0.0),
            Point3::new(14.0, 0.0, 3.0),
            Point3::new(12.0, 0.0, 3.0),
        ]);
        let out = PlanarMerger::default().merge(vec![a, b]);
        assert!(out.is_single());
        assert_eq!(out.suspicious, 1);
    }

    #[test]
    fn degenerate_inputs_are_counted() {
        let sliver = Polygon::new(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)]);
        let out = PlanarMerger::default().merge(vec![sq(0.0, 0.0), sliver, sq(1.0, 0.0)]);
        assert_eq!(out.discarded, 1);
        assert!(out.is_single());
        assert_relative_eq!(out.polygons[0].area(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn pass_cap_is_respected() {
        let merger = PlanarMerger {
            max_passes: 0,
            ..PlanarMerger::default()
        };
        let out = merger.merge(vec![sq(0.0, 0.0), sq(1.0, 0.0)]);
        assert_eq!(out.polygons.len(), 2);
        assert_eq!(out.passes, 0);
    }
}
