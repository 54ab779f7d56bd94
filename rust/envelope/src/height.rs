// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Final wall height correction.

use ifc2citygml_geometry::bool2d::Region2D;
use ifc2citygml_geometry::Point2;

use crate::config::ReconstructionConfig;
use crate::context::{Phase, Progress};
use crate::error::Result;
use crate::extract::Patch;
use crate::surface::Surface;

/// Snaps wall outer-ring vertices onto the nearest base or roof plane above
/// or below them.
///
/// Only planes whose original polygon contains the vertex in plan count, and
/// only moves up to `height_snap_tolerance`. Holes keep their heights.
/// Returns the number of vertices moved.
pub(crate) fn correct_wall_heights(
    walls: &mut [Surface],
    planes: &[&Patch],
    config: &ReconstructionConfig,
    progress: &mut Progress,
) -> Result<usize> {
    progress.begin(Phase::HeightCorrection)?;
    let footprints: Vec<Region2D> = planes.iter().map(|p| p.footprint()).collect();
    let tol = config.contact_tolerance;

    let mut moved = 0;
    for polygon in walls.iter_mut().flat_map(|s| s.polygons.iter_mut()) {
        for vertex in polygon.polygon.outer.iter_mut() {
            let xy = Point2::new(vertex.x, vertex.y);
            let nearest = planes
                .iter()
                .zip(&footprints)
                .filter(|(_, footprint)| footprint.contains(&xy, tol))
                .filter_map(|(patch, _)| patch.z_at(&xy))
                .map(|z| (z, (z - vertex.z).abs()))
                .filter(|(_, shift)| *shift <= config.height_snap_tolerance)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((z, shift)) = nearest {
                if shift > 0.0 {
                    vertex.z = z;
                    moved += 1;
                }
            }
        }
    }
    progress.finish(Phase::HeightCorrection);
    tracing::debug!(moved, "wall heights corrected");
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SilentContext;
    use crate::surface::SurfaceKind;
    use ifc2citygml_geometry::{Point3, Polygon};

    fn flat(z: f64) -> Patch {
        Patch::new(
            Polygon::new(vec![
                Point3::new(0.0, 0.0, z),
                Point3::new(10.0, 0.0, z),
                Point3::new(10.0, 10.0, z),
                Point3::new(0.0, 10.0, z),
            ]),
            None,
        )
        .unwrap()
    }

    #[test]
    fn vertices_snap_to_nearby_planes_only() {
        let hole = vec![
            Point3::new(2.0, 0.0, 1.0),
            Point3::new(2.0, 0.0, 2.0),
            Point3::new(4.0, 0.0, 2.0),
            Point3::new(4.0, 0.0, 1.0),
        ];
        let wall = Polygon::with_holes(
            vec![
                Point3::new(0.0, 0.0, 0.02),
                Point3::new(10.0, 0.0, 0.0),
                Point3::new(10.0, 0.0, 4.9),
                Point3::new(12.0, 0.0, 4.9),
                Point3::new(0.0, 0.0, 3.0),
            ],
            vec![hole.clone()],
        );
        let mut walls = vec![Surface::new(SurfaceKind::Wall, vec![wall], None)];
        let (base, roof) = (flat(0.0), flat(5.0));

        let mut ctx = SilentContext;
        let mut progress = Progress::new(&mut ctx, 1, false);
        let moved =
            correct_wall_heights(&mut walls, &[&base, &roof], &ReconstructionConfig::default(), &mut progress).unwrap();

        let outer = &walls[0].polygons[0].polygon.outer;
        assert_eq!(moved, 2);
        assert_eq!(outer[0].z, 0.0);
        assert_eq!(outer[2].z, 5.0);
        // outside every footprint
        assert_eq!(outer[3].z, 4.9);
        // too far from both planes
        assert_eq!(outer[4].z, 3.0);
        assert_eq!(walls[0].polygons[0].polygon.holes[0], hole);
    }
}
