// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Coarse levels of detail: footprint with roof edge, and block models.

use ifc2citygml_geometry::bool2d::{union_regions, Contour, Projection, Region2D};
use ifc2citygml_geometry::{Plane, Point3, Polygon, Vector3};

use crate::element::ElementKey;
use crate::error::Result;
use crate::extract::Patch;
use crate::surface::{Surface, SurfaceKind};

fn horizontal(z: f64) -> Result<Projection> {
    Ok(Projection::xy(Plane::new(Point3::new(0.0, 0.0, z), Vector3::z())?))
}

fn outline(patches: &[Patch]) -> Vec<Region2D> {
    let footprints: Vec<Region2D> = patches.iter().map(Patch::footprint).collect();
    union_regions(&footprints)
}

/// Footprint (ground, facing down) and roof edge.
///
/// The roof edge is the union of all roof footprints at the lowest roof
/// height.
pub(crate) fn footprint_surfaces(bases: &[Patch], roofs: &[Patch]) -> Result<Vec<Surface>> {
    let mut surfaces = Vec::new();
    if !bases.is_empty() {
        let ground = bases.iter().map(|b| b.polygon.reversed()).collect();
        surfaces.push(Surface::new(SurfaceKind::Ground, ground, bases[0].source));
    }
    let eaves = roofs.iter().map(|r| r.polygon.min_z()).min_by(f64::total_cmp);
    if let Some(z) = eaves {
        let projection = horizontal(z)?;
        let edge: Vec<Polygon> = outline(roofs)
            .iter()
            .filter_map(|region| projection.lift_region(region))
            .collect();
        if !edge.is_empty() {
            surfaces.push(Surface::new(SurfaceKind::Roof, edge, roofs[0].source));
        }
    }
    Ok(surfaces)
}

/// Block model: the base outline extruded from the lowest base point by
/// `height`.
pub(crate) fn block_surfaces(bases: &[Patch], height: f64, wall_source: Option<ElementKey>) -> Result<Vec<Surface>> {
    let Some(bottom) = bases.iter().map(|b| b.polygon.min_z()).min_by(f64::total_cmp) else {
        return Ok(Vec::new());
    };
    let top = bottom + height;
    let (floor, ceiling) = (horizontal(bottom)?, horizontal(top)?);
    let regions = outline(bases);

    let mut ground = Vec::new();
    let mut roof = Vec::new();
    let mut surfaces = Vec::new();
    for region in &regions {
        if let Some(p) = floor.lift_region(region) {
            ground.push(p.reversed());
        }
        if let Some(p) = ceiling.lift_region(region) {
            roof.push(p);
        }
        let contours = std::iter::once(&region.outer).chain(&region.holes);
        for wall in contours.flat_map(|c| side_walls(c, bottom, top)) {
            surfaces.push(Surface::new(SurfaceKind::Wall, vec![wall], wall_source));
        }
    }
    let source = bases[0].source;
    surfaces.insert(0, Surface::new(SurfaceKind::Ground, ground, source));
    surfaces.insert(1, Surface::new(SurfaceKind::Roof, roof, None));
    Ok(surfaces)
}

/// One vertical quad per contour edge, facing right of the edge direction.
fn side_walls(contour: &Contour, bottom: f64, top: f64) -> Vec<Polygon> {
    let n = contour.len();
    (0..n)
        .map(|i| {
            let (a, b) = (contour[i], contour[(i + 1) % n]);
            Polygon::new(vec![
                Point3::new(a.x, a.y, bottom),
                Point3::new(b.x, b.y, bottom),
                Point3::new(b.x, b.y, top),
                Point3::new(a.x, a.y, top),
            ])
        })
        .filter(|p| p.area() > 0.0)
        .collect()
}
