// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Door and window integration.
//!
//! Every opening element is assigned to the wall surface closest to its
//! mesh. Its extent along the wall and its height range give a rectangle on
//! the wall plane, which is cut out of the wall and attached to it as an
//! opening surface.

use ifc2citygml_geometry::bool2d::{intersect_regions, subtract_regions, Projection, Region2D};
use ifc2citygml_geometry::polygon::{centroid, points_coincide};
use ifc2citygml_geometry::{Error as GeometryError, Plane, Point2, Point3, Polygon, Vector3};

use crate::config::ReconstructionConfig;
use crate::context::{Phase, Progress};
use crate::element::{Collaborators, ElementKey, ElementKind};
use crate::error::{Error, Result};
use crate::surface::{Opening, OpeningKind, Surface, SurfacePolygon};

/// Walls whose distances differ by less than this are equally near.
const TIE_DISTANCE: f64 = 1e-6;

/// Vertex tolerance when matching an existing fragment to an opening.
const FRAGMENT_MATCH: f64 = 1e-3;

const MIN_OPENING_AREA: f64 = 1e-6;

/// Horizontal wall coordinates: `u` along the wall, `v` = z.
struct WallFrame {
    origin: Point3<f64>,
    along: Vector3<f64>,
}

impl WallFrame {
    fn new(plane: &Plane) -> Option<Self> {
        let along = Vector3::new(-plane.normal.y, plane.normal.x, 0.0);
        let len = along.norm();
        if len < 1e-9 {
            return None;
        }
        Some(Self {
            origin: plane.point,
            along: along / len,
        })
    }

    fn u(&self, p: &Point3<f64>) -> f64 {
        (p - self.origin).dot(&self.along)
    }

    fn point(&self, u: f64, z: f64) -> Point3<f64> {
        let p = self.origin + self.along * u;
        Point3::new(p.x, p.y, z)
    }

    /// Rectangle covering `vertices` in wall coordinates.
    fn rectangle(&self, vertices: &[Point3<f64>]) -> Option<Polygon> {
        let (mut u0, mut u1) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut z0, mut z1) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in vertices {
            let u = self.u(p);
            u0 = u0.min(u);
            u1 = u1.max(u);
            z0 = z0.min(p.z);
            z1 = z1.max(p.z);
        }
        if !(u1 - u0 > 0.0 && z1 - z0 > 0.0) {
            return None;
        }
        Some(Polygon::new(vec![
            self.point(u0, z0),
            self.point(u1, z0),
            self.point(u1, z1),
            self.point(u0, z1),
        ]))
    }
}

/// Cuts doors and windows of the building into the wall surfaces.
pub(crate) fn integrate_openings(
    sources: &Collaborators,
    building: ElementKey,
    walls: &mut [Surface],
    config: &ReconstructionConfig,
    progress: &mut Progress,
) -> Result<()> {
    progress.begin(Phase::Openings)?;

    let elements: Vec<(ElementKey, OpeningKind)> = sources
        .index
        .find_descendants(building, ElementKind::Door, None)
        .into_iter()
        .map(|k| (k, OpeningKind::Door))
        .chain(
            sources
                .index
                .find_descendants(building, ElementKind::Window, None)
                .into_iter()
                .map(|k| (k, OpeningKind::Window)),
        )
        .collect();
    if elements.is_empty() {
        progress.finish(Phase::Openings);
        return Ok(());
    }
    let step = 1.0 / elements.len() as f64;

    let mut placed = 0usize;
    for (element, kind) in elements {
        progress.checkpoint()?;
        let outcome = match sources.world_mesh(element) {
            Some(mesh) => {
                let opening = Opening::new(kind, Polygon::default(), Some(element), sources.name(element));
                attach_opening(walls, &mesh.vertices, opening, config)
            }
            None => Err(Error::missing(format!("{} has no geometry", sources.label(element)))),
        };
        match outcome {
            Ok(_) => placed += 1,
            Err(error) => progress.report(error),
        }
        progress.step(Phase::Openings, step);
    }
    tracing::debug!(placed, "openings integrated");
    Ok(())
}

/// Assigns one opening, given by its mesh vertices, to the nearest wall and
/// gives `opening` its polygon there.
pub(crate) fn attach_opening(
    walls: &mut [Surface],
    vertices: &[Point3<f64>],
    mut opening: Opening,
    config: &ReconstructionConfig,
) -> Result<()> {
    let index = nearest_wall(walls, vertices).ok_or_else(|| Error::missing("no wall to hold the opening"))?;
    let wall = &mut walls[index];
    let dominant = wall.dominant_index().ok_or_else(|| Error::missing("wall without polygons"))?;
    let plane = wall.polygons[dominant].polygon.plane()?;
    let frame = WallFrame::new(&plane).ok_or(GeometryError::DegeneratePlane)?;
    let rectangle = frame
        .rectangle(vertices)
        .ok_or_else(|| GeometryError::DegenerateRing("opening has no extent on its wall".into()))?;

    let projection = Projection::dominant(plane);
    let bounds = projection.region(&rectangle);
    let overlaps_existing = wall.openings.iter().any(|o| {
        let existing = projection.region(&o.polygon.polygon);
        intersect_regions(&existing, &bounds).iter().any(|r| r.area() > MIN_OPENING_AREA)
    });
    if overlaps_existing {
        return Err(GeometryError::Boolean("opening overlaps an existing opening".into()).into());
    }

    if let Some(fragment) = matching_fragment(wall, &rectangle) {
        opening.polygon.polygon = wall.polygons.remove(fragment).polygon;
        cut_from_wall(wall, &opening.polygon.polygon, config);
        wall.openings.push(opening);
        return Ok(());
    }

    let target = projection.region(&wall.polygons[dominant].polygon);
    let cut = intersect_regions(&bounds, &target)
        .into_iter()
        .filter(|r| r.area() > MIN_OPENING_AREA)
        .max_by(|a, b| a.area().total_cmp(&b.area()))
        .ok_or_else(|| GeometryError::Boolean("opening does not overlap its wall".into()))?;
    opening.polygon.polygon = projection
        .lift_region(&cut)
        .ok_or(GeometryError::DegeneratePlane)?;

    cut_from_wall(wall, &opening.polygon.polygon, config);
    wall.openings.push(opening);
    Ok(())
}

/// Subtracts `opening` from every wall polygon it overlaps, leaving a hole
/// or a notch. The largest remainder keeps the polygon's place.
fn cut_from_wall(wall: &mut Surface, opening: &Polygon, config: &ReconstructionConfig) {
    let mut kept = Vec::with_capacity(wall.polygons.len());
    let mut split = Vec::new();
    for fragment in std::mem::take(&mut wall.polygons) {
        let Ok(plane) = fragment.polygon.plane() else {
            kept.push(fragment);
            continue;
        };
        let projection = Projection::dominant(plane);
        let target = projection.region(&fragment.polygon);
        let cut = projection.region(opening);
        let overlap: f64 = intersect_regions(&target, &cut).iter().map(Region2D::area).sum();
        if overlap <= MIN_OPENING_AREA {
            kept.push(fragment);
            continue;
        }

        let references: Vec<Point2<f64>> = target.vertices().chain(cut.vertices()).copied().collect();
        let mut remainder: Vec<Polygon> = subtract_regions(&target, &cut)
            .into_iter()
            .filter_map(|mut piece| {
                piece.snap_to(&references, config.contact_tolerance);
                projection.lift_region(&piece)
            })
            .collect();
        remainder.sort_by(|a, b| b.area().total_cmp(&a.area()));
        let mut remainder = remainder.into_iter();
        if let Some(largest) = remainder.next() {
            kept.push(SurfacePolygon {
                polygon: largest,
                ..fragment
            });
        }
        split.extend(remainder.map(SurfacePolygon::new));
    }
    kept.extend(split);
    wall.polygons = kept;
}

/// Wall with the smallest vertex-to-vertex distance to the opening; ties go
/// to the wall whose plane passes closer to the opening's centroid.
fn nearest_wall(walls: &[Surface], vertices: &[Point3<f64>]) -> Option<usize> {
    let center = centroid(vertices)?;
    let mut best: Option<(usize, f64, f64)> = None;
    for (index, wall) in walls.iter().enumerate() {
        let distance = wall
            .polygons
            .iter()
            .flat_map(|p| p.polygon.vertices())
            .flat_map(|w| vertices.iter().map(move |v| (v - w).norm()))
            .fold(f64::INFINITY, f64::min);
        if !distance.is_finite() {
            continue;
        }
        let plane_distance = wall
            .dominant()
            .and_then(|p| p.plane().ok())
            .map_or(f64::INFINITY, |plane| plane.signed_distance(&center).abs());
        let better = match best {
            None => true,
            Some((_, d, pd)) if (distance - d).abs() <= TIE_DISTANCE => plane_distance < pd,
            Some((_, d, _)) => distance < d,
        };
        if better {
            best = Some((index, distance, plane_distance));
        }
    }
    best.map(|(index, _, _)| index)
}

/// A four-cornered fragment of the wall matching the rectangle corner for corner.
fn matching_fragment(wall: &Surface, rectangle: &Polygon) -> Option<usize> {
    if wall.polygons.len() < 2 {
        return None;
    }
    wall.polygons.iter().position(|fragment| {
        let ring = &fragment.polygon.outer;
        fragment.polygon.holes.is_empty()
            && ring.len() == 4
            && rectangle
                .outer
                .iter()
                .all(|corner| ring.iter().any(|p| points_coincide(p, corner, FRAGMENT_MATCH)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceKind;
    use approx::assert_relative_eq;

    fn front_wall() -> Surface {
        Surface::new(
            SurfaceKind::Wall,
            vec![Polygon::new(vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(10.0, 0.0, 0.0),
                Point3::new(10.0, 0.0, 5.0),
                Point3::new(0.0, 0.0, 5.0),
            ])],
            None,
        )
    }

    fn side_wall() -> Surface {
        Surface::new(
            SurfaceKind::Wall,
            vec![Polygon::new(vec![
                Point3::new(10.0, 0.0, 0.0),
                Point3::new(10.0, 10.0, 0.0),
                Point3::new(10.0, 10.0, 5.0),
                Point3::new(10.0, 0.0, 5.0),
            ])],
            None,
        )
    }

    /// Corners of a box-shaped opening element.
    fn slab_box(x0: f64, x1: f64, z0: f64, z1: f64, y0: f64, y1: f64) -> Vec<Point3<f64>> {
        let mut out = Vec::new();
        for x in [x0, x1] {
            for y in [y0, y1] {
                for z in [z0, z1] {
                    out.push(Point3::new(x, y, z));
                }
            }
        }
        out
    }

    fn opening_of(kind: OpeningKind) -> Opening {
        Opening::new(kind, Polygon::default(), None, None)
    }

    #[test]
    fn opening_inside_the_wall_becomes_a_hole() {
        let mut walls = vec![front_wall(), side_wall()];
        let door = slab_box(2.0, 4.0, 1.0, 3.0, -0.1, 0.1);
        attach_opening(&mut walls, &door, opening_of(OpeningKind::Door), &ReconstructionConfig::default()).unwrap();

        let wall = &walls[0];
        assert_eq!(wall.openings.len(), 1);
        assert_eq!(wall.polygons.len(), 1);
        assert_eq!(wall.polygons[0].polygon.holes.len(), 1);
        assert_relative_eq!(wall.area(), 46.0, epsilon = 1e-6);
        let opening = &wall.openings[0].polygon.polygon;
        assert_relative_eq!(opening.area(), 4.0, epsilon = 1e-6);
        // opening faces the same way as its wall
        assert!(opening.normal().unwrap().y < -0.99);
        assert!(walls[1].openings.is_empty());
    }

    #[test]
    fn door_notches_the_wall_bottom() {
        let mut walls = vec![front_wall()];
        let door = slab_box(6.0, 7.0, 0.0, 2.0, -0.1, 0.1);
        attach_opening(&mut walls, &door, opening_of(OpeningKind::Door), &ReconstructionConfig::default()).unwrap();
        let wall = &walls[0];
        assert_relative_eq!(wall.area() + wall.openings[0].polygon.polygon.area(), 50.0, epsilon = 1e-6);
        assert_relative_eq!(wall.openings[0].polygon.polygon.min_z(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn overlapping_openings_are_rejected() {
        let mut walls = vec![front_wall()];
        let config = ReconstructionConfig::default();
        let first = slab_box(2.0, 4.0, 1.0, 3.0, -0.1, 0.1);
        let second = slab_box(3.0, 5.0, 2.0, 4.0, -0.1, 0.1);
        attach_opening(&mut walls, &first, opening_of(OpeningKind::Window), &config).unwrap();
        let err = attach_opening(&mut walls, &second, opening_of(OpeningKind::Window), &config).unwrap_err();
        assert!(matches!(err, Error::Geometry(GeometryError::Boolean(_))));
        assert_eq!(walls[0].openings.len(), 1);
        assert_relative_eq!(walls[0].area(), 46.0, epsilon = 1e-6);

        // next to the first one is fine
        let third = slab_box(5.0, 6.0, 1.0, 3.0, -0.1, 0.1);
        attach_opening(&mut walls, &third, opening_of(OpeningKind::Window), &config).unwrap();
        assert_eq!(walls[0].openings.len(), 2);
        assert_relative_eq!(walls[0].area(), 44.0, epsilon = 1e-6);
    }

    #[test]
    fn matching_fragment_is_reused() {
        let mut wall = front_wall();
        wall.polygons.push(SurfacePolygon::new(Polygon::new(vec![
            Point3::new(2.0, 0.0, 1.0),
            Point3::new(4.0, 0.0, 1.0),
            Point3::new(4.0, 0.0, 3.0),
            Point3::new(2.0, 0.0, 3.0),
        ])));
        let mut walls = vec![wall];
        let window = slab_box(2.0, 4.0, 1.0, 3.0, 0.0, 0.0);
        attach_opening(&mut walls, &window, opening_of(OpeningKind::Window), &ReconstructionConfig::default()).unwrap();
        let wall = &walls[0];
        assert_eq!(wall.polygons.len(), 1);
        assert_eq!(wall.openings.len(), 1);
        // the fragment no longer overlaps the wall it came from
        assert_eq!(wall.polygons[0].polygon.holes.len(), 1);
        let opening = wall.openings[0].polygon.polygon.area();
        assert_relative_eq!(opening, 4.0, epsilon = 1e-6);
        assert_relative_eq!(wall.area(), 50.0 - opening, epsilon = 1e-6);
    }

    #[test]
    fn equidistant_walls_go_to_the_closer_plane() {
        // a window at the corner touches both walls' corner vertex
        let walls = vec![front_wall(), side_wall()];
        let window = vec![
            Point3::new(10.0, 0.0, 5.0),
            Point3::new(9.0, 0.05, 4.0),
            Point3::new(9.0, 0.05, 5.0),
            Point3::new(10.0, 0.05, 4.0),
        ];
        assert_eq!(nearest_wall(&walls, &window), Some(0));
        let mirrored: Vec<Point3<f64>> = window.iter().map(|p| Point3::new(10.0 - p.y, 10.0 - p.x, p.z)).collect();
        assert_eq!(nearest_wall(&walls, &mirrored), Some(1));
    }

    #[test]
    fn frame_measures_along_the_wall() {
        let plane = front_wall().polygons[0].polygon.plane().unwrap();
        let frame = WallFrame::new(&plane).unwrap();
        let a = frame.u(&Point3::new(2.0, 0.0, 1.0));
        let b = frame.u(&Point3::new(4.0, 0.3, 1.0));
        assert_relative_eq!((a - b).abs(), 2.0, epsilon = 1e-12);
    }
}
