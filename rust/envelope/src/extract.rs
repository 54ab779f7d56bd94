// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Base and roof extraction.
//!
//! Element meshes are split into groups of coplanar triangles. Every group is
//! merged into a single polygon (coplanar merge, then a 2D union, then
//! growing buffers to bridge hairline gaps) and scored by its projected area
//! plus the square of its height extent. The best groups at the bottom of
//! the base slabs, and at the top of every roof element, become the planar
//! patches the rest of the reconstruction works with.

use ifc2citygml_geometry::bool2d::{orient_to, union_regions, Projection, Region2D};
use ifc2citygml_geometry::polygon::signed_area_xy;
use ifc2citygml_geometry::{
    simplify_polygon, Error as GeometryError, Plane, Point2, Polygon, Simplified, Tolerances, Vector3,
};

use crate::config::ReconstructionConfig;
use crate::context::{Phase, Progress};
use crate::element::{Collaborators, ElementKey, ElementKind};
use crate::error::{Error, Result};

/// Triangles whose XY footprint is smaller than this are vertical.
const MIN_FOOTPRINT_AREA: f64 = 1e-9;

const HEIGHT_SETS: [&str; 2] = ["BaseQuantities", "Qto_BuildingBaseQuantities"];
const HEIGHT_ATTRIBUTES: [&str; 3] = ["GrossHeight", "Height", "NetHeight"];

/// A planar polygon with its supporting plane and originating element.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Patch {
    pub polygon: Polygon,
    pub plane: Plane,
    pub source: Option<ElementKey>,
}

impl Patch {
    pub fn new(polygon: Polygon, source: Option<ElementKey>) -> Option<Self> {
        let plane = polygon.plane().ok()?;
        Some(Self {
            polygon,
            plane,
            source,
        })
    }

    pub fn footprint(&self) -> Region2D {
        Region2D::footprint(&self.polygon)
    }

    #[inline]
    pub fn z_at(&self, p: &Point2<f64>) -> Option<f64> {
        self.plane.z_at(p.x, p.y)
    }
}

struct CoplanarGroup {
    plane: Plane,
    triangles: Vec<Polygon>,
    /// Triangle area contributed by each element.
    sources: Vec<(ElementKey, f64)>,
}

impl CoplanarGroup {
    fn new(plane: Plane) -> Self {
        Self {
            plane,
            triangles: Vec::new(),
            sources: Vec::new(),
        }
    }

    fn push(&mut self, triangle: Polygon, source: ElementKey) {
        let area = triangle.area();
        match self.sources.iter_mut().find(|(key, _)| *key == source) {
            Some((_, total)) => *total += area,
            None => self.sources.push((source, area)),
        }
        self.triangles.push(triangle);
    }

    /// Element covering most of the group.
    fn source(&self) -> Option<ElementKey> {
        self.sources
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(key, _)| *key)
    }
}

struct Candidate {
    polygon: Polygon,
    source: Option<ElementKey>,
    low: f64,
    high: f64,
    score: f64,
}

impl Candidate {
    fn new(polygon: Polygon, source: Option<ElementKey>) -> Self {
        let area = Region2D::footprint(&polygon).area();
        let (low, high) = (polygon.min_z(), polygon.max_z());
        Self {
            polygon,
            source,
            low,
            high,
            score: area + (high - low).powi(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    Lowest,
    Highest,
}

/// Bottom surfaces of the base slabs (`BASESLAB`, else `FLOOR`), wound with
/// their normals up.
pub(crate) fn extract_base(
    sources: &Collaborators,
    config: &ReconstructionConfig,
    building: ElementKey,
    progress: &mut Progress,
) -> Result<Vec<Patch>> {
    progress.begin(Phase::Base)?;

    let mut slabs = sources
        .index
        .find_descendants(building, ElementKind::Slab, Some("BASESLAB"));
    if slabs.is_empty() {
        progress.log("no base slab found, using floor slabs");
        slabs = sources
            .index
            .find_descendants(building, ElementKind::Slab, Some("FLOOR"));
    }
    if slabs.is_empty() {
        progress.report(Error::missing("no base or floor slab"));
        progress.finish(Phase::Base);
        return Ok(Vec::new());
    }

    let mut triangles = Vec::new();
    for &slab in &slabs {
        progress.checkpoint()?;
        match sources.world_mesh(slab) {
            Some(mesh) => triangles.extend(mesh.triangle_polygons().map(|t| (t, slab))),
            None => progress.log(&format!("slab {} has no geometry", sources.label(slab))),
        }
        progress.step(Phase::Base, 0.5 / slabs.len() as f64);
    }

    let groups = group_coplanar(triangles, config);
    let group_count = groups.len();
    let candidates = merge_groups(groups, config, progress, Phase::Base, 0.5)?;
    let selected = select(candidates, config, Extreme::Lowest);
    let patches = into_patches(selected, config.base_simplify.tolerances(), progress);

    tracing::debug!(
        slabs = slabs.len(),
        groups = group_count,
        patches = patches.len(),
        "base extracted"
    );
    if patches.is_empty() {
        progress.report(Error::missing("no usable base surface"));
    }
    Ok(patches)
}

/// Top surfaces of every roof element (`ROOF` slabs and roofs), normals up.
pub(crate) fn extract_roofs(
    sources: &Collaborators,
    config: &ReconstructionConfig,
    building: ElementKey,
    progress: &mut Progress,
) -> Result<Vec<Patch>> {
    progress.begin(Phase::Roofs)?;

    let mut elements = sources
        .index
        .find_descendants(building, ElementKind::Slab, Some("ROOF"));
    for roof in sources.index.find_descendants(building, ElementKind::Roof, None) {
        // a roof decomposed into slabs is represented by those slabs
        let decomposed = !sources
            .index
            .find_descendants(roof, ElementKind::Slab, None)
            .is_empty();
        if !decomposed && !elements.contains(&roof) {
            elements.push(roof);
        }
    }
    if elements.is_empty() {
        progress.report(Error::missing("no roof elements"));
        progress.finish(Phase::Roofs);
        return Ok(Vec::new());
    }

    let share = 1.0 / elements.len() as f64;
    let mut patches = Vec::new();
    for &element in &elements {
        progress.checkpoint()?;
        let Some(mesh) = sources.world_mesh(element) else {
            progress.log(&format!("roof {} has no geometry", sources.label(element)));
            progress.step(Phase::Roofs, share);
            continue;
        };
        let triangles: Vec<(Polygon, ElementKey)> = mesh
            .triangle_polygons()
            .filter(|t| signed_area_xy(&t.outer).abs() > MIN_FOOTPRINT_AREA)
            .map(|t| (t, element))
            .collect();
        let groups = group_coplanar(triangles, config);
        let candidates = merge_groups(groups, config, progress, Phase::Roofs, share)?;
        let selected = select(candidates, config, Extreme::Highest);
        patches.extend(into_patches(selected, config.roof_simplify.tolerances(), progress));
    }

    tracing::debug!(elements = elements.len(), patches = patches.len(), "roofs extracted");
    if patches.is_empty() {
        progress.report(Error::missing("no usable roof surface"));
    }
    Ok(patches)
}

/// Highest roof point above the lowest base point, else the building's
/// quantity sets.
pub(crate) fn nominal_height(
    sources: &Collaborators,
    building: ElementKey,
    bases: &[Patch],
    roofs: &[Patch],
) -> Option<f64> {
    let low = bases
        .iter()
        .map(|p| p.polygon.min_z())
        .fold(f64::INFINITY, f64::min);
    let high = roofs
        .iter()
        .map(|p| p.polygon.max_z())
        .fold(f64::NEG_INFINITY, f64::max);
    if low.is_finite() && high.is_finite() && high > low {
        return Some(high - low);
    }

    HEIGHT_SETS
        .iter()
        .flat_map(|set| HEIGHT_ATTRIBUTES.iter().map(move |attr| (*set, *attr)))
        .filter_map(|(set, attr)| sources.index.find_pset(building, set, Some(attr)))
        .filter_map(|value| value.as_f64())
        .find(|h| *h > 0.0)
}

/// Lowest z of a set of patches.
pub(crate) fn lowest(patches: &[Patch]) -> Option<f64> {
    patches
        .iter()
        .map(|p| p.polygon.min_z())
        .min_by(f64::total_cmp)
}

fn group_coplanar(triangles: Vec<(Polygon, ElementKey)>, config: &ReconstructionConfig) -> Vec<CoplanarGroup> {
    let mut groups: Vec<CoplanarGroup> = Vec::new();
    for (triangle, source) in triangles {
        let Ok(plane) = triangle.plane() else {
            continue;
        };
        let found = groups.iter_mut().find(|g| {
            g.plane.normal.dot(&plane.normal).clamp(-1.0, 1.0).acos() < config.grouping_angle
                && g.plane.signed_distance(&plane.point).abs() < config.grouping_distance
        });
        match found {
            Some(group) => group.push(triangle, source),
            None => {
                let mut group = CoplanarGroup::new(plane);
                group.push(triangle, source);
                groups.push(group);
            }
        }
    }
    groups
}

fn merge_groups(
    groups: Vec<CoplanarGroup>,
    config: &ReconstructionConfig,
    progress: &mut Progress,
    phase: Phase,
    share: f64,
) -> Result<Vec<Candidate>> {
    let step = share / groups.len().max(1) as f64;
    let mut candidates = Vec::with_capacity(groups.len());
    for group in groups {
        progress.checkpoint()?;
        let source = group.source();
        match merge_group(group, config) {
            Ok(polygon) => candidates.push(Candidate::new(polygon, source)),
            Err(e) => progress.report(e.into()),
        }
        progress.step(phase, step);
    }
    Ok(candidates)
}

/// Merges one coplanar group into a single polygon.
fn merge_group(group: CoplanarGroup, config: &ReconstructionConfig) -> std::result::Result<Polygon, GeometryError> {
    let mut pieces = config.merger().merge(group.triangles).polygons;
    match pieces.len() {
        0 => return Err(GeometryError::UnresolvedMerge("empty group".into())),
        1 => return pieces.pop().ok_or_else(|| GeometryError::UnresolvedMerge("empty group".into())),
        _ => {}
    }

    let projection = Projection::dominant(group.plane);
    let lift = |region: &Region2D| {
        projection
            .lift_region(region)
            .ok_or_else(|| GeometryError::Boolean("merged region cannot be lifted onto its plane".into()))
    };
    let regions: Vec<Region2D> = pieces.iter().map(|p| projection.region(p)).collect();
    let references: Vec<Point2<f64>> = regions.iter().flat_map(|r| r.vertices().copied()).collect();

    let union = union_regions(&regions);
    if let [single] = union.as_slice() {
        let mut region = single.clone();
        region.snap_to(&references, config.contact_tolerance);
        return lift(&region);
    }

    let mut remaining = union.len();
    for &distance in &config.buffer_ladder {
        let grown: Vec<Region2D> = regions.iter().filter_map(|r| r.buffered(distance)).collect();
        let union = union_regions(&grown);
        remaining = union.len();
        if let [single] = union.as_slice() {
            if let Some(mut region) = single.buffered(-distance) {
                region.snap_to(&references, distance * 2.0);
                tracing::debug!(distance, pieces = pieces.len(), "pieces joined by buffering");
                return lift(&region);
            }
        }
    }
    Err(GeometryError::UnresolvedMerge(format!(
        "{remaining} coplanar pieces stay apart after buffering"
    )))
}

fn select(candidates: Vec<Candidate>, config: &ReconstructionConfig, extreme: Extreme) -> Vec<Candidate> {
    let best = candidates.iter().map(|c| c.score).fold(0.0, f64::max);
    let threshold = best * config.selection_ratio;
    let passing: Vec<Candidate> = candidates.into_iter().filter(|c| c.score >= threshold).collect();

    let level = |c: &Candidate| match extreme {
        Extreme::Lowest => c.low,
        Extreme::Highest => c.high,
    };
    let reference = match extreme {
        Extreme::Lowest => passing.iter().map(level).fold(f64::INFINITY, f64::min),
        Extreme::Highest => passing.iter().map(level).fold(f64::NEG_INFINITY, f64::max),
    };
    passing
        .into_iter()
        .filter(|c| (level(c) - reference).abs() <= config.height_band)
        .collect()
}

fn into_patches(
    selected: Vec<Candidate>,
    tolerances: Tolerances,
    progress: &mut Progress,
) -> Vec<Patch> {
    let up = Vector3::z();
    let mut patches = Vec::with_capacity(selected.len());
    for candidate in selected {
        let polygon = match simplify_polygon(&candidate.polygon, tolerances) {
            Simplified::Polygon(polygon) => orient_to(polygon, &up),
            Simplified::Line(_) => {
                progress.report(GeometryError::DegenerateRing("surface collapsed to a line".into()).into());
                continue;
            }
        };
        match Patch::new(polygon, candidate.source) {
            Some(patch) => patches.push(patch),
            None => progress.report(GeometryError::DegeneratePlane.into()),
        }
    }
    patches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RecordingContext;
    use crate::element::{Element, IdentityGeoreference, PsetValue};
    use crate::model::InMemoryModel;
    use approx::assert_relative_eq;
    use ifc2citygml_geometry::{Mesh, Point3};

    /// Closed box mesh, outward normals.
    fn cuboid(min: [f64; 3], max: [f64; 3]) -> Mesh {
        let [x0, y0, z0] = min;
        let [x1, y1, z1] = max;
        let c = |x, y, z| Point3::new(x, y, z);
        let quads = [
            [c(x0, y0, z0), c(x0, y1, z0), c(x1, y1, z0), c(x1, y0, z0)],
            [c(x0, y0, z1), c(x1, y0, z1), c(x1, y1, z1), c(x0, y1, z1)],
            [c(x0, y0, z0), c(x1, y0, z0), c(x1, y0, z1), c(x0, y0, z1)],
            [c(x1, y0, z0), c(x1, y1, z0), c(x1, y1, z1), c(x1, y0, z1)],
            [c(x1, y1, z0), c(x0, y1, z0), c(x0, y1, z1), c(x1, y1, z1)],
            [c(x0, y1, z0), c(x0, y0, z0), c(x0, y0, z1), c(x0, y1, z1)],
        ];
        Mesh::from_triangles(quads.iter().flat_map(|q| [[q[0], q[1], q[2]], [q[0], q[2], q[3]]]))
    }

    fn model_with(slab_type: &str, mesh: Mesh) -> (InMemoryModel, ElementKey) {
        let mut model = InMemoryModel::new();
        let building = model.add(Element::new(ElementKind::Building, "b"), None);
        model.add_with_mesh(
            Element::new(ElementKind::Slab, "s").with_predefined_type(slab_type),
            Some(building),
            mesh,
        );
        (model, building)
    }

    #[test]
    fn base_is_the_bottom_face_wound_up() {
        let (model, building) = model_with("BASESLAB", cuboid([0.0, 0.0, -0.3], [10.0, 8.0, 0.0]));
        let georef = IdentityGeoreference;
        let sources = Collaborators::new(&model, &model, &georef);
        let mut ctx = RecordingContext::new();
        let mut progress = Progress::new(&mut ctx, 1, false);

        let base = extract_base(&sources, &ReconstructionConfig::default(), building, &mut progress).unwrap();
        assert_eq!(base.len(), 1);
        let patch = &base[0];
        assert_eq!(patch.polygon.outer.len(), 4);
        assert_relative_eq!(patch.polygon.area(), 80.0, epsilon = 1e-9);
        assert_relative_eq!(patch.polygon.max_z(), -0.3, epsilon = 1e-12);
        assert!(patch.plane.normal.z > 0.99);
        assert!(progress.take_issues().is_empty());
    }

    #[test]
    fn base_patch_keeps_the_slab_covering_most_of_it() {
        let mut model = InMemoryModel::new();
        let building = model.add(Element::new(ElementKind::Building, "b"), None);
        let slab = |id: &str| Element::new(ElementKind::Slab, id).with_predefined_type("BASESLAB");
        model.add_with_mesh(slab("narrow"), Some(building), cuboid([0.0, 0.0, 0.0], [4.0, 10.0, 0.3]));
        let wide = model.add_with_mesh(slab("wide"), Some(building), cuboid([4.0, 0.0, 0.0], [10.0, 10.0, 0.3]));
        let georef = IdentityGeoreference;
        let sources = Collaborators::new(&model, &model, &georef);
        let mut ctx = RecordingContext::new();
        let mut progress = Progress::new(&mut ctx, 1, false);

        let base = extract_base(&sources, &ReconstructionConfig::default(), building, &mut progress).unwrap();
        assert_eq!(base.len(), 1);
        assert_relative_eq!(base[0].polygon.area(), 100.0, epsilon = 1e-6);
        assert_eq!(base[0].source, Some(wide));
    }

    #[test]
    fn floor_slabs_are_the_fallback() {
        let (model, building) = model_with("FLOOR", cuboid([0.0, 0.0, 0.0], [4.0, 4.0, 0.2]));
        let georef = IdentityGeoreference;
        let sources = Collaborators::new(&model, &model, &georef);
        let mut ctx = RecordingContext::new();
        let mut progress = Progress::new(&mut ctx, 1, false);
        let base = extract_base(&sources, &ReconstructionConfig::default(), building, &mut progress).unwrap();
        assert_eq!(base.len(), 1);
        drop(progress);
        assert!(ctx.messages.iter().any(|m| m.contains("floor slabs")));
    }

    #[test]
    fn roof_is_the_top_face() {
        let (model, building) = model_with("ROOF", cuboid([0.0, 0.0, 6.0], [10.0, 8.0, 6.4]));
        let georef = IdentityGeoreference;
        let sources = Collaborators::new(&model, &model, &georef);
        let mut ctx = RecordingContext::new();
        let mut progress = Progress::new(&mut ctx, 1, false);
        let roofs = extract_roofs(&sources, &ReconstructionConfig::default(), building, &mut progress).unwrap();
        assert_eq!(roofs.len(), 1);
        assert_relative_eq!(roofs[0].polygon.min_z(), 6.4, epsilon = 1e-12);
        assert!(roofs[0].source.is_some());
    }

    #[test]
    fn missing_slabs_are_reported() {
        let mut model = InMemoryModel::new();
        let building = model.add(Element::new(ElementKind::Building, "b"), None);
        let georef = IdentityGeoreference;
        let sources = Collaborators::new(&model, &model, &georef);
        let mut ctx = RecordingContext::new();
        let mut progress = Progress::new(&mut ctx, 1, false);
        let config = ReconstructionConfig::default();
        assert!(extract_base(&sources, &config, building, &mut progress).unwrap().is_empty());
        assert!(extract_roofs(&sources, &config, building, &mut progress).unwrap().is_empty());
        assert_eq!(progress.take_issues().len(), 2);
    }

    #[test]
    fn gap_between_coplanar_pieces_is_bridged() {
        // two rectangles 2 mm apart: the merger cannot join them, buffering can
        let a = Polygon::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(5.0, 0.0, 0.0),
            Point3::new(5.0, 4.0, 0.0),
            Point3::new(0.0, 4.0, 0.0),
        ]);
        let b = Polygon::new(vec![
            Point3::new(5.002, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(10.0, 4.0, 0.0),
            Point3::new(5.002, 4.0, 0.0),
        ]);
        let group = CoplanarGroup {
            plane: a.plane().unwrap(),
            triangles: vec![a, b],
            sources: Vec::new(),
        };
        let merged = merge_group(group, &ReconstructionConfig::default()).unwrap();
        assert!(merged.holes.is_empty());
        assert_relative_eq!(merged.area(), 40.0, epsilon = 1e-2);
    }

    #[test]
    fn far_apart_pieces_stay_unresolved() {
        let square = |x: f64| {
            Polygon::new(vec![
                Point3::new(x, 0.0, 0.0),
                Point3::new(x + 1.0, 0.0, 0.0),
                Point3::new(x + 1.0, 1.0, 0.0),
                Point3::new(x, 1.0, 0.0),
            ])
        };
        let group = CoplanarGroup {
            plane: square(0.0).plane().unwrap(),
            triangles: vec![square(0.0), square(5.0)],
            sources: Vec::new(),
        };
        let err = merge_group(group, &ReconstructionConfig::default()).unwrap_err();
        assert!(matches!(err, GeometryError::UnresolvedMerge(_)));
    }

    #[test]
    fn nominal_height_falls_back_to_quantities() {
        let mut model = InMemoryModel::new();
        let building = model.add(Element::new(ElementKind::Building, "b"), None);
        model.set_property(building, "Qto_BuildingBaseQuantities", "Height", PsetValue::Real(9.5));
        let georef = IdentityGeoreference;
        let sources = Collaborators::new(&model, &model, &georef);
        assert_eq!(nominal_height(&sources, building, &[], &[]), Some(9.5));
    }

    #[test]
    fn selection_prefers_large_low_groups() {
        let config = ReconstructionConfig::default();
        let flat = |z: f64, size: f64| {
            Candidate::new(
                Polygon::new(vec![
                    Point3::new(0.0, 0.0, z),
                    Point3::new(size, 0.0, z),
                    Point3::new(size, size, z),
                    Point3::new(0.0, size, z),
                ]),
                None,
            )
        };
        let picked = select(
            vec![flat(0.0, 10.0), flat(-0.3, 10.0), flat(-1.0, 1.0)],
            &config,
            Extreme::Lowest,
        );
        assert_eq!(picked.len(), 1);
        assert_relative_eq!(picked[0].low, -0.3);

        let picked = select(vec![flat(0.0, 10.0), flat(-0.3, 10.0)], &config, Extreme::Highest);
        assert_eq!(picked.len(), 1);
        assert_relative_eq!(picked[0].high, 0.0);
    }
}
