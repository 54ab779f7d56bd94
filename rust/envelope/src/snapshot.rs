// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON form of a reconstructed envelope.
//!
//! Element keys are resolved to the elements' global ids so the snapshot can
//! be handed to a serializer that knows nothing about the catalog.

use ifc2citygml_geometry::{azimuth, inclination, Polygon, Ring};
use serde::{Deserialize, Serialize};

use crate::element::{ElementIndex, ElementKey};
use crate::error::{Error, Result};
use crate::surface::{BuildingEnvelope, Opening, OpeningKind, Surface, SurfaceKind, SurfacePolygon};

#[derive(Debug, Serialize, Deserialize)]
pub struct EnvelopeSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    pub lod: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    pub surfaces: Vec<SurfaceSnapshot>,
    /// Polygon ids of the outer shell.
    pub boundary: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SurfaceSnapshot {
    pub id: String,
    pub kind: SurfaceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Tilt of the dominant polygon in degrees (0 = facing up).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inclination: Option<f64>,
    /// Direction of the dominant polygon's normal in degrees from the x axis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth: Option<f64>,
    pub area: f64,
    pub polygons: Vec<PolygonSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub openings: Vec<OpeningSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpeningSnapshot {
    pub id: String,
    pub kind: OpeningKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub polygon: PolygonSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PolygonSnapshot {
    pub id: String,
    pub exterior: Vec<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interiors: Vec<Vec<[f64; 3]>>,
}

impl BuildingEnvelope {
    /// Serializes the envelope to a JSON string.
    pub fn to_json(&self, index: &dyn ElementIndex) -> Result<String> {
        let snapshot = self.to_snapshot(index);
        serde_json::to_string_pretty(&snapshot).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn to_snapshot(&self, index: &dyn ElementIndex) -> EnvelopeSnapshot {
        let global_id = |key: Option<ElementKey>| {
            key.and_then(|k| index.element(k))
                .map(|e| e.global_id.clone())
        };

        EnvelopeSnapshot {
            building: global_id(Some(self.building)),
            lod: self.lod.number(),
            height: self.height,
            surfaces: self
                .surfaces
                .iter()
                .map(|s| surface_snapshot(s, &global_id))
                .collect(),
            boundary: self.boundary_ids().into_iter().map(String::from).collect(),
            issues: self.issues.iter().map(ToString::to_string).collect(),
        }
    }
}

fn surface_snapshot(surface: &Surface, global_id: &dyn Fn(Option<ElementKey>) -> Option<String>) -> SurfaceSnapshot {
    let dominant = surface.dominant();
    SurfaceSnapshot {
        id: surface.id.clone(),
        kind: surface.kind,
        name: surface.name.clone(),
        source: global_id(surface.source),
        inclination: dominant.and_then(|p| inclination(p).ok()).map(f64::to_degrees),
        azimuth: dominant.and_then(|p| azimuth(p).ok()),
        area: surface.area(),
        polygons: surface.polygons.iter().map(polygon_snapshot).collect(),
        openings: surface
            .openings
            .iter()
            .map(|o| opening_snapshot(o, global_id))
            .collect(),
    }
}

fn opening_snapshot(opening: &Opening, global_id: &dyn Fn(Option<ElementKey>) -> Option<String>) -> OpeningSnapshot {
    OpeningSnapshot {
        id: opening.id.clone(),
        kind: opening.kind,
        name: opening.name.clone(),
        source: global_id(opening.source),
        polygon: polygon_snapshot(&opening.polygon),
    }
}

fn polygon_snapshot(polygon: &SurfacePolygon) -> PolygonSnapshot {
    let coords = |ring: &Ring| ring.iter().map(|p| [p.x, p.y, p.z]).collect::<Vec<_>>();
    let Polygon { outer, holes } = &polygon.polygon;
    PolygonSnapshot {
        id: polygon.id.clone(),
        exterior: coords(outer),
        interiors: holes.iter().map(coords).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LevelOfDetail;
    use crate::element::{Element, ElementKind};
    use crate::model::InMemoryModel;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn snapshot_resolves_sources_and_keeps_ids() {
        let mut model = InMemoryModel::new();
        let building = model.add(Element::new(ElementKind::Building, "2O2Fr$t4X7Zf8NOew3FLOH"), None);
        let wall = model.add(Element::new(ElementKind::Wall, "1hOSvn6df7F8_7GcBWlRGQ"), Some(building));

        let polygon = Polygon::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 3.0),
            Point3::new(0.0, 0.0, 3.0),
        ]);
        let envelope = BuildingEnvelope {
            building,
            lod: LevelOfDetail::Lod2,
            surfaces: vec![Surface::new(SurfaceKind::Wall, vec![polygon], Some(wall))],
            footprint: Vec::new(),
            height: Some(3.0),
            issues: vec![Error::missing("roof")],
        };

        let snapshot = envelope.to_snapshot(&model);
        assert_eq!(snapshot.building.as_deref(), Some("2O2Fr$t4X7Zf8NOew3FLOH"));
        assert_eq!(snapshot.surfaces[0].source.as_deref(), Some("1hOSvn6df7F8_7GcBWlRGQ"));
        assert_relative_eq!(snapshot.surfaces[0].inclination.unwrap(), 90.0, epsilon = 1e-9);
        assert_relative_eq!(snapshot.surfaces[0].azimuth.unwrap(), 270.0, epsilon = 1e-9);
        assert_eq!(snapshot.boundary, vec![envelope.surfaces[0].polygons[0].id.clone()]);
        assert_eq!(snapshot.issues.len(), 1);

        let json = envelope.to_json(&model).unwrap();
        let parsed: EnvelopeSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.surfaces[0].polygons[0].exterior.len(), 4);
        assert_eq!(parsed.lod, 2);
    }
}
