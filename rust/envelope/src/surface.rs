// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconstructed envelope: surfaces, openings and the per-building result.

use ifc2citygml_geometry::polygon::bounds;
use ifc2citygml_geometry::{area_3d, Polygon};
use nalgebra::Point3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::LevelOfDetail;
use crate::element::ElementKey;
use crate::error::Error;

/// Fresh GML identifier.
pub fn new_gml_id() -> String {
    format!("GML_{}", uuid::Uuid::new_v4())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    Ground,
    Roof,
    Wall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpeningKind {
    Door,
    Window,
}

/// A polygon together with its own identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfacePolygon {
    pub id: String,
    pub polygon: Polygon,
}

impl SurfacePolygon {
    pub fn new(polygon: Polygon) -> Self {
        Self {
            id: new_gml_id(),
            polygon,
        }
    }
}

/// A door or window, owned by exactly one wall surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Opening {
    pub id: String,
    pub kind: OpeningKind,
    pub name: Option<String>,
    pub source: Option<ElementKey>,
    pub polygon: SurfacePolygon,
}

impl Opening {
    pub fn new(kind: OpeningKind, polygon: Polygon, source: Option<ElementKey>, name: Option<String>) -> Self {
        Self {
            id: new_gml_id(),
            kind,
            name,
            source,
            polygon: SurfacePolygon::new(polygon),
        }
    }
}

/// One boundary surface of the envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub id: String,
    pub kind: SurfaceKind,
    pub name: Option<String>,
    pub source: Option<ElementKey>,
    pub polygons: Vec<SurfacePolygon>,
    pub openings: Vec<Opening>,
}

impl Surface {
    pub fn new(kind: SurfaceKind, polygons: Vec<Polygon>, source: Option<ElementKey>) -> Self {
        Self {
            id: new_gml_id(),
            kind,
            name: None,
            source,
            polygons: polygons.into_iter().map(SurfacePolygon::new).collect(),
            openings: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Net area (holes excluded).
    pub fn area(&self) -> f64 {
        self.polygons.iter().map(|p| p.polygon.area()).sum()
    }

    /// Index of the polygon with the largest area.
    pub fn dominant_index(&self) -> Option<usize> {
        self.polygons
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.polygon.area()))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    pub fn dominant(&self) -> Option<&Polygon> {
        self.dominant_index().map(|i| &self.polygons[i].polygon)
    }

    /// Polygons of the surface and of its openings.
    pub fn all_polygons(&self) -> impl Iterator<Item = &SurfacePolygon> {
        self.polygons
            .iter()
            .chain(self.openings.iter().map(|o| &o.polygon))
    }
}

/// Result of reconstructing one building.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingEnvelope {
    pub building: ElementKey,
    pub lod: LevelOfDetail,
    pub surfaces: Vec<Surface>,
    /// Selected base polygons, normals pointing up.
    pub footprint: Vec<Polygon>,
    /// Nominal height (highest roof above lowest base).
    pub height: Option<f64>,
    /// Non-fatal problems; the surfaces they concern are missing.
    pub issues: Vec<Error>,
}

impl BuildingEnvelope {
    /// Polygon ids forming the outer shell, openings included.
    pub fn boundary_ids(&self) -> Vec<&str> {
        self.surfaces
            .iter()
            .flat_map(Surface::all_polygons)
            .map(|p| p.id.as_str())
            .collect()
    }

    pub fn surfaces_of(&self, kind: SurfaceKind) -> impl Iterator<Item = &Surface> {
        self.surfaces.iter().filter(move |s| s.kind == kind)
    }

    pub fn area_of(&self, kind: SurfaceKind) -> f64 {
        self.surfaces_of(kind).map(Surface::area).sum()
    }

    pub fn openings(&self) -> impl Iterator<Item = &Opening> {
        self.surfaces.iter().flat_map(|s| s.openings.iter())
    }

    /// 3D bounds of all surface polygons.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        bounds(
            self.surfaces
                .iter()
                .flat_map(|s| s.polygons.iter())
                .flat_map(|p| p.polygon.outer.iter()),
        )
    }

    /// Edges not shared by exactly two polygon rings.
    ///
    /// Vertices are compared on a grid of `tolerance`; an empty result means
    /// the shell is closed.
    pub fn open_edges(&self, tolerance: f64) -> Vec<(Point3<f64>, Point3<f64>)> {
        type GridPoint = (i64, i64, i64);
        let grid = |p: &Point3<f64>| -> GridPoint {
            (
                (p.x / tolerance).round() as i64,
                (p.y / tolerance).round() as i64,
                (p.z / tolerance).round() as i64,
            )
        };

        let mut uses: FxHashMap<(GridPoint, GridPoint), (usize, Point3<f64>, Point3<f64>)> =
            FxHashMap::default();
        let rings = self
            .surfaces
            .iter()
            .flat_map(Surface::all_polygons)
            .flat_map(|p| std::iter::once(&p.polygon.outer).chain(&p.polygon.holes));
        for ring in rings {
            let n = ring.len();
            for i in 0..n {
                let (a, b) = (ring[i], ring[(i + 1) % n]);
                let (ga, gb) = (grid(&a), grid(&b));
                if ga == gb {
                    continue;
                }
                let key = if ga < gb { (ga, gb) } else { (gb, ga) };
                uses.entry(key).or_insert((0, a, b)).0 += 1;
            }
        }

        let mut open: Vec<_> = uses
            .into_values()
            .filter(|(count, _, _)| *count != 2)
            .map(|(_, a, b)| (a, b))
            .collect();
        open.sort_by(|x, y| {
            x.0.x.total_cmp(&y.0.x)
                .then(x.0.y.total_cmp(&y.0.y))
                .then(x.0.z.total_cmp(&y.0.z))
        });
        open
    }

    /// Total area of all surfaces (openings included once, as surfaces).
    pub fn total_area(&self) -> f64 {
        let polygons: Vec<Polygon> = self
            .surfaces
            .iter()
            .flat_map(Surface::all_polygons)
            .map(|p| p.polygon.clone())
            .collect();
        area_3d(&polygons)
    }
}
