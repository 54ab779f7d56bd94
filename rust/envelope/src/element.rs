// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building elements and the collaborators that serve them.
//!
//! Parsing the source model, triangulating elements and storing property
//! sets happen outside this crate. Reconstruction only sees them through
//! [`ElementIndex`], [`MeshSource`] and [`Georeference`].

use ifc2citygml_geometry::Mesh;
use nalgebra::Point3;
use slotmap::new_key_type;

new_key_type! {
    /// Key of an element in the host's element catalog.
    pub struct ElementKey;
}

/// Element categories the reconstruction looks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Project,
    Site,
    Building,
    Storey,
    Slab,
    Roof,
    Wall,
    Door,
    Window,
    Other,
}

impl ElementKind {
    /// IFC entity name of the kind.
    pub fn ifc_name(self) -> &'static str {
        match self {
            ElementKind::Project => "IfcProject",
            ElementKind::Site => "IfcSite",
            ElementKind::Building => "IfcBuilding",
            ElementKind::Storey => "IfcBuildingStorey",
            ElementKind::Slab => "IfcSlab",
            ElementKind::Roof => "IfcRoof",
            ElementKind::Wall => "IfcWall",
            ElementKind::Door => "IfcDoor",
            ElementKind::Window => "IfcWindow",
            ElementKind::Other => "IfcProduct",
        }
    }
}

/// Catalog entry for one element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    pub global_id: String,
    pub name: Option<String>,
    /// E.g. `BASESLAB`, `FLOOR` or `ROOF` for slabs.
    pub predefined_type: Option<String>,
}

impl Element {
    pub fn new(kind: ElementKind, global_id: impl Into<String>) -> Self {
        Self {
            kind,
            global_id: global_id.into(),
            name: None,
            predefined_type: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_predefined_type(mut self, predefined_type: impl Into<String>) -> Self {
        self.predefined_type = Some(predefined_type.into());
        self
    }
}

/// Single property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PsetValue {
    Real(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
}

impl PsetValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PsetValue::Real(v) => Some(*v),
            PsetValue::Integer(v) => Some(*v as f64),
            PsetValue::Text(s) => s.trim().parse().ok(),
            PsetValue::Boolean(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PsetValue::Boolean(b) => Some(*b),
            PsetValue::Text(s) => match s.trim().to_ascii_uppercase().as_str() {
                "TRUE" | ".T." => Some(true),
                "FALSE" | ".F." => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Relationship traversal and property lookup over the element catalog.
pub trait ElementIndex {
    fn element(&self, key: ElementKey) -> Option<&Element>;

    /// Elements of `kind` anywhere below `root` in the spatial/aggregation
    /// tree, optionally filtered by predefined type (case-insensitive), in a
    /// stable order.
    fn find_descendants(
        &self,
        root: ElementKey,
        kind: ElementKind,
        predefined_type: Option<&str>,
    ) -> Vec<ElementKey>;

    /// Property `attribute` of property set `set`. Without an attribute the
    /// call only tests that the set exists and yields `Boolean(true)`.
    fn find_pset(&self, element: ElementKey, set: &str, attribute: Option<&str>) -> Option<PsetValue>;
}

/// Triangulated geometry of elements, in model coordinates.
pub trait MeshSource {
    fn mesh(&self, element: ElementKey) -> Option<Mesh>;
}

/// Model-to-world coordinate transformation.
pub trait Georeference {
    fn georeference(&self, point: Point3<f64>) -> Point3<f64>;
}

/// Leaves coordinates untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityGeoreference;

impl Georeference for IdentityGeoreference {
    #[inline]
    fn georeference(&self, point: Point3<f64>) -> Point3<f64> {
        point
    }
}

/// Map conversion: rotation about the vertical axis, uniform horizontal
/// scale and an origin shift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineGeoreference {
    /// False easting (X offset to map CRS)
    pub eastings: f64,
    /// False northing (Y offset to map CRS)
    pub northings: f64,
    /// Orthogonal height (Z offset)
    pub orthogonal_height: f64,
    /// X-axis abscissa (cos of rotation angle)
    pub x_axis_abscissa: f64,
    /// X-axis ordinate (sin of rotation angle)
    pub x_axis_ordinate: f64,
    /// Scale factor (default 1.0)
    pub scale: f64,
}

impl Default for AffineGeoreference {
    fn default() -> Self {
        Self {
            eastings: 0.0,
            northings: 0.0,
            orthogonal_height: 0.0,
            x_axis_abscissa: 1.0,
            x_axis_ordinate: 0.0,
            scale: 1.0,
        }
    }
}

impl AffineGeoreference {
    /// Shift plus a rotation given in radians.
    pub fn new(eastings: f64, northings: f64, orthogonal_height: f64, rotation: f64, scale: f64) -> Self {
        Self {
            eastings,
            northings,
            orthogonal_height,
            x_axis_abscissa: rotation.cos(),
            x_axis_ordinate: rotation.sin(),
            scale,
        }
    }

    /// Get rotation angle in radians
    #[inline]
    pub fn rotation(&self) -> f64 {
        self.x_axis_ordinate.atan2(self.x_axis_abscissa)
    }
}

impl Georeference for AffineGeoreference {
    #[inline]
    fn georeference(&self, p: Point3<f64>) -> Point3<f64> {
        let cos_r = self.x_axis_abscissa;
        let sin_r = self.x_axis_ordinate;
        let s = self.scale;

        let e = s * (cos_r * p.x - sin_r * p.y) + self.eastings;
        let n = s * (sin_r * p.x + cos_r * p.y) + self.northings;
        let h = p.z + self.orthogonal_height;

        Point3::new(e, n, h)
    }
}

/// The host-side services a reconstruction reads from.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub index: &'a dyn ElementIndex,
    pub meshes: &'a dyn MeshSource,
    pub georef: &'a dyn Georeference,
}

impl<'a> Collaborators<'a> {
    pub fn new(index: &'a dyn ElementIndex, meshes: &'a dyn MeshSource, georef: &'a dyn Georeference) -> Self {
        Self { index, meshes, georef }
    }

    /// Mesh of an element in world coordinates, `None` when the element has
    /// no (non-empty) geometry.
    pub fn world_mesh(&self, element: ElementKey) -> Option<Mesh> {
        self.meshes
            .mesh(element)
            .filter(|m| !m.is_empty())
            .map(|m| m.transformed(|p| self.georef.georeference(p)))
    }

    pub fn name(&self, element: ElementKey) -> Option<String> {
        self.index.element(element).and_then(|e| e.name.clone())
    }

    /// Display label for messages: name, else global id.
    pub fn label(&self, element: ElementKey) -> String {
        self.index
            .element(element)
            .map(|e| e.name.clone().unwrap_or_else(|| e.global_id.clone()))
            .unwrap_or_else(|| "<unknown element>".into())
    }
}
