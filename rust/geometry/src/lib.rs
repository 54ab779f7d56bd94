// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # ifc2citygml Geometry
//!
//! Planar polygon toolkit used to rebuild building envelopes from triangulated
//! element meshes:
//!
//! - [`plane`]: planes, plane/plane and plane/line intersections, inclination,
//!   azimuth and true 3D area
//! - [`simplify`]: fixed-point vertex reduction for rings and polylines
//! - [`buffer`]: horizontal offsetting of rings
//! - [`merge`]: union of coplanar polygons sharing vertices
//! - [`bool2d`]: 2D intersection, difference and union on projected footprints
//!
//! All coordinates are `f64` in the target (projected) reference system.

pub mod bool2d;
pub mod buffer;
pub mod error;
pub mod merge;
pub mod mesh;
pub mod plane;
pub mod polygon;
pub mod simplify;

pub use bool2d::{Projection, Region2D};
pub use buffer::{buffer_2d, buffer_polygon};
pub use error::{Error, Result};
pub use merge::{MergeOutcome, PlanarMerger};
pub use mesh::Mesh;
pub use nalgebra::{Point2, Point3, Vector3};
pub use plane::{
    area_3d, azimuth, inclination, intersect_plane_line, intersect_planes, plane_from_points,
    Line3, Plane,
};
pub use polygon::{Polygon, Ring};
pub use simplify::{simplify_polygon, simplify_ring, Simplified, Tolerances};
