// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # ifc2citygml Envelope
//!
//! Rebuilds the outer shell of buildings from triangulated IFC elements as
//! CityGML boundary surfaces (ground, roof and wall surfaces, plus doors and
//! windows at LoD3).
//!
//! ## Phases
//!
//! 1. Base extraction: bottom faces of the base slabs
//! 2. Roof extraction: top faces of every roof element
//! 3. Walls from every base edge up to the roofs above it, with flat filler
//!    roofs where no roof covers the wall
//! 4. Walls between roofs at different heights
//! 5. Cleanup of overlapping wall fragments and clipping of roof overhangs
//! 6. Doors and windows cut into their walls (LoD3)
//! 7. Snapping of wall vertices onto nearby base and roof planes
//!
//! LoD0 (footprint and roof edge) and LoD1 (block model) stop after the
//! extraction phases.
//!
//! ## Collaborators
//!
//! Parsing and triangulation stay with the host: the reconstruction reads
//! elements, meshes and property sets through [`ElementIndex`],
//! [`MeshSource`] and [`Georeference`], and reports progress through a
//! [`ReconstructionContext`]. [`InMemoryModel`] implements the model side for
//! tests and simple hosts.
//!
//! ```ignore
//! let sources = Collaborators::new(&model, &model, &IdentityGeoreference);
//! let reconstructor = EnvelopeReconstructor::new(sources, ReconstructionConfig::from_env()?);
//! for envelope in reconstructor.reconstruct_document(project, &mut SilentContext)? {
//!     println!("{}", envelope.to_json(&model)?);
//! }
//! ```

mod cleanup;
mod extract;
mod height;
mod lod;
mod openings;
mod roof_walls;
mod walls;

pub mod config;
pub mod context;
pub mod element;
pub mod error;
pub mod model;
pub mod reconstruct;
pub mod snapshot;
pub mod surface;

pub use config::{LevelOfDetail, ReconstructionConfig, SimplifyTolerance};
pub use context::{Phase, Progress, ReconstructionContext, RecordingContext, SilentContext};
pub use element::{
    AffineGeoreference, Collaborators, Element, ElementIndex, ElementKey, ElementKind, Georeference,
    IdentityGeoreference, MeshSource, PsetValue,
};
pub use error::{Error, Result};
pub use model::InMemoryModel;
pub use reconstruct::EnvelopeReconstructor;
pub use snapshot::{EnvelopeSnapshot, OpeningSnapshot, PolygonSnapshot, SurfaceSnapshot};
pub use surface::{BuildingEnvelope, Opening, OpeningKind, Surface, SurfaceKind, SurfacePolygon};
