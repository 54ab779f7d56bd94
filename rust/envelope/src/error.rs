// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for envelope reconstruction.

use thiserror::Error;

/// Result type alias for reconstruction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reconstructing a building envelope.
///
/// Only [`Error::Cancelled`] aborts a reconstruction. Everything else is
/// recorded in [`crate::BuildingEnvelope::issues`] and the affected surface
/// is left out.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Missing input geometry: {0}")]
    MissingInputGeometry(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] ifc2citygml_geometry::Error),

    #[error("Reconstruction cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingInputGeometry(what.into())
    }
}
