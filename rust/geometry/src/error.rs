// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during polygon processing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Three (or more) points that should span a plane are collinear.
    #[error("Degenerate plane: points are collinear or coincident")]
    DegeneratePlane,

    /// A group of coplanar polygons could not be reduced to one outer ring.
    #[error("Unresolved merge: {0}")]
    UnresolvedMerge(String),

    #[error("Degenerate ring: {0}")]
    DegenerateRing(String),

    #[error("2D boolean operation failed: {0}")]
    Boolean(String),
}
