// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconstruction settings.
//!
//! Defaults reproduce the tolerances the envelope heuristics were tuned with.
//! Hosts override them from JSON ([`ReconstructionConfig::from_json`]) or
//! from `IFC2CITYGML_*` environment variables ([`ReconstructionConfig::from_env`]).

use ifc2citygml_geometry::{PlanarMerger, Tolerances};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// CityGML level of detail of the reconstructed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum LevelOfDetail {
    /// Footprint and roof edge.
    Lod0,
    /// Block model.
    Lod1,
    /// Roof shapes and walls.
    #[default]
    Lod2,
    /// Lod2 with doors and windows.
    Lod3,
}

impl LevelOfDetail {
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Lod0),
            1 => Some(Self::Lod1),
            2 => Some(Self::Lod2),
            3 => Some(Self::Lod3),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::Lod0 => 0,
            Self::Lod1 => 1,
            Self::Lod2 => 2,
            Self::Lod3 => 3,
        }
    }
}

/// Distance / angle pair for [`ifc2citygml_geometry::simplify_polygon`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimplifyTolerance {
    pub distance: f64,
    pub angle: f64,
}

impl SimplifyTolerance {
    pub const fn new(distance: f64, angle: f64) -> Self {
        Self { distance, angle }
    }

    pub fn tolerances(&self) -> Tolerances {
        Tolerances::new(self.distance, self.angle)
    }
}

/// All tunables of a reconstruction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub lod: LevelOfDetail,
    /// Energy attributes are derived by the host afterwards; reconstruction
    /// only reserves half of the progress range for them.
    pub energy_attributes: bool,

    /// Component tolerance on unit normals when merging coplanar polygons.
    pub coplanar_tolerance: f64,
    /// Per-coordinate tolerance for shared vertices.
    pub contact_tolerance: f64,
    pub max_merge_passes: usize,
    pub suspicious_rise: f64,
    pub suspicious_run: f64,

    /// Max angle (radians) between triangle normals of one coplanar group.
    pub grouping_angle: f64,
    /// Max plane distance of one coplanar group.
    pub grouping_distance: f64,

    pub base_simplify: SimplifyTolerance,
    pub roof_simplify: SimplifyTolerance,
    pub wall_simplify: SimplifyTolerance,
    /// Used on hole remainders of the merger and on filler roof rings.
    pub merge_simplify: SimplifyTolerance,

    /// Share of the best score a base/roof group needs to be kept.
    pub selection_ratio: f64,
    /// Height band around the lowest base / highest roof group.
    pub height_band: f64,
    /// Growing offsets tried when merged pieces do not touch.
    pub buffer_ladder: Vec<f64>,

    /// Minimal height difference that makes two adjoining roofs need a wall.
    pub step_tolerance: f64,
    /// Largest vertical move allowed when snapping wall vertices to planes.
    pub height_snap_tolerance: f64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            lod: LevelOfDetail::Lod2,
            energy_attributes: false,
            coplanar_tolerance: 1e-3,
            contact_tolerance: 1e-4,
            max_merge_passes: 3,
            suspicious_rise: 2.3,
            suspicious_run: 10.0,
            grouping_angle: 1e-3,
            grouping_distance: 1e-3,
            base_simplify: SimplifyTolerance::new(0.1, 0.05),
            roof_simplify: SimplifyTolerance::new(0.01, 0.05),
            wall_simplify: SimplifyTolerance::new(0.01, 0.05),
            merge_simplify: SimplifyTolerance::new(0.001, 0.0001),
            selection_ratio: 0.9,
            height_band: 0.01,
            buffer_ladder: vec![0.001, 0.005, 0.01, 0.05, 0.1],
            step_tolerance: 1e-3,
            height_snap_tolerance: 0.5,
        }
    }
}

impl ReconstructionConfig {
    /// Defaults overridden by `IFC2CITYGML_*` environment variables, then
    /// validated. Unparsable values keep their default.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let number = |name: &str| var(name).and_then(|v| v.trim().parse::<f64>().ok());
        let config = Self {
            lod: var("IFC2CITYGML_LOD")
                .and_then(|v| v.trim().parse::<u8>().ok())
                .and_then(LevelOfDetail::from_number)
                .unwrap_or(defaults.lod),
            energy_attributes: var("IFC2CITYGML_ENERGY")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(defaults.energy_attributes),
            max_merge_passes: var("IFC2CITYGML_MERGE_PASSES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_merge_passes),
            contact_tolerance: number("IFC2CITYGML_CONTACT_TOLERANCE").unwrap_or(defaults.contact_tolerance),
            height_snap_tolerance: number("IFC2CITYGML_HEIGHT_SNAP").unwrap_or(defaults.height_snap_tolerance),
            buffer_ladder: var("IFC2CITYGML_BUFFER_LADDER")
                .map(|v| {
                    v.split(',')
                        .filter_map(|s| s.trim().parse::<f64>().ok())
                        .collect::<Vec<_>>()
                })
                .filter(|ladder| !ladder.is_empty())
                .unwrap_or_else(|| defaults.buffer_ladder.clone()),
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a (possibly partial) JSON object; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("coplanar_tolerance", self.coplanar_tolerance),
            ("contact_tolerance", self.contact_tolerance),
            ("grouping_angle", self.grouping_angle),
            ("grouping_distance", self.grouping_distance),
            ("height_band", self.height_band),
            ("step_tolerance", self.step_tolerance),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| !(*v > 0.0)) {
            return Err(Error::Config(format!("{name} must be positive")));
        }
        if !(0.0..=1.0).contains(&self.selection_ratio) {
            return Err(Error::Config("selection_ratio must be within [0, 1]".into()));
        }
        if self.buffer_ladder.iter().any(|d| !(*d > 0.0)) {
            return Err(Error::Config("buffer_ladder entries must be positive".into()));
        }
        let simplify = [
            ("base_simplify", self.base_simplify),
            ("roof_simplify", self.roof_simplify),
            ("wall_simplify", self.wall_simplify),
            ("merge_simplify", self.merge_simplify),
        ];
        if let Some((name, _)) = simplify.iter().find(|(_, t)| !(t.distance >= 0.0 && t.angle >= 0.0)) {
            return Err(Error::Config(format!("{name} tolerances must not be negative")));
        }
        if !(self.height_snap_tolerance >= 0.0) {
            return Err(Error::Config("height_snap_tolerance must not be negative".into()));
        }
        Ok(())
    }

    /// Merger configured with this run's tolerances.
    pub fn merger(&self) -> PlanarMerger {
        PlanarMerger {
            suspicious_rise: self.suspicious_rise,
            suspicious_run: self.suspicious_run,
            remainder_tolerances: self.merge_simplify.tolerances(),
            ..PlanarMerger::new(
                self.coplanar_tolerance,
                self.contact_tolerance,
                self.max_merge_passes,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ReconstructionConfig::from_json(r#"{"lod":"Lod3","height_snap_tolerance":0.25}"#).unwrap();
        assert_eq!(config.lod, LevelOfDetail::Lod3);
        assert_eq!(config.height_snap_tolerance, 0.25);
        assert_eq!(config.buffer_ladder, vec![0.001, 0.005, 0.01, 0.05, 0.1]);
        assert_eq!(config.base_simplify, SimplifyTolerance::new(0.1, 0.05));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = ReconstructionConfig::from_json(r#"{"buffer_ladder":[0.01,-1.0]}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = ReconstructionConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn merger_carries_tolerances() {
        let config = ReconstructionConfig {
            max_merge_passes: 5,
            ..Default::default()
        };
        let merger = config.merger();
        assert_eq!(merger.max_passes, 5);
        assert_eq!(merger.contact_tolerance, 1e-4);
        assert_eq!(merger.suspicious_rise, 2.3);
        assert_eq!(merger.remainder_tolerances, Tolerances::new(0.001, 0.0001));
    }

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| pairs.iter().find(|(k, _)| *k == name).map(|(_, v)| v.to_string())
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ReconstructionConfig::from_vars(vars(&[
            ("IFC2CITYGML_LOD", "3"),
            ("IFC2CITYGML_ENERGY", "yes"),
            ("IFC2CITYGML_HEIGHT_SNAP", " 0.2 "),
            ("IFC2CITYGML_BUFFER_LADDER", "0.002, 0.02"),
            ("IFC2CITYGML_MERGE_PASSES", "many"),
        ]))
        .unwrap();
        assert_eq!(config.lod, LevelOfDetail::Lod3);
        assert!(config.energy_attributes);
        assert_eq!(config.height_snap_tolerance, 0.2);
        assert_eq!(config.buffer_ladder, vec![0.002, 0.02]);
        assert_eq!(config.max_merge_passes, 3);
    }

    #[test]
    fn invalid_environment_is_rejected() {
        for pairs in [
            [("IFC2CITYGML_HEIGHT_SNAP", "-1")],
            [("IFC2CITYGML_CONTACT_TOLERANCE", "0")],
            [("IFC2CITYGML_BUFFER_LADDER", "0.01,-0.5")],
        ] {
            let err = ReconstructionConfig::from_vars(vars(&pairs)).unwrap_err();
            assert!(matches!(err, Error::Config(_)));
        }
    }

    #[test]
    fn from_env_reads_the_process_environment() {
        std::env::set_var("IFC2CITYGML_HEIGHT_SNAP", "0.75");
        let config = ReconstructionConfig::from_env();
        std::env::set_var("IFC2CITYGML_HEIGHT_SNAP", "-0.75");
        let rejected = ReconstructionConfig::from_env();
        std::env::remove_var("IFC2CITYGML_HEIGHT_SNAP");

        assert_eq!(config.unwrap().height_snap_tolerance, 0.75);
        assert!(matches!(rejected, Err(Error::Config(_))));
    }

    #[test]
    fn lod_numbers() {
        assert_eq!(LevelOfDetail::from_number(1), Some(LevelOfDetail::Lod1));
        assert_eq!(LevelOfDetail::from_number(4), None);
        assert_eq!(LevelOfDetail::Lod3.number(), 3);
    }
}
