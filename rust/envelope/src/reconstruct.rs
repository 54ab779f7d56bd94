// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Phase driver for one building and for whole documents.

use ifc2citygml_geometry::{Plane, Polygon};

use crate::cleanup::{clean_walls, clip_roofs_to_base};
use crate::config::{LevelOfDetail, ReconstructionConfig};
use crate::context::{Phase, Progress, ReconstructionContext};
use crate::element::{Collaborators, ElementKey, ElementKind};
use crate::error::{Error, Result};
use crate::extract::{extract_base, extract_roofs, lowest, nominal_height, Patch};
use crate::height::correct_wall_heights;
use crate::lod::{block_surfaces, footprint_surfaces};
use crate::openings::integrate_openings;
use crate::roof_walls::inter_roof_walls;
use crate::surface::{BuildingEnvelope, Surface, SurfaceKind};
use crate::walls::{generate_walls, WallOutput};

const WALL_PSET: &str = "Pset_WallCommon";
const EXTERNAL_FLAG: &str = "IsExternal";

/// Reconstructs building envelopes from element meshes.
///
/// # Example
///
/// ```ignore
/// let sources = Collaborators::new(&model, &model, &IdentityGeoreference);
/// let reconstructor = EnvelopeReconstructor::new(sources, ReconstructionConfig::default());
/// let envelopes = reconstructor.reconstruct_document(project, &mut SilentContext)?;
/// ```
pub struct EnvelopeReconstructor<'a> {
    sources: Collaborators<'a>,
    config: ReconstructionConfig,
}

impl<'a> EnvelopeReconstructor<'a> {
    pub fn new(sources: Collaborators<'a>, config: ReconstructionConfig) -> Self {
        Self { sources, config }
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Reconstructs every building below `root` (or `root` itself when it is
    /// a building), one after the other.
    pub fn reconstruct_document(
        &self,
        root: ElementKey,
        ctx: &mut dyn ReconstructionContext,
    ) -> Result<Vec<BuildingEnvelope>> {
        let index = self.sources.index;
        let buildings = match index.element(root) {
            Some(e) if e.kind == ElementKind::Building => vec![root],
            _ => index.find_descendants(root, ElementKind::Building, None),
        };

        let mut progress = Progress::new(ctx, buildings.len(), self.config.energy_attributes);
        if buildings.is_empty() {
            progress.log("no building found");
            return Ok(Vec::new());
        }

        let mut envelopes = Vec::with_capacity(buildings.len());
        for building in buildings {
            progress.log(&format!("reconstructing building {}", self.sources.label(building)));
            envelopes.push(self.reconstruct(building, &mut progress)?);
        }
        Ok(envelopes)
    }

    /// Runs all phases for one building at the configured level of detail.
    ///
    /// Only [`Error::Cancelled`] is returned as an error; every other
    /// problem ends up in [`BuildingEnvelope::issues`].
    pub fn reconstruct(&self, building: ElementKey, progress: &mut Progress) -> Result<BuildingEnvelope> {
        let config = &self.config;
        let sources = &self.sources;
        tracing::debug!(lod = config.lod.number(), "reconstructing building");

        let bases = recover(extract_base(sources, config, building, progress), progress)?;
        let roofs = recover(extract_roofs(sources, config, building, progress), progress)?;
        let height = nominal_height(sources, building, &bases, &roofs);
        let wall_source = self.wall_source(building);

        let surfaces = match config.lod {
            LevelOfDetail::Lod0 => {
                skip(progress, &[Phase::Walls, Phase::InterRoofWalls, Phase::Cleanup, Phase::Openings]);
                let surfaces = recover(footprint_surfaces(&bases, &roofs), progress)?;
                progress.finish(Phase::HeightCorrection);
                surfaces
            }
            LevelOfDetail::Lod1 => {
                skip(progress, &[Phase::Walls, Phase::InterRoofWalls, Phase::Cleanup, Phase::Openings]);
                let surfaces = match height {
                    Some(h) => recover(block_surfaces(&bases, h, wall_source), progress)?,
                    None => {
                        progress.report(Error::missing("building height for the block model"));
                        Vec::new()
                    }
                };
                progress.finish(Phase::HeightCorrection);
                surfaces
            }
            LevelOfDetail::Lod2 | LevelOfDetail::Lod3 => {
                self.detailed(building, &bases, roofs, height, wall_source, progress)?
            }
        };

        progress.checkpoint()?;
        let envelope = BuildingEnvelope {
            building,
            lod: config.lod,
            surfaces,
            footprint: bases.into_iter().map(|b| b.polygon).collect(),
            height,
            issues: progress.take_issues(),
        };
        tracing::debug!(
            surfaces = envelope.surfaces.len(),
            issues = envelope.issues.len(),
            "building reconstructed"
        );
        Ok(envelope)
    }

    /// Walls from the base edges up to the roofs, inter-roof walls, cleanup,
    /// openings and height correction.
    fn detailed(
        &self,
        building: ElementKey,
        bases: &[Patch],
        mut roofs: Vec<Patch>,
        height: Option<f64>,
        wall_source: Option<ElementKey>,
        progress: &mut Progress,
    ) -> Result<Vec<Surface>> {
        let config = &self.config;
        let originals: Vec<Patch> = bases.iter().chain(&roofs).cloned().collect();

        let nominal_top = lowest(bases).zip(height).map(|(z, h)| z + h);
        let WallOutput { walls, fillers } =
            recover(generate_walls(bases, &roofs, nominal_top, config, progress), progress)?;
        roofs.extend(fillers);

        let step_walls = recover(inter_roof_walls(&mut roofs, config, progress), progress)?;
        let walls = recover(clean_walls(walls, step_walls, &roofs, config, progress), progress)?;
        let roofs = clip_roofs_to_base(roofs, bases, config);
        progress.step(Phase::Cleanup, 0.5);

        let mut wall_surfaces = self.wall_surfaces(walls, wall_source);
        if config.lod == LevelOfDetail::Lod3 {
            recover(
                integrate_openings(&self.sources, building, &mut wall_surfaces, config, progress),
                progress,
            )?;
        } else {
            progress.finish(Phase::Openings);
        }
        let planes: Vec<&Patch> = originals.iter().collect();
        recover(correct_wall_heights(&mut wall_surfaces, &planes, config, progress), progress)?;

        let mut surfaces = Vec::with_capacity(wall_surfaces.len() + roofs.len() + 1);
        if let Some(first) = bases.first() {
            let ground = bases.iter().map(|b| b.polygon.reversed()).collect();
            surfaces.push(Surface::new(SurfaceKind::Ground, ground, first.source));
        }
        for roof in roofs {
            let name = roof.source.and_then(|k| self.sources.name(k));
            surfaces.push(Surface::new(SurfaceKind::Roof, vec![roof.polygon], roof.source).with_name(name));
        }
        surfaces.extend(wall_surfaces);
        Ok(surfaces)
    }

    /// One wall surface per plane.
    fn wall_surfaces(&self, walls: Vec<Polygon>, source: Option<ElementKey>) -> Vec<Surface> {
        let merger = self.config.merger();
        let name = source.and_then(|k| self.sources.name(k));
        let mut groups: Vec<(Plane, Vec<Polygon>)> = Vec::new();
        for wall in walls {
            let Ok(plane) = wall.plane() else {
                continue;
            };
            let group = groups.iter_mut().find(|(p, _)| {
                merger.coplanar(&p.normal, &plane.normal)
                    && p.signed_distance(&plane.point).abs() <= self.config.grouping_distance
            });
            match group {
                Some((_, members)) => members.push(wall),
                None => groups.push((plane, vec![wall])),
            }
        }
        groups
            .into_iter()
            .map(|(_, polygons)| Surface::new(SurfaceKind::Wall, polygons, source).with_name(name.clone()))
            .collect()
    }

    /// First external wall of the building, else its first wall.
    fn wall_source(&self, building: ElementKey) -> Option<ElementKey> {
        let index = self.sources.index;
        let walls = index.find_descendants(building, ElementKind::Wall, None);
        walls
            .iter()
            .copied()
            .find(|w| {
                index
                    .find_pset(*w, WALL_PSET, Some(EXTERNAL_FLAG))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            })
            .or_else(|| walls.first().copied())
    }
}

/// Keeps cancellation fatal and turns any other failure into an issue.
fn recover<T: Default>(result: Result<T>, progress: &mut Progress) -> Result<T> {
    match result {
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(error) => {
            progress.report(error);
            Ok(T::default())
        }
        Ok(value) => Ok(value),
    }
}

fn skip(progress: &mut Progress, phases: &[Phase]) {
    for phase in phases {
        progress.finish(*phase);
    }
}
