// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host context: cancellation, progress reporting and user-facing messages.

use std::cell::Cell;

use crate::error::{Error, Result};

/// Callbacks the host application provides to a reconstruction run.
pub trait ReconstructionContext {
    fn is_cancelled(&self) -> bool;
    /// Overall progress in percent, never decreasing.
    fn set_progress(&mut self, percent: f64);
    fn log(&mut self, message: &str);
}

/// Context that never cancels and discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentContext;

impl ReconstructionContext for SilentContext {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn set_progress(&mut self, _percent: f64) {}

    fn log(&mut self, _message: &str) {}
}

/// Context that keeps every message and progress value, optionally
/// cancelling after a fixed number of cancellation checks.
#[derive(Debug, Default)]
pub struct RecordingContext {
    pub messages: Vec<String>,
    pub progress: Vec<f64>,
    cancel_after: Option<usize>,
    checks: Cell<usize>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports cancellation from the `checks + 1`-th query on.
    pub fn cancelling_after(checks: usize) -> Self {
        Self {
            cancel_after: Some(checks),
            ..Self::default()
        }
    }

    pub fn last_progress(&self) -> Option<f64> {
        self.progress.last().copied()
    }
}

impl ReconstructionContext for RecordingContext {
    fn is_cancelled(&self) -> bool {
        let seen = self.checks.get();
        self.checks.set(seen + 1);
        self.cancel_after.is_some_and(|limit| seen >= limit)
    }

    fn set_progress(&mut self, percent: f64) {
        self.progress.push(percent);
    }

    fn log(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}

/// Reconstruction phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Base,
    Roofs,
    Walls,
    InterRoofWalls,
    Cleanup,
    Openings,
    HeightCorrection,
}

impl Phase {
    /// Share of the progress range (percent) of one building.
    pub fn weight(self) -> f64 {
        match self {
            Phase::HeightCorrection => 5.0,
            _ => 10.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Base => "extracting base surfaces",
            Phase::Roofs => "extracting roof surfaces",
            Phase::Walls => "generating walls",
            Phase::InterRoofWalls => "generating walls between roofs",
            Phase::Cleanup => "cleaning up surfaces",
            Phase::Openings => "integrating doors and windows",
            Phase::HeightCorrection => "correcting wall heights",
        }
    }
}

/// Progress and diagnostics threaded explicitly through every phase.
///
/// Wraps the host context, scales phase weights to the number of buildings,
/// and collects non-fatal issues for the building currently processed.
pub struct Progress<'a> {
    ctx: &'a mut dyn ReconstructionContext,
    percent: f64,
    scale: f64,
    issues: Vec<Error>,
}

impl<'a> Progress<'a> {
    /// Starts at 10 % (5 % with energy attributes), where the host's parsing
    /// stage left off.
    pub fn new(ctx: &'a mut dyn ReconstructionContext, buildings: usize, energy_attributes: bool) -> Self {
        let halve = if energy_attributes { 0.5 } else { 1.0 };
        let mut progress = Self {
            ctx,
            percent: 10.0 * halve,
            scale: halve / buildings.max(1) as f64,
            issues: Vec::new(),
        };
        let start = progress.percent;
        progress.ctx.set_progress(start);
        progress
    }

    /// Fails with [`Error::Cancelled`] once the host asks to stop.
    pub fn checkpoint(&self) -> Result<()> {
        if self.ctx.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn begin(&mut self, phase: Phase) -> Result<()> {
        self.checkpoint()?;
        self.log(phase.label());
        Ok(())
    }

    /// Books the full weight of a finished phase.
    pub fn finish(&mut self, phase: Phase) {
        self.advance(phase.weight());
    }

    /// Books `fraction` of a phase, e.g. `1 / n` per processed element.
    pub fn step(&mut self, phase: Phase, fraction: f64) {
        self.advance(phase.weight() * fraction);
    }

    /// Books raw percent (before building and energy scaling).
    pub fn advance(&mut self, weight: f64) {
        let next = (self.percent + weight * self.scale).min(100.0);
        if next > self.percent {
            self.percent = next;
            self.ctx.set_progress(next);
        }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn log(&mut self, message: &str) {
        self.ctx.log(message);
    }

    /// Records a non-fatal problem: logged for the user and kept as an issue.
    pub fn report(&mut self, error: Error) {
        tracing::warn!(%error, "surface omitted");
        self.ctx.log(&error.to_string());
        self.issues.push(error);
    }

    /// Issues recorded since the previous call.
    pub fn take_issues(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_monotonic_and_capped() {
        let mut ctx = RecordingContext::new();
        {
            let mut progress = Progress::new(&mut ctx, 1, false);
            for _ in 0..20 {
                progress.finish(Phase::Base);
            }
            progress.advance(-5.0);
        }
        assert_eq!(ctx.progress[0], 10.0);
        assert!(ctx.progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ctx.last_progress(), Some(100.0));
    }

    #[test]
    fn energy_attributes_halve_weights() {
        let mut ctx = RecordingContext::new();
        {
            let mut progress = Progress::new(&mut ctx, 2, true);
            progress.finish(Phase::Walls);
        }
        assert_eq!(ctx.progress, vec![5.0, 7.5]);
    }

    #[test]
    fn checkpoint_reports_cancellation() {
        let mut ctx = RecordingContext::cancelling_after(1);
        let progress = Progress::new(&mut ctx, 1, false);
        assert!(progress.checkpoint().is_ok());
        assert_eq!(progress.checkpoint(), Err(Error::Cancelled));
    }

    #[test]
    fn reported_issues_are_logged_and_taken() {
        let mut ctx = RecordingContext::new();
        {
            let mut progress = Progress::new(&mut ctx, 1, false);
            progress.report(Error::missing("roof"));
            assert_eq!(progress.take_issues().len(), 1);
            assert!(progress.take_issues().is_empty());
        }
        assert_eq!(ctx.messages, vec!["Missing input geometry: roof".to_string()]);
    }
}
