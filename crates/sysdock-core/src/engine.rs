//! One patch run over a set of groups.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use strum::{Display, IntoStaticStr};
use tracing::{info, warn};

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::outcome::{GroupOutcomes, PatchOutcome};
use crate::policy::{FeatureFlags, PolicyResolver};
use crate::process::ProcessControl;
use crate::template::PatchGroup;
use crate::walker::{DEFAULT_CHUNK_SIZE, RegionWalker, WalkStats};

/// What happened to a group as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum GroupStatus {
    Scanned,
    /// Every template was settled before scanning
    NothingToScan,
    TargetNotRunning,
    /// The target could not be inspected
    Failed,
    /// Patching is switched off for the current storage mode
    PatchingDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub name: String,
    pub target_id: String,
    pub status: GroupStatus,
    /// Template names, indexed like `outcomes`
    pub templates: Vec<String>,
    pub outcomes: GroupOutcomes,
}

impl GroupReport {
    pub fn entries(&self) -> impl Iterator<Item = (&str, PatchOutcome)> {
        self.templates
            .iter()
            .map(String::as_str)
            .zip(self.outcomes.as_slice().iter().copied())
    }

    pub fn outcome_of(&self, template: &str) -> Option<PatchOutcome> {
        self.entries()
            .find(|(name, _)| *name == template)
            .map(|(_, outcome)| outcome)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub patching_enabled: bool,
    pub groups: Vec<GroupReport>,
    /// Time spent locating and scanning targets
    pub elapsed: Duration,
    pub stats: WalkStats,
}

impl RunReport {
    pub fn group(&self, name: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn count(&self, outcome: PatchOutcome) -> usize {
        self.groups.iter().map(|g| g.outcomes.count(outcome)).sum()
    }
}

/// Runs policy resolution and scanning for every group against one
/// process backend.
pub struct Engine<'a, P: ProcessControl> {
    process: &'a P,
    chunk_size: usize,
}

impl<'a, P: ProcessControl> Engine<'a, P> {
    pub fn new(process: &'a P) -> Self {
        Self {
            process,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Patch every group in order.
    ///
    /// A group whose target is missing or cannot be inspected is reported
    /// and the run moves on. Failing to list processes ends the run with an
    /// error.
    pub fn run<F: FeatureFlags>(
        &self,
        groups: &[PatchGroup],
        ctx: &RunContext,
        patching_enabled: bool,
        flags: &mut F,
    ) -> Result<RunReport> {
        let started_at = Local::now();
        let resolver = PolicyResolver::new(ctx);
        let tables: Vec<GroupOutcomes> = groups
            .iter()
            .map(|g| resolver.resolve(g, flags))
            .collect();

        if !patching_enabled {
            info!(
                "Patching disabled for {} storage",
                if ctx.emulated_storage { "emulated" } else { "system" }
            );
        }

        let start = Instant::now();
        let mut walker = RegionWalker::new(self.process, self.chunk_size);
        let mut reports = Vec::with_capacity(groups.len());

        for (group, mut outcomes) in groups.iter().zip(tables) {
            let status = if !patching_enabled {
                outcomes.fill(PatchOutcome::Skipped);
                GroupStatus::PatchingDisabled
            } else if !outcomes.any_pending() {
                GroupStatus::NothingToScan
            } else {
                match walker.patch_group(group, &mut outcomes) {
                    Ok(()) => GroupStatus::Scanned,
                    Err(Error::TargetNotRunning(id)) => {
                        warn!("{}: target {} is not running", group.name, id);
                        GroupStatus::TargetNotRunning
                    }
                    Err(e) if e.is_group_local() => {
                        warn!("{}: {}", group.name, e);
                        GroupStatus::Failed
                    }
                    Err(e) => return Err(e),
                }
            };

            info!(
                "{}: {} ({} patched, {} already patched, {} unpatched)",
                group.name,
                status,
                outcomes.count(PatchOutcome::PatchedByTool),
                outcomes.count(PatchOutcome::PatchedExternally),
                outcomes.count(PatchOutcome::NotFound)
            );

            reports.push(GroupReport {
                name: group.name.clone(),
                target_id: group.target_id.clone(),
                status,
                templates: group.templates.iter().map(|t| t.name.clone()).collect(),
                outcomes,
            });
        }

        let elapsed = start.elapsed();
        let stats = walker.stats();
        info!(
            "Run finished in {:.3}s: {} regions, {} bytes read, {} writes",
            elapsed.as_secs_f64(),
            stats.regions_scanned,
            stats.bytes_read,
            stats.writes
        );

        Ok(RunReport {
            started_at,
            patching_enabled,
            groups: reports,
            elapsed,
            stats,
        })
    }
}
