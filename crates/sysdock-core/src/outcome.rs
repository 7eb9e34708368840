//! Per-template outcome of a run.

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::template::PatchGroup;

/// Outcome state machine: starts at `NotFound`; every other state is
/// terminal for the run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    IntoStaticStr,
)]
pub enum PatchOutcome {
    #[default]
    #[strum(serialize = "Unpatched")]
    NotFound,
    #[strum(serialize = "Skipped")]
    Skipped,
    #[strum(serialize = "Disabled")]
    Disabled,
    /// Target bytes already held the patch before this run
    #[strum(serialize = "Patched (file)")]
    PatchedExternally,
    #[strum(serialize = "Patched (sysdock)")]
    PatchedByTool,
    #[strum(serialize = "Failed (write)")]
    WriteFailed,
}

impl PatchOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::NotFound)
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Outcomes of one patch group, indexed like the group's templates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupOutcomes {
    outcomes: Vec<PatchOutcome>,
}

impl GroupOutcomes {
    pub fn new(len: usize) -> Self {
        Self {
            outcomes: vec![PatchOutcome::NotFound; len],
        }
    }

    pub fn for_group(group: &PatchGroup) -> Self {
        Self::new(group.templates.len())
    }

    pub fn get(&self, index: usize) -> PatchOutcome {
        self.outcomes[index]
    }

    pub fn set(&mut self, index: usize, outcome: PatchOutcome) {
        self.outcomes[index] = outcome;
    }

    pub fn fill(&mut self, outcome: PatchOutcome) {
        self.outcomes.fill(outcome);
    }

    /// Whether any template is still eligible for scanning.
    pub fn any_pending(&self) -> bool {
        self.outcomes.iter().any(|o| !o.is_terminal())
    }

    pub fn as_slice(&self) -> &[PatchOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn count(&self, outcome: PatchOutcome) -> usize {
        self.outcomes.iter().filter(|&&o| o == outcome).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_strings() {
        assert_eq!(PatchOutcome::NotFound.to_string(), "Unpatched");
        assert_eq!(PatchOutcome::PatchedExternally.as_str(), "Patched (file)");
        assert_eq!(PatchOutcome::PatchedByTool.as_str(), "Patched (sysdock)");
        assert_eq!(PatchOutcome::WriteFailed.as_str(), "Failed (write)");
    }

    #[test]
    fn test_only_not_found_is_pending() {
        assert!(!PatchOutcome::NotFound.is_terminal());
        for outcome in [
            PatchOutcome::Skipped,
            PatchOutcome::Disabled,
            PatchOutcome::PatchedExternally,
            PatchOutcome::PatchedByTool,
            PatchOutcome::WriteFailed,
        ] {
            assert!(outcome.is_terminal(), "{:?}", outcome);
        }
    }
}
