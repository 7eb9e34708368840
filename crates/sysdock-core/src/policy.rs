//! Deciding which templates take part in a run before any memory is read.

use tracing::{debug, info};

use crate::context::RunContext;
use crate::outcome::{GroupOutcomes, PatchOutcome};
use crate::template::PatchGroup;

/// Source of per-feature enable flags.
pub trait FeatureFlags {
    /// Flag for `key` in `section`, falling back to `default`.
    fn feature_enabled(&mut self, section: &str, key: &str, default: bool) -> bool;
}

/// Flags that always report the template default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFlags;

impl FeatureFlags for DefaultFlags {
    fn feature_enabled(&mut self, _section: &str, _key: &str, default: bool) -> bool {
        default
    }
}

/// Turns enable flags, exclusivity groups and version bounds into the
/// initial outcome table of each group.
#[derive(Debug, Clone, Copy)]
pub struct PolicyResolver<'a> {
    ctx: &'a RunContext,
}

impl<'a> PolicyResolver<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    pub fn resolve<F: FeatureFlags>(&self, group: &PatchGroup, flags: &mut F) -> GroupOutcomes {
        let mut outcomes = GroupOutcomes::for_group(group);

        let mut enabled: Vec<bool> = group
            .templates
            .iter()
            .map(|t| flags.feature_enabled(&group.name, &t.config_key, t.enabled))
            .collect();

        for (i, t) in group.templates.iter().enumerate() {
            if !enabled[i] {
                outcomes.set(i, PatchOutcome::Disabled);
                continue;
            }
            let Some(exclusive) = t.exclusivity_group else {
                continue;
            };
            let earlier = group.templates[..i]
                .iter()
                .zip(&enabled)
                .find(|(prev, on)| **on && prev.exclusivity_group == Some(exclusive))
                .map(|(prev, _)| prev);
            if let Some(prev) = earlier {
                debug!(
                    "{}: {} disabled, exclusive with {}",
                    group.name, t.name, prev.name
                );
                enabled[i] = false;
                outcomes.set(i, PatchOutcome::Disabled);
            }
        }

        if !self.ctx.version_gating {
            return outcomes;
        }

        if !group.target_versions.contains(self.ctx.target_version) {
            info!(
                "{}: skipped, requires {} (running {})",
                group.name, group.target_versions, self.ctx.target_version
            );
            outcomes.fill(PatchOutcome::Skipped);
            return outcomes;
        }

        for (i, t) in group.templates.iter().enumerate() {
            if outcomes.get(i).is_terminal() {
                continue;
            }
            if !t.target_versions.contains(self.ctx.target_version)
                || !t.provider_versions.contains(self.ctx.provider.version)
            {
                debug!("{}: {} skipped for this version", group.name, t.name);
                outcomes.set(i, PatchOutcome::Skipped);
            }
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::context::ProviderInfo;
    use crate::rule::{Condition, Patch};
    use crate::template::PatternTemplate;
    use crate::version::{Version, VersionRange};

    #[derive(Default)]
    struct MapFlags(HashMap<(String, String), bool>);

    impl MapFlags {
        fn set(mut self, section: &str, key: &str, value: bool) -> Self {
            self.0.insert((section.to_string(), key.to_string()), value);
            self
        }
    }

    impl FeatureFlags for MapFlags {
        fn feature_enabled(&mut self, section: &str, key: &str, default: bool) -> bool {
            self.0
                .get(&(section.to_string(), key.to_string()))
                .copied()
                .unwrap_or(default)
        }
    }

    fn template(name: &str, key: &str) -> PatternTemplate {
        PatternTemplate::builder(name, key, "0x...34")
            .condition(Condition::Cbz)
            .patch(Patch::nop(1).unwrap())
            .enabled(true)
            .build()
            .unwrap()
    }

    fn ctx(fw: Version) -> RunContext {
        RunContext::new(
            fw,
            ProviderInfo {
                version: Version::new(1, 8, 0),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_disabled_by_flag() {
        let group = PatchGroup::new("g", "id", vec![template("a", "a"), template("b", "b")]);
        let ctx = ctx(Version::new(17, 0, 0));
        let mut flags = MapFlags::default().set("g", "b", false);

        let outcomes = PolicyResolver::new(&ctx).resolve(&group, &mut flags);
        assert_eq!(outcomes.as_slice(), &[PatchOutcome::NotFound, PatchOutcome::Disabled]);
    }

    #[test]
    fn test_exclusivity_keeps_first_declared() {
        let mut a = template("no_bw_downgrade", "no_bw_downgrade");
        a.exclusivity_group = Some(0);
        let mut b = template("force_bw_downgrade", "force_bw_downgrade");
        b.exclusivity_group = Some(0);
        let group = PatchGroup::new("g", "id", vec![a, b]);
        let ctx = ctx(Version::new(17, 0, 0));

        let outcomes = PolicyResolver::new(&ctx).resolve(&group, &mut DefaultFlags);
        assert_eq!(outcomes.as_slice(), &[PatchOutcome::NotFound, PatchOutcome::Disabled]);

        // first one switched off: the second survives
        let mut flags = MapFlags::default().set("g", "no_bw_downgrade", false);
        let outcomes = PolicyResolver::new(&ctx).resolve(&group, &mut flags);
        assert_eq!(outcomes.as_slice(), &[PatchOutcome::Disabled, PatchOutcome::NotFound]);
    }

    #[test]
    fn test_template_version_gating() {
        let mut old = template("11.0.0-16.1.0 lane", "lane");
        old.target_versions = VersionRange::between(Version::new(11, 0, 0), Version::new(16, 1, 0));
        let mut new = template("21.0.0+ lane", "lane");
        new.target_versions = VersionRange::from(Version::new(21, 0, 0));
        let group = PatchGroup::new("g", "id", vec![old, new]);

        let gated = ctx(Version::new(16, 0, 0));
        let outcomes = PolicyResolver::new(&gated).resolve(&group, &mut DefaultFlags);
        assert_eq!(outcomes.as_slice(), &[PatchOutcome::NotFound, PatchOutcome::Skipped]);

        let ungated = gated.with_version_gating(false);
        let outcomes = PolicyResolver::new(&ungated).resolve(&group, &mut DefaultFlags);
        assert_eq!(outcomes.as_slice(), &[PatchOutcome::NotFound, PatchOutcome::NotFound]);
    }

    #[test]
    fn test_provider_version_gating() {
        let mut t = template("a", "a");
        t.provider_versions = VersionRange::from(Version::new(1, 9, 0));
        let group = PatchGroup::new("g", "id", vec![t]);
        let ctx = ctx(Version::new(17, 0, 0));

        let outcomes = PolicyResolver::new(&ctx).resolve(&group, &mut DefaultFlags);
        assert_eq!(outcomes.get(0), PatchOutcome::Skipped);
    }

    #[test]
    fn test_group_gating_skips_everything() {
        let group = PatchGroup::new("g", "id", vec![template("a", "a"), template("b", "b")])
            .with_target_versions(VersionRange::from(Version::new(18, 0, 0)));
        let ctx = ctx(Version::new(17, 0, 0));
        let mut flags = MapFlags::default().set("g", "b", false);

        let outcomes = PolicyResolver::new(&ctx).resolve(&group, &mut flags);
        assert_eq!(outcomes.as_slice(), &[PatchOutcome::Skipped, PatchOutcome::Skipped]);
    }

    #[test]
    fn test_disabled_wins_over_template_gating() {
        let mut t = template("a", "a");
        t.target_versions = VersionRange::from(Version::new(21, 0, 0));
        let group = PatchGroup::new("g", "id", vec![t]);
        let ctx = ctx(Version::new(17, 0, 0));
        let mut flags = MapFlags::default().set("g", "a", false);

        let outcomes = PolicyResolver::new(&ctx).resolve(&group, &mut flags);
        assert_eq!(outcomes.get(0), PatchOutcome::Disabled);
    }
}
