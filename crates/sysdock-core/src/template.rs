//! Pattern templates and the patch groups that own them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pattern::Pattern;
use crate::rule::{Condition, INSTRUCTION_SIZE, Patch, PatchData};
use crate::version::VersionRange;

/// One code variant of a feature patch.
///
/// Several templates may share a `config_key` when the same feature needs a
/// different byte pattern per target version; at most one of them can match
/// a given binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTemplate {
    /// Unique per variant, used for logging
    pub name: String,
    /// Shared among variants of the same logical patch
    pub config_key: String,
    pub pattern: Pattern,
    /// Instruction offset relative to the match start
    pub instruction_offset: i32,
    /// Patch offset relative to the instruction offset
    pub patch_offset: i32,
    pub condition: Condition,
    pub patch: Patch,
    /// Default enable flag, overridden by the config store
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusivity_group: Option<u32>,
    #[serde(default, skip_serializing_if = "VersionRange::is_unbounded")]
    pub target_versions: VersionRange,
    #[serde(default, skip_serializing_if = "VersionRange::is_unbounded")]
    pub provider_versions: VersionRange,
}

impl PatternTemplate {
    pub fn builder(
        name: impl Into<String>,
        config_key: impl Into<String>,
        pattern: &str,
    ) -> PatternTemplateBuilder {
        PatternTemplateBuilder {
            name: name.into(),
            config_key: config_key.into(),
            pattern: pattern.to_string(),
            instruction_offset: 0,
            patch_offset: 0,
            condition: None,
            patch: None,
            enabled: false,
            exclusivity_group: None,
            target_versions: VersionRange::ANY,
            provider_versions: VersionRange::ANY,
        }
    }

    /// Check that the instruction word and the patch window both lie inside
    /// the pattern, so any structural match can be decoded and compared
    /// without leaving the scanned buffer.
    pub fn validate(&self) -> Result<()> {
        let len = self.pattern.len() as i64;
        let inst = i64::from(self.instruction_offset);
        if inst < 0 || inst + INSTRUCTION_SIZE as i64 > len {
            return Err(Error::InvalidPattern(format!(
                "{}: instruction offset {} outside {}-byte pattern",
                self.name, self.instruction_offset, len
            )));
        }

        let start = inst + i64::from(self.patch_offset);
        let end = start + self.patch.len() as i64;
        if start < 0 || end > len {
            return Err(Error::InvalidPattern(format!(
                "{}: patch window {}..{} outside {}-byte pattern",
                self.name, start, end, len
            )));
        }
        Ok(())
    }

    /// Offset of the instruction word from the match start.
    pub fn instruction_start(&self) -> usize {
        self.instruction_offset as usize
    }

    /// Offset of the patch bytes from the match start.
    pub fn patch_start(&self) -> usize {
        (self.instruction_offset + self.patch_offset) as usize
    }

    pub fn matches(&self, word: u32) -> bool {
        self.condition.matches(word)
    }

    pub fn patch_for(&self, word: u32) -> PatchData {
        self.patch.bytes_for(word)
    }

    /// Whether `bytes` (starting at the patch address) already hold what
    /// this template would write.
    pub fn already_applied(&self, bytes: &[u8], word: u32) -> bool {
        self.patch_for(word).is_present_in(bytes)
    }
}

/// Builder for [`PatternTemplate`].
#[derive(Debug, Clone)]
pub struct PatternTemplateBuilder {
    name: String,
    config_key: String,
    pattern: String,
    instruction_offset: i32,
    patch_offset: i32,
    condition: Option<Condition>,
    patch: Option<Patch>,
    enabled: bool,
    exclusivity_group: Option<u32>,
    target_versions: VersionRange,
    provider_versions: VersionRange,
}

impl PatternTemplateBuilder {
    pub fn instruction_offset(mut self, offset: i32) -> Self {
        self.instruction_offset = offset;
        self
    }

    pub fn patch_offset(mut self, offset: i32) -> Self {
        self.patch_offset = offset;
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn patch(mut self, patch: Patch) -> Self {
        self.patch = Some(patch);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn exclusivity_group(mut self, group: u32) -> Self {
        self.exclusivity_group = Some(group);
        self
    }

    pub fn target_versions(mut self, range: VersionRange) -> Self {
        self.target_versions = range;
        self
    }

    pub fn provider_versions(mut self, range: VersionRange) -> Self {
        self.provider_versions = range;
        self
    }

    pub fn build(self) -> Result<PatternTemplate> {
        let condition = self.condition.ok_or_else(|| {
            Error::InvalidPattern(format!("{}: missing condition", self.name))
        })?;
        let patch = self
            .patch
            .ok_or_else(|| Error::InvalidPattern(format!("{}: missing patch", self.name)))?;

        let template = PatternTemplate {
            pattern: Pattern::parse(&self.pattern)?,
            name: self.name,
            config_key: self.config_key,
            instruction_offset: self.instruction_offset,
            patch_offset: self.patch_offset,
            condition,
            patch,
            enabled: self.enabled,
            exclusivity_group: self.exclusivity_group,
            target_versions: self.target_versions,
            provider_versions: self.provider_versions,
        };
        template.validate()?;
        Ok(template)
    }
}

/// Templates applied to one target process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchGroup {
    /// Display name, also the config section holding the feature flags
    pub name: String,
    /// Identity of the process to patch
    pub target_id: String,
    pub templates: Vec<PatternTemplate>,
    #[serde(default, skip_serializing_if = "VersionRange::is_unbounded")]
    pub target_versions: VersionRange,
}

impl PatchGroup {
    pub fn new(
        name: impl Into<String>,
        target_id: impl Into<String>,
        templates: Vec<PatternTemplate>,
    ) -> Self {
        Self {
            name: name.into(),
            target_id: target_id.into(),
            templates,
            target_versions: VersionRange::ANY,
        }
    }

    pub fn with_target_versions(mut self, range: VersionRange) -> Self {
        self.target_versions = range;
        self
    }

    /// Distinct config keys in declaration order.
    pub fn config_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for t in &self.templates {
            if !keys.contains(&t.config_key.as_str()) {
                keys.push(&t.config_key);
            }
        }
        keys
    }

    pub fn validate(&self) -> Result<()> {
        for t in &self.templates {
            t.validate()?;
        }
        for (i, t) in self.templates.iter().enumerate() {
            if self.templates[..i].iter().any(|prev| prev.name == t.name) {
                return Err(Error::InvalidPattern(format!(
                    "{}: duplicate template name '{}'",
                    self.name, t.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn nop_template(pattern: &str, inst: i32) -> Result<PatternTemplate> {
        PatternTemplate::builder("t", "key", pattern)
            .instruction_offset(inst)
            .condition(Condition::Cbz)
            .patch(Patch::nop(1)?)
            .build()
    }

    #[test]
    fn test_builder_defaults() {
        let t = nop_template("0x...34", 0).unwrap();
        assert_eq!(t.name, "t");
        assert_eq!(t.config_key, "key");
        assert!(!t.enabled);
        assert_eq!(t.exclusivity_group, None);
        assert!(t.target_versions.is_unbounded());
        assert_eq!(t.patch_start(), 0);
    }

    #[test]
    fn test_builder_rejects_out_of_pattern_offsets() {
        assert!(nop_template("0x...34", 1).is_err());
        assert!(nop_template("0x...34", -1).is_err());
        assert!(nop_template("0x...34....", 4).is_ok());

        let past_end = PatternTemplate::builder("t", "key", "0x...34....")
            .instruction_offset(4)
            .patch_offset(4)
            .condition(Condition::Cbz)
            .patch(Patch::nop(1).unwrap())
            .build();
        assert!(past_end.is_err());

        let before_start = PatternTemplate::builder("t", "key", "0x...34....")
            .instruction_offset(0)
            .patch_offset(-4)
            .condition(Condition::Cbz)
            .patch(Patch::nop(1).unwrap())
            .build();
        assert!(before_start.is_err());
    }

    #[test]
    fn test_builder_requires_condition_and_patch() {
        let missing = PatternTemplate::builder("t", "key", "0x00000000").build();
        assert!(matches!(missing, Err(Error::InvalidPattern(_))));
    }

    #[test]
    fn test_negative_patch_offset_within_pattern() {
        let t = PatternTemplate::builder("t", "key", "0x00112233..008052")
            .instruction_offset(4)
            .patch_offset(-4)
            .condition(Condition::Movz)
            .patch(Patch::nop(1).unwrap())
            .build()
            .unwrap();
        assert_eq!(t.instruction_start(), 4);
        assert_eq!(t.patch_start(), 0);
    }

    #[test]
    fn test_already_applied_compares_patch_bytes() {
        let t = nop_template("0x...34....", 0).unwrap();
        assert!(t.already_applied(&[0x1F, 0x20, 0x03, 0xD5, 0xAA], 0));
        assert!(!t.already_applied(&[0x79, 0x01, 0x00, 0x34], 0));
    }

    #[test]
    fn test_group_config_keys_and_duplicates() {
        let a = nop_template("0x...34", 0).unwrap();
        let mut b = a.clone();
        b.name = "t2".into();
        let mut c = a.clone();
        c.name = "t3".into();
        c.config_key = "other".into();

        let group = PatchGroup::new("g", "0100000000000019", vec![a.clone(), b, c])
            .with_target_versions(VersionRange::from(Version::new(11, 0, 0)));
        assert_eq!(group.config_keys(), vec!["key", "other"]);
        assert!(group.validate().is_ok());

        let dup = PatchGroup::new("g", "id", vec![a.clone(), a]);
        assert!(dup.validate().is_err());
    }
}
