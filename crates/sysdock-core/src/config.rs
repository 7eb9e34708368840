//! Persistent feature flags and run options.
//!
//! The store is a TOML file with one table per section: `[options]` for
//! run-wide switches and one table per patch group holding a boolean per
//! config key. Reads that miss write the default back, so a first run leaves
//! a complete, editable file behind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::policy::FeatureFlags;
use crate::template::PatchGroup;

/// Default file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Section holding [`RunOptions`]
pub const OPTIONS_SECTION: &str = "options";

/// Run-wide switches from the `[options]` section. All default to on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub patch_sysmmc: bool,
    pub patch_emummc: bool,
    pub enable_logging: bool,
    pub version_skip: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            patch_sysmmc: true,
            patch_emummc: true,
            enable_logging: true,
            version_skip: true,
        }
    }
}

impl RunOptions {
    pub const KEYS: [&'static str; 4] = [
        "patch_sysmmc",
        "patch_emummc",
        "enable_logging",
        "version_skip",
    ];

    /// Read every option, writing defaults for the missing ones.
    pub fn load(store: &mut ConfigStore) -> Self {
        let defaults = Self::default();
        Self {
            patch_sysmmc: store.get_bool_or_insert(
                OPTIONS_SECTION,
                "patch_sysmmc",
                defaults.patch_sysmmc,
            ),
            patch_emummc: store.get_bool_or_insert(
                OPTIONS_SECTION,
                "patch_emummc",
                defaults.patch_emummc,
            ),
            enable_logging: store.get_bool_or_insert(
                OPTIONS_SECTION,
                "enable_logging",
                defaults.enable_logging,
            ),
            version_skip: store.get_bool_or_insert(
                OPTIONS_SECTION,
                "version_skip",
                defaults.version_skip,
            ),
        }
    }

    /// Whether patching is allowed for the current storage mode.
    pub fn patching_enabled(&self, emulated_storage: bool) -> bool {
        if emulated_storage {
            self.patch_emummc
        } else {
            self.patch_sysmmc
        }
    }
}

/// TOML-backed key/value store.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    table: toml::Table,
    dirty: bool,
}

impl ConfigStore {
    /// Store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file yields an empty store bound to it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let table = match fs::read_to_string(path).map_err(Error::from) {
            Ok(content) => content.parse::<toml::Table>()?,
            Err(e) if e.is_not_found() => {
                debug!("No config at {}, starting empty", path.display());
                toml::Table::new()
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            table,
            dirty: false,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether values were written since the last save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Boolean at `section.key`. Integers count as `!= 0`.
    pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        match self.table.get(section)?.get(key)? {
            toml::Value::Boolean(b) => Some(*b),
            toml::Value::Integer(i) => Some(*i != 0),
            other => {
                warn!(
                    "Ignoring non-boolean value for {}.{}: {}",
                    section, key, other
                );
                None
            }
        }
    }

    /// Boolean at `section.key`; when absent, `default` is stored and
    /// returned.
    pub fn get_bool_or_insert(&mut self, section: &str, key: &str, default: bool) -> bool {
        if let Some(value) = self.get_bool(section, key) {
            return value;
        }
        let present = self
            .table
            .get(section)
            .and_then(|s| s.get(key))
            .is_some();
        if !present {
            self.set_bool(section, key, default);
        }
        default
    }

    pub fn set_bool(&mut self, section: &str, key: &str, value: bool) {
        if let Some(table) = self.section_mut(section) {
            table.insert(key.to_string(), toml::Value::Boolean(value));
            self.dirty = true;
        }
    }

    /// Section tables, sorted by name.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &toml::Table)> {
        self.table
            .iter()
            .filter_map(|(name, value)| value.as_table().map(|t| (name.as_str(), t)))
    }

    /// Set a run-wide option.
    pub fn set_option(&mut self, key: &str, value: bool) -> Result<()> {
        if !RunOptions::KEYS.contains(&key) {
            return Err(Error::Config(format!(
                "unknown option '{}', expected one of {}",
                key,
                RunOptions::KEYS.join(", ")
            )));
        }
        self.set_bool(OPTIONS_SECTION, key, value);
        Ok(())
    }

    /// Set a feature flag of `group`.
    ///
    /// Turning a key on turns off every other key of the group that shares
    /// an exclusivity group with it. Returns the keys turned off.
    pub fn set_feature(&mut self, group: &PatchGroup, key: &str, value: bool) -> Result<Vec<String>> {
        let exclusive: Vec<u32> = group
            .templates
            .iter()
            .filter(|t| t.config_key == key)
            .filter_map(|t| t.exclusivity_group)
            .collect();
        if !group.templates.iter().any(|t| t.config_key == key) {
            return Err(Error::Config(format!(
                "{} has no key '{}', expected one of {}",
                group.name,
                key,
                group.config_keys().join(", ")
            )));
        }

        self.set_bool(&group.name, key, value);

        let mut cleared: Vec<String> = Vec::new();
        if value {
            for t in &group.templates {
                let conflicts = t.config_key != key
                    && t.exclusivity_group.is_some_and(|g| exclusive.contains(&g));
                if conflicts && !cleared.contains(&t.config_key) {
                    self.set_bool(&group.name, &t.config_key, false);
                    cleared.push(t.config_key.clone());
                }
            }
        }
        Ok(cleared)
    }

    /// Write the default flag of every template that has no entry yet.
    pub fn seed_defaults(&mut self, groups: &[PatchGroup]) {
        for group in groups {
            for t in &group.templates {
                self.get_bool_or_insert(&group.name, &t.config_key, t.enabled);
            }
        }
    }

    /// Write the store to its file, creating parent directories.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            self.dirty = false;
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(&self.table)?)?;
        debug!("Saved config to {}", path.display());
        self.dirty = false;
        Ok(())
    }

    pub fn save_if_dirty(&mut self) -> Result<()> {
        if self.dirty { self.save() } else { Ok(()) }
    }

    fn section_mut(&mut self, section: &str) -> Option<&mut toml::Table> {
        if !self.table.get(section).is_some_and(toml::Value::is_table) {
            self.table
                .insert(section.to_string(), toml::Value::Table(toml::Table::new()));
        }
        self.table
            .get_mut(section)
            .and_then(toml::Value::as_table_mut)
    }
}

impl FeatureFlags for ConfigStore {
    fn feature_enabled(&mut self, section: &str, key: &str, default: bool) -> bool {
        self.get_bool_or_insert(section, key, default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Condition, Patch};
    use crate::template::PatternTemplate;
    use tempfile::tempdir;

    fn template(name: &str, key: &str, exclusive: Option<u32>) -> PatternTemplate {
        let mut t = PatternTemplate::builder(name, key, "0x...34")
            .condition(Condition::Cbz)
            .patch(Patch::nop(1).unwrap())
            .build()
            .unwrap();
        t.exclusivity_group = exclusive;
        t
    }

    fn nvservices() -> PatchGroup {
        PatchGroup::new(
            "nvservices",
            "0100000000000019",
            vec![
                template("a no_lane_downgrade", "no_lane_downgrade", None),
                template("b no_lane_downgrade", "no_lane_downgrade", None),
                template("no_bw_downgrade", "no_bw_downgrade", Some(0)),
                template("force_bw_downgrade", "force_bw_downgrade", Some(0)),
            ],
        )
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::load(dir.path().join("config.toml")).unwrap();
        assert_eq!(store.sections().count(), 0);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_unreadable_path_is_an_error() {
        let dir = tempdir().unwrap();
        let err = ConfigStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_defaults_are_written_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sysdock").join("config.toml");

        let mut store = ConfigStore::load(&path).unwrap();
        let options = RunOptions::load(&mut store);
        assert_eq!(options, RunOptions::default());
        assert!(!store.get_bool_or_insert("nvservices", "no_bw_downgrade", false));
        assert!(store.is_dirty());
        store.save_if_dirty().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[options]"));
        assert!(content.contains("version_skip = true"));
        assert!(content.contains("no_bw_downgrade = false"));

        let reloaded = ConfigStore::load(&path).unwrap();
        assert_eq!(reloaded.get_bool(OPTIONS_SECTION, "patch_emummc"), Some(true));
    }

    #[test]
    fn test_existing_values_win_over_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[options]\npatch_emummc = false\nenable_logging = 0\n").unwrap();

        let mut store = ConfigStore::load(&path).unwrap();
        let options = RunOptions::load(&mut store);
        assert!(!options.patch_emummc);
        assert!(!options.enable_logging);
        assert!(options.patch_sysmmc);
        assert!(!options.patching_enabled(true));
        assert!(options.patching_enabled(false));
    }

    #[test]
    fn test_invalid_value_is_not_overwritten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[options]\nversion_skip = \"maybe\"\n").unwrap();

        let mut store = ConfigStore::load(&path).unwrap();
        assert!(store.get_bool_or_insert(OPTIONS_SECTION, "version_skip", true));
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[options\n").unwrap();
        assert!(matches!(ConfigStore::load(&path), Err(Error::TomlDe(_))));
    }

    #[test]
    fn test_set_feature_enforces_exclusivity() {
        let group = nvservices();
        let mut store = ConfigStore::in_memory();
        store.seed_defaults(std::slice::from_ref(&group));
        assert_eq!(store.get_bool("nvservices", "force_bw_downgrade"), Some(false));

        store.set_feature(&group, "no_bw_downgrade", true).unwrap();
        let cleared = store.set_feature(&group, "force_bw_downgrade", true).unwrap();
        assert_eq!(cleared, vec!["no_bw_downgrade".to_string()]);
        assert_eq!(store.get_bool("nvservices", "no_bw_downgrade"), Some(false));
        assert_eq!(store.get_bool("nvservices", "force_bw_downgrade"), Some(true));

        let cleared = store.set_feature(&group, "no_lane_downgrade", true).unwrap();
        assert!(cleared.is_empty());

        assert!(store.set_feature(&group, "missing", true).is_err());
    }

    #[test]
    fn test_set_option_validates_key() {
        let mut store = ConfigStore::in_memory();
        store.set_option("patch_emummc", false).unwrap();
        assert_eq!(store.get_bool(OPTIONS_SECTION, "patch_emummc"), Some(false));
        assert!(matches!(store.set_option("turbo", true), Err(Error::Config(_))));
    }
}
