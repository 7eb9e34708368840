//! Result log written after each run.
//!
//! A TOML file with one table per group mapping template names to outcome
//! strings, plus a `[stats]` table describing the run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::RunContext;
use crate::engine::RunReport;
use crate::error::{Error, Result};

/// Default file name inside the config directory
pub const LOG_FILE: &str = "log.toml";

pub const STATS_SECTION: &str = "stats";

/// `[stats]` table of the result log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub version: String,
    pub build_date: String,
    pub run_date: String,
    pub fw_version: String,
    pub ams_version: String,
    pub ams_target_version: String,
    pub ams_keygen: u8,
    pub ams_hash: String,
    pub is_emummc: bool,
    pub buffer_size: u64,
    pub patch_time: String,
}

impl RunStats {
    pub fn from_run(report: &RunReport, ctx: &RunContext, buffer_size: usize) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            build_date: option_env!("SYSDOCK_BUILD_DATE")
                .unwrap_or("unknown")
                .to_string(),
            run_date: report.started_at.format("%d.%m.%Y %H:%M:%S").to_string(),
            fw_version: ctx.target_version.to_string(),
            ams_version: ctx.provider.version.to_string(),
            ams_target_version: ctx.provider.target_version.to_string(),
            ams_keygen: ctx.provider.keygen,
            ams_hash: ctx.provider.short_hash(),
            is_emummc: ctx.emulated_storage,
            buffer_size: buffer_size as u64,
            patch_time: format_elapsed(report.elapsed),
        }
    }
}

/// `1234 ms` -> `"1.234s"`
pub fn format_elapsed(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    format!("{}.{:03}s", ms / 1000, ms % 1000)
}

/// The result log file.
#[derive(Debug, Clone)]
pub struct ResultLog {
    path: PathBuf,
}

impl ResultLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the log of a previous run. A missing file is fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).map_err(Error::from) {
            Err(e) if !e.is_not_found() => Err(e),
            _ => Ok(()),
        }
    }

    pub fn write(&self, report: &RunReport, stats: &RunStats) -> Result<()> {
        let mut table = toml::Table::new();
        for group in &report.groups {
            let entries: toml::Table = group
                .entries()
                .map(|(name, outcome)| {
                    (
                        name.to_string(),
                        toml::Value::String(outcome.as_str().to_string()),
                    )
                })
                .collect();
            table.insert(group.name.clone(), toml::Value::Table(entries));
        }
        table.insert(STATS_SECTION.to_string(), toml::Value::try_from(stats)?);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml::to_string_pretty(&table)?)?;
        debug!("Wrote result log to {}", self.path.display());
        Ok(())
    }

    /// Parsed log, `None` when no run has written one.
    pub fn load(&self) -> Result<Option<toml::Table>> {
        match fs::read_to_string(&self.path).map_err(Error::from) {
            Ok(content) => Ok(Some(content.parse::<toml::Table>()?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Local;
    use tempfile::tempdir;

    use super::*;
    use crate::context::ProviderInfo;
    use crate::engine::{GroupReport, GroupStatus};
    use crate::outcome::{GroupOutcomes, PatchOutcome};
    use crate::version::Version;
    use crate::walker::WalkStats;

    fn report() -> RunReport {
        let mut outcomes = GroupOutcomes::new(2);
        outcomes.set(0, PatchOutcome::PatchedByTool);
        outcomes.set(1, PatchOutcome::Skipped);
        RunReport {
            started_at: Local::now(),
            patching_enabled: true,
            groups: vec![GroupReport {
                name: "usb".into(),
                target_id: "0100000000000006".into(),
                status: GroupStatus::Scanned,
                templates: vec![
                    "15.0.0+ force_dp_mode_c".into(),
                    "12.0.0-14.1.2 force_dp_mode_c".into(),
                ],
                outcomes,
            }],
            elapsed: Duration::from_millis(1234),
            stats: WalkStats::default(),
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(
            Version::new(17, 0, 1),
            ProviderInfo {
                version: Version::new(1, 8, 0),
                target_version: Version::new(17, 0, 1),
                keygen: 18,
                hash: 0xAF66_FF99_1234_5678,
            },
        )
        .with_emulated_storage(true)
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(1234)), "1.234s");
        assert_eq!(format_elapsed(Duration::from_millis(7)), "0.007s");
        assert_eq!(format_elapsed(Duration::from_secs(12)), "12.000s");
    }

    #[test]
    fn test_stats_from_run() {
        let stats = RunStats::from_run(&report(), &ctx(), 0x1000);
        assert_eq!(stats.fw_version, "17.0.1");
        assert_eq!(stats.ams_version, "1.8.0");
        assert_eq!(stats.ams_hash, "af66ff99");
        assert_eq!(stats.ams_keygen, 18);
        assert!(stats.is_emummc);
        assert_eq!(stats.buffer_size, 4096);
        assert_eq!(stats.patch_time, "1.234s");
    }

    #[test]
    fn test_write_load_and_clear() {
        let dir = tempdir().unwrap();
        let log = ResultLog::new(dir.path().join("sysdock").join(LOG_FILE));
        assert!(log.load().unwrap().is_none());
        log.clear().unwrap();

        let report = report();
        log.write(&report, &RunStats::from_run(&report, &ctx(), 0x1000))
            .unwrap();

        let table = log.load().unwrap().unwrap();
        let usb = table["usb"].as_table().unwrap();
        assert_eq!(usb["15.0.0+ force_dp_mode_c"].as_str(), Some("Patched (sysdock)"));
        assert_eq!(usb["12.0.0-14.1.2 force_dp_mode_c"].as_str(), Some("Skipped"));
        let stats = table[STATS_SECTION].as_table().unwrap();
        assert_eq!(stats["fw_version"].as_str(), Some("17.0.1"));
        assert_eq!(stats["is_emummc"].as_bool(), Some(true));

        log.clear().unwrap();
        assert!(log.load().unwrap().is_none());
    }

    #[test]
    fn test_other_io_errors_are_reported() {
        let dir = tempdir().unwrap();
        // a directory can be neither read nor removed as a file
        let log = ResultLog::new(dir.path());
        assert!(matches!(log.load(), Err(Error::Io(_))));
        assert!(matches!(log.clear(), Err(Error::Io(_))));
    }
}
