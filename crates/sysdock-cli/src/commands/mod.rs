//! CLI command implementations.

pub mod catalog;
pub mod hex_utils;
pub mod image;
pub mod log;
pub mod options;
pub mod run;
pub mod toggle;

use anyhow::Result;
use clap::ValueEnum;
use sysdock_core::{ProviderInfo, RunContext, Version};

use hex_utils::parse_hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(switch: Switch) -> bool {
        switch == Switch::On
    }
}

/// Versions of the system being patched.
#[derive(clap::Args, Debug, Clone)]
pub struct TargetArgs {
    /// Firmware version of the target system
    #[arg(long, env = "SYSDOCK_FW_VERSION")]
    pub fw_version: Version,

    /// Packed provider config word (hex); overrides the other --ams-* versions
    #[arg(long, env = "SYSDOCK_AMS_CONFIG")]
    pub ams_config: Option<String>,

    #[arg(long, env = "SYSDOCK_AMS_VERSION", default_value = "0.0.0")]
    pub ams_version: Version,

    /// Defaults to the firmware version
    #[arg(long, env = "SYSDOCK_AMS_TARGET_VERSION")]
    pub ams_target_version: Option<Version>,

    #[arg(long, env = "SYSDOCK_AMS_KEYGEN", default_value_t = 0)]
    pub ams_keygen: u8,

    /// Provider commit hash (hex)
    #[arg(long, env = "SYSDOCK_AMS_HASH", default_value = "0")]
    pub ams_hash: String,

    /// Running from emulated storage
    #[arg(long, env = "SYSDOCK_EMUMMC")]
    pub emummc: bool,
}

impl TargetArgs {
    pub fn context(&self, version_gating: bool) -> Result<RunContext> {
        let hash = parse_hex(&self.ams_hash)?;
        let provider = match &self.ams_config {
            Some(word) => ProviderInfo::from_config_word(parse_hex(word)?, hash),
            None => ProviderInfo {
                version: self.ams_version,
                target_version: self.ams_target_version.unwrap_or(self.fw_version),
                keygen: self.ams_keygen,
                hash,
            },
        };
        Ok(RunContext::new(self.fw_version, provider)
            .with_emulated_storage(self.emummc)
            .with_version_gating(version_gating))
    }
}

#[cfg(test)]
pub(crate) fn target_args(fw: &str) -> TargetArgs {
    TargetArgs {
        fw_version: fw.parse().unwrap(),
        ams_config: None,
        ams_version: Version::new(1, 8, 0),
        ams_target_version: None,
        ams_keygen: 0,
        ams_hash: "0".into(),
        emummc: false,
    }
}
