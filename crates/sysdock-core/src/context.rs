//! Run-scoped facts about the target system.

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// The patch provider (custom firmware) that the target runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub version: Version,
    /// Lowest target version the provider supports
    pub target_version: Version,
    pub keygen: u8,
    /// Commit hash of the provider build
    pub hash: u64,
}

impl ProviderInfo {
    /// Decode the packed provider config word:
    /// `version << 40 | keygen << 32 | target_version`, with both versions in
    /// their 24-bit packed form.
    pub fn from_config_word(word: u64, hash: u64) -> Self {
        Self {
            version: Version::from_packed(((word >> 40) & 0xFF_FFFF) as u32),
            keygen: ((word >> 32) & 0xFF) as u8,
            target_version: Version::from_packed((word & 0xFF_FFFF) as u32),
            hash,
        }
    }

    /// First 8 hex digits of the commit hash.
    pub fn short_hash(&self) -> String {
        format!("{:08x}", (self.hash >> 32) as u32)
    }
}

/// Immutable inputs of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunContext {
    pub target_version: Version,
    pub provider: ProviderInfo,
    /// Running from emulated storage (emuMMC) rather than the system one
    pub emulated_storage: bool,
    /// Skip templates whose version bounds exclude the running versions
    pub version_gating: bool,
}

impl RunContext {
    pub fn new(target_version: Version, provider: ProviderInfo) -> Self {
        Self {
            target_version,
            provider,
            emulated_storage: false,
            version_gating: true,
        }
    }

    pub fn with_emulated_storage(mut self, emulated: bool) -> Self {
        self.emulated_storage = emulated;
        self
    }

    pub fn with_version_gating(mut self, enabled: bool) -> Self {
        self.version_gating = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_config_word() {
        let word = (0x01_08_02u64 << 40) | (0x12u64 << 32) | 0x11_00_01;
        let provider = ProviderInfo::from_config_word(word, 0xAF66_FF99_0000_0000);
        assert_eq!(provider.version, Version::new(1, 8, 2));
        assert_eq!(provider.keygen, 0x12);
        assert_eq!(provider.target_version, Version::new(17, 0, 1));
        assert_eq!(provider.short_hash(), "af66ff99");
    }

    #[test]
    fn test_context_defaults() {
        let ctx = RunContext::new(Version::new(17, 0, 0), ProviderInfo::default());
        assert!(ctx.version_gating);
        assert!(!ctx.emulated_storage);

        let ctx = ctx.with_emulated_storage(true).with_version_gating(false);
        assert!(ctx.emulated_storage);
        assert!(!ctx.version_gating);
    }
}
