//! # sysdock-core
//!
//! Pattern-scanning patch engine for the code of running processes.
//!
//! This crate provides:
//! - Wildcard byte patterns and single-instruction predicates
//! - Pattern templates grouped per target process, with version gating
//! - Chunked scanning of static code regions with a carried overlap
//! - Conditional patching with detection of already-applied patches
//! - Process backends: in-memory images, Linux `/proc`, Windows
//! - TOML config and result log stores

pub mod applier;
pub mod catalog;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod outcome;
pub mod pattern;
pub mod policy;
pub mod process;
pub mod results;
pub mod rule;
pub mod scanner;
pub mod template;
pub mod version;
pub mod walker;

pub use applier::{PatchApplier, PatchWriter};
pub use catalog::{builtin_groups, find_group, load_catalog, save_catalog};
pub use config::{CONFIG_FILE, ConfigStore, RunOptions};
pub use context::{ProviderInfo, RunContext};
pub use engine::{Engine, GroupReport, GroupStatus, RunReport};
pub use error::{Error, Result};
pub use outcome::{GroupOutcomes, PatchOutcome};
pub use pattern::{MAX_PATTERN_LEN, Pattern, format_pattern, parse_pattern};
pub use policy::{DefaultFlags, FeatureFlags, PolicyResolver};
#[cfg(target_os = "linux")]
pub use process::{ProcFs, ProcFsHandle};
pub use process::{
    ImageHandle, ImageProcess, MemoryImage, Permissions, ProcessControl, ProcessId, RegionInfo,
    RegionKind, WriteRecord,
};
#[cfg(target_os = "windows")]
pub use process::{WinHandle, WinProcess};
pub use results::{LOG_FILE, ResultLog, RunStats, format_elapsed};
pub use rule::{Condition, NOP, Patch, PatchData};
pub use scanner::scan_chunk;
pub use template::{PatchGroup, PatternTemplate, PatternTemplateBuilder};
pub use version::{Version, VersionRange};
pub use walker::{ChunkBuffer, DEFAULT_CHUNK_SIZE, OVERLAP_SIZE, RegionWalker, WalkStats};
