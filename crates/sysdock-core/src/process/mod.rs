//! Process control primitives.
//!
//! The patch engine only talks to a target through [`ProcessControl`].
//! Backends:
//!
//! - [`MemoryImage`]: in-memory processes built from byte images
//! - `ProcFs` (Linux): `/proc/<pid>/{comm,maps,mem}`
//! - `WinProcess` (Windows): Toolhelp snapshot + `Read/WriteProcessMemory`

mod image;
#[cfg(target_os = "linux")]
mod procfs;
#[cfg(target_os = "windows")]
mod win32;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use image::{ImageHandle, ImageProcess, MemoryImage, WriteRecord};
#[cfg(target_os = "linux")]
pub use procfs::{ProcFs, ProcFsHandle};
#[cfg(target_os = "windows")]
pub use win32::{WinHandle, WinProcess};

pub type ProcessId = u64;

/// Page permissions of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Permissions {
    pub const RX: Self = Self {
        read: true,
        write: false,
        execute: true,
    };
    pub const RW: Self = Self {
        read: true,
        write: true,
        execute: false,
    };

    pub fn is_rx(&self) -> bool {
        self.read && self.execute
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.read { 'r' } else { '-' },
            if self.write { 'w' } else { '-' },
            if self.execute { 'x' } else { '-' }
        )
    }
}

/// Category of a mapped region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    /// Code loaded from the program image
    StaticCode,
    /// JIT or otherwise runtime-generated code
    MutableCode,
    Data,
    Other,
}

/// A mapped region as reported by [`ProcessControl::query_region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub base: u64,
    pub size: u64,
    pub permissions: Permissions,
    pub kind: RegionKind,
}

impl RegionInfo {
    /// First address past the region; `None` when it wraps the address space.
    pub fn end(&self) -> Option<u64> {
        self.base.checked_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && self.end().is_none_or(|end| address < end)
    }

    /// Only non-empty, readable and executable static code is scanned.
    pub fn is_scannable(&self) -> bool {
        self.size != 0 && self.permissions.is_rx() && self.kind == RegionKind::StaticCode
    }
}

/// Blocking primitives for inspecting and patching another process.
pub trait ProcessControl {
    type Handle;

    fn list_processes(&self) -> Result<Vec<ProcessId>>;

    fn open_process(&self, pid: ProcessId) -> Result<Self::Handle>;

    /// Identity of the opened process, compared against
    /// [`PatchGroup::target_id`](crate::PatchGroup).
    fn target_id(&self, handle: &Self::Handle) -> Result<String>;

    /// The region containing `address`, or the next one above it.
    ///
    /// `None` ends region iteration.
    fn query_region(&self, handle: &Self::Handle, address: u64) -> Option<RegionInfo>;

    /// Fill `buf` from `address`. Short reads are errors.
    fn read_memory(&self, handle: &Self::Handle, address: u64, buf: &mut [u8]) -> Result<()>;

    fn write_memory(&self, handle: &Self::Handle, address: u64, data: &[u8]) -> Result<()>;

    fn close(&self, handle: Self::Handle);
}
