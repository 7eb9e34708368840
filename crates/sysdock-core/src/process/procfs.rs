//! Linux backend over `/proc`.
//!
//! Identity is `/proc/<pid>/comm`. Regions come from `/proc/<pid>/maps`,
//! snapshotted when the process is opened; memory is accessed with
//! positional I/O on `/proc/<pid>/mem`, which needs ptrace access to the
//! target (same user with `ptrace_scope = 0`, or `CAP_SYS_PTRACE`).

use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Permissions, ProcessControl, ProcessId, RegionInfo, RegionKind};
use crate::error::{Error, Result};

/// `/proc` based [`ProcessControl`].
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFs {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Use another procfs mount.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn pid_path(&self, pid: ProcessId, file: &str) -> PathBuf {
        self.root.join(pid.to_string()).join(file)
    }
}

#[derive(Debug)]
pub struct ProcFsHandle {
    pid: ProcessId,
    mem: File,
    regions: Vec<RegionInfo>,
}

impl ProcFsHandle {
    pub fn pid(&self) -> ProcessId {
        self.pid
    }
}

/// Parse the contents of a `maps` file, skipping malformed lines.
///
/// File-backed executable mappings are [`RegionKind::StaticCode`]; other
/// executable mappings are [`RegionKind::MutableCode`].
pub fn parse_maps(content: &str) -> Vec<RegionInfo> {
    content.lines().filter_map(parse_maps_line).collect()
}

fn parse_maps_line(line: &str) -> Option<RegionInfo> {
    let mut fields = line.split_whitespace();
    let (start, end) = fields.next()?.split_once('-')?;
    let perms = fields.next()?.as_bytes();
    // offset, device, inode
    let inode = fields.nth(2)?;
    let pathname = fields.next();

    let base = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    if perms.len() < 3 || end < base {
        return None;
    }

    let permissions = Permissions {
        read: perms[0] == b'r',
        write: perms[1] == b'w',
        execute: perms[2] == b'x',
    };
    let file_backed = inode != "0" && pathname.is_some_and(|p| !p.starts_with('['));
    let kind = match (permissions.execute, file_backed) {
        (true, true) => RegionKind::StaticCode,
        (true, false) => RegionKind::MutableCode,
        (false, _) if permissions.read => RegionKind::Data,
        _ => RegionKind::Other,
    };

    Some(RegionInfo {
        base,
        size: end - base,
        permissions,
        kind,
    })
}

impl ProcessControl for ProcFs {
    type Handle = ProcFsHandle;

    fn list_processes(&self) -> Result<Vec<ProcessId>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| Error::EnumerationFailed(format!("{}: {}", self.root.display(), e)))?;
        let mut pids: Vec<ProcessId> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn open_process(&self, pid: ProcessId) -> Result<ProcFsHandle> {
        let maps = fs::read_to_string(self.pid_path(pid, "maps"))
            .map_err(|e| Error::ProcessOpenFailed(format!("pid {}: maps: {}", pid, e)))?;
        let mem_path = self.pid_path(pid, "mem");
        let mem = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&mem_path)
            .or_else(|e| {
                debug!("pid {}: mem not writable ({}), opening read-only", pid, e);
                File::open(&mem_path)
            })
            .map_err(|e| Error::ProcessOpenFailed(format!("pid {}: mem: {}", pid, e)))?;

        let mut regions = parse_maps(&maps);
        regions.sort_by_key(|r| r.base);
        Ok(ProcFsHandle { pid, mem, regions })
    }

    fn target_id(&self, handle: &ProcFsHandle) -> Result<String> {
        let comm = fs::read_to_string(self.pid_path(handle.pid, "comm"))?;
        Ok(comm.trim_end().to_string())
    }

    fn query_region(&self, handle: &ProcFsHandle, address: u64) -> Option<RegionInfo> {
        handle
            .regions
            .iter()
            .find(|r| r.end().is_none_or(|end| end > address))
            .copied()
    }

    fn read_memory(&self, handle: &ProcFsHandle, address: u64, buf: &mut [u8]) -> Result<()> {
        handle
            .mem
            .read_exact_at(buf, address)
            .map_err(|e| Error::RegionReadFailed {
                address,
                message: e.to_string(),
            })
    }

    fn write_memory(&self, handle: &ProcFsHandle, address: u64, data: &[u8]) -> Result<()> {
        handle
            .mem
            .write_all_at(data, address)
            .map_err(|e| Error::PatchWriteFailed {
                address,
                message: e.to_string(),
            })
    }

    fn close(&self, handle: ProcFsHandle) {
        debug!("Closing pid {}", handle.pid);
    }
}
