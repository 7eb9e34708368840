//! In-memory process backend.
//!
//! Processes are byte images mapped at fixed addresses. Writes land in the
//! images and are recorded, which makes this backend usable both for tests
//! and for patching raw memory dumps offline.

use std::cell::{Cell, RefCell};

use tracing::debug;

use super::{Permissions, ProcessControl, ProcessId, RegionInfo, RegionKind};
use crate::error::{Error, Result};

/// A write performed through [`ProcessControl::write_memory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub pid: ProcessId,
    pub address: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct MappedRegion {
    info: RegionInfo,
    bytes: Vec<u8>,
    readable: bool,
}

/// One process in a [`MemoryImage`].
#[derive(Debug, Clone)]
pub struct ImageProcess {
    pid: ProcessId,
    target_id: String,
    regions: Vec<MappedRegion>,
    read_only: bool,
}

impl ImageProcess {
    pub fn new(pid: ProcessId, target_id: impl Into<String>) -> Self {
        Self {
            pid,
            target_id: target_id.into(),
            regions: Vec::new(),
            read_only: false,
        }
    }

    /// Map `bytes` at `base` with the given permissions and kind.
    pub fn region(
        mut self,
        base: u64,
        bytes: Vec<u8>,
        permissions: Permissions,
        kind: RegionKind,
    ) -> Self {
        let info = RegionInfo {
            base,
            size: bytes.len() as u64,
            permissions,
            kind,
        };
        self.regions.push(MappedRegion {
            info,
            bytes,
            readable: true,
        });
        self.regions.sort_by_key(|r| r.info.base);
        self
    }

    /// Map `bytes` as `r-x` static code.
    pub fn code(self, base: u64, bytes: Vec<u8>) -> Self {
        self.region(base, bytes, Permissions::RX, RegionKind::StaticCode)
    }

    /// Make every read inside the region at `base` fail.
    pub fn unreadable(mut self, base: u64) -> Self {
        if let Some(region) = self.regions.iter_mut().find(|r| r.info.base == base) {
            region.readable = false;
        }
        self
    }

    /// Make every write fail.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn region_at(&self, address: u64, len: usize) -> Option<(&MappedRegion, usize)> {
        let region = self.regions.iter().find(|r| r.info.contains(address))?;
        let offset = (address - region.info.base) as usize;
        (offset + len <= region.bytes.len()).then_some((region, offset))
    }
}

/// Handle to a process of a [`MemoryImage`].
#[derive(Debug)]
pub struct ImageHandle {
    index: usize,
}

/// In-memory [`ProcessControl`] backend.
#[derive(Debug, Default)]
pub struct MemoryImage {
    processes: RefCell<Vec<ImageProcess>>,
    writes: RefCell<Vec<WriteRecord>>,
    open_handles: Cell<usize>,
    opened: Cell<usize>,
    enumeration_error: Option<String>,
}

impl MemoryImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(self, process: ImageProcess) -> Self {
        self.processes.borrow_mut().push(process);
        self
    }

    /// A single process with one static code region, as used for dump files.
    pub fn single(target_id: impl Into<String>, base: u64, bytes: Vec<u8>) -> Self {
        Self::new().with_process(ImageProcess::new(1, target_id).code(base, bytes))
    }

    /// Make [`ProcessControl::list_processes`] fail.
    pub fn failing_enumeration(mut self, message: impl Into<String>) -> Self {
        self.enumeration_error = Some(message.into());
        self
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.borrow().clone()
    }

    /// Handles opened and not closed yet.
    pub fn open_handles(&self) -> usize {
        self.open_handles.get()
    }

    /// Total number of successful opens.
    pub fn opened(&self) -> usize {
        self.opened.get()
    }

    /// Current contents of the region mapped at `base` in process `pid`.
    pub fn region_bytes(&self, pid: ProcessId, base: u64) -> Option<Vec<u8>> {
        self.processes
            .borrow()
            .iter()
            .find(|p| p.pid == pid)?
            .regions
            .iter()
            .find(|r| r.info.base == base)
            .map(|r| r.bytes.clone())
    }
}

impl ProcessControl for MemoryImage {
    type Handle = ImageHandle;

    fn list_processes(&self) -> Result<Vec<ProcessId>> {
        if let Some(message) = &self.enumeration_error {
            return Err(Error::EnumerationFailed(message.clone()));
        }
        Ok(self.processes.borrow().iter().map(|p| p.pid).collect())
    }

    fn open_process(&self, pid: ProcessId) -> Result<ImageHandle> {
        let index = self
            .processes
            .borrow()
            .iter()
            .position(|p| p.pid == pid)
            .ok_or_else(|| Error::ProcessOpenFailed(format!("no process with pid {}", pid)))?;
        self.open_handles.set(self.open_handles.get() + 1);
        self.opened.set(self.opened.get() + 1);
        Ok(ImageHandle { index })
    }

    fn target_id(&self, handle: &ImageHandle) -> Result<String> {
        Ok(self.processes.borrow()[handle.index].target_id.clone())
    }

    fn query_region(&self, handle: &ImageHandle, address: u64) -> Option<RegionInfo> {
        self.processes.borrow()[handle.index]
            .regions
            .iter()
            .map(|r| r.info)
            .find(|info| info.end().is_none_or(|end| end > address))
    }

    fn read_memory(&self, handle: &ImageHandle, address: u64, buf: &mut [u8]) -> Result<()> {
        let processes = self.processes.borrow();
        let process = &processes[handle.index];
        let (region, offset) =
            process
                .region_at(address, buf.len())
                .ok_or_else(|| Error::RegionReadFailed {
                    address,
                    message: format!("{} bytes not mapped", buf.len()),
                })?;
        if !region.readable {
            return Err(Error::RegionReadFailed {
                address,
                message: "region is unreadable".to_string(),
            });
        }
        buf.copy_from_slice(&region.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write_memory(&self, handle: &ImageHandle, address: u64, data: &[u8]) -> Result<()> {
        let mut processes = self.processes.borrow_mut();
        let process = &mut processes[handle.index];
        if process.read_only {
            return Err(Error::PatchWriteFailed {
                address,
                message: "process image is read-only".to_string(),
            });
        }
        let offset = process
            .region_at(address, data.len())
            .map(|(_, offset)| offset)
            .ok_or_else(|| Error::PatchWriteFailed {
                address,
                message: format!("{} bytes not mapped", data.len()),
            })?;
        let pid = process.pid;
        let region = process
            .regions
            .iter_mut()
            .find(|r| r.info.contains(address))
            .ok_or_else(|| Error::PatchWriteFailed {
                address,
                message: "region vanished".to_string(),
            })?;
        region.bytes[offset..offset + data.len()].copy_from_slice(data);

        debug!("image write: pid={} addr=0x{:X} len={}", pid, address, data.len());
        self.writes.borrow_mut().push(WriteRecord {
            pid,
            address,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn close(&self, _handle: ImageHandle) {
        self.open_handles.set(self.open_handles.get().saturating_sub(1));
    }
}
