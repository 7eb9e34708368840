//! Windows backend.
//!
//! Processes are listed with a Toolhelp snapshot and identified by their
//! executable name. Executable pages of mapped images are static code.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::mem::size_of;

use tracing::debug;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::Debug::{
    FlushInstructionCache, ReadProcessMemory, WriteProcessMemory,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW,
    TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_IMAGE, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE,
    PAGE_EXECUTE_WRITECOPY, PAGE_GUARD, PAGE_READONLY, PAGE_READWRITE, PAGE_WRITECOPY,
    VirtualQueryEx,
};
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
    PROCESS_VM_WRITE,
};

use super::{Permissions, ProcessControl, ProcessId, RegionInfo, RegionKind};
use crate::error::{Error, Result};

/// Closes the wrapped handle on drop.
struct HandleGuard(HANDLE);

impl Drop for HandleGuard {
    fn drop(&mut self) {
        // SAFETY: the guard owns a handle returned by a successful Win32 call.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// Win32 [`ProcessControl`].
#[derive(Debug, Default)]
pub struct WinProcess {
    /// Executable names from the last snapshot
    names: RefCell<HashMap<ProcessId, String>>,
}

#[derive(Debug)]
pub struct WinHandle {
    pid: ProcessId,
    name: Option<String>,
    handle: HANDLE,
}

impl WinProcess {
    pub fn new() -> Self {
        Self::default()
    }
}

fn exe_name(entry: &PROCESSENTRY32W) -> String {
    let len = entry
        .szExeFile
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(entry.szExeFile.len());
    String::from_utf16_lossy(&entry.szExeFile[..len])
}

fn permissions(protect: u32) -> Permissions {
    if protect & PAGE_GUARD.0 != 0 {
        return Permissions::default();
    }
    let protect = protect & 0xFF;
    let read_write = PAGE_READWRITE.0 | PAGE_WRITECOPY.0;
    let exec_read = PAGE_EXECUTE_READ.0 | PAGE_EXECUTE_READWRITE.0 | PAGE_EXECUTE_WRITECOPY.0;
    let exec_write = PAGE_EXECUTE_READWRITE.0 | PAGE_EXECUTE_WRITECOPY.0;
    Permissions {
        read: protect & (PAGE_READONLY.0 | read_write | exec_read) != 0,
        write: protect & (read_write | exec_write) != 0,
        // PAGE_EXECUTE without read access is not scannable, leave it out
        execute: protect & exec_read != 0,
    }
}

impl ProcessControl for WinProcess {
    type Handle = WinHandle;

    fn list_processes(&self) -> Result<Vec<ProcessId>> {
        // SAFETY: the snapshot handle is closed by the guard, and `entry` is
        // a properly sized PROCESSENTRY32W.
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
                .map_err(|e| Error::EnumerationFailed(e.to_string()))?;
            let _guard = HandleGuard(snapshot);

            let mut entry = PROCESSENTRY32W {
                dwSize: size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };
            Process32FirstW(snapshot, &mut entry)
                .map_err(|e| Error::EnumerationFailed(e.to_string()))?;

            let mut names = self.names.borrow_mut();
            names.clear();
            let mut pids = Vec::new();
            loop {
                let pid = ProcessId::from(entry.th32ProcessID);
                names.insert(pid, exe_name(&entry));
                pids.push(pid);
                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
            Ok(pids)
        }
    }

    fn open_process(&self, pid: ProcessId) -> Result<WinHandle> {
        let raw_pid = u32::try_from(pid)
            .map_err(|_| Error::ProcessOpenFailed(format!("pid {} out of range", pid)))?;
        // SAFETY: plain handle acquisition, released in `close`.
        let handle = unsafe {
            OpenProcess(
                PROCESS_QUERY_INFORMATION | PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION,
                false,
                raw_pid,
            )
        }
        .map_err(|e| Error::ProcessOpenFailed(format!("pid {}: {}", pid, e)))?;

        Ok(WinHandle {
            pid,
            name: self.names.borrow().get(&pid).cloned(),
            handle,
        })
    }

    fn target_id(&self, handle: &WinHandle) -> Result<String> {
        handle.name.clone().ok_or_else(|| {
            Error::ProcessOpenFailed(format!("pid {} missing from process snapshot", handle.pid))
        })
    }

    fn query_region(&self, handle: &WinHandle, address: u64) -> Option<RegionInfo> {
        let mut info = MEMORY_BASIC_INFORMATION::default();
        // SAFETY: `info` is a valid out-buffer of the size passed.
        let written = unsafe {
            VirtualQueryEx(
                handle.handle,
                Some(address as usize as *const c_void),
                &mut info,
                size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 {
            return None;
        }

        let committed = info.State == MEM_COMMIT;
        let permissions = if committed {
            permissions(info.Protect.0)
        } else {
            Permissions::default()
        };
        let kind = match (committed, permissions.execute, info.Type == MEM_IMAGE) {
            (false, _, _) => RegionKind::Other,
            (true, true, true) => RegionKind::StaticCode,
            (true, true, false) => RegionKind::MutableCode,
            (true, false, _) => RegionKind::Data,
        };

        Some(RegionInfo {
            base: info.BaseAddress as usize as u64,
            size: info.RegionSize as u64,
            permissions,
            kind,
        })
    }

    fn read_memory(&self, handle: &WinHandle, address: u64, buf: &mut [u8]) -> Result<()> {
        let mut read = 0usize;
        // SAFETY: `buf` is valid for `buf.len()` bytes of writes.
        unsafe {
            ReadProcessMemory(
                handle.handle,
                address as usize as *const c_void,
                buf.as_mut_ptr().cast(),
                buf.len(),
                Some(&mut read),
            )
        }
        .map_err(|e| Error::RegionReadFailed {
            address,
            message: e.to_string(),
        })?;

        if read != buf.len() {
            return Err(Error::RegionReadFailed {
                address,
                message: format!("short read: {} of {} bytes", read, buf.len()),
            });
        }
        Ok(())
    }

    fn write_memory(&self, handle: &WinHandle, address: u64, data: &[u8]) -> Result<()> {
        let mut written = 0usize;
        // SAFETY: `data` is valid for `data.len()` bytes of reads.
        unsafe {
            WriteProcessMemory(
                handle.handle,
                address as usize as *const c_void,
                data.as_ptr().cast(),
                data.len(),
                Some(&mut written),
            )
        }
        .map_err(|e| Error::PatchWriteFailed {
            address,
            message: e.to_string(),
        })?;

        if written != data.len() {
            return Err(Error::PatchWriteFailed {
                address,
                message: format!("short write: {} of {} bytes", written, data.len()),
            });
        }

        // SAFETY: flushing a range that was just written.
        if let Err(e) = unsafe {
            FlushInstructionCache(
                handle.handle,
                Some(address as usize as *const c_void),
                data.len(),
            )
        } {
            debug!("FlushInstructionCache failed at 0x{:X}: {}", address, e);
        }
        Ok(())
    }

    fn close(&self, handle: WinHandle) {
        drop(HandleGuard(handle.handle));
    }
}
