//! Locating a target process and walking its code regions.

mod chunk;

use tracing::{debug, info, warn};

use crate::applier::PatchApplier;
use crate::error::{Error, Result};
use crate::outcome::GroupOutcomes;
use crate::process::{ProcessControl, RegionInfo};
use crate::scanner::scan_chunk;
use crate::template::PatchGroup;

pub use chunk::{ChunkBuffer, DEFAULT_CHUNK_SIZE, OVERLAP_SIZE};

/// Counters accumulated over every group walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub regions_scanned: usize,
    pub bytes_read: u64,
    pub read_failures: usize,
    pub structural_matches: usize,
    pub writes: usize,
}

/// Drives the scanner over every static code region of a target process.
pub struct RegionWalker<'a, P: ProcessControl> {
    process: &'a P,
    buffer: ChunkBuffer,
    stats: WalkStats,
}

impl<'a, P: ProcessControl> RegionWalker<'a, P> {
    pub fn new(process: &'a P, chunk_size: usize) -> Self {
        Self {
            process,
            buffer: ChunkBuffer::new(chunk_size),
            stats: WalkStats::default(),
        }
    }

    pub fn stats(&self) -> WalkStats {
        self.stats
    }

    /// Scan the group's target for every pending template.
    ///
    /// Returns [`Error::TargetNotRunning`] when no process has the group's
    /// target id and [`Error::EnumerationFailed`] when processes cannot be
    /// listed. The process handle is closed on every path once opened.
    pub fn patch_group(&mut self, group: &PatchGroup, outcomes: &mut GroupOutcomes) -> Result<()> {
        if !outcomes.any_pending() {
            debug!("{}: nothing to scan", group.name);
            return Ok(());
        }

        let handle = self.find_target(&group.target_id)?;
        self.scan_regions(&handle, group, outcomes);
        self.process.close(handle);
        Ok(())
    }

    fn find_target(&self, target_id: &str) -> Result<P::Handle> {
        let pids = self.process.list_processes().map_err(|e| match e {
            Error::EnumerationFailed(_) => e,
            other => Error::EnumerationFailed(other.to_string()),
        })?;

        for pid in pids {
            let handle = match self.process.open_process(pid) {
                Ok(h) => h,
                Err(e) => {
                    debug!("Skipping pid {}: {}", pid, e);
                    continue;
                }
            };
            match self.process.target_id(&handle) {
                Ok(id) if id == target_id => {
                    debug!("Found {} as pid {}", target_id, pid);
                    return Ok(handle);
                }
                Ok(_) => {}
                Err(e) => debug!("No identity for pid {}: {}", pid, e),
            }
            self.process.close(handle);
        }

        Err(Error::TargetNotRunning(target_id.to_string()))
    }

    fn scan_regions(&mut self, handle: &P::Handle, group: &PatchGroup, outcomes: &mut GroupOutcomes) {
        let mut address = 0u64;
        while outcomes.any_pending() {
            let Some(region) = self.process.query_region(handle, address) else {
                break;
            };
            // Stop at the top of the address space or when the backend makes
            // no progress.
            let next = match region.end() {
                Some(end) if end > address => end,
                _ => break,
            };
            if region.is_scannable() {
                self.scan_region(handle, &region, group, outcomes);
            }
            address = next;
        }
    }

    fn scan_region(
        &mut self,
        handle: &P::Handle,
        region: &RegionInfo,
        group: &PatchGroup,
        outcomes: &mut GroupOutcomes,
    ) {
        debug!(
            "{}: scanning 0x{:X}..0x{:X} ({})",
            group.name,
            region.base,
            region.base + region.size,
            region.permissions
        );
        self.buffer.reset();
        self.stats.regions_scanned += 1;

        let process = self.process;
        let mut applier = PatchApplier::new(process, handle);
        let chunk_size = self.buffer.chunk_size() as u64;
        let mut offset = 0u64;

        while offset < region.size && outcomes.any_pending() {
            let chunk_address = region.base + offset;
            let len = chunk_size.min(region.size - offset) as usize;

            if let Err(e) = self
                .buffer
                .fill(len, |slot| process.read_memory(handle, chunk_address, slot))
            {
                warn!(
                    "{}: read failed at 0x{:X}, skipping rest of region: {}",
                    group.name, chunk_address, e
                );
                self.stats.read_failures += 1;
                break;
            }
            self.stats.bytes_read += len as u64;

            let base = self.buffer.window_base(chunk_address);
            self.stats.structural_matches += scan_chunk(
                self.buffer.window(),
                base,
                &group.templates,
                outcomes,
                &mut applier,
            );
            self.buffer.carry_tail();
            offset += len as u64;
        }

        self.stats.writes += applier.writes();
        if !outcomes.any_pending() {
            info!("{}: all templates resolved", group.name);
        }
    }
}
