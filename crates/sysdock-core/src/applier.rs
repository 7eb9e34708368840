//! Writing patches into the target process.

use tracing::{info, warn};

use crate::outcome::PatchOutcome;
use crate::process::ProcessControl;
use crate::template::PatternTemplate;

/// Receiver of actionable matches found by the scanner.
pub trait PatchWriter {
    /// Write `template`'s patch for `word` at `address` and report the
    /// resulting outcome.
    fn write_patch(&mut self, template: &PatternTemplate, address: u64, word: u32) -> PatchOutcome;
}

/// [`PatchWriter`] backed by an open process handle.
///
/// Failed writes are reported as [`PatchOutcome::WriteFailed`] and never
/// retried.
pub struct PatchApplier<'a, P: ProcessControl> {
    process: &'a P,
    handle: &'a P::Handle,
    writes: usize,
}

impl<'a, P: ProcessControl> PatchApplier<'a, P> {
    pub fn new(process: &'a P, handle: &'a P::Handle) -> Self {
        Self {
            process,
            handle,
            writes: 0,
        }
    }

    pub fn apply(&mut self, template: &PatternTemplate, address: u64, word: u32) -> PatchOutcome {
        let patch = template.patch_for(word);
        self.writes += 1;
        match self
            .process
            .write_memory(self.handle, address, patch.as_bytes())
        {
            Ok(()) => {
                info!(
                    "Patched {} at 0x{:X} ({} bytes, inst=0x{:08X})",
                    template.name,
                    address,
                    patch.len(),
                    word
                );
                PatchOutcome::PatchedByTool
            }
            Err(e) => {
                warn!("Failed to patch {}: {}", template.name, e);
                PatchOutcome::WriteFailed
            }
        }
    }

    /// Write attempts issued so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl<P: ProcessControl> PatchWriter for PatchApplier<'_, P> {
    fn write_patch(&mut self, template: &PatternTemplate, address: u64, word: u32) -> PatchOutcome {
        self.apply(template, address, word)
    }
}
