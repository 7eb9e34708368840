//! Structural matching of pattern templates against a byte buffer.

use tracing::{debug, trace};

use crate::applier::PatchWriter;
use crate::outcome::{GroupOutcomes, PatchOutcome};
use crate::rule::read_word;
use crate::template::PatternTemplate;

/// Scan `data` (mapped at `base`) for every template that is still
/// `NotFound`, updating its outcome slot.
///
/// A template stops being scanned in this buffer once its instruction is
/// handed to `writer` or the patch is found already in place. A structural
/// match whose instruction fails the condition and which is not already
/// patched is ignored, and scanning continues at the next offset.
///
/// Returns the number of structural matches seen.
pub fn scan_chunk<W: PatchWriter>(
    data: &[u8],
    base: u64,
    templates: &[PatternTemplate],
    outcomes: &mut GroupOutcomes,
    writer: &mut W,
) -> usize {
    let mut structural = 0;
    for (index, template) in templates.iter().enumerate() {
        if outcomes.get(index).is_terminal() {
            continue;
        }
        if let Some(outcome) = scan_template(data, base, template, writer, &mut structural) {
            outcomes.set(index, outcome);
        }
    }
    structural
}

fn scan_template<W: PatchWriter>(
    data: &[u8],
    base: u64,
    template: &PatternTemplate,
    writer: &mut W,
    structural: &mut usize,
) -> Option<PatchOutcome> {
    let len = template.pattern.len();
    let mut i = 0;
    while i + len < data.len() {
        if !template.pattern.matches_at(data, i) {
            i += 1;
            continue;
        }
        *structural += 1;

        // Offsets are validated against the pattern length, so the word and
        // the patch window are inside `data` for any structural match.
        let word = read_word(data, i + template.instruction_start())?;
        let patch_at = i + template.patch_start();

        if template.matches(word) {
            let address = base + patch_at as u64;
            debug!(
                "{}: match at 0x{:X}, inst=0x{:08X}",
                template.name,
                base + i as u64,
                word
            );
            return Some(writer.write_patch(template, address, word));
        }

        if template.already_applied(&data[patch_at..], word) {
            debug!(
                "{}: already patched at 0x{:X}",
                template.name,
                base + patch_at as u64
            );
            return Some(PatchOutcome::PatchedExternally);
        }

        trace!(
            "{}: structural match at 0x{:X} rejected, inst=0x{:08X}",
            template.name,
            base + i as u64,
            word
        );
        i += 1;
    }
    None
}
