//! Built-in patch groups and catalog files.
//!
//! Instruction listings next to each template show the matched code; the
//! marked line is the one rewritten.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::rule::{Condition, Patch};
use crate::template::{PatchGroup, PatternTemplate};
use crate::version::{Version, VersionRange};

/// Title id of the graphics services process
pub const NVSERVICES_TITLE_ID: &str = "0100000000000019";

/// Title id of the USB services process
pub const USB_TITLE_ID: &str = "0100000000000006";

/// Immediate selecting DP alt-mode pin assignment C and D
const DP_MODE_C_IMMEDIATE: u16 = 0x406;

const fn v(major: u8, minor: u8, micro: u8) -> Version {
    Version::new(major, minor, micro)
}

/// Every built-in group, in the order they are patched.
pub fn builtin_groups() -> Result<Vec<PatchGroup>> {
    Ok(vec![nvservices()?, usb()?])
}

fn nvservices() -> Result<PatchGroup> {
    let templates = vec![
        // 79 01 00 34  CBZ     W25, loc_7100042540     <-- nop
        // 2A 05 91 52  MOV     W10, #0x48829           <-- nop
        // 8A 00 A0 72                                  <-- nop
        // FF 02 0A 6B  CMP     W23, W10                <-- nop
        // E3 00 00 54  B.CC    loc_7100042540          <-- nop
        // 69 EE 0C 39  STRB    W9, [X19,#(g_dp_lane_count)]
        PatternTemplate::builder(
            "21.0.0+ no_lane_downgrade",
            "no_lane_downgrade",
            "0x...34.059152.00a072...6b...54.ee0c39",
        )
        .condition(Condition::Cbz)
        .patch(Patch::nop(5)?)
        .target_versions(VersionRange::from(v(21, 0, 0)))
        .build()?,
        // extra LDUR after the CBZ
        PatternTemplate::builder(
            "17.0.0-17.0.1 no_lane_downgrade",
            "no_lane_downgrade",
            "0x...34.....059152.00a072...6b...54.ee0c39",
        )
        .condition(Condition::Cbz)
        .patch(Patch::nop(6)?)
        .target_versions(VersionRange::between(v(17, 0, 0), v(17, 0, 1)))
        .build()?,
        // 2A 05 91 52  MOV     W10, #0x48829
        // 8A 00 A0 72
        // FF 02 0A 6B  CMP     W23, W10
        // 42 00 00 54  B.CS    loc_71000405C0
        // 49 00 80 52  MOV     W9, #2                  <-- nop
        // 69 EE 0C 39  STRB    W9, [X19,#(g_dp_lane_count)]
        PatternTemplate::builder(
            "11.0.0-16.1.0 no_lane_downgrade",
            "no_lane_downgrade",
            "0x.059152.00a072...6b...54.008052.ee0c39",
        )
        .instruction_offset(16)
        .condition(Condition::Movz)
        .patch(Patch::nop(1)?)
        .target_versions(VersionRange::between(v(11, 0, 0), v(16, 1, 0)))
        .build()?,
        PatternTemplate::builder(
            "18.0.0-20.5.0 no_lane_downgrade",
            "no_lane_downgrade",
            "0x.059152.00a072...6b...54.008052.ee0c39",
        )
        .instruction_offset(16)
        .condition(Condition::Movz)
        .patch(Patch::nop(1)?)
        .target_versions(VersionRange::between(v(18, 0, 0), v(20, 5, 0)))
        .build()?,
        // 61 00 00 54  B.NE    loc_71000427B4
        // 48 01 80 52  MOV     W8, #0xA
        // 68 E6 0C 39  STRB    W8, [X19,#(g_dp_current_link_bw)]   <-- nop
        // 61 E6 0C 91  ADD     X1, X19, #0x339
        // 62 EA 0C 91  ADD     X2, X19, #0x33A
        PatternTemplate::builder(
            "no_bw_downgrade",
            "no_bw_downgrade",
            "0x.....018052.e60c39..0c91..0c91",
        )
        .instruction_offset(8)
        .condition(Condition::Strb)
        .patch(Patch::nop(1)?)
        .exclusivity_group(0)
        .target_versions(VersionRange::from(v(11, 0, 0)))
        .build()?,
        // same code, the B.NE is removed so the STRB always runs
        PatternTemplate::builder(
            "force_bw_downgrade",
            "force_bw_downgrade",
            "0x.....018052.e60c39..0c91..0c91",
        )
        .condition(Condition::BCondOrTbnz)
        .patch(Patch::nop(1)?)
        .exclusivity_group(0)
        .target_versions(VersionRange::from(v(11, 0, 0)))
        .build()?,
    ];
    Ok(PatchGroup::new("nvservices", NVSERVICES_TITLE_ID, templates))
}

fn usb() -> Result<PatchGroup> {
    let templates = vec![
        // C0 03 5F D6  RET
        // D4 00 81 52  MOV     W20, #0x806             <-- 0x406
        PatternTemplate::builder(
            "15.0.0+ force_dp_mode_c",
            "force_dp_mode_c",
            "0xC0035FD6D4008152",
        )
        .instruction_offset(4)
        .condition(Condition::Movz)
        .patch(Patch::MovzImmediate(DP_MODE_C_IMMEDIATE))
        .target_versions(VersionRange::from(v(15, 0, 0)))
        .build()?,
        // C0 10 84 52  MOV     W0, #0x2086
        // DC FF FF 17  B       loc_7100054E38
        // D4 00 81 52  MOV     W20, #0x806             <-- 0x406
        PatternTemplate::builder(
            "12.0.0-14.1.2 force_dp_mode_c",
            "force_dp_mode_c",
            "0xC0108452....D4008152",
        )
        .instruction_offset(8)
        .condition(Condition::Movz)
        .patch(Patch::MovzImmediate(DP_MODE_C_IMMEDIATE))
        .target_versions(VersionRange::between(v(12, 0, 0), v(14, 1, 2)))
        .build()?,
        // 1F 01 0E 72  TST     W8, #0x40000
        // C8 80 80 52  MOV     W8, #0x406
        // C9 00 81 52  MOV     W9, #0x806              <-- 0x406
        PatternTemplate::builder(
            "11.0.0-11.0.1 force_dp_mode_c",
            "force_dp_mode_c",
            "0x1F010E72C8808052C9008152",
        )
        .instruction_offset(8)
        .condition(Condition::Movz)
        .patch(Patch::MovzImmediate(DP_MODE_C_IMMEDIATE))
        .target_versions(VersionRange::between(v(11, 0, 0), v(11, 0, 1)))
        .build()?,
    ];
    Ok(PatchGroup::new("usb", USB_TITLE_ID, templates))
}

/// Load groups from a JSON catalog file and validate every template.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Vec<PatchGroup>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let groups: Vec<PatchGroup> = serde_json::from_str(&content)?;
    for group in &groups {
        group.validate()?;
    }
    info!("Loaded {} patch groups from {}", groups.len(), path.display());
    Ok(groups)
}

/// Write groups as a JSON catalog file.
pub fn save_catalog<P: AsRef<Path>>(path: P, groups: &[PatchGroup]) -> Result<()> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(groups)?;
    fs::write(path, content)?;
    debug!("Saved {} patch groups to {}", groups.len(), path.display());
    Ok(())
}

pub fn find_group<'a>(groups: &'a [PatchGroup], name: &str) -> Option<&'a PatchGroup> {
    groups.iter().find(|g| g.name == name)
}
