//! Image command: patch a code dump instead of a live process.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use sysdock_core::MemoryImage;

use super::TargetArgs;
use super::hex_utils::{format_hex_address, parse_hex};
use crate::workspace::Workspace;

pub fn run(
    ws: &Workspace,
    file: &Path,
    group: &str,
    base: &str,
    output: Option<&Path>,
    target: &TargetArgs,
    chunk_size: usize,
) -> Result<()> {
    let group = ws.group(group)?;
    let base = parse_hex(base)?;
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    println!(
        "Loaded {} bytes from {} at {}",
        bytes.len(),
        file.display(),
        format_hex_address(base)
    );

    let image = MemoryImage::single(group.target_id.clone(), base, bytes);
    let report = super::run::patch(ws, &image, std::slice::from_ref(&group), target, chunk_size)?;
    super::log::print_report(&report);

    let writes = image.writes();
    if writes.is_empty() {
        println!("No changes, nothing written");
        return Ok(());
    }

    let patched = image
        .region_bytes(1, base)
        .context("Patched region missing from image")?;
    let output = output.map(Path::to_path_buf).unwrap_or_else(|| default_output(file));
    fs::write(&output, &patched)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    for write in &writes {
        println!(
            "  {} +{:#x}: {} bytes",
            format_hex_address(write.address),
            write.address - base,
            write.data.len()
        );
    }
    println!("Wrote {} patches to {}", writes.len(), output.display());
    Ok(())
}

fn default_output(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(".patched");
    PathBuf::from(name)
}
