//! Run command: patch the live target processes.

use anyhow::Result;
use std::path::Path;
use sysdock_core::{
    Engine, PatchGroup, PatchOutcome, ProcessControl, RunOptions, RunReport, RunStats,
};
use tracing::info;

use super::TargetArgs;
use crate::workspace::Workspace;

pub fn run(ws: &Workspace, target: &TargetArgs, chunk_size: usize, proc_root: &Path) -> Result<()> {
    let groups = ws.groups()?;
    let report = run_on_backend(ws, &groups, target, chunk_size, proc_root)?;
    super::log::print_report(&report);
    Ok(())
}

#[cfg(target_os = "linux")]
fn run_on_backend(
    ws: &Workspace,
    groups: &[PatchGroup],
    target: &TargetArgs,
    chunk_size: usize,
    proc_root: &Path,
) -> Result<RunReport> {
    let process = sysdock_core::ProcFs::with_root(proc_root);
    patch(ws, &process, groups, target, chunk_size)
}

#[cfg(target_os = "windows")]
fn run_on_backend(
    ws: &Workspace,
    groups: &[PatchGroup],
    target: &TargetArgs,
    chunk_size: usize,
    _proc_root: &Path,
) -> Result<RunReport> {
    let process = sysdock_core::WinProcess::new();
    patch(ws, &process, groups, target, chunk_size)
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn run_on_backend(
    _ws: &Workspace,
    _groups: &[PatchGroup],
    _target: &TargetArgs,
    _chunk_size: usize,
    _proc_root: &Path,
) -> Result<RunReport> {
    anyhow::bail!("Live patching is not supported on this platform; use `sysdock image`")
}

/// One full run against `process`: clear the previous log, resolve options
/// and flags from the config, patch, then persist config and log.
pub fn patch<P: ProcessControl>(
    ws: &Workspace,
    process: &P,
    groups: &[PatchGroup],
    target: &TargetArgs,
    chunk_size: usize,
) -> Result<RunReport> {
    let log = ws.result_log();
    log.clear()?;

    let mut config = ws.config()?;
    let options = RunOptions::load(&mut config);
    let ctx = target.context(options.version_skip)?;
    info!(
        "Target {} with provider {} ({}{})",
        ctx.target_version,
        ctx.provider.version,
        ctx.provider.short_hash(),
        if ctx.emulated_storage { ", emuMMC" } else { "" }
    );

    let engine = Engine::new(process).with_chunk_size(chunk_size);
    let report = engine.run(
        groups,
        &ctx,
        options.patching_enabled(ctx.emulated_storage),
        &mut config,
    )?;

    config.save_if_dirty()?;
    if options.enable_logging {
        log.write(&report, &RunStats::from_run(&report, &ctx, engine.chunk_size()))?;
        info!("Results written to {}", log.path().display());
    }

    info!(
        "{} patched, {} already patched",
        report.count(PatchOutcome::PatchedByTool),
        report.count(PatchOutcome::PatchedExternally)
    );
    Ok(report)
}
