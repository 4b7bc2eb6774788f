//! `lxops snapshot`: Recursively snapshot an instance's volumes.

use std::path::PathBuf;

use clap::Args;
use lxops_common::config::ToolConfig;
use lxops_core::runner::ProcessRunner;
use lxops_runtime::{Engine, LxcHypervisor, Target};

/// Arguments for the `snapshot` command.
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Instance config file.
    pub file: PathBuf,

    /// Instance name; defaults to the config file name without extension.
    #[arg(short, long)]
    pub name: Option<String>,

    /// Snapshot name.
    #[arg(short, long)]
    pub snapshot: String,
}

/// Executes the `snapshot` command.
///
/// Transient filesystems and directories are skipped; volumes nested in
/// another snapshotted volume are covered by its recursive snapshot.
///
/// # Errors
///
/// Returns an error if the config is invalid or a snapshot fails.
pub fn execute(args: SnapshotArgs, tool: &ToolConfig) -> anyhow::Result<()> {
    let runner = ProcessRunner::new(tool);
    let hypervisor = LxcHypervisor::new(&runner);
    let engine = Engine::new(&runner, &hypervisor, tool);

    let target = Target::new(args.file, args.name)?;
    engine.snapshot(&target, &args.snapshot)?;
    Ok(())
}
