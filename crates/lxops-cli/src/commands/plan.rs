//! `lxops plan`: Show what provisioning an instance involves.

use std::path::PathBuf;

use clap::Args;
use lxops_common::config::ToolConfig;
use lxops_core::runner::ProcessRunner;
use lxops_runtime::{Engine, LxcHypervisor, Target};

use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Instance config file.
    pub file: PathBuf,

    /// Instance name; defaults to the config file name without extension.
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Executes the `plan` command.
///
/// Resolves the image, guest commands, filesystem paths, device
/// directories, and profile name. Only read-only queries reach the host.
///
/// # Errors
///
/// Returns an error if the config is invalid or a pattern cannot be resolved.
#[allow(clippy::print_stdout)]
pub fn execute(args: PlanArgs, tool: &ToolConfig) -> anyhow::Result<()> {
    let runner = ProcessRunner::new(tool);
    let hypervisor = LxcHypervisor::new(&runner);
    let engine = Engine::new(&runner, &hypervisor, tool);

    let target = Target::new(args.file, args.name)?;
    let plan = engine.plan(&target)?;
    print!("{}", output::render_yaml(&plan)?);
    Ok(())
}
