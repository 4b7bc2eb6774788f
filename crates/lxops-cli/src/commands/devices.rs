//! `lxops devices`: Create filesystems and bind devices.

use std::path::PathBuf;

use clap::Args;
use lxops_common::config::ToolConfig;
use lxops_core::runner::ProcessRunner;
use lxops_runtime::{Engine, LxcHypervisor, Target};

/// Arguments for the `devices` command.
#[derive(Args, Debug)]
pub struct DevicesArgs {
    /// Instance config files, processed in order.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Instance name; only valid with a single config file.
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Builds the provisioning targets for `args`.
///
/// # Errors
///
/// Returns an error if a name is given for several files or a file name
/// yields no instance name.
pub fn targets(args: DevicesArgs) -> anyhow::Result<Vec<Target>> {
    if args.name.is_some() && args.files.len() > 1 {
        anyhow::bail!("--name can only be used with a single config file");
    }
    let mut name = args.name;
    args.files
        .into_iter()
        .map(|file| Target::new(file, name.take()).map_err(anyhow::Error::from))
        .collect()
}

/// Executes the `devices` command.
///
/// Each instance is provisioned completely before the next one starts.
/// With `--dry-run` the host commands are printed instead.
///
/// # Errors
///
/// Returns the first failure; instances after it are not processed.
pub fn execute(args: DevicesArgs, tool: &ToolConfig) -> anyhow::Result<()> {
    let targets = targets(args)?;
    let runner = ProcessRunner::new(tool);
    let hypervisor = LxcHypervisor::new(&runner);
    let engine = Engine::new(&runner, &hypervisor, tool);

    tracing::debug!(count = targets.len(), dry_run = tool.dry_run, "provisioning devices");
    engine.configure_devices(&targets)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(files: &[&str], name: Option<&str>) -> DevicesArgs {
        DevicesArgs {
            files: files.iter().map(PathBuf::from).collect(),
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn names_default_to_file_stems() {
        let targets = targets(args(&["a1.yaml", "dir/b2.yaml"], None)).unwrap();
        let names: Vec<_> = targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a1", "b2"]);
    }

    #[test]
    fn explicit_name_needs_single_file() {
        assert_eq!(targets(args(&["a1.yaml"], Some("web"))).unwrap()[0].name, "web");
        assert!(targets(args(&["a1.yaml", "b2.yaml"], Some("web"))).is_err());
    }
}
