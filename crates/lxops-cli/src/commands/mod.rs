//! CLI command definitions and dispatch.

pub mod address;
pub mod config;
pub mod devices;
pub mod plan;
pub mod snapshot;

use clap::{Parser, Subcommand};
use lxops_common::config::ToolConfig;

/// lxops: resolve instance configs and provision their storage and devices.
#[derive(Parser, Debug)]
#[command(name = "lxops", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Print host-mutating commands instead of running them.
    #[arg(long, global = true, env = "LXOPS_DRY_RUN")]
    pub dry_run: bool,

    /// Echo every external command to stderr before it runs.
    #[arg(long, global = true, env = "LXOPS_TRACE")]
    pub trace: bool,

    /// Debug logging and warnings for overridden filesystems and devices.
    #[arg(short, long, global = true, env = "LXOPS_VERBOSE")]
    pub verbose: bool,

    /// User property as key=value, addressed in patterns as (.key).
    #[arg(short = 'P', long = "property", global = true, value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
}

impl Cli {
    /// Tool settings from the global flags.
    ///
    /// # Errors
    ///
    /// Returns an error if a property is not `key=value`.
    pub fn tool_config(&self) -> anyhow::Result<ToolConfig> {
        let mut tool = ToolConfig {
            dry_run: self.dry_run,
            trace: self.trace,
            verbose: self.verbose,
            ..ToolConfig::default()
        };
        for property in &self.properties {
            tool.set_property(property)?;
        }
        Ok(tool)
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the merged config of one or more files.
    Config(config::ConfigArgs),
    /// Show the resolved image, commands, filesystems, and devices of an instance.
    Plan(plan::PlanArgs),
    /// Create an instance's filesystems and bind its devices.
    Devices(devices::DevicesArgs),
    /// Snapshot an instance's volumes.
    Snapshot(snapshot::SnapshotArgs),
    /// Wait for an instance to report a network address.
    Address(address::AddressArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let tool = cli.tool_config()?;
    match cli.command {
        Command::Config(args) => config::execute(args, &tool),
        Command::Plan(args) => plan::execute(args, &tool),
        Command::Devices(args) => devices::execute(args, &tool),
        Command::Snapshot(args) => snapshot::execute(args, &tool),
        Command::Address(args) => address::execute(args, &tool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_build_tool_config() {
        let cli = Cli::try_parse_from([
            "lxops", "devices", "a1.yaml", "--dry-run", "-P", ".host=tank", "--property", "zone=b",
        ])
        .unwrap();
        let tool = cli.tool_config().unwrap();
        assert!(tool.dry_run);
        assert!(!tool.trace);
        assert_eq!(tool.properties["host"], "tank");
        assert_eq!(tool.properties["zone"], "b");
    }

    #[test]
    fn malformed_property_is_rejected() {
        let cli = Cli::try_parse_from(["lxops", "config", "a.yaml", "-P", "novalue"]).unwrap();
        assert!(cli.tool_config().is_err());
    }

    #[test]
    fn snapshot_requires_a_name() {
        assert!(Cli::try_parse_from(["lxops", "snapshot", "a1.yaml"]).is_err());
        assert!(Cli::try_parse_from(["lxops", "snapshot", "a1.yaml", "-s", "nightly"]).is_ok());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
