//! `lxops config`: Print the merged config of one or more files.

use std::path::PathBuf;

use clap::Args;
use lxops_common::config::ToolConfig;
use lxops_config::ConfigReader;

use crate::output;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config files, merged in order.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Executes the `config` command.
///
/// Reads every file with its includes, applies command line properties,
/// and prints the effective config as a config file.
///
/// # Errors
///
/// Returns an error if a file cannot be read or the merged config is invalid.
#[allow(clippy::print_stdout)]
pub fn execute(args: ConfigArgs, tool: &ToolConfig) -> anyhow::Result<()> {
    let mut config = ConfigReader::new()
        .verbose(tool.verbose)
        .read_all(&args.files)?;
    config.properties.extend(tool.properties.clone());
    print!("{}", output::render_config(&config)?);
    Ok(())
}
