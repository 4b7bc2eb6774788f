//! # lxops: instance config and device provisioning CLI
//!
//! Resolves layered instance configs and creates the host storage and
//! profile device bindings they describe.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

/// Crates whose events `--verbose` raises to debug.
const VERBOSE_TARGETS: [&str; 4] = ["lxops_config", "lxops_core", "lxops_runtime", "lxops"];

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut filter = EnvFilter::from_default_env();
    if cli.verbose {
        for target in VERBOSE_TARGETS {
            filter = filter.add_directive(format!("{target}=debug").parse()?);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    commands::execute(cli)
}
