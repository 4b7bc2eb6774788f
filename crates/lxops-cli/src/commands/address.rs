//! `lxops address`: Wait for an instance's network address.

use clap::Args;
use lxops_common::config::ToolConfig;
use lxops_common::constants::{ADDRESS_POLL_ATTEMPTS, DEFAULT_PROJECT};
use lxops_core::runner::ProcessRunner;
use lxops_runtime::{LxcHypervisor, PollPolicy, wait_for_address};

/// Arguments for the `address` command.
#[derive(Args, Debug)]
pub struct AddressArgs {
    /// Instance name.
    pub name: String,

    /// Hypervisor project.
    #[arg(long, default_value = DEFAULT_PROJECT)]
    pub project: String,

    /// Number of one-second polls before giving up.
    #[arg(long, default_value_t = ADDRESS_POLL_ATTEMPTS)]
    pub attempts: u32,
}

/// Executes the `address` command.
///
/// Prints the first global IPv4 address the instance reports.
///
/// # Errors
///
/// Returns an error if the instance does not exist or no address shows up
/// in time.
#[allow(clippy::print_stdout)]
pub fn execute(args: AddressArgs, tool: &ToolConfig) -> anyhow::Result<()> {
    let runner = ProcessRunner::new(tool);
    let hypervisor = LxcHypervisor::new(&runner);
    let policy = PollPolicy {
        attempts: args.attempts,
        ..PollPolicy::default()
    };
    let address = wait_for_address(&hypervisor, &args.project, &args.name, policy)?;
    println!("{address}");
    Ok(())
}
