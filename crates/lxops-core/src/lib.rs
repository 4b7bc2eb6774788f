//! # lxops-core
//!
//! Host-level primitives for the lxops provisioning engine:
//! - **Runner**: external commands with dry-run, trace, and `sudo` handling.
//! - **Filesystem**: storage-volume and directory operations built on the runner.
//!
//! Nothing here knows about configs or instances; callers pass resolved
//! paths.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod runner;

pub use runner::{CommandRunner, HostCommand, ProcessRunner};
