//! # lxops-runtime
//!
//! Binds configs to instances and provisions them:
//! - **Instance**: per-instance pattern context, resolved filesystem paths
//!   and device directories.
//! - **Devices**: the provisioning state machine for volumes, directories,
//!   and profile device bindings.
//! - **Hypervisor**: the profile and instance-state seam, backed by `lxc`.
//! - **Engine**: sequential processing of several configs.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod devices;
pub mod engine;
pub mod hypervisor;
pub mod instance;
pub mod network;
pub mod snapshot;

pub use devices::DeviceConfigurer;
pub use engine::{Engine, LoadedConfig, Plan, Target};
pub use hypervisor::{Hypervisor, InstanceState, LxcHypervisor, Profile};
pub use instance::{Instance, InstanceFs};
pub use network::{PollPolicy, wait_for_address};
