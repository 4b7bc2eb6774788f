//! # lxops-config
//!
//! Everything needed to turn a graph of config files into one effective
//! instance config:
//! - **Pattern**: `(key)` substitution over ordered resolver layers.
//! - **Model**: the config data model and device-origin references.
//! - **OS**: per-family guest capabilities.
//! - **Reader**: include/merge resolution.
//! - **Validator**: static checks on the merged result.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod model;
pub mod ordered;
pub mod os;
pub mod pattern;
pub mod reader;
pub mod validator;

pub use model::{Config, Device, DeviceOrigin, FileSpec, Filesystem, OsSpec, Script, User};
pub use pattern::{Pattern, PatternContext, ResolverLayer};
pub use reader::ConfigReader;
