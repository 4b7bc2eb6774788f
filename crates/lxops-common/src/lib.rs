//! # lxops-common
//!
//! Shared error definitions, constants, and the tool configuration model
//! used across the entire lxops workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
