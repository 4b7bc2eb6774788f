//! ZFS storage volumes.
//!
//! Volume paths are dataset names such as `tank/web/a1`. Volumes are
//! mounted at their default mountpoint, `/` followed by the dataset name.

use std::collections::BTreeMap;
use std::path::PathBuf;

use lxops_common::error::Result;

use crate::runner::{CommandRunner, HostCommand};

/// Returns `true` if the dataset exists. Always queries the host.
///
/// # Errors
///
/// Returns an error if `zfs` cannot be started.
pub fn volume_exists(runner: &dyn CommandRunner, path: &str) -> Result<bool> {
    let exists = runner.probe(&HostCommand::new("zfs").args(["list", "-H", "-o", "name", path]))?;
    tracing::debug!(path, exists, "volume probe");
    Ok(exists)
}

/// Creates a dataset and any missing parents, applying `properties`.
///
/// # Errors
///
/// Returns an error if `zfs create` fails.
pub fn create_volume(
    runner: &dyn CommandRunner,
    path: &str,
    properties: &BTreeMap<String, String>,
) -> Result<()> {
    let mut command = HostCommand::new("zfs").args(["create", "-p"]);
    for (key, value) in properties {
        command = command.arg("-o").arg(format!("{key}={value}"));
    }
    tracing::info!(path, "creating volume");
    runner.run(&command.arg(path).privileged())
}

/// Clones `snapshot` (`<dataset>@<name>`) into a new dataset at `path`.
///
/// # Errors
///
/// Returns an error if `zfs clone` fails.
pub fn clone_volume(runner: &dyn CommandRunner, snapshot: &str, path: &str) -> Result<()> {
    tracing::info!(snapshot, path, "cloning volume");
    runner.run(
        &HostCommand::new("zfs")
            .args(["clone", "-p", snapshot, path])
            .privileged(),
    )
}

/// Snapshots `path` and all its descendants as `<path>@<name>`.
///
/// # Errors
///
/// Returns an error if `zfs snapshot` fails.
pub fn snapshot_recursive(runner: &dyn CommandRunner, path: &str, name: &str) -> Result<()> {
    tracing::info!(path, name, "snapshotting volume tree");
    runner.run(
        &HostCommand::new("zfs")
            .args(["snapshot", "-r", &format!("{path}@{name}")])
            .privileged(),
    )
}

/// Default mountpoint of a dataset.
#[must_use]
pub fn mountpoint(path: &str) -> PathBuf {
    PathBuf::from(format!("/{}", path.trim_start_matches('/')))
}

/// Reduces `paths` to those that are not descendants of another path in
/// the set. The result is sorted and free of duplicates.
#[must_use]
pub fn root_paths<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sorted: Vec<String> = paths
        .into_iter()
        .map(|p| p.as_ref().trim_end_matches('/').to_string())
        .collect();
    sorted.sort();
    sorted.dedup();

    let mut roots: Vec<String> = Vec::new();
    for path in sorted {
        let covered = roots
            .iter()
            .any(|root| path.strip_prefix(root.as_str()).is_some_and(|rest| rest.starts_with('/')));
        if !covered {
            roots.push(path);
        }
    }
    roots
}
