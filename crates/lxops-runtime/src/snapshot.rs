//! Recursive snapshots of an instance's volumes.

use lxops_common::error::{LxopsError, Result};
use lxops_core::filesystem::volume;
use lxops_core::runner::CommandRunner;

use crate::instance::Instance;

/// Volume paths a snapshot of `instance` covers: the root paths of its
/// non-transient, volume-backed filesystems.
///
/// # Errors
///
/// Returns an error if a filesystem pattern cannot be resolved.
pub fn snapshot_roots(instance: &Instance<'_>) -> Result<Vec<String>> {
    let paths = instance
        .filesystems()?
        .iter()
        .filter(|fs| !fs.is_dir() && !fs.filesystem.transient)
        .map(|fs| fs.path.as_str());
    Ok(volume::root_paths(paths))
}

/// Snapshots every root volume of `instance` as `<root>@<name>`.
///
/// # Errors
///
/// Returns an error if `name` is empty or contains `@` or `/`, or if a snapshot
/// command fails.
pub fn snapshot(runner: &dyn CommandRunner, instance: &Instance<'_>, name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['@', '/']) {
        return Err(LxopsError::config(format!("invalid snapshot name \"{name}\"")));
    }
    let roots = snapshot_roots(instance)?;
    if roots.is_empty() {
        tracing::warn!(instance = instance.name(), "no volumes to snapshot");
    }
    for root in roots {
        volume::snapshot_recursive(runner, &root, name)?;
    }
    Ok(())
}
