//! Static checks on a merged config.
//!
//! Everything here runs before any host mutation, so a config that passes
//! can only fail later on pattern keys that need an instance or on host
//! side effects.

use std::collections::HashSet;

use lxops_common::error::{LxopsError, Result};

use crate::model::{Config, DeviceOrigin};
use crate::os::os_type;

/// Validates a merged config.
///
/// # Checks performed
///
/// 1. The OS, if declared, is a supported family.
/// 2. Filesystem ids, device names, and user names are identifiers.
/// 3. Device paths are absolute and unique.
/// 4. Every device names a declared filesystem.
/// 5. Every pattern parses.
/// 6. A literal device origin has the `<name>@<snapshot>` form.
/// 7. Required files exist.
///
/// # Errors
///
/// Returns the first failing check, naming the offending entity.
pub fn validate(config: &Config) -> Result<()> {
    tracing::debug!("validating config");
    check_os(config)?;
    check_identifiers(config)?;
    check_device_paths(config)?;
    check_filesystem_references(config)?;
    check_patterns(config)?;
    check_device_origin(config)?;
    check_required_files(config)?;
    Ok(())
}

/// Returns `true` for names made of ASCII letters, digits, `_`, `-`, and `.`
/// that do not start with `-`.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn check_os(config: &Config) -> Result<()> {
    if !config.os.name.is_empty() {
        let _ = os_type(&config.os)?;
    }
    Ok(())
}

fn check_identifier(kind: &str, name: &str) -> Result<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(LxopsError::config(format!("invalid {kind} name: \"{name}\"")))
    }
}

fn check_identifiers(config: &Config) -> Result<()> {
    for id in config.filesystems.keys() {
        check_identifier("filesystem", id)?;
    }
    for name in config.devices.keys() {
        check_identifier("device", name)?;
    }
    let mut users = HashSet::new();
    for user in &config.users {
        check_identifier("user", &user.name)?;
        if !users.insert(user.name.as_str()) {
            return Err(LxopsError::config(format!(
                "duplicate user name: \"{}\"",
                user.name
            )));
        }
    }
    for name in &config.passwords {
        check_identifier("password user", name)?;
    }
    Ok(())
}

fn check_device_paths(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();
    for (name, device) in config.devices.iter() {
        if !device.path.starts_with('/') {
            return Err(LxopsError::config(format!(
                "device \"{name}\" path must be absolute: \"{}\"",
                device.path
            )));
        }
        if !seen.insert(device.path.trim_end_matches('/')) {
            return Err(LxopsError::config(format!(
                "duplicate device path: \"{}\" (device \"{name}\")",
                device.path
            )));
        }
    }
    Ok(())
}

fn check_filesystem_references(config: &Config) -> Result<()> {
    for (name, device) in config.devices.iter() {
        if !config.filesystems.contains_key(&device.filesystem) {
            return Err(LxopsError::NotFound {
                kind: "filesystem",
                id: format!(
                    "\"{}\" referenced by device \"{name}\"",
                    device.filesystem
                ),
            });
        }
    }
    Ok(())
}

fn check_patterns(config: &Config) -> Result<()> {
    for (_, fs) in config.filesystems.iter() {
        let _ = fs.pattern.keys()?;
    }
    for (_, device) in config.devices.iter() {
        let _ = device.dir.keys()?;
    }
    for pattern in [
        &config.profile,
        &config.origin,
        &config.device_template,
        &config.device_origin,
    ] {
        let _ = pattern.keys()?;
    }
    Ok(())
}

fn check_device_origin(config: &Config) -> Result<()> {
    if !config.device_origin.is_empty() && config.device_origin.keys()?.is_empty() {
        let _: DeviceOrigin = config.device_origin.as_str().parse()?;
    }
    Ok(())
}

fn check_required_files(config: &Config) -> Result<()> {
    for path in &config.required_files {
        if !path.exists() {
            return Err(LxopsError::NotFound {
                kind: "required file",
                id: path.display().to_string(),
            });
        }
    }
    Ok(())
}
