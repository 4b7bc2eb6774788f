//! Device provisioning.
//!
//! Creates the backing storage of an instance and binds its device
//! directories into the instance's profile. Every creation is guarded by
//! an existence probe, so re-running after a failure only does what is
//! still missing. Nothing is ever rolled back or reconciled.
//!
//! The profile is created last, carrying every device binding at once. A
//! run that fails on a device leaves no profile behind, so the next run
//! still binds all devices.

use std::path::Path;

use lxops_common::constants::{UNPRIVILEGED_ROOT_GID, UNPRIVILEGED_ROOT_UID};
use lxops_common::error::{LxopsError, Result};
use lxops_config::{Config, DeviceOrigin};
use lxops_core::filesystem::{directory, volume};
use lxops_core::runner::CommandRunner;

use crate::hypervisor::{Hypervisor, Profile};
use crate::instance::{Instance, InstanceFs};

/// Provisions filesystems and devices for instances.
pub struct DeviceConfigurer<'a> {
    runner: &'a dyn CommandRunner,
    hypervisor: &'a dyn Hypervisor,
}

impl<'a> DeviceConfigurer<'a> {
    /// Creates a configurer using `runner` for host commands.
    #[must_use]
    pub const fn new(runner: &'a dyn CommandRunner, hypervisor: &'a dyn Hypervisor) -> Self {
        Self { runner, hypervisor }
    }

    /// Provisions `instance`.
    ///
    /// `source` is the config describing the device-origin and
    /// device-template instances; pass the instance's own config when it
    /// has no separate source config.
    ///
    /// # Errors
    ///
    /// Returns the first failure. Host changes made before it stay in place.
    pub fn configure(&self, instance: &Instance<'_>, source: &Config) -> Result<()> {
        tracing::info!(
            instance = instance.name(),
            dry_run = self.runner.is_dry_run(),
            "provisioning devices"
        );
        let filesystems = instance.filesystems()?;

        // Resolve everything that can fail without touching the host first.
        let origin = match instance.device_origin()? {
            Some(origin) => {
                let origin_instance =
                    Instance::new(source, origin.name.clone()).with_storage_root(self.hypervisor);
                let origin_fs = origin_instance.filesystems()?.to_vec();
                Some((origin, origin_fs))
            }
            None => None,
        };
        let template = instance
            .device_template()?
            .map(|name| Instance::new(source, name).with_storage_root(self.hypervisor));
        if let Some(template) = &template {
            let _ = template.filesystems()?;
        }

        for fs in filesystems {
            self.ensure_filesystem(instance, fs, origin.as_ref())?;
        }

        let devices = &instance.config().devices;
        let mut pending = if devices.is_empty() {
            None
        } else {
            self.pending_profile(instance)?
        };
        for (name, device) in devices.iter() {
            let dir = instance.device_dir(name, device)?;
            if !directory::dir_exists(self.runner, &dir)? {
                directory::create_dir(self.runner, &dir)?;
                directory::chown_recursive(
                    self.runner,
                    &dir,
                    UNPRIVILEGED_ROOT_UID,
                    UNPRIVILEGED_ROOT_GID,
                )?;
                if let Some(template) = &template {
                    let from = template.device_dir(name, device)?;
                    self.seed(&from, &dir)?;
                }
            }
            if let Some(profile) = pending.as_mut() {
                tracing::info!(instance = instance.name(), device = name, path = %device.path, "adding device");
                profile.add_disk(name, &device.path, &dir);
            }
        }

        if let Some(profile) = pending {
            self.hypervisor.create_profile(instance.project(), &profile)?;
        }
        Ok(())
    }

    fn ensure_filesystem(
        &self,
        instance: &Instance<'_>,
        fs: &InstanceFs,
        origin: Option<&(DeviceOrigin, Vec<InstanceFs>)>,
    ) -> Result<()> {
        if fs.is_dir() {
            let dir = fs.dir();
            if !directory::dir_exists(self.runner, &dir)? {
                directory::create_dir(self.runner, &dir)?;
            }
            return Ok(());
        }
        if volume::volume_exists(self.runner, &fs.path)? {
            tracing::debug!(instance = instance.name(), filesystem = %fs.id, "volume exists");
            return Ok(());
        }
        match origin {
            Some((origin, origin_fs)) if !fs.filesystem.transient => {
                let source = origin_fs
                    .iter()
                    .find(|o| o.id == fs.id)
                    .ok_or_else(|| LxopsError::NotFound {
                        kind: "origin filesystem",
                        id: format!("{}:{}", origin.name, fs.id),
                    })?;
                if source.is_dir() {
                    return Err(LxopsError::config(format!(
                        "cannot clone directory filesystem {} of {}",
                        fs.id, origin.name
                    )));
                }
                volume::clone_volume(
                    self.runner,
                    &format!("{}@{}", source.path, origin.snapshot),
                    &fs.path,
                )
            }
            _ => volume::create_volume(self.runner, &fs.path, &fs.filesystem.properties),
        }
    }

    /// The profile to create once all devices are in place, or `None` if it
    /// already exists.
    fn pending_profile(&self, instance: &Instance<'_>) -> Result<Option<Profile>> {
        let name = instance.profile_name();
        if self
            .hypervisor
            .get_profile(instance.project(), &name)?
            .is_some()
        {
            tracing::debug!(profile = %name, "profile exists, devices left unchanged");
            return Ok(None);
        }
        Ok(Some(Profile::new(
            name,
            format!("lxops devices for {}", instance.name()),
        )))
    }

    fn seed(&self, from: &Path, to: &Path) -> Result<()> {
        if !directory::dir_exists(self.runner, from)? {
            return Err(LxopsError::NotFound {
                kind: "template directory",
                id: from.display().to_string(),
            });
        }
        directory::copy_contents(self.runner, from, to)
    }
}
