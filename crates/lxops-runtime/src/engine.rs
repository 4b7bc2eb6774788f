//! Runtime engine that drives provisioning for one or more configs.
//!
//! Targets are processed strictly one at a time in input order. The first
//! failure stops the run; earlier targets keep whatever was provisioned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lxops_common::config::ToolConfig;
use lxops_common::error::{LxopsError, Result};
use lxops_config::os::os_type;
use lxops_config::{Config, ConfigReader};
use lxops_core::runner::CommandRunner;
use serde::Serialize;

use crate::devices::DeviceConfigurer;
use crate::hypervisor::Hypervisor;
use crate::instance::Instance;
use crate::snapshot;

/// A config file and the instance name it is provisioned under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Root config file.
    pub config: PathBuf,
    /// Instance name.
    pub name: String,
}

impl Target {
    /// Creates a target. Without an explicit name the instance is named
    /// after the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if no name is given and the path has no file stem.
    pub fn new(config: impl Into<PathBuf>, name: Option<String>) -> Result<Self> {
        let config = config.into();
        let name = match name {
            Some(name) => name,
            None => instance_name(&config)?,
        };
        Ok(Self { config, name })
    }
}

/// Instance name derived from a config path: its file stem.
///
/// # Errors
///
/// Returns an error if the path has no usable file stem.
pub fn instance_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            LxopsError::config(format!("cannot derive an instance name from {}", path.display()))
        })
}

/// A config together with the config describing its origin and template
/// instances.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The instance's own config.
    pub config: Config,
    /// The `source-config`, if the config names one.
    pub source: Option<Config>,
}

impl LoadedConfig {
    /// Config that origin and template instances are resolved against.
    #[must_use]
    pub fn source(&self) -> &Config {
        self.source.as_ref().unwrap_or(&self.config)
    }
}

/// Resolved view of what provisioning an instance involves.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Plan {
    /// Instance name.
    pub instance: String,
    /// Hypervisor project.
    pub project: String,
    /// Profile receiving the devices.
    pub profile: String,
    /// Image to launch, if an OS is declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Container copied instead of launching an image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Device origin as `<name>@<snapshot>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_origin: Option<String>,
    /// Instance whose device directories seed new ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_template: Option<String>,
    /// Filesystem id to resolved path.
    pub filesystems: BTreeMap<String, String>,
    /// Device name to host directory.
    pub devices: BTreeMap<String, String>,
    /// Guest package installation command.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub install: Vec<String>,
    /// Guest user creation commands.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<Vec<String>>,
    /// Users that get a generated password.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub passwords: Vec<String>,
}

/// Coordinates reading, resolving, and provisioning.
pub struct Engine<'a> {
    runner: &'a dyn CommandRunner,
    hypervisor: &'a dyn Hypervisor,
    reader: ConfigReader,
    overrides: BTreeMap<String, String>,
}

impl<'a> Engine<'a> {
    /// Creates an engine. Properties in `tool` override same-named config
    /// properties.
    #[must_use]
    pub fn new(
        runner: &'a dyn CommandRunner,
        hypervisor: &'a dyn Hypervisor,
        tool: &ToolConfig,
    ) -> Self {
        Self {
            runner,
            hypervisor,
            reader: ConfigReader::new().verbose(tool.verbose),
            overrides: tool.properties.clone(),
        }
    }

    fn read(&self, path: &Path) -> Result<Config> {
        let mut config = self.reader.read(path)?;
        config.properties.extend(self.overrides.clone());
        Ok(config)
    }

    /// Reads a config and its source config.
    ///
    /// # Errors
    ///
    /// Returns an error if either config cannot be read or is invalid.
    pub fn load(&self, path: &Path) -> Result<LoadedConfig> {
        let config = self.read(path)?;
        let source = match &config.source_config {
            Some(source) => {
                tracing::debug!(source = %source.display(), "reading source config");
                Some(self.read(source)?)
            }
            None => None,
        };
        Ok(LoadedConfig { config, source })
    }

    /// Binds `config` to `name`, with `(zfsroot)` available.
    #[must_use]
    pub fn instance<'c>(&self, config: &'c Config, name: &str) -> Instance<'c>
    where
        'a: 'c,
    {
        Instance::new(config, name).with_storage_root(self.hypervisor)
    }

    /// Provisions filesystems and devices for each target, in order.
    ///
    /// # Errors
    ///
    /// Returns the first failure; later targets are not processed.
    pub fn configure_devices(&self, targets: &[Target]) -> Result<()> {
        let configurer = DeviceConfigurer::new(self.runner, self.hypervisor);
        for target in targets {
            tracing::info!(instance = %target.name, config = %target.config.display(), "configuring devices");
            let loaded = self.load(&target.config)?;
            let instance = self.instance(&loaded.config, &target.name);
            configurer
                .configure(&instance, loaded.source())
                .inspect_err(|err| {
                    if err.is_configuration() {
                        tracing::error!(instance = %target.name, "invalid config, fix it and re-run");
                    } else {
                        tracing::error!(instance = %target.name, "provisioning stopped, earlier changes kept");
                    }
                })?;
        }
        Ok(())
    }

    /// Snapshots the volumes of a target.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be read or a snapshot fails.
    pub fn snapshot(&self, target: &Target, name: &str) -> Result<()> {
        let loaded = self.load(&target.config)?;
        let instance = self.instance(&loaded.config, &target.name);
        snapshot::snapshot(self.runner, &instance, name)
    }

    /// Resolves everything about a target without touching the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be read or a pattern cannot be
    /// resolved.
    pub fn plan(&self, target: &Target) -> Result<Plan> {
        let loaded = self.load(&target.config)?;
        let config = &loaded.config;
        let instance = self.instance(config, &target.name);

        let mut plan = Plan {
            instance: target.name.clone(),
            project: instance.project().to_string(),
            profile: instance.profile_name(),
            origin: instance.origin()?,
            device_origin: instance.device_origin()?.map(|o| o.to_string()),
            device_template: instance.device_template()?,
            ..Plan::default()
        };
        for fs in instance.filesystems()? {
            let _ = plan.filesystems.insert(fs.id.clone(), fs.path.clone());
        }
        for (name, device) in config.devices.iter() {
            let dir = instance.device_dir(name, device)?;
            let _ = plan
                .devices
                .insert(name.to_string(), dir.display().to_string());
        }
        if !config.os.name.is_empty() {
            let os = os_type(&config.os)?;
            plan.image = Some(os.image_name(&config.os.version));
            plan.install = os.install_packages_command(&config.packages);
            plan.users = config.users.iter().map(|u| os.add_user_command(u)).collect();
            if os.need_passwords() {
                plan.passwords.clone_from(&config.passwords);
            }
        }
        Ok(plan)
    }
}
