//! A config bound to a concrete instance name.
//!
//! [`Instance`] is the single place where patterns are turned into names
//! and paths for one provisioning run. It is never persisted.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::path::PathBuf;

use lxops_common::constants::{DEFAULT_PROFILE_SUFFIX, DEFAULT_PROJECT, DEFAULT_STORAGE_POOL};
use lxops_common::error::{LxopsError, Result};
use lxops_config::pattern::KeyFn;
use lxops_config::{
    Config, Device, DeviceOrigin, Filesystem, Pattern, PatternContext, ResolverLayer,
};
use lxops_core::filesystem::volume;

use crate::hypervisor::Hypervisor;

/// A filesystem with its pattern resolved for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceFs {
    /// Filesystem id.
    pub id: String,
    /// Resolved location: a host directory if it starts with `/`,
    /// otherwise a volume name.
    pub path: String,
    /// The declaration it was resolved from.
    pub filesystem: Filesystem,
}

impl InstanceFs {
    /// Returns `true` for directory-backed filesystems.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.path.starts_with('/')
    }

    /// Host directory holding the filesystem's contents.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        host_dir(&self.path)
    }
}

fn host_dir(path: &str) -> PathBuf {
    if path.starts_with('/') {
        PathBuf::from(path)
    } else {
        volume::mountpoint(path)
    }
}

/// A [`Config`] bound to an instance name.
pub struct Instance<'a> {
    config: &'a Config,
    name: String,
    properties: PatternContext<'a>,
    filesystems: OnceCell<Vec<InstanceFs>>,
}

impl std::fmt::Debug for Instance<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("project", &self.config.project_name())
            .finish_non_exhaustive()
    }
}

fn constants(config: &Config, name: &str) -> BTreeMap<String, String> {
    let project = config.project_name();
    let (prefix, qualified) = if project == DEFAULT_PROJECT {
        (String::new(), name.to_string())
    } else {
        (format!("{project}/"), format!("{project}_{name}"))
    };
    let mut values = BTreeMap::from([
        ("instance".to_string(), name.to_string()),
        ("project".to_string(), project.to_string()),
        ("project/".to_string(), prefix),
        ("project_instance".to_string(), qualified),
    ]);
    values.extend(
        config
            .properties
            .iter()
            .map(|(key, value)| (format!(".{key}"), value.clone())),
    );
    values
}

impl<'a> Instance<'a> {
    /// Binds `config` to `name`.
    ///
    /// The context starts with the constants `instance`, `project`,
    /// `project/` (empty in the default project), `project_instance`
    /// (`<project>_<name>` outside the default project), and every config
    /// property as `.<key>`.
    #[must_use]
    pub fn new(config: &'a Config, name: impl Into<String>) -> Self {
        let name = name.into();
        let properties = PatternContext::new(vec![ResolverLayer::Properties(constants(
            config, &name,
        ))]);
        Self {
            config,
            name,
            properties,
            filesystems: OnceCell::new(),
        }
    }

    /// Adds a resolver layer below the existing ones.
    #[must_use]
    pub fn with_layer(mut self, layer: ResolverLayer<'a>) -> Self {
        self.properties.push(layer);
        self
    }

    /// Adds the `(zfsroot)` key: the backing dataset of the default
    /// storage pool, queried on first use and then cached.
    #[must_use]
    pub fn with_storage_root(self, hypervisor: &'a dyn Hypervisor) -> Self {
        let cache: OnceCell<String> = OnceCell::new();
        let root: KeyFn<'a> = Box::new(move || {
            if let Some(root) = cache.get() {
                return Ok(root.clone());
            }
            let root = hypervisor.storage_pool_source(DEFAULT_STORAGE_POOL)?;
            let _ = cache.set(root.clone());
            Ok(root)
        });
        self.with_layer(ResolverLayer::Functions(BTreeMap::from([(
            "zfsroot".to_string(),
            root,
        )])))
    }

    /// Instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bound config.
    #[must_use]
    pub const fn config(&self) -> &'a Config {
        self.config
    }

    /// Hypervisor project.
    #[must_use]
    pub fn project(&self) -> &'a str {
        self.config.project_name()
    }

    /// Substitutes an arbitrary pattern against this instance.
    ///
    /// # Errors
    ///
    /// Returns an error if a key cannot be resolved.
    pub fn substitute(&self, pattern: &str) -> Result<String> {
        self.properties.substitute(pattern)
    }

    /// Name of the profile that receives this instance's devices.
    ///
    /// Never fails: an unresolvable profile pattern falls back to
    /// `<name>.lxops` with a warning.
    #[must_use]
    pub fn profile_name(&self) -> String {
        let fallback = || format!("{}.{DEFAULT_PROFILE_SUFFIX}", self.name);
        if self.config.profile.is_empty() {
            return fallback();
        }
        match self.config.profile.substitute(&self.properties) {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => fallback(),
            Err(e) => {
                let name = fallback();
                tracing::warn!(instance = %self.name, error = %e, profile = %name, "using default profile name");
                name
            }
        }
    }

    /// Resolved filesystems in declaration order. Computed once.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern cannot be resolved or resolves to an
    /// empty path.
    pub fn filesystems(&self) -> Result<&[InstanceFs]> {
        if let Some(filesystems) = self.filesystems.get() {
            return Ok(filesystems.as_slice());
        }
        let mut resolved = Vec::with_capacity(self.config.filesystems.len());
        for (id, filesystem) in self.config.filesystems.iter() {
            let path = filesystem.pattern.substitute(&self.properties)?;
            if path.is_empty() {
                return Err(LxopsError::config(format!(
                    "filesystem {id} resolves to an empty path for {}",
                    self.name
                )));
            }
            tracing::debug!(instance = %self.name, filesystem = id, path = %path, "resolved filesystem");
            resolved.push(InstanceFs {
                id: id.to_string(),
                path,
                filesystem: filesystem.clone(),
            });
        }
        Ok(self.filesystems.get_or_init(|| resolved).as_slice())
    }

    /// Looks up one resolved filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`LxopsError::NotFound`] if no filesystem has this id.
    pub fn filesystem(&self, id: &str) -> Result<&InstanceFs> {
        self.filesystems()?
            .iter()
            .find(|fs| fs.id == id)
            .ok_or_else(|| LxopsError::NotFound {
                kind: "filesystem",
                id: id.to_string(),
            })
    }

    /// Location of a device's directory in filesystem terms: a volume
    /// sub-path such as `tank/a1/etc`, or an absolute host path.
    ///
    /// # Errors
    ///
    /// Returns an error if the dir pattern cannot be resolved or the
    /// device references an unknown filesystem.
    pub fn device_path(&self, name: &str, device: &Device) -> Result<String> {
        let dir = if device.dir.is_empty() {
            name.to_string()
        } else {
            device.dir.substitute(&self.properties)?
        };
        if dir.starts_with('/') {
            return Ok(dir);
        }
        let fs = self.filesystem(&device.filesystem)?;
        let root = fs.path.trim_end_matches('/');
        Ok(if dir == "." {
            root.to_string()
        } else {
            format!("{root}/{}", dir.trim_start_matches("./"))
        })
    }

    /// Host directory bound into the container for a device.
    ///
    /// # Errors
    ///
    /// See [`Instance::device_path`].
    pub fn device_dir(&self, name: &str, device: &Device) -> Result<PathBuf> {
        Ok(host_dir(&self.device_path(name, device)?))
    }

    /// Parsed device origin, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern cannot be resolved or the result is
    /// not `<name>@<snapshot>`.
    pub fn device_origin(&self) -> Result<Option<DeviceOrigin>> {
        if self.config.device_origin.is_empty() {
            return Ok(None);
        }
        let origin = self.config.device_origin.substitute(&self.properties)?;
        Ok(Some(origin.parse()?))
    }

    /// Name of the instance whose device directories seed new ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern cannot be resolved.
    pub fn device_template(&self) -> Result<Option<String>> {
        self.optional(&self.config.device_template)
    }

    /// Container to copy instead of launching from an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern cannot be resolved.
    pub fn origin(&self) -> Result<Option<String>> {
        self.optional(&self.config.origin)
    }

    fn optional(&self, pattern: &Pattern) -> Result<Option<String>> {
        if pattern.is_empty() {
            return Ok(None);
        }
        let value = pattern.substitute(&self.properties)?;
        Ok((!value.is_empty()).then_some(value))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::hypervisor::{InstanceState, Profile};

    fn config(filesystems: &[(&str, &str)], devices: &[(&str, &str, &str, &str)]) -> Config {
        Config {
            filesystems: filesystems
                .iter()
                .map(|(id, pattern)| {
                    (
                        (*id).to_string(),
                        Filesystem {
                            pattern: Pattern::from(*pattern),
                            ..Filesystem::default()
                        },
                    )
                })
                .collect(),
            devices: devices
                .iter()
                .map(|(name, path, dir, fs)| {
                    (
                        (*name).to_string(),
                        Device {
                            path: (*path).to_string(),
                            dir: Pattern::from(*dir),
                            filesystem: (*fs).to_string(),
                        },
                    )
                })
                .collect(),
            ..Config::default()
        }
    }

    #[test]
    fn resolves_filesystem_and_device_paths() {
        let config = config(&[("host", "tank/(instance)")], &[("etc", "/etc/opt", "etc", "host")]);
        let instance = Instance::new(&config, "a1");
        let fs = instance.filesystem("host").unwrap();
        assert_eq!(fs.path, "tank/a1");
        assert!(!fs.is_dir());
        assert_eq!(fs.dir(), PathBuf::from("/tank/a1"));

        let device = config.devices.get("etc").unwrap();
        assert_eq!(instance.device_path("etc", device).unwrap(), "tank/a1/etc");
        assert_eq!(instance.device_dir("etc", device).unwrap(), PathBuf::from("/tank/a1/etc"));
    }

    #[test]
    fn device_dir_defaults_and_special_values() {
        let config = config(
            &[("data", "/srv/(instance)/")],
            &[
                ("log", "/var/log", "", "data"),
                ("root", "/data", ".", "data"),
                ("abs", "/opt", "/mnt/shared/(instance)", "data"),
            ],
        );
        let instance = Instance::new(&config, "a1");
        let dir = |name: &str| instance.device_dir(name, config.devices.get(name).unwrap()).unwrap();
        assert_eq!(dir("log"), PathBuf::from("/srv/a1/log"));
        assert_eq!(dir("root"), PathBuf::from("/srv/a1"));
        assert_eq!(dir("abs"), PathBuf::from("/mnt/shared/a1"));
    }

    #[test]
    fn unknown_filesystem_reference_is_not_found() {
        let config = config(&[], &[("etc", "/etc", "etc", "missing")]);
        let instance = Instance::new(&config, "a1");
        let err = instance
            .device_path("etc", config.devices.get("etc").unwrap())
            .unwrap_err();
        assert!(matches!(err, LxopsError::NotFound { kind: "filesystem", .. }));
    }

    #[test]
    fn project_keys_depend_on_project() {
        let mut config = config(&[("host", "tank/(project/)(instance)")], &[]);
        {
            let instance = Instance::new(&config, "a1");
            assert_eq!(instance.filesystem("host").unwrap().path, "tank/a1");
            assert_eq!(instance.substitute("(project_instance)").unwrap(), "a1");
        }

        config.project = "web".into();
        let instance = Instance::new(&config, "a1");
        assert_eq!(instance.filesystem("host").unwrap().path, "tank/web/a1");
        assert_eq!(instance.substitute("(project) (project_instance)").unwrap(), "web web_a1");
    }

    #[test]
    fn user_properties_are_dotted() {
        let mut config = config(&[("host", "(.pool)/(instance)")], &[]);
        let _ = config.properties.insert("pool".into(), "z/host".into());
        let instance = Instance::new(&config, "a");
        assert_eq!(instance.filesystem("host").unwrap().path, "z/host/a");
    }

    #[test]
    fn empty_path_is_rejected() {
        let mut config = config(&[("host", "(.pool)")], &[]);
        let _ = config.properties.insert("pool".into(), String::new());
        let instance = Instance::new(&config, "a1");
        assert!(instance.filesystems().is_err());
    }

    #[test]
    fn filesystems_are_memoized() {
        let config = config(&[("a", "tank/(instance)"), ("b", "/srv/(instance)")], &[]);
        let instance = Instance::new(&config, "a1");
        let first = instance.filesystems().unwrap().as_ptr();
        let second = instance.filesystems().unwrap().as_ptr();
        assert_eq!(first, second);
        let ids: Vec<_> = instance.filesystems().unwrap().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn profile_name_falls_back() {
        let mut config = Config::default();
        assert_eq!(Instance::new(&config, "a1").profile_name(), "a1.lxops");

        config.profile = Pattern::from("(instance).(.suffix)");
        assert_eq!(Instance::new(&config, "a1").profile_name(), "a1.lxops");

        let _ = config.properties.insert("suffix".into(), "web".into());
        assert_eq!(Instance::new(&config, "a1").profile_name(), "a1.web");
    }

    #[test]
    fn device_origin_is_parsed() {
        let mut config = Config {
            device_origin: Pattern::from("golden-(project)@base"),
            ..Config::default()
        };
        let origin = Instance::new(&config, "a1").device_origin().unwrap().unwrap();
        assert_eq!(origin.name, "golden-default");
        assert_eq!(origin.snapshot, "base");

        config.device_origin = Pattern::from("golden");
        assert!(Instance::new(&config, "a1").device_origin().is_err());
    }

    struct Pool(Cell<u32>);

    impl Hypervisor for Pool {
        fn get_profile(&self, _project: &str, _name: &str) -> Result<Option<Profile>> {
            Ok(None)
        }

        fn create_profile(&self, _project: &str, _profile: &Profile) -> Result<()> {
            Ok(())
        }

        fn instance_state(&self, _project: &str, _name: &str) -> Result<Option<InstanceState>> {
            Ok(None)
        }

        fn storage_pool_source(&self, _pool: &str) -> Result<String> {
            self.0.set(self.0.get() + 1);
            Ok("tank/lxd".into())
        }
    }

    #[test]
    fn storage_root_is_queried_once() {
        let pool = Pool(Cell::new(0));
        let config = config(
            &[("a", "(zfsroot)/(instance)/a"), ("b", "(zfsroot)/(instance)/b")],
            &[],
        );
        let instance = Instance::new(&config, "a1").with_storage_root(&pool);
        assert_eq!(instance.filesystem("b").unwrap().path, "tank/lxd/a1/b");
        assert_eq!(instance.substitute("(zfsroot)").unwrap(), "tank/lxd");
        assert_eq!(pool.0.get(), 1);
    }
}
