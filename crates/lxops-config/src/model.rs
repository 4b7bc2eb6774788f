//! In-memory model of an effective instance config.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use lxops_common::error::{LxopsError, Result};
use serde::{Deserialize, Serialize};

use crate::ordered::OrderedMap;
use crate::pattern::Pattern;

/// Guest operating system family and version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OsSpec {
    /// Family name: `alpine`, `debian`, or `ubuntu`.
    pub name: String,
    /// Release, empty when unconstrained.
    pub version: String,
}

impl OsSpec {
    /// Creates an OS spec.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Returns `true` if neither name nor version is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.version.is_empty()
    }

    /// Names match exactly and versions match or one side is unset.
    #[must_use]
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.name == other.name
            && (self.version == other.version
                || self.version.is_empty()
                || other.version.is_empty())
    }

    /// Combines two declarations, treating empty fields as unconstrained.
    ///
    /// # Errors
    ///
    /// Returns [`LxopsError::IncompatibleOs`] if both sides set a field
    /// to different values.
    pub fn merge(&self, other: &Self) -> Result<Self> {
        let pick = |a: &str, b: &str| -> Result<String> {
            if a.is_empty() || a == b {
                Ok(b.to_string())
            } else if b.is_empty() {
                Ok(a.to_string())
            } else {
                Err(LxopsError::IncompatibleOs {
                    left: self.to_string(),
                    right: other.to_string(),
                })
            }
        };
        Ok(Self {
            name: pick(&self.name, &other.name)?,
            version: pick(&self.version, &other.version)?,
        })
    }
}

impl fmt::Display for OsSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.name, self.version)
        }
    }
}

const fn is_false(value: &bool) -> bool {
    !*value
}

/// A declared backing store, keyed by id in [`Config::filesystems`].
///
/// The resolved pattern names a host directory if it starts with `/`,
/// otherwise a storage volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filesystem {
    /// Location of the store.
    pub pattern: Pattern,
    /// Storage properties applied when a volume is created.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    /// Excluded from snapshots and never cloned from a device origin.
    #[serde(default, skip_serializing_if = "is_false")]
    pub transient: bool,
}

/// A disk binding from a host directory into the container, keyed by
/// name in [`Config::devices`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Device {
    /// Mount point inside the container.
    pub path: String,
    /// Sub-path inside the filesystem; empty means the device name, `.`
    /// means the filesystem root, an absolute result is used verbatim.
    #[serde(default, skip_serializing_if = "Pattern::is_empty")]
    pub dir: Pattern,
    /// Id of the backing filesystem.
    pub filesystem: String,
}

/// A user to create inside the guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct User {
    /// Login name.
    pub name: String,
    /// Numeric uid, assigned by the guest when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    /// Login shell.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Home directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
    /// Grant passwordless sudo.
    #[serde(skip_serializing_if = "is_false")]
    pub sudo: bool,
    /// Copy the operator's authorized keys.
    #[serde(skip_serializing_if = "is_false")]
    pub ssh: bool,
    /// Supplementary groups.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

/// A file to install inside the guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSpec {
    /// Destination inside the guest.
    pub path: String,
    /// Host file to copy, relative to the declaring config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Inline content, used when `source` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Octal mode, e.g. `0644`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Owner inside the guest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// A script to run inside the guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Script {
    /// Name used in logs.
    pub name: String,
    /// Host file holding the script, relative to the declaring config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Inline script body, used when `file` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Working directory inside the guest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Uid to run as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    /// Gid to run as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    /// Restart the guest afterwards.
    #[serde(skip_serializing_if = "is_false")]
    pub reboot: bool,
}

/// The effective instance template. Read-only once merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Files merged ahead of this one. Always empty after reading.
    #[serde(skip_serializing)]
    pub include: Vec<PathBuf>,
    /// Guest operating system.
    #[serde(skip_serializing_if = "OsSpec::is_empty")]
    pub os: OsSpec,
    /// Hypervisor project; empty means the default project.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub project: String,
    /// Name of the profile that receives the device bindings.
    #[serde(skip_serializing_if = "Pattern::is_empty")]
    pub profile: Pattern,
    /// Container to copy instead of launching from an image.
    #[serde(skip_serializing_if = "Pattern::is_empty")]
    pub origin: Pattern,
    /// Instance whose device directories seed new ones.
    #[serde(skip_serializing_if = "Pattern::is_empty")]
    pub device_template: Pattern,
    /// `<name>@<snapshot>` whose volumes are cloned for new filesystems.
    #[serde(skip_serializing_if = "Pattern::is_empty")]
    pub device_origin: Pattern,
    /// Config describing the origin and template instances.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_config: Option<PathBuf>,
    /// User properties, addressed in patterns as `(.key)`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    /// Backing stores by id.
    #[serde(skip_serializing_if = "OrderedMap::is_empty")]
    pub filesystems: OrderedMap<Filesystem>,
    /// Disk bindings by name.
    #[serde(skip_serializing_if = "OrderedMap::is_empty")]
    pub devices: OrderedMap<Device>,
    /// Extra hypervisor profiles attached to the instance.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<String>,
    /// Packages installed in the guest.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    /// Users created in the guest.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<User>,
    /// Files installed in the guest.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileSpec>,
    /// Scripts run before packages are installed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pre_scripts: Vec<Script>,
    /// Scripts run after everything else.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<Script>,
    /// Users that get a generated password.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub passwords: Vec<String>,
    /// Host files that must exist before anything is provisioned.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_files: Vec<PathBuf>,
}

impl Config {
    /// Project name, falling back to the default project.
    #[must_use]
    pub fn project_name(&self) -> &str {
        if self.project.is_empty() {
            lxops_common::constants::DEFAULT_PROJECT
        } else {
            &self.project
        }
    }
}

/// Parsed `<name>@<snapshot>` device-origin reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOrigin {
    /// Instance whose filesystems are cloned.
    pub name: String,
    /// Snapshot to clone from.
    pub snapshot: String,
}

impl FromStr for DeviceOrigin {
    type Err = LxopsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('@') {
            Some((name, snapshot))
                if !name.is_empty() && !snapshot.is_empty() && !snapshot.contains('@') =>
            {
                Ok(Self {
                    name: name.to_string(),
                    snapshot: snapshot.to_string(),
                })
            }
            _ => Err(LxopsError::config(format!(
                "device origin must be <name>@<snapshot>: \"{s}\""
            ))),
        }
    }
}

impl fmt::Display for DeviceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.snapshot)
    }
}
