//! Hypervisor abstraction.
//!
//! Provisioning needs very little from the container hypervisor: read a
//! profile, create one with its device map, read an instance's network
//! state, and look up where a storage pool lives.

pub mod lxc;

use std::collections::BTreeMap;
use std::path::Path;

use lxops_common::error::Result;
use serde::{Deserialize, Serialize};

pub use lxc::LxcHypervisor;

/// A named, reusable set of device bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Profile configuration keys.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    /// Devices by name; each device is a map of hypervisor keys.
    #[serde(default)]
    pub devices: BTreeMap<String, BTreeMap<String, String>>,
}

impl Profile {
    /// Creates an empty profile.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    /// Adds or replaces a disk device mounting `source` at `path`.
    pub fn add_disk(&mut self, name: &str, path: &str, source: &Path) {
        let device = BTreeMap::from([
            ("type".to_string(), "disk".to_string()),
            ("path".to_string(), path.to_string()),
            ("source".to_string(), source.display().to_string()),
        ]);
        let _ = self.devices.insert(name.to_string(), device);
    }
}

/// One address reported for a network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAddress {
    /// `inet` or `inet6`.
    pub family: String,
    /// The address itself.
    pub address: String,
    /// `global`, `link`, or `local`.
    #[serde(default)]
    pub scope: String,
}

/// State of one network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    /// Addresses assigned to the interface.
    #[serde(default)]
    pub addresses: Vec<NetworkAddress>,
}

/// Runtime state of an instance as reported by the hypervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    /// Status such as `Running` or `Stopped`.
    #[serde(default)]
    pub status: String,
    /// Interfaces by name; absent while the instance is stopped.
    #[serde(default)]
    pub network: Option<BTreeMap<String, NetworkState>>,
}

impl InstanceState {
    /// First global-scope IPv4 address on a non-loopback interface.
    #[must_use]
    pub fn global_ipv4(&self) -> Option<&str> {
        self.network
            .as_ref()?
            .iter()
            .filter(|(name, _)| name.as_str() != "lo")
            .flat_map(|(_, state)| &state.addresses)
            .find(|a| a.family == "inet" && a.scope == "global")
            .map(|a| a.address.as_str())
    }
}

/// The hypervisor operations provisioning depends on.
pub trait Hypervisor {
    /// Returns the profile, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the hypervisor cannot be queried.
    fn get_profile(&self, project: &str, name: &str) -> Result<Option<Profile>>;

    /// Creates a profile together with its devices.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be created.
    fn create_profile(&self, project: &str, profile: &Profile) -> Result<()>;

    /// Returns an instance's runtime state, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the hypervisor cannot be queried.
    fn instance_state(&self, project: &str, name: &str) -> Result<Option<InstanceState>>;

    /// Returns the backing dataset of a storage pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool does not exist or has no backing dataset.
    fn storage_pool_source(&self, pool: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(family: &str, address: &str, scope: &str) -> NetworkAddress {
        NetworkAddress {
            family: family.into(),
            address: address.into(),
            scope: scope.into(),
        }
    }

    #[test]
    fn add_disk_builds_disk_device() {
        let mut profile = Profile::new("a1.lxops", "");
        profile.add_disk("etc", "/etc/opt", Path::new("/tank/a1/etc"));
        let device = &profile.devices["etc"];
        assert_eq!(device["type"], "disk");
        assert_eq!(device["path"], "/etc/opt");
        assert_eq!(device["source"], "/tank/a1/etc");
    }

    #[test]
    fn global_ipv4_skips_loopback_and_link_scope() {
        let state = InstanceState {
            status: "Running".into(),
            network: Some(BTreeMap::from([
                (
                    "lo".to_string(),
                    NetworkState {
                        addresses: vec![address("inet", "127.0.0.1", "global")],
                    },
                ),
                (
                    "eth0".to_string(),
                    NetworkState {
                        addresses: vec![
                            address("inet6", "fe80::1", "link"),
                            address("inet", "10.0.3.15", "global"),
                        ],
                    },
                ),
            ])),
        };
        assert_eq!(state.global_ipv4(), Some("10.0.3.15"));
    }

    #[test]
    fn global_ipv4_none_without_network() {
        assert_eq!(InstanceState::default().global_ipv4(), None);
    }

    #[test]
    fn instance_state_decodes_hypervisor_json() {
        let json = r#"{"status":"Running","network":{"eth0":{"addresses":[
            {"family":"inet","address":"10.1.1.2","netmask":"24","scope":"global"}],
            "hwaddr":"00:16:3e:00:00:01"}},"pid":42}"#;
        let state: InstanceState = serde_json::from_str(json).unwrap();
        assert_eq!(state.global_ipv4(), Some("10.1.1.2"));
    }
}
