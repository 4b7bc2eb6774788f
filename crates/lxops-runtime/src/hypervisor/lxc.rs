//! Hypervisor access through `lxc query`.
//!
//! `lxc query` talks to the local daemon's REST API with the client's own
//! credentials and remotes, so no socket or certificate handling is needed
//! here. Mutations go through [`CommandRunner::run`] and are therefore
//! printed instead of executed in dry-run mode.

use std::collections::BTreeMap;

use lxops_common::error::{LxopsError, Result};
use lxops_core::runner::{CommandRunner, HostCommand};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Hypervisor, InstanceState, Profile};

const API: &str = "/1.0";

/// [`Hypervisor`] backed by the `lxc` command line client.
pub struct LxcHypervisor<'r> {
    runner: &'r dyn CommandRunner,
}

#[derive(Debug, Deserialize)]
struct StoragePool {
    #[serde(default)]
    config: BTreeMap<String, String>,
}

/// Request body for profile creation.
#[derive(Debug, Serialize)]
struct ProfileBody<'p> {
    name: &'p str,
    description: &'p str,
    config: &'p BTreeMap<String, String>,
    devices: &'p BTreeMap<String, BTreeMap<String, String>>,
}

fn scoped(path: &str, project: &str) -> String {
    format!("{API}{path}?project={project}")
}

impl<'r> LxcHypervisor<'r> {
    /// Creates a hypervisor client that runs `lxc` through `runner`.
    #[must_use]
    pub const fn new(runner: &'r dyn CommandRunner) -> Self {
        Self { runner }
    }

    fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let out = self
            .runner
            .output(&HostCommand::new("lxc").args(["query", url]))?;
        Ok(serde_json::from_str(&out)?)
    }

    fn send(&self, method: &str, url: &str, body: &ProfileBody<'_>) -> Result<()> {
        let data = serde_json::to_string(body)?;
        self.runner.run(
            &HostCommand::new("lxc")
                .args(["query", "--request", method, "--data"])
                .arg(data)
                .arg(url),
        )
    }

    /// Lists the names in a collection such as `/profiles`.
    fn names(&self, collection: &str, project: &str) -> Result<Vec<String>> {
        let urls: Vec<String> = self.get(&scoped(collection, project))?;
        let prefix = format!("{API}{collection}/");
        Ok(urls
            .into_iter()
            .filter_map(|url| {
                let name = url.strip_prefix(&prefix)?;
                Some(name.split('?').next().unwrap_or(name).to_string())
            })
            .collect())
    }
}

impl Hypervisor for LxcHypervisor<'_> {
    fn get_profile(&self, project: &str, name: &str) -> Result<Option<Profile>> {
        if !self.names("/profiles", project)?.iter().any(|n| n == name) {
            return Ok(None);
        }
        let profile = self.get(&scoped(&format!("/profiles/{name}"), project))?;
        Ok(Some(profile))
    }

    fn create_profile(&self, project: &str, profile: &Profile) -> Result<()> {
        tracing::info!(project, profile = %profile.name, devices = profile.devices.len(), "creating profile");
        self.send(
            "POST",
            &scoped("/profiles", project),
            &ProfileBody {
                name: &profile.name,
                description: &profile.description,
                config: &profile.config,
                devices: &profile.devices,
            },
        )
    }

    fn instance_state(&self, project: &str, name: &str) -> Result<Option<InstanceState>> {
        if !self.names("/instances", project)?.iter().any(|n| n == name) {
            return Ok(None);
        }
        let state = self.get(&scoped(&format!("/instances/{name}/state"), project))?;
        Ok(Some(state))
    }

    fn storage_pool_source(&self, pool: &str) -> Result<String> {
        let pool_info: StoragePool = self.get(&format!("{API}/storage-pools/{pool}"))?;
        pool_info
            .config
            .get("zfs.pool_name")
            .or_else(|| pool_info.config.get("source"))
            .filter(|s| !s.is_empty())
            .cloned()
            .ok_or_else(|| LxopsError::NotFound {
                kind: "storage pool source",
                id: pool.to_string(),
            })
    }
}
