//! Waiting for a launched instance to come up on the network.

use std::thread;
use std::time::Duration;

use lxops_common::constants::{ADDRESS_POLL_ATTEMPTS, ADDRESS_POLL_INTERVAL};
use lxops_common::error::{LxopsError, Result};

use crate::hypervisor::Hypervisor;

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between attempts.
    pub interval: Duration,
    /// Maximum number of attempts.
    pub attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: ADDRESS_POLL_INTERVAL,
            attempts: ADDRESS_POLL_ATTEMPTS,
        }
    }
}

/// Polls until the instance reports a global IPv4 address and returns it.
///
/// # Errors
///
/// Returns [`LxopsError::NotFound`] if the instance does not exist,
/// [`LxopsError::Timeout`] if no address shows up within the policy, or
/// any hypervisor error.
pub fn wait_for_address(
    hypervisor: &dyn Hypervisor,
    project: &str,
    name: &str,
    policy: PollPolicy,
) -> Result<String> {
    for attempt in 1..=policy.attempts {
        let state = hypervisor
            .instance_state(project, name)?
            .ok_or_else(|| LxopsError::NotFound {
                kind: "instance",
                id: name.to_string(),
            })?;
        if let Some(address) = state.global_ipv4() {
            tracing::info!(instance = name, address, attempt, "instance has an address");
            return Ok(address.to_string());
        }
        tracing::debug!(instance = name, status = %state.status, attempt, "waiting for address");
        if attempt < policy.attempts {
            thread::sleep(policy.interval);
        }
    }
    Err(LxopsError::Timeout {
        what: format!("an address for {name}"),
        attempts: policy.attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::BTreeMap;

    use super::*;
    use crate::hypervisor::{InstanceState, NetworkAddress, NetworkState, Profile};

    /// Reports an address from the `ready`-th query on.
    struct Booting {
        calls: Cell<u32>,
        ready: u32,
        exists: bool,
    }

    impl Hypervisor for Booting {
        fn get_profile(&self, _project: &str, _name: &str) -> Result<Option<Profile>> {
            Ok(None)
        }

        fn create_profile(&self, _project: &str, _profile: &Profile) -> Result<()> {
            Ok(())
        }

        fn instance_state(&self, _project: &str, _name: &str) -> Result<Option<InstanceState>> {
            if !self.exists {
                return Ok(None);
            }
            self.calls.set(self.calls.get() + 1);
            let addresses = if self.calls.get() >= self.ready {
                vec![NetworkAddress {
                    family: "inet".into(),
                    address: "10.0.3.7".into(),
                    scope: "global".into(),
                }]
            } else {
                Vec::new()
            };
            Ok(Some(InstanceState {
                status: "Running".into(),
                network: Some(BTreeMap::from([(
                    "eth0".to_string(),
                    NetworkState { addresses },
                )])),
            }))
        }

        fn storage_pool_source(&self, _pool: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    fn fast(attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::ZERO,
            attempts,
        }
    }

    #[test]
    fn returns_address_once_reported() {
        let hv = Booting {
            calls: Cell::new(0),
            ready: 3,
            exists: true,
        };
        assert_eq!(wait_for_address(&hv, "default", "a1", fast(5)).unwrap(), "10.0.3.7");
        assert_eq!(hv.calls.get(), 3);
    }

    #[test]
    fn times_out_after_attempts() {
        let hv = Booting {
            calls: Cell::new(0),
            ready: u32::MAX,
            exists: true,
        };
        let err = wait_for_address(&hv, "default", "a1", fast(4)).unwrap_err();
        assert!(matches!(err, LxopsError::Timeout { attempts: 4, .. }));
        assert_eq!(hv.calls.get(), 4);
    }

    #[test]
    fn missing_instance_fails_fast() {
        let hv = Booting {
            calls: Cell::new(0),
            ready: 1,
            exists: false,
        };
        let err = wait_for_address(&hv, "default", "a1", fast(30)).unwrap_err();
        assert!(matches!(err, LxopsError::NotFound { kind: "instance", .. }));
    }

    #[test]
    fn default_policy_is_thirty_seconds() {
        let policy = PollPolicy::default();
        assert_eq!(policy.attempts, 30);
        assert_eq!(policy.interval, Duration::from_secs(1));
    }
}
