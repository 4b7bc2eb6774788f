//! System-wide constants and defaults.

use std::time::Duration;

/// First line every lxops config file must carry.
pub const CONFIG_MARKER: &str = "#lxops";

/// Hypervisor project used when a config declares none.
pub const DEFAULT_PROJECT: &str = "default";

/// Suffix of the fallback profile name `<instance>.<suffix>`.
pub const DEFAULT_PROFILE_SUFFIX: &str = "lxops";

/// Storage pool queried for the `(zfsroot)` pattern key.
pub const DEFAULT_STORAGE_POOL: &str = "default";

/// Host uid that root inside an unprivileged container maps to.
pub const UNPRIVILEGED_ROOT_UID: u32 = 1_000_000;

/// Host gid that root inside an unprivileged container maps to.
pub const UNPRIVILEGED_ROOT_GID: u32 = 1_000_000;

/// Delay between network-address polls.
pub const ADDRESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Number of network-address polls before giving up.
pub const ADDRESS_POLL_ATTEMPTS: u32 = 30;

