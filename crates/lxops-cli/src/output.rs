//! Formatted output helpers for CLI commands.
//!
//! Commands print YAML documents so their output can be piped back into
//! lxops or diffed between runs.

use lxops_common::constants::CONFIG_MARKER;
use lxops_config::Config;
use serde::Serialize;

/// Renders any serializable value as a YAML document.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn render_yaml<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_yaml::to_string(value)?)
}

/// Renders a config as a readable config file, marker line included.
///
/// # Errors
///
/// Returns an error if the config cannot be serialized.
pub fn render_config(config: &Config) -> anyhow::Result<String> {
    Ok(format!("{CONFIG_MARKER}\n{}", render_yaml(config)?))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use lxops_config::reader::parse_config;
    use lxops_config::{Device, Filesystem, Pattern};

    use super::*;

    #[test]
    fn render_config_starts_with_marker() {
        let text = render_config(&Config::default()).unwrap();
        assert!(text.starts_with("#lxops\n"), "got: {text}");
    }

    #[test]
    fn rendered_config_reads_back() {
        let mut config = Config::default();
        let _ = config.filesystems.insert(
            "host",
            Filesystem {
                pattern: Pattern::from("tank/(instance)"),
                ..Filesystem::default()
            },
        );
        let _ = config.devices.insert(
            "etc",
            Device {
                path: "/etc/opt".into(),
                dir: Pattern::from("etc"),
                filesystem: "host".into(),
            },
        );
        let text = render_config(&config).unwrap();
        let parsed = parse_config(&text, Path::new("rendered.yaml")).unwrap();
        assert_eq!(parsed, config);
    }
}
