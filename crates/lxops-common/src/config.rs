//! Tool-level settings shared by every command.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Settings that govern how lxops talks to the host, independent of
/// any instance config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Print host-mutating commands instead of running them.
    pub dry_run: bool,
    /// Echo every external command before it runs.
    pub trace: bool,
    /// Emit warnings for overridden filesystem and device ids.
    pub verbose: bool,
    /// User properties, addressed in patterns as `(.key)`.
    pub properties: BTreeMap<String, String>,
}

impl ToolConfig {
    /// Parses a `key=value` property assignment and records it.
    ///
    /// # Errors
    ///
    /// Returns an error if the assignment has no `=` or an empty key.
    pub fn set_property(&mut self, assignment: &str) -> crate::error::Result<()> {
        let (key, value) = assignment
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| {
                crate::error::LxopsError::config(format!(
                    "property must be key=value: {assignment}"
                ))
            })?;
        let key = key.strip_prefix('.').unwrap_or(key);
        let _ = self.properties.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_property_strips_leading_dot() {
        let mut config = ToolConfig::default();
        config.set_property(".host=tank").unwrap();
        config.set_property("zone=a=b").unwrap();
        assert_eq!(config.properties.get("host").map(String::as_str), Some("tank"));
        assert_eq!(config.properties.get("zone").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn set_property_rejects_missing_value() {
        let mut config = ToolConfig::default();
        assert!(config.set_property("host").is_err());
        assert!(config.set_property("=x").is_err());
    }
}
