//! Unified error type for the lxops workspace.
//!
//! Configuration problems (`Config`, `Pattern`, `IncompatibleOs`, `Yaml`) are
//! raised while reading and validating, before any host mutation. Provisioning
//! problems (`Command`, `Timeout`, missing template directories) are raised by
//! the runtime and leave already-applied host changes in place.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum LxopsError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A pattern could not be parsed or one of its keys could not be resolved.
    #[error("pattern \"{pattern}\": {message}")]
    Pattern {
        /// The offending pattern text.
        pattern: String,
        /// What went wrong.
        message: String,
    },

    /// Two OS declarations cannot be merged.
    #[error("incompatible OS: {left} vs {right}")]
    IncompatibleOs {
        /// OS already accumulated.
        left: String,
        /// OS declared by the fragment being merged.
        right: String,
    },

    /// An external command could not be started or exited unsuccessfully.
    #[error("command failed: {command}: {message}")]
    Command {
        /// The literal command line.
        command: String,
        /// Exit status or spawn error.
        message: String,
    },

    /// A bounded wait ran out of attempts.
    #[error("timed out waiting for {what} after {attempts} attempts")]
    Timeout {
        /// What was being waited for.
        what: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A YAML config file could not be decoded.
    #[error("{path}: {source}")]
    Yaml {
        /// File being decoded.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// JSON encoding or decoding failed.
    #[error("serialization error: {source}")]
    Json {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl LxopsError {
    /// Shorthand for [`LxopsError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns `true` for errors in the config itself rather than in the
    /// host or the hypervisor.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::Pattern { .. }
                | Self::IncompatibleOs { .. }
                | Self::Yaml { .. }
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, LxopsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_names_the_command() {
        let err = LxopsError::Command {
            command: "sudo zfs create tank/a1".into(),
            message: "exit status: 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "command failed: sudo zfs create tank/a1: exit status: 1"
        );
        assert!(!err.is_configuration());
    }

    #[test]
    fn pattern_error_is_configuration() {
        let err = LxopsError::Pattern {
            pattern: "(x)".into(),
            message: "no value for key \"x\"".into(),
        };
        assert!(err.is_configuration());
        assert!(err.to_string().contains("(x)"));
    }
}
