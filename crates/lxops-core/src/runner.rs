//! External command execution.
//!
//! Every host side effect goes through a [`CommandRunner`]. The process
//! runner honors dry-run (mutating commands are printed, not executed)
//! and trace (every command is echoed to stderr before it runs). Probes
//! and output queries are read-only and always execute, so a dry run
//! still reflects the real state of the host.

use std::fmt;
use std::process::{Command, Output};

use lxops_common::config::ToolConfig;
use lxops_common::error::{LxopsError, Result};

/// An external command line, optionally requiring root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    program: String,
    args: Vec<String>,
    privileged: bool,
}

impl HostCommand {
    /// Starts a command line for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            privileged: false,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Marks the command as needing root.
    #[must_use]
    pub const fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, without the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Returns `true` if the command needs root.
    #[must_use]
    pub const fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Returns the command prefixed with `sudo`.
    #[must_use]
    pub fn with_sudo(&self) -> Self {
        Self {
            program: "sudo".into(),
            args: std::iter::once(self.program.clone())
                .chain(self.args.iter().cloned())
                .collect(),
            privileged: self.privileged,
        }
    }
}

fn needs_quoting(word: &str) -> bool {
    word.is_empty()
        || word
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '$' | '`' | '\\' | '*' | '?' | ';' | '&' | '|'))
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if needs_quoting(arg) {
                write!(f, " '{}'", arg.replace('\'', r"'\''"))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Executes external commands on behalf of the provisioning code.
pub trait CommandRunner {
    /// Runs a host-mutating command. Suppressed in dry-run mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be started or exits unsuccessfully.
    fn run(&self, command: &HostCommand) -> Result<()>;

    /// Runs a read-only command and reports whether it succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error only if the command cannot be started.
    fn probe(&self, command: &HostCommand) -> Result<bool>;

    /// Runs a read-only command and returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be started or exits unsuccessfully.
    fn output(&self, command: &HostCommand) -> Result<String>;

    /// Returns `true` if mutating commands are only printed.
    fn is_dry_run(&self) -> bool;
}

/// Runs commands as child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    dry_run: bool,
    trace: bool,
    use_sudo: bool,
}

impl ProcessRunner {
    /// Creates a runner from the tool settings. Privileged commands are
    /// prefixed with `sudo` unless the current user is root.
    #[must_use]
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            trace: config.trace,
            use_sudo: !nix::unistd::geteuid().is_root(),
        }
    }

    /// Never prefix privileged commands with `sudo`.
    #[must_use]
    pub const fn without_sudo(mut self) -> Self {
        self.use_sudo = false;
        self
    }

    fn effective(&self, command: &HostCommand) -> HostCommand {
        if command.is_privileged() && self.use_sudo {
            command.with_sudo()
        } else {
            command.clone()
        }
    }

    #[allow(clippy::print_stderr)]
    fn echo(&self, command: &HostCommand) {
        if self.trace {
            eprintln!("+ {command}");
        }
    }

    fn spawn(&self, command: &HostCommand) -> Result<Output> {
        let effective = self.effective(command);
        self.echo(&effective);
        tracing::debug!(command = %effective, "exec");
        Command::new(effective.program())
            .args(effective.arguments())
            .output()
            .map_err(|e| spawn_error(&effective, &e))
    }
}

fn spawn_error(command: &HostCommand, error: &std::io::Error) -> LxopsError {
    let message = if which::which(command.program()).is_err() {
        format!("{} not found on PATH", command.program())
    } else {
        error.to_string()
    };
    LxopsError::Command {
        command: command.to_string(),
        message,
    }
}

fn failure(command: &HostCommand, output: &Output) -> LxopsError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    LxopsError::Command {
        command: command.to_string(),
        message: if stderr.is_empty() {
            output.status.to_string()
        } else {
            format!("{}: {stderr}", output.status)
        },
    }
}

impl CommandRunner for ProcessRunner {
    #[allow(clippy::print_stdout)]
    fn run(&self, command: &HostCommand) -> Result<()> {
        let effective = self.effective(command);
        if self.dry_run {
            println!("{effective}");
            tracing::info!(command = %effective, "dry run");
            return Ok(());
        }
        self.echo(&effective);
        tracing::info!(command = %effective, "run");
        let status = Command::new(effective.program())
            .args(effective.arguments())
            .status()
            .map_err(|e| spawn_error(&effective, &e))?;
        if status.success() {
            Ok(())
        } else {
            Err(LxopsError::Command {
                command: effective.to_string(),
                message: status.to_string(),
            })
        }
    }

    fn probe(&self, command: &HostCommand) -> Result<bool> {
        Ok(self.spawn(command)?.status.success())
    }

    fn output(&self, command: &HostCommand) -> Result<String> {
        let output = self.spawn(command)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(failure(&self.effective(command), &output))
        }
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(dry_run: bool) -> ProcessRunner {
        ProcessRunner::new(&ToolConfig {
            dry_run,
            ..ToolConfig::default()
        })
        .without_sudo()
    }

    #[test]
    fn display_quotes_when_needed() {
        let command = HostCommand::new("adduser").args(["--gecos", "", "a b", "it's"]);
        assert_eq!(command.to_string(), r"adduser --gecos '' 'a b' 'it'\''s'");
    }

    #[test]
    fn with_sudo_prefixes_program() {
        let command = HostCommand::new("zfs").args(["create", "tank/a1"]).privileged();
        assert_eq!(command.with_sudo().to_string(), "sudo zfs create tank/a1");
    }

    #[test]
    fn privileged_without_sudo_runs_directly() {
        let command = HostCommand::new("mkdir").arg("/x").privileged();
        assert_eq!(runner(false).effective(&command).to_string(), "mkdir /x");
    }

    #[cfg(unix)]
    #[test]
    fn dry_run_does_not_execute() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("marker");
        let command = HostCommand::new("touch").arg(target.display().to_string());
        runner(true).run(&command).unwrap();
        assert!(!target.exists());
        assert!(runner(true).is_dry_run());
    }

    #[cfg(unix)]
    #[test]
    fn run_executes_and_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("marker");
        runner(false)
            .run(&HostCommand::new("touch").arg(target.display().to_string()))
            .unwrap();
        assert!(target.exists());

        let err = runner(false).run(&HostCommand::new("false")).unwrap_err();
        assert!(err.to_string().contains("false"), "got: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn probe_runs_even_in_dry_run() {
        assert!(runner(true).probe(&HostCommand::new("true")).unwrap());
        assert!(!runner(true).probe(&HostCommand::new("false")).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn output_captures_stdout() {
        let out = runner(true)
            .output(&HostCommand::new("echo").arg("hello"))
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn missing_program_is_reported() {
        let err = runner(false)
            .probe(&HostCommand::new("lxops-no-such-program"))
            .unwrap_err();
        assert!(err.to_string().contains("not found on PATH"), "got: {err}");
    }
}
