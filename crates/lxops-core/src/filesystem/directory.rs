//! Plain host directories.

use std::path::Path;

use lxops_common::error::Result;

use crate::runner::{CommandRunner, HostCommand};

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Returns `true` if `path` is an existing directory. Always queries the host.
///
/// # Errors
///
/// Returns an error if `test` cannot be started.
pub fn dir_exists(runner: &dyn CommandRunner, path: &Path) -> Result<bool> {
    let exists = runner.probe(&HostCommand::new("test").args(["-d".to_string(), display(path)]))?;
    tracing::debug!(path = %path.display(), exists, "directory probe");
    Ok(exists)
}

/// Creates `path` and any missing parents.
///
/// # Errors
///
/// Returns an error if `mkdir` fails.
pub fn create_dir(runner: &dyn CommandRunner, path: &Path) -> Result<()> {
    tracing::info!(path = %path.display(), "creating directory");
    runner.run(
        &HostCommand::new("mkdir")
            .args(["-p".to_string(), display(path)])
            .privileged(),
    )
}

/// Recursively sets the owner of `path`.
///
/// # Errors
///
/// Returns an error if `chown` fails.
pub fn chown_recursive(runner: &dyn CommandRunner, path: &Path, uid: u32, gid: u32) -> Result<()> {
    runner.run(
        &HostCommand::new("chown")
            .args(["-R".to_string(), format!("{uid}:{gid}"), display(path)])
            .privileged(),
    )
}

/// Copies the contents of `from` into the existing directory `to`,
/// preserving ownership and modes.
///
/// # Errors
///
/// Returns an error if `cp` fails.
pub fn copy_contents(runner: &dyn CommandRunner, from: &Path, to: &Path) -> Result<()> {
    tracing::info!(from = %from.display(), to = %to.display(), "copying template directory");
    runner.run(
        &HostCommand::new("cp")
            .args([
                "-a".to_string(),
                format!("{}/.", from.display()),
                display(to),
            ])
            .privileged(),
    )
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<String>>);

    impl CommandRunner for Recorder {
        fn run(&self, command: &HostCommand) -> Result<()> {
            self.0.borrow_mut().push(command.to_string());
            Ok(())
        }

        fn probe(&self, _command: &HostCommand) -> Result<bool> {
            Ok(false)
        }

        fn output(&self, _command: &HostCommand) -> Result<String> {
            Ok(String::new())
        }

        fn is_dry_run(&self) -> bool {
            true
        }
    }

    #[test]
    fn commands_are_privileged_and_well_formed() {
        let recorder = Recorder::default();
        create_dir(&recorder, Path::new("/tank/a1/etc")).unwrap();
        chown_recursive(&recorder, Path::new("/tank/a1/etc"), 1_000_000, 1_000_000).unwrap();
        copy_contents(&recorder, Path::new("/tank/t/etc"), Path::new("/tank/a1/etc")).unwrap();
        assert_eq!(
            recorder.0.into_inner(),
            vec![
                "mkdir -p /tank/a1/etc",
                "chown -R 1000000:1000000 /tank/a1/etc",
                "cp -a /tank/t/etc/. /tank/a1/etc",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn dir_exists_checks_host() {
        use lxops_common::config::ToolConfig;

        use crate::runner::ProcessRunner;

        let runner = ProcessRunner::new(&ToolConfig {
            dry_run: true,
            ..ToolConfig::default()
        })
        .without_sudo();
        let dir = tempfile::tempdir().unwrap();
        assert!(dir_exists(&runner, dir.path()).unwrap());
        assert!(!dir_exists(&runner, &dir.path().join("missing")).unwrap());
    }
}
