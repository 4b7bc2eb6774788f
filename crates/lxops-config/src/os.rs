//! Guest OS capabilities.
//!
//! Each supported family is a small variant behind [`OsType`]. Debian and
//! Ubuntu share their package and user handling through [`DebianFamily`].

use std::fmt;

use lxops_common::error::{LxopsError, Result};

use crate::model::{OsSpec, User};

/// What provisioning needs to know about a guest OS.
pub trait OsType: fmt::Debug {
    /// Family name as written in config files.
    fn name(&self) -> &'static str;

    /// Whether accounts need a local password to be usable.
    fn need_passwords(&self) -> bool;

    /// Image reference to launch for `version`.
    fn image_name(&self, version: &str) -> String;

    /// Command line that installs `packages`, empty if there are none.
    fn install_packages_command(&self, packages: &[String]) -> Vec<String>;

    /// Command line that creates `user`.
    fn add_user_command(&self, user: &User) -> Vec<String>;
}

/// Resolves the capability object for an OS declaration.
///
/// # Errors
///
/// Returns an error if the OS name is empty or unknown.
pub fn os_type(spec: &OsSpec) -> Result<Box<dyn OsType>> {
    match spec.name.as_str() {
        "alpine" => Ok(Box::new(Alpine)),
        "debian" => Ok(Box::new(Debian)),
        "ubuntu" => Ok(Box::new(Ubuntu)),
        "" => Err(LxopsError::config("no OS declared")),
        other => Err(LxopsError::config(format!("unsupported OS: {other}"))),
    }
}

fn with_packages(mut command: Vec<String>, packages: &[String]) -> Vec<String> {
    if packages.is_empty() {
        return Vec::new();
    }
    command.extend(packages.iter().cloned());
    command
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Alpine Linux.
#[derive(Debug, Clone, Copy)]
pub struct Alpine;

impl OsType for Alpine {
    fn name(&self) -> &'static str {
        "alpine"
    }

    fn need_passwords(&self) -> bool {
        true
    }

    fn image_name(&self, version: &str) -> String {
        let version = if version.is_empty() { "edge" } else { version };
        format!("images:alpine/{version}")
    }

    fn install_packages_command(&self, packages: &[String]) -> Vec<String> {
        with_packages(words(&["apk", "add"]), packages)
    }

    fn add_user_command(&self, user: &User) -> Vec<String> {
        let mut command = words(&["adduser", "-D", "-s"]);
        command.push(user.shell.clone().unwrap_or_else(|| "/bin/ash".into()));
        if let Some(home) = &user.home {
            command.extend(["-h".to_string(), home.clone()]);
        }
        if let Some(uid) = user.uid {
            command.extend(["-u".to_string(), uid.to_string()]);
        }
        command.push(user.name.clone());
        command
    }
}

/// Behavior shared by Debian-derived distributions.
#[derive(Debug, Clone, Copy)]
pub struct DebianFamily;

impl DebianFamily {
    /// `apt-get install` command line.
    pub fn install_packages_command(self, packages: &[String]) -> Vec<String> {
        with_packages(words(&["apt-get", "install", "-y"]), packages)
    }

    /// `adduser` command line for a password-less account.
    pub fn add_user_command(self, user: &User) -> Vec<String> {
        let mut command = words(&["adduser", "--disabled-password", "--gecos", "", "--shell"]);
        command.push(user.shell.clone().unwrap_or_else(|| "/bin/bash".into()));
        if let Some(home) = &user.home {
            command.extend(["--home".to_string(), home.clone()]);
        }
        if let Some(uid) = user.uid {
            command.extend(["--uid".to_string(), uid.to_string()]);
        }
        command.push(user.name.clone());
        command
    }
}

/// Debian.
#[derive(Debug, Clone, Copy)]
pub struct Debian;

impl OsType for Debian {
    fn name(&self) -> &'static str {
        "debian"
    }

    fn need_passwords(&self) -> bool {
        false
    }

    fn image_name(&self, version: &str) -> String {
        if version.is_empty() {
            "images:debian".into()
        } else {
            format!("images:debian/{version}")
        }
    }

    fn install_packages_command(&self, packages: &[String]) -> Vec<String> {
        DebianFamily.install_packages_command(packages)
    }

    fn add_user_command(&self, user: &User) -> Vec<String> {
        DebianFamily.add_user_command(user)
    }
}

/// Ubuntu, launched from the official image remote.
#[derive(Debug, Clone, Copy)]
pub struct Ubuntu;

impl OsType for Ubuntu {
    fn name(&self) -> &'static str {
        "ubuntu"
    }

    fn need_passwords(&self) -> bool {
        false
    }

    fn image_name(&self, version: &str) -> String {
        let version = if version.is_empty() { "lts" } else { version };
        format!("ubuntu:{version}")
    }

    fn install_packages_command(&self, packages: &[String]) -> Vec<String> {
        DebianFamily.install_packages_command(packages)
    }

    fn add_user_command(&self, user: &User) -> Vec<String> {
        DebianFamily.add_user_command(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> User {
        User {
            name: name.into(),
            ..User::default()
        }
    }

    #[test]
    fn resolves_known_families() {
        for name in ["alpine", "debian", "ubuntu"] {
            let os = os_type(&OsSpec::new(name, "")).unwrap();
            assert_eq!(os.name(), name);
        }
    }

    #[test]
    fn rejects_unknown_and_empty() {
        assert!(os_type(&OsSpec::new("gentoo", "")).is_err());
        assert!(os_type(&OsSpec::default()).is_err());
    }

    #[test]
    fn image_names_differ_per_family() {
        assert_eq!(Alpine.image_name("3.18"), "images:alpine/3.18");
        assert_eq!(Debian.image_name("bookworm"), "images:debian/bookworm");
        assert_eq!(Ubuntu.image_name("22.04"), "ubuntu:22.04");
        assert_eq!(Ubuntu.image_name(""), "ubuntu:lts");
    }

    #[test]
    fn only_alpine_needs_passwords() {
        assert!(Alpine.need_passwords());
        assert!(!Debian.need_passwords());
        assert!(!Ubuntu.need_passwords());
    }

    #[test]
    fn install_command_is_empty_without_packages() {
        assert!(Alpine.install_packages_command(&[]).is_empty());
        assert!(Ubuntu.install_packages_command(&[]).is_empty());
    }

    #[test]
    fn install_command_lists_packages() {
        let packages = vec!["curl".to_string(), "git".to_string()];
        assert_eq!(
            Alpine.install_packages_command(&packages),
            vec!["apk", "add", "curl", "git"]
        );
        assert_eq!(
            Debian.install_packages_command(&packages),
            vec!["apt-get", "install", "-y", "curl", "git"]
        );
    }

    #[test]
    fn add_user_uses_family_defaults() {
        let alice = User {
            uid: Some(1000),
            ..user("alice")
        };
        assert_eq!(
            Alpine.add_user_command(&alice),
            vec!["adduser", "-D", "-s", "/bin/ash", "-u", "1000", "alice"]
        );
        assert_eq!(
            Ubuntu.add_user_command(&user("bob")),
            vec!["adduser", "--disabled-password", "--gecos", "", "--shell", "/bin/bash", "bob"]
        );
    }
}
