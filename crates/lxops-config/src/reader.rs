//! Include/merge resolution of config files.
//!
//! A root file and its transitive includes are merged depth-first,
//! include-first, into one effective [`Config`]:
//!
//! 1. A file already visited in this resolution is skipped with a warning,
//!    so diamond-shaped include graphs merge each file once.
//! 2. Singleton fields (OS, patterns, project, properties) are first-wins.
//!    OS names and versions must agree whenever both sides set them.
//! 3. The fragment's includes are merged before its own collections.
//! 4. Filesystems and devices are last-writer-wins per key; lists are
//!    appended; packages and passwords are de-duplicated at the end.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use lxops_common::constants::CONFIG_MARKER;
use lxops_common::error::{LxopsError, Result};

use crate::model::Config;
use crate::pattern::Pattern;
use crate::validator;

/// Canonical paths of files already merged in one resolution.
pub type Visited = BTreeSet<PathBuf>;

/// Reads config files and resolves their includes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigReader {
    verbose: bool,
}

impl ConfigReader {
    /// Creates a reader.
    #[must_use]
    pub const fn new() -> Self {
        Self { verbose: false }
    }

    /// Warn when an included file overrides a filesystem or device id.
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Reads `path` and everything it includes into one validated config.
    ///
    /// # Errors
    ///
    /// Returns an error if any file is unreadable or malformed, OS
    /// declarations conflict, or the merged config fails validation.
    pub fn read(&self, path: &Path) -> Result<Config> {
        self.read_all(std::slice::from_ref(&path.to_path_buf()))
    }

    /// Reads several root files, in order, into one validated config.
    ///
    /// # Errors
    ///
    /// See [`ConfigReader::read`].
    pub fn read_all(&self, paths: &[PathBuf]) -> Result<Config> {
        let mut config = Config::default();
        let mut visited = Visited::new();
        for path in paths {
            (config, visited) = self.merge_file(config, path, visited)?;
        }
        let config = finish(config);
        validator::validate(&config)?;
        Ok(config)
    }

    /// Merges `path` and its includes into `acc`.
    ///
    /// Returns the new accumulator and the updated visited set; files in
    /// `visited` are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, or if OS
    /// declarations conflict.
    pub fn merge_file(&self, acc: Config, path: &Path, visited: Visited) -> Result<(Config, Visited)> {
        let key = std::fs::canonicalize(path).map_err(|e| LxopsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if visited.contains(&key) {
            tracing::warn!(path = %path.display(), "config already included, skipping");
            return Ok((acc, visited));
        }
        let mut visited = visited;
        let _ = visited.insert(key);

        tracing::debug!(path = %path.display(), "reading config");
        let fragment = read_fragment(path)?;
        let mut acc = merge_singletons(acc, &fragment)?;
        for include in &fragment.include {
            (acc, visited) = self.merge_file(acc, include, visited)?;
        }
        Ok((self.merge_collections(acc, fragment, path), visited))
    }

    fn merge_collections(&self, mut acc: Config, fragment: Config, path: &Path) -> Config {
        for (id, fs) in fragment.filesystems {
            if acc.filesystems.insert(id.clone(), fs).is_some() && self.verbose {
                tracing::warn!(path = %path.display(), id = %id, "filesystem overridden");
            }
        }
        for (name, device) in fragment.devices {
            if acc.devices.insert(name.clone(), device).is_some() && self.verbose {
                tracing::warn!(path = %path.display(), device = %name, "device overridden");
            }
        }
        acc.profiles.extend(fragment.profiles);
        acc.packages.extend(fragment.packages);
        acc.users.extend(fragment.users);
        acc.files.extend(fragment.files);
        acc.pre_scripts.extend(fragment.pre_scripts);
        acc.scripts.extend(fragment.scripts);
        acc.passwords.extend(fragment.passwords);
        acc.required_files.extend(fragment.required_files);
        acc
    }
}

/// Parses config text, checking the marker line.
///
/// `path` is only used in error messages.
///
/// # Errors
///
/// Returns an error if the first line is not the config marker or the
/// YAML does not describe a config.
pub fn parse_config(text: &str, path: &Path) -> Result<Config> {
    let first = text.lines().next().unwrap_or_default().trim_end();
    if first != CONFIG_MARKER {
        return Err(LxopsError::config(format!(
            "{}: first line must be {CONFIG_MARKER}",
            path.display()
        )));
    }
    serde_yaml::from_str(text).map_err(|e| LxopsError::Yaml {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Reads one file without resolving its includes. Relative paths inside
/// it are resolved against its directory.
fn read_fragment(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path).map_err(|e| LxopsError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut config = parse_config(&text, path)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    relativize(&mut config, base, dirs::home_dir().as_deref());
    Ok(config)
}

/// Makes the paths of a fragment absolute. A leading `~` means `home`.
fn relativize(config: &mut Config, base: &Path, home: Option<&Path>) {
    let join = |p: &mut PathBuf| {
        let under_home = home.and_then(|home| Some(home.join(p.strip_prefix("~").ok()?)));
        if let Some(expanded) = under_home {
            *p = expanded;
        } else if p.is_relative() {
            *p = base.join(&*p);
        }
    };
    config.include.iter_mut().for_each(join);
    config.required_files.iter_mut().for_each(join);
    if let Some(source) = config.source_config.as_mut() {
        join(source);
    }
    for file in &mut config.files {
        if let Some(source) = file.source.as_mut() {
            join(source);
        }
    }
    for script in config.pre_scripts.iter_mut().chain(config.scripts.iter_mut()) {
        if let Some(file) = script.file.as_mut() {
            join(file);
        }
    }
}

fn first_pattern(acc: Pattern, fragment: &Pattern) -> Pattern {
    if acc.is_empty() { fragment.clone() } else { acc }
}

fn merge_singletons(mut acc: Config, fragment: &Config) -> Result<Config> {
    acc.os = acc.os.merge(&fragment.os)?;
    if acc.project.is_empty() {
        acc.project.clone_from(&fragment.project);
    }
    acc.profile = first_pattern(acc.profile, &fragment.profile);
    acc.origin = first_pattern(acc.origin, &fragment.origin);
    acc.device_template = first_pattern(acc.device_template, &fragment.device_template);
    acc.device_origin = first_pattern(acc.device_origin, &fragment.device_origin);
    if acc.source_config.is_none() {
        acc.source_config.clone_from(&fragment.source_config);
    }
    for (key, value) in &fragment.properties {
        let _ = acc
            .properties
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    Ok(acc)
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn finish(mut config: Config) -> Config {
    config.include.clear();
    config.packages = dedup_preserving_order(config.packages);
    config.passwords = dedup_preserving_order(config.passwords);
    config
}
