//! Profile files: where they live and how they are loaded.
//!
//! The default profile lives at `<config_dir>/conf.env`; a named profile
//! `john` lives at `<config_dir>/conf.john.env`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zeroize::Zeroizing;

use super::env_file::parse_profile;
use crate::errors::{Result, VaultClientError};

/// Directory name under the user's config home.
pub const APP_DIR: &str = "vault-keepass-client";

/// Environment variable that overrides the config directory.
pub const CONFIG_DIR_ENV: &str = "KC_CONFIG_DIR";

const FILE_PREFIX: &str = "conf";
const FILE_SUFFIX: &str = ".env";

/// A profile as read from disk.
#[derive(Clone)]
pub struct Profile {
    /// Profile name; empty for the default profile.
    pub name: String,
    /// File the profile was (or would have been) loaded from.
    pub config_file: PathBuf,
    /// Whether `config_file` existed and was read.
    pub loaded: bool,
    pub database: Option<PathBuf>,
    pub password: Option<Zeroizing<String>>,
}

impl Profile {
    /// Display name, `default` for the unnamed profile.
    pub fn display_name(&self) -> &str {
        display_name(&self.name)
    }
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("config_file", &self.config_file)
            .field("loaded", &self.loaded)
            .field("database", &self.database)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// `default` for the empty name, the name itself otherwise.
pub fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "default"
    } else {
        name
    }
}

/// Resolve the configuration directory.
///
/// Order: `$KC_CONFIG_DIR`, `$XDG_CONFIG_HOME/vault-keepass-client`,
/// `$HOME/.config/vault-keepass-client`.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = non_empty_env(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = non_empty_env("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join(APP_DIR));
    }
    let home = non_empty_env("HOME")
        .or_else(|| non_empty_env("USERPROFILE"))
        .ok_or(VaultClientError::ConfigDirUnknown)?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Path of the file backing profile `name`.
///
/// Example: `/home/me/.config/vault-keepass-client/conf.john.env`
pub fn profile_path(config_dir: &Path, name: &str) -> PathBuf {
    if name.is_empty() {
        config_dir.join(format!("{FILE_PREFIX}{FILE_SUFFIX}"))
    } else {
        config_dir.join(format!("{FILE_PREFIX}.{name}{FILE_SUFFIX}"))
    }
}

/// Whether a profile file exists for `name`.
///
/// Names that could never be valid profiles (path separators, `__`, ...)
/// are reported as absent without touching the filesystem.
pub fn profile_exists(config_dir: &Path, name: &str) -> bool {
    validate_profile_name(name).is_ok() && profile_path(config_dir, name).is_file()
}

/// Validate that a profile name maps to a single file in the config dir.
///
/// Allowed: ASCII letters, digits, `-`, `_` and `.`; must not start with
/// `.` or `-`, must not contain the `__` query separator, max 64 chars.
pub fn validate_profile_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VaultClientError::Usage(
            "profile name cannot be empty".into(),
        ));
    }

    if name.len() > 64 {
        return Err(VaultClientError::Usage(
            "profile name cannot exceed 64 characters".into(),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(VaultClientError::Usage(format!(
            "profile name '{name}' is invalid — only letters, digits, '-', '_' and '.' are allowed"
        )));
    }

    if name.starts_with('.') || name.starts_with('-') {
        return Err(VaultClientError::Usage(format!(
            "profile name '{name}' cannot start with '.' or '-'"
        )));
    }

    if name.contains("__") {
        return Err(VaultClientError::Usage(format!(
            "profile name '{name}' cannot contain '__'"
        )));
    }

    Ok(())
}

/// Load profile `name` from `config_dir`.
///
/// The default profile (empty name) is optional: a missing file yields an
/// empty profile. A named profile must exist.
pub fn load_profile(config_dir: &Path, name: &str) -> Result<Profile> {
    if !name.is_empty() {
        validate_profile_name(name)?;
    }

    let path = profile_path(config_dir, name);
    let mut profile = Profile {
        name: name.to_string(),
        config_file: path.clone(),
        loaded: false,
        database: None,
        password: None,
    };

    if !path.is_file() {
        if name.is_empty() {
            debug!(file = %path.display(), "no default profile, skipping");
            return Ok(profile);
        }
        return Err(VaultClientError::MissingProfile {
            name: name.to_string(),
            path,
        });
    }

    let content = fs::read_to_string(&path)?;
    let values = parse_profile(&content).map_err(|e| VaultClientError::InvalidProfile {
        path: path.clone(),
        line: e.line,
        reason: e.reason,
    })?;
    profile.database = values.database.map(|db| expand_home(&db));
    profile.password = values.password;
    profile.loaded = true;

    info!(
        profile = profile.display_name(),
        file = %path.display(),
        "loaded profile"
    );
    Ok(profile)
}

/// A profile file found in the config directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub name: String,
    pub path: PathBuf,
}

/// List all profile files in `config_dir`, sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_profiles(config_dir: &Path) -> Result<Vec<ProfileEntry>> {
    let mut profiles = Vec::new();

    if !config_dir.is_dir() {
        return Ok(profiles);
    }

    for entry in fs::read_dir(config_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = profile_name_from_file(&file_name.to_string_lossy()) else {
            continue;
        };
        profiles.push(ProfileEntry { name, path });
    }

    profiles.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(profiles)
}

/// Inverse of [`profile_path`] for a bare file name.
fn profile_name_from_file(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(FILE_SUFFIX)?;
    if stem == FILE_PREFIX {
        return Some(String::new());
    }
    let name = stem.strip_prefix(FILE_PREFIX)?.strip_prefix('.')?;
    validate_profile_name(name).ok()?;
    Some(name.to_string())
}

/// Expand a leading `~/` the way a shell sourcing the file would.
fn expand_home(value: &str) -> PathBuf {
    match (value.strip_prefix("~/"), non_empty_env("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(value),
    }
}
