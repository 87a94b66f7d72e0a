//! KeePassXC backend: locating `keepassxc-cli` and fetching passwords.

pub mod protocol;

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::errors::{Result, VaultClientError};
use crate::process::Executor;
use protocol::{Exchange, Outcome};

/// Environment variable naming the backend executable explicitly.
pub const CLI_ENV: &str = "KC_CLI";

/// Environment variable overriding the protocol timeout, in seconds.
pub const TIMEOUT_ENV: &str = "KC_TIMEOUT";

/// Default time allowed for each wait in the unlock exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const BINARY: &str = "keepassxc-cli";
const FLATPAK: &str = "flatpak";
const FLATPAK_APP: &str = "org.keepassxc.KeePassXC";

/// How to invoke `keepassxc-cli`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// A binary invoked directly.
    Direct(PathBuf),
    /// `flatpak run --command=keepassxc-cli org.keepassxc.KeePassXC`.
    Flatpak(PathBuf),
}

impl Backend {
    /// Find the backend: `$KC_CLI`, then `keepassxc-cli` on `PATH`, then the
    /// KeePassXC flatpak.
    pub fn detect() -> Result<Self> {
        let explicit = std::env::var(CLI_ENV).ok().filter(|v| !v.is_empty());
        Self::detect_with(
            explicit.as_deref(),
            |name| which::which(name).ok(),
            flatpak_has_app,
        )
    }

    /// Detection with the environment lookups injected.
    pub fn detect_with(
        explicit: Option<&str>,
        lookup: impl Fn(&str) -> Option<PathBuf>,
        has_flatpak_app: impl Fn(&Path) -> bool,
    ) -> Result<Self> {
        if let Some(program) = explicit {
            let path = lookup(program).unwrap_or_else(|| PathBuf::from(program));
            debug!(backend = %path.display(), "using backend from {CLI_ENV}");
            return Ok(Backend::Direct(path));
        }

        if let Some(path) = lookup(BINARY) {
            debug!(backend = %path.display(), "found keepassxc-cli");
            return Ok(Backend::Direct(path));
        }

        if let Some(flatpak) = lookup(FLATPAK) {
            if has_flatpak_app(&flatpak) {
                debug!(app = FLATPAK_APP, "using keepassxc-cli from flatpak");
                return Ok(Backend::Flatpak(flatpak));
            }
        }

        Err(VaultClientError::BackendNotFound)
    }

    /// A fresh command with the invocation prefix applied.
    pub fn command(&self) -> Command {
        match self {
            Backend::Direct(path) => Command::new(path),
            Backend::Flatpak(flatpak) => {
                let mut cmd = Command::new(flatpak);
                cmd.args(["run", &format!("--command={BINARY}"), FLATPAK_APP]);
                cmd
            }
        }
    }

    /// Human-readable invocation prefix.
    pub fn describe(&self) -> String {
        crate::process::render(&self.command())
    }

    /// Ask the backend for its version; `None` in dry-run mode.
    pub fn version(&self, exec: &Executor) -> Result<Option<String>> {
        let mut cmd = self.command();
        cmd.arg("--version");
        let Some(output) = exec.output(&mut cmd)? else {
            return Ok(None);
        };
        if !output.status.success() {
            return Err(VaultClientError::BackendFailed(format!(
                "'{}' exited with {}",
                crate::process::render(&cmd),
                output.status
            )));
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }

    /// Unlock the database and return the password of entry `key`.
    ///
    /// Returns `None` in dry-run mode.
    pub fn fetch(
        &self,
        exec: &Executor,
        unlock: &Unlock,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<Zeroizing<String>>> {
        let mut cmd = self.command();
        cmd.arg("show").arg("-s").arg(&unlock.database).arg(key);

        let Some(child) = exec.spawn(&mut cmd)? else {
            return Ok(None);
        };

        info!(key, database = %unlock.database.display(), "fetching entry");
        let outcome = Exchange::start(child, timeout)?.run(&unlock.password)?;
        debug!(?outcome, "backend response classified");

        match outcome {
            Outcome::Found(secret) => Ok(Some(secret)),
            Outcome::NotFound => Err(VaultClientError::KeyNotFound(key.to_string())),
            Outcome::AuthenticationFailed => Err(VaultClientError::AuthenticationFailed),
            Outcome::Unrecognized => Err(VaultClientError::UnrecognizedResponse),
        }
    }
}

fn flatpak_has_app(flatpak: &Path) -> bool {
    Command::new(flatpak)
        .args(["info", FLATPAK_APP])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// External tools that are used when present.
const OPTIONAL_DEPENDENCIES: &[(&str, &str)] = &[(FLATPAK, "runs a sandboxed KeePassXC")];

/// Log which optional tools are installed.
pub fn check_optional_dependencies() {
    for (tool, purpose) in OPTIONAL_DEPENDENCIES {
        match which::which(tool) {
            Ok(path) => debug!(tool, path = %path.display(), "optional dependency found"),
            Err(_) => debug!(tool, purpose, "optional dependency not installed"),
        }
    }
}

/// Protocol timeout from `$KC_TIMEOUT`, falling back to the default.
pub fn timeout_from_env() -> Result<Duration> {
    parse_timeout(std::env::var(TIMEOUT_ENV).ok().as_deref())
}

/// Parse a timeout in whole seconds. Unset or blank means the default;
/// zero is rejected since every wait would expire at once.
pub fn parse_timeout(value: Option<&str>) -> Result<Duration> {
    let Some(text) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(DEFAULT_TIMEOUT);
    };
    match text.parse::<u64>() {
        Ok(0) => Err(VaultClientError::Usage(format!(
            "{TIMEOUT_ENV} must be at least 1 second"
        ))),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(VaultClientError::Usage(format!(
            "{TIMEOUT_ENV} must be a number of seconds, got '{text}'"
        ))),
    }
}

/// Everything needed to open the database.
pub struct Unlock {
    pub database: PathBuf,
    pub password: Zeroizing<String>,
}

/// Check that a database is configured and present, prompting for the
/// password on the terminal if none is configured.
pub fn ensure_settings(settings: &Settings) -> Result<Unlock> {
    ensure_settings_with(settings, prompt_database_password)
}

/// [`ensure_settings`] with the password prompt injected.
pub fn ensure_settings_with(
    settings: &Settings,
    prompt: impl FnOnce(&Path) -> Result<Zeroizing<String>>,
) -> Result<Unlock> {
    let database = settings
        .database_path()
        .cloned()
        .ok_or(VaultClientError::MissingDatabase)?;

    if !database.exists() {
        return Err(VaultClientError::DatabaseNotFound(database));
    }

    let password = match &settings.password {
        Some(p) => p.value.clone(),
        None => prompt(&database)?,
    };

    Ok(Unlock { database, password })
}

/// Prompt for the database password with echo disabled.
pub fn prompt_database_password(database: &Path) -> Result<Zeroizing<String>> {
    let pw = dialoguer::Password::new()
        .with_prompt(format!("Password for {}", database.display()))
        .allow_empty_password(true)
        .interact()
        .map_err(|e| VaultClientError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Overrides, Profile};
    use std::fs;
    use tempfile::TempDir;

    fn settings(db: Option<PathBuf>, pass: Option<&str>) -> Settings {
        let profile = Profile {
            name: String::new(),
            config_file: PathBuf::from("/cfg/conf.env"),
            loaded: false,
            database: db,
            password: pass.map(|p| Zeroizing::new(p.to_string())),
        };
        Settings::resolve(profile, "Ansible/admin", &Overrides::default(), &Overrides::default())
    }

    fn no_prompt(_: &Path) -> Result<Zeroizing<String>> {
        panic!("prompt should not be called")
    }

    #[test]
    fn detect_prefers_explicit_override() {
        let backend = Backend::detect_with(Some("/opt/kp/keepassxc-cli"), |_| None, |_| false).unwrap();
        assert_eq!(backend, Backend::Direct(PathBuf::from("/opt/kp/keepassxc-cli")));
    }

    #[test]
    fn detect_finds_binary_on_path() {
        let backend = Backend::detect_with(
            None,
            |name| (name == "keepassxc-cli").then(|| PathBuf::from("/usr/bin/keepassxc-cli")),
            |_| true,
        )
        .unwrap();
        assert_eq!(backend, Backend::Direct(PathBuf::from("/usr/bin/keepassxc-cli")));
    }

    #[test]
    fn detect_falls_back_to_flatpak() {
        let backend = Backend::detect_with(
            None,
            |name| (name == "flatpak").then(|| PathBuf::from("/usr/bin/flatpak")),
            |_| true,
        )
        .unwrap();
        assert_eq!(
            backend.describe(),
            "/usr/bin/flatpak run --command=keepassxc-cli org.keepassxc.KeePassXC"
        );
    }

    #[test]
    fn detect_fails_without_binary_or_flatpak_app() {
        let err = Backend::detect_with(
            None,
            |name| (name == "flatpak").then(|| PathBuf::from("/usr/bin/flatpak")),
            |_| false,
        )
        .unwrap_err();
        assert!(matches!(err, VaultClientError::BackendNotFound));
    }

    #[test]
    fn timeout_defaults_when_unset_or_blank() {
        assert_eq!(parse_timeout(None).unwrap(), DEFAULT_TIMEOUT);
        assert_eq!(parse_timeout(Some("  ")).unwrap(), DEFAULT_TIMEOUT);
        assert_eq!(parse_timeout(Some("5")).unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn zero_or_garbage_timeout_is_usage_error() {
        let err = parse_timeout(Some("0")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("at least 1 second"));
        assert_eq!(parse_timeout(Some("soon")).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn missing_database_setting_fails() {
        let err = ensure_settings_with(&settings(None, Some("pw")), no_prompt)
            .err()
            .unwrap();
        assert!(matches!(err, VaultClientError::MissingDatabase));
    }

    #[test]
    fn absent_database_file_fails() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("missing.kdbx");
        let err = ensure_settings_with(&settings(Some(db), Some("pw")), no_prompt)
            .err()
            .unwrap();
        assert!(matches!(err, VaultClientError::DatabaseNotFound(_)));
    }

    #[test]
    fn configured_password_skips_prompt() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("ops.kdbx");
        fs::write(&db, b"kdbx").unwrap();

        let unlock = ensure_settings_with(&settings(Some(db.clone()), Some("pw")), no_prompt).unwrap();
        assert_eq!(unlock.database, db);
        assert_eq!(unlock.password.as_str(), "pw");
    }

    #[test]
    fn missing_password_prompts() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("ops.kdbx");
        fs::write(&db, b"kdbx").unwrap();

        let unlock = ensure_settings_with(&settings(Some(db), None), |_| {
            Ok(Zeroizing::new("typed".to_string()))
        })
        .unwrap();
        assert_eq!(unlock.password.as_str(), "typed");
    }

    #[test]
    fn dry_run_fetch_spawns_nothing() {
        let backend = Backend::Direct(PathBuf::from("definitely-not-a-real-program-xyz"));
        let unlock = Unlock {
            database: PathBuf::from("/db.kdbx"),
            password: Zeroizing::new("pw".into()),
        };
        let result = backend
            .fetch(&Executor::new(true), &unlock, "k", DEFAULT_TIMEOUT)
            .unwrap();
        assert!(result.is_none());
    }
}
