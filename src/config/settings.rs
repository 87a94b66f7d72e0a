use std::path::PathBuf;

use serde::Serialize;
use zeroize::Zeroizing;

use super::env_file::{KC_DB, KC_PASS};
use super::profile::Profile;

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// An explicit command-line flag (`--db`, `--pass`).
    Flag,
    /// The profile's config file.
    Profile,
    /// The process environment (`KC_DB`, `KC_PASS`).
    Environment,
}

/// A value together with its provenance.
#[derive(Clone)]
pub struct Sourced<T> {
    pub value: T,
    pub source: Source,
}

/// Database settings supplied outside a profile file.
#[derive(Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub password: Option<Zeroizing<String>>,
}

impl Overrides {
    /// Read `KC_DB` / `KC_PASS` from the process environment.
    pub fn from_env() -> Self {
        let get = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            database: get(KC_DB).map(PathBuf::from),
            password: get(KC_PASS).map(Zeroizing::new),
        }
    }
}

/// The resolved query context: one profile's database settings merged with
/// flags and environment, plus the key being looked up.
///
/// Built once per invocation and never mutated afterwards.
/// Precedence per field: flag, then profile file, then environment.
#[derive(Clone)]
pub struct Settings {
    pub profile: Profile,
    pub key: String,
    pub database: Option<Sourced<PathBuf>>,
    pub password: Option<Sourced<Zeroizing<String>>>,
}

impl Settings {
    pub fn resolve(profile: Profile, key: &str, flags: &Overrides, env: &Overrides) -> Self {
        let database = pick(
            flags.database.clone(),
            profile.database.clone(),
            env.database.clone(),
        );
        let password = pick(
            flags.password.clone(),
            profile.password.clone(),
            env.password.clone(),
        );

        Self {
            profile,
            key: key.to_string(),
            database,
            password,
        }
    }

    pub fn database_path(&self) -> Option<&PathBuf> {
        self.database.as_ref().map(|d| &d.value)
    }
}

fn pick<T>(flag: Option<T>, profile: Option<T>, env: Option<T>) -> Option<Sourced<T>> {
    flag.map(|value| Sourced {
        value,
        source: Source::Flag,
    })
    .or_else(|| {
        profile.map(|value| Sourced {
            value,
            source: Source::Profile,
        })
    })
    .or_else(|| {
        env.map(|value| Sourced {
            value,
            source: Source::Environment,
        })
    })
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("profile", &self.profile.name)
            .field("key", &self.key)
            .field("database", &self.database.as_ref().map(|d| (&d.value, d.source)))
            .field("password", &self.password.as_ref().map(|p| p.source))
            .finish()
    }
}
