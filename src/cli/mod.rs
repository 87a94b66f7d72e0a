//! CLI module — global options, the run context, and the orchestrator that
//! routes an invocation to a command.

pub mod commands;
pub mod dispatch;
pub mod output;

use std::cell::OnceCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ArgMatches;
use tracing::debug;
use zeroize::Zeroizing;

use crate::backend::{self, Backend};
use crate::config::{self, Overrides, Settings};
use crate::errors::{Result, VaultClientError};
use crate::logging::{self, Verbosity};
use crate::process::{self, Executor};
use crate::query::Query;
use dispatch::{CommandSpec, OptionSpec, Positional, Registry, ValueKind, BIN_NAME, HELP_OPTION};

/// Crate version, shown by `--version` and the help footer.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Top-level command: global options plus `COMMAND [ARGS]...`.
pub static ROOT: CommandSpec = CommandSpec {
    name: "",
    usage: "[OPTIONS] [COMMAND] [ARGS]...",
    about: "Look up ansible-vault passwords in a KeePassXC database.",
    options: &[
        OptionSpec {
            id: "vault-id",
            short: None,
            long: "vault-id",
            value: ValueKind::Required("ID"),
            description: "Vault identity [PROFILE__]KEY passed by ansible-vault; runs `query`",
        },
        OptionSpec {
            id: "profile",
            short: Some('p'),
            long: "profile",
            value: ValueKind::Required("NAME"),
            description: "Profile to load (default: conf.env)",
        },
        OptionSpec {
            id: "key",
            short: Some('k'),
            long: "key",
            value: ValueKind::Required("KEY"),
            description: "Entry path inside the database",
        },
        OptionSpec {
            id: "db",
            short: None,
            long: "db",
            value: ValueKind::Required("PATH"),
            description: "Database file, overrides KC_DB",
        },
        OptionSpec {
            id: "pass",
            short: None,
            long: "pass",
            value: ValueKind::Required("PASSWORD"),
            description: "Database password, overrides KC_PASS (prompted when unset)",
        },
        OptionSpec {
            id: "dry-run",
            short: Some('n'),
            long: "dry-run",
            value: ValueKind::Flag,
            description: "Log backend commands instead of running them",
        },
        OptionSpec {
            id: "verbose",
            short: Some('v'),
            long: "verbose",
            value: ValueKind::Optional("LEVEL"),
            description: "Log to stderr: 0-4 or error, warn, info, debug, trace (bare: info)",
        },
        HELP_OPTION,
        OptionSpec {
            id: "version",
            short: Some('V'),
            long: "version",
            value: ValueKind::Flag,
            description: "Print version",
        },
    ],
    positionals: &[Positional {
        id: "command",
        metavar: "COMMAND [ARGS]...",
        required: false,
        multiple: true,
        description: "Command to run (default: help, or query with --vault-id)",
    }],
};

/// Parsed top-level flags. Built once, read-only afterwards.
#[derive(Default)]
pub struct GlobalOptions {
    pub vault_id: Option<String>,
    pub profile: Option<String>,
    pub key: Option<String>,
    pub db: Option<PathBuf>,
    pub pass: Option<Zeroizing<String>>,
    pub verbosity: Verbosity,
    pub dry_run: bool,
    pub help: bool,
    pub version: bool,
    /// Command name followed by its arguments.
    pub command: Vec<String>,
}

impl GlobalOptions {
    pub fn from_matches(m: &ArgMatches) -> Result<Self> {
        let text = |id: &str| m.get_one::<String>(id).cloned();

        let verbosity = match m.get_one::<String>("verbose").map(String::as_str) {
            None => Verbosity::default(),
            Some("") => Verbosity::BARE_FLAG,
            Some(level) => Verbosity::parse(level)?,
        };

        Ok(Self {
            vault_id: text("vault-id"),
            profile: text("profile").filter(|p| !p.is_empty()),
            key: text("key"),
            db: text("db").map(PathBuf::from),
            pass: text("pass").map(Zeroizing::new),
            verbosity,
            dry_run: m.get_flag("dry-run"),
            help: m.get_flag("help"),
            version: m.get_flag("version"),
            command: m
                .get_many::<String>("command")
                .map(|words| words.cloned().collect())
                .unwrap_or_default(),
        })
    }

    /// Invoked by ansible-vault as a vault-id client script.
    pub fn vault_mode(&self) -> bool {
        self.vault_id.is_some()
    }

    /// Database settings given as flags.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            database: self.db.clone(),
            password: self.pass.clone(),
        }
    }

    /// Query assembled from `--profile` / `--key`, if a key was given.
    pub fn flag_query(&self) -> Option<Result<Query>> {
        self.key
            .as_ref()
            .map(|key| Query::new(self.profile.clone().unwrap_or_default(), key.clone()))
    }
}

impl std::fmt::Debug for GlobalOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalOptions")
            .field("vault_id", &self.vault_id)
            .field("profile", &self.profile)
            .field("key", &self.key)
            .field("db", &self.db)
            .field("pass", &self.pass.as_ref().map(|_| "<redacted>"))
            .field("verbosity", &self.verbosity)
            .field("dry_run", &self.dry_run)
            .field("command", &self.command)
            .finish()
    }
}

/// Everything a command needs, assembled once by the orchestrator.
pub struct RunContext<'a> {
    pub globals: &'a GlobalOptions,
    pub registry: &'a Registry,
    /// `None` when no config directory could be determined; only commands
    /// that read profiles fail on that.
    config_dir: Option<PathBuf>,
    pub executor: Executor,
    /// `KC_DB` / `KC_PASS` from the process environment.
    pub env: Overrides,
    backend: OnceCell<Backend>,
}

impl<'a> RunContext<'a> {
    pub fn new(globals: &'a GlobalOptions, registry: &'a Registry, config_dir: Option<PathBuf>) -> Self {
        Self {
            globals,
            registry,
            config_dir,
            executor: Executor::new(globals.dry_run),
            env: Overrides::from_env(),
            backend: OnceCell::new(),
        }
    }

    /// The profile directory.
    pub fn config_dir(&self) -> Result<&Path> {
        self.config_dir
            .as_deref()
            .ok_or(VaultClientError::ConfigDirUnknown)
    }

    /// Backend protocol timeout, read when a command first needs it.
    pub fn timeout(&self) -> Result<Duration> {
        backend::timeout_from_env()
    }

    /// The backend, detected on first use.
    pub fn backend(&self) -> Result<&Backend> {
        if let Some(backend) = self.backend.get() {
            return Ok(backend);
        }
        let detected = Backend::detect()?;
        Ok(self.backend.get_or_init(|| detected))
    }

    pub fn profile_exists(&self, name: &str) -> bool {
        self.config_dir()
            .is_ok_and(|dir| config::profile_exists(dir, name))
    }

    /// Load the query's profile and merge it with flags and environment.
    pub fn settings_for(&self, query: &Query) -> Result<Settings> {
        let profile = config::load_profile(self.config_dir()?, &query.profile)?;
        let settings = Settings::resolve(profile, &query.key, &self.globals.overrides(), &self.env);
        debug!(?settings, "resolved settings");
        Ok(settings)
    }
}

/// All commands, in help order.
pub fn build_registry(config_dir: Option<&Path>) -> Registry {
    use commands::{completions, get, help, info, profile, query, shell};

    let mut registry = Registry::new(&ROOT);
    registry.register(Box::new(get::Get));
    registry.register(Box::new(query::QueryCommand));
    registry.register(Box::new(shell::Shell));
    registry.register(Box::new(info::Info));
    registry.group(&profile::PROFILE);
    registry.register(Box::new(profile::List));
    registry.register(Box::new(profile::PathCommand));
    registry.register(Box::new(completions::Completions));
    registry.register(Box::new(help::Help));

    let config_dir = config_dir
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());
    registry.with_footer(vec![
        ("Config dir", config_dir),
        ("Author", env!("CARGO_PKG_AUTHORS").replace(':', ", ")),
        ("Version", VERSION.to_string()),
    ])
}

/// Decide which command runs and with which arguments.
///
/// With `--vault-id` the command is `query` and the vault-id is its only
/// argument; otherwise an empty command line shows help.
pub fn route(globals: &GlobalOptions) -> Result<(String, Vec<String>)> {
    let (first, rest) = match globals.command.split_first() {
        Some((first, rest)) => (Some(first.as_str()), rest.to_vec()),
        None => (None, Vec::new()),
    };

    let Some(vault_id) = &globals.vault_id else {
        return Ok(match first {
            Some(name) => (name.to_string(), rest),
            None => ("help".to_string(), Vec::new()),
        });
    };

    if vault_id.trim().is_empty() {
        return Err(VaultClientError::VaultIdMisuse("the vault-id is empty".into()));
    }

    match first {
        None => Ok(("query".to_string(), vec![vault_id.clone()])),
        Some("query") if rest.is_empty() => Ok(("query".to_string(), vec![vault_id.clone()])),
        Some("query") => Err(VaultClientError::VaultIdMisuse(
            "the vault-id already names the query; drop the QUERY argument".into(),
        )),
        Some(other) => Err(VaultClientError::VaultIdMisuse(format!(
            "--vault-id only works with `query`, not `{other}`"
        ))),
    }
}

/// Entry point: parse, route and dispatch one invocation.
///
/// `argv` includes the program name.
pub fn run<I>(argv: I) -> Result<()>
where
    I: IntoIterator<Item = String>,
{
    process::harden();

    let args: Vec<String> = argv.into_iter().skip(1).collect();
    let matches = ROOT.parse(args.as_slice())?;
    let globals = GlobalOptions::from_matches(&matches)?;
    logging::init(globals.verbosity);
    debug!(?globals, "parsed global options");
    if globals.pass.is_some() {
        output::warning("--pass on the command line may show up in shell history and process listings.");
    }

    let config_dir = config::config_dir()
        .map_err(|e| debug!(error = %e, "no config directory"))
        .ok();
    let registry = build_registry(config_dir.as_deref());

    if globals.help {
        print!("{}", registry.render_help(ROOT.name)?);
        return Ok(());
    }
    if globals.version {
        println!("{BIN_NAME} {VERSION}");
        return Ok(());
    }

    let (name, rest) = route(&globals)?;
    backend::check_optional_dependencies();

    let ctx = RunContext::new(&globals, &registry, config_dir);
    registry.dispatch(&ctx, "", &name, &rest)
}
