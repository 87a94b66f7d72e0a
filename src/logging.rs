//! Diagnostic logging.
//!
//! Everything goes to stderr through `tracing`; stdout is reserved for the
//! secret itself or generated shell code, since callers capture it.

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{Result, VaultClientError};

/// How chatty diagnostics should be, selected with `--verbose[=LEVEL]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    /// Level used when `--verbose` is given without a value.
    pub const BARE_FLAG: Verbosity = Verbosity::Info;

    /// Parse a level given either as a number (`0`..=`4`) or a name.
    pub fn parse(text: &str) -> Result<Self> {
        text.parse()
    }

    fn as_directive(self) -> &'static str {
        match self {
            Verbosity::Error => "error",
            Verbosity::Warn => "warn",
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
            Verbosity::Trace => "trace",
        }
    }
}

impl FromStr for Verbosity {
    type Err = VaultClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "0" | "error" => Ok(Verbosity::Error),
            "1" | "warn" | "warning" => Ok(Verbosity::Warn),
            "2" | "info" => Ok(Verbosity::Info),
            "3" | "debug" => Ok(Verbosity::Debug),
            "4" | "trace" => Ok(Verbosity::Trace),
            other => Err(VaultClientError::Usage(format!(
                "invalid verbosity '{other}' — use 0-4 or error, warn, info, debug, trace"
            ))),
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the flag-derived level. Calling this twice is a
/// no-op, which keeps tests that drive the orchestrator in-process happy.
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.as_directive()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_level(true)
                .with_target(false)
                .without_time(),
        )
        .try_init();
}
