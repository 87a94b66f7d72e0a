//! Command implementations, one module per command.

pub mod completions;
pub mod get;
pub mod help;
pub mod info;
pub mod profile;
pub mod query;
pub mod shell;

use std::io::Write;

use clap::ArgMatches;
use tracing::info;

use crate::backend;
use crate::cli::dispatch::{OptionSpec, ValueKind};
use crate::cli::RunContext;
use crate::errors::Result;
use crate::query::Query;

/// `-n, --no-newline`, shared by the commands that print a password.
pub const NO_NEWLINE_OPTION: OptionSpec = OptionSpec {
    id: "no-newline",
    short: Some('n'),
    long: "no-newline",
    value: ValueKind::Flag,
    description: "Do not print a trailing newline after the password",
};

/// Values of a multi-word positional, empty when absent.
pub(crate) fn words(args: &ArgMatches, id: &str) -> Vec<String> {
    args.get_many::<String>(id)
        .map(|w| w.cloned().collect())
        .unwrap_or_default()
}

/// Build the query from positionals, or from `--profile`/`--key` when no
/// positionals were given.
///
/// An explicit `--profile` disables profile inference: the positionals are
/// then the key as a whole.
pub(crate) fn query_from(
    ctx: &RunContext<'_>,
    positionals: &[String],
    infer: impl FnOnce(&RunContext<'_>, &[String]) -> Result<Query>,
) -> Result<Query> {
    let globals = ctx.globals;

    if positionals.is_empty() {
        if let Some(query) = globals.flag_query() {
            return query;
        }
    }

    match &globals.profile {
        Some(profile) => Query::new(profile.clone(), positionals.join(" ")),
        None => infer(ctx, positionals),
    }
}

/// Resolve `query`, fetch its password and print it to stdout.
pub(crate) fn fetch_and_print(ctx: &RunContext<'_>, query: &Query, no_newline: bool) -> Result<()> {
    let settings = ctx.settings_for(query)?;
    let backend = ctx.backend()?;
    let unlock = backend::ensure_settings(&settings)?;

    let Some(secret) = backend.fetch(&ctx.executor, &unlock, &settings.key, ctx.timeout()?)? else {
        info!(query = %query.reference(), "dry-run: no password fetched");
        return Ok(());
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(secret.as_bytes())?;
    if !no_newline {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
