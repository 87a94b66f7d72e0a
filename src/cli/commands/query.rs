//! `query [PROFILE__]KEY` — print a password named by a query reference.
//!
//! This is what ansible-vault ends up running through `--vault-id`.

use clap::ArgMatches;
use tracing::debug;

use super::{fetch_and_print, query_from, words, NO_NEWLINE_OPTION};
use crate::cli::dispatch::{CommandSpec, Handler, Positional, HELP_OPTION};
use crate::cli::RunContext;
use crate::errors::Result;
use crate::query::parse_query;

pub static QUERY: CommandSpec = CommandSpec {
    name: "query",
    usage: "query [OPTIONS] [PROFILE__]KEY",
    about: "Print the password named by a [PROFILE__]KEY reference",
    options: &[NO_NEWLINE_OPTION, HELP_OPTION],
    positionals: &[Positional {
        id: "query",
        metavar: "[PROFILE__]KEY",
        required: false,
        multiple: true,
        description: "Query reference; the prefix is a profile only if its config file exists",
    }],
};

pub struct QueryCommand;

impl Handler for QueryCommand {
    fn spec(&self) -> &'static CommandSpec {
        &QUERY
    }

    fn execute(&self, ctx: &RunContext<'_>, args: &ArgMatches) -> Result<()> {
        if ctx.globals.vault_mode() {
            debug!("running as ansible-vault client script");
        }

        let words = words(args, "query");
        let query = query_from(ctx, &words, |ctx, words| {
            parse_query(&words.join(" "), |name| ctx.profile_exists(name))
        })?;
        fetch_and_print(ctx, &query, args.get_flag(NO_NEWLINE_OPTION.id))
    }
}
