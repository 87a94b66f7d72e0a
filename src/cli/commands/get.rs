//! `get [PROFILE] KEY...` — print a password, profile given as a word.

use clap::ArgMatches;

use super::{fetch_and_print, query_from, words, NO_NEWLINE_OPTION};
use crate::cli::dispatch::{CommandSpec, Handler, Positional, HELP_OPTION};
use crate::cli::RunContext;
use crate::errors::Result;
use crate::query::parse_get;

pub static GET: CommandSpec = CommandSpec {
    name: "get",
    usage: "get [OPTIONS] [PROFILE] KEY...",
    about: "Print the password of KEY, read from PROFILE if such a profile exists",
    options: &[NO_NEWLINE_OPTION, HELP_OPTION],
    positionals: &[Positional {
        id: "words",
        metavar: "[PROFILE] KEY...",
        required: false,
        multiple: true,
        description: "Optional profile name followed by the entry path (words are joined with spaces)",
    }],
};

pub struct Get;

impl Handler for Get {
    fn spec(&self) -> &'static CommandSpec {
        &GET
    }

    fn execute(&self, ctx: &RunContext<'_>, args: &ArgMatches) -> Result<()> {
        let words = words(args, "words");
        let query = query_from(ctx, &words, |ctx, words| {
            parse_get(words, |name| ctx.profile_exists(name))
        })?;
        fetch_and_print(ctx, &query, args.get_flag(NO_NEWLINE_OPTION.id))
    }
}
