//! `help [COMMAND...]` — print help for the program or one command.

use clap::ArgMatches;

use super::words;
use crate::cli::dispatch::{CommandSpec, Handler, Positional, HELP_OPTION, LEVEL_SEPARATOR};
use crate::cli::RunContext;
use crate::errors::Result;

pub static HELP: CommandSpec = CommandSpec {
    name: "help",
    usage: "help [COMMAND]...",
    about: "Show help for the program or a command",
    options: &[HELP_OPTION],
    positionals: &[Positional {
        id: "command",
        metavar: "COMMAND...",
        required: false,
        multiple: true,
        description: "Command to describe, e.g. `get` or `profile list`",
    }],
};

pub struct Help;

impl Handler for Help {
    fn spec(&self) -> &'static CommandSpec {
        &HELP
    }

    fn execute(&self, ctx: &RunContext<'_>, args: &ArgMatches) -> Result<()> {
        let name = words(args, "command").join(LEVEL_SEPARATOR);
        print!("{}", ctx.registry.render_help(&name)?);
        Ok(())
    }
}
