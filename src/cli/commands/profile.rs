//! `profile list` / `profile path [NAME]` — inspect profile files.

use clap::ArgMatches;
use comfy_table::{ContentArrangement, Table};

use super::words;
use crate::cli::dispatch::{CommandSpec, Handler, Positional, HELP_OPTION};
use crate::cli::output;
use crate::cli::RunContext;
use crate::config::{self, profile::display_name};
use crate::errors::Result;

pub static PROFILE: CommandSpec = CommandSpec {
    name: "profile",
    usage: "profile COMMAND",
    about: "Inspect profile files",
    options: &[HELP_OPTION],
    positionals: &[],
};

pub static LIST: CommandSpec = CommandSpec {
    name: "profile__list",
    usage: "profile list",
    about: "List the profiles in the config directory",
    options: &[HELP_OPTION],
    positionals: &[],
};

pub static PATH: CommandSpec = CommandSpec {
    name: "profile__path",
    usage: "profile path [NAME]",
    about: "Print the config file path of a profile",
    options: &[HELP_OPTION],
    positionals: &[Positional {
        id: "name",
        metavar: "NAME",
        required: false,
        multiple: false,
        description: "Profile name (default profile when omitted)",
    }],
};

pub struct List;

impl Handler for List {
    fn spec(&self) -> &'static CommandSpec {
        &LIST
    }

    fn execute(&self, ctx: &RunContext<'_>, _args: &ArgMatches) -> Result<()> {
        let config_dir = ctx.config_dir()?;
        let profiles = config::list_profiles(config_dir)?;

        if profiles.is_empty() {
            output::info(&format!("No profiles found in {}", config_dir.display()));
            output::tip("Create conf.env or conf.<name>.env with KC_DB=... and optionally KC_PASS=...");
            return Ok(());
        }

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Profile", "File"]);
        for profile in &profiles {
            table.add_row(vec![
                display_name(&profile.name).to_string(),
                profile.path.display().to_string(),
            ]);
        }

        println!("{table}");
        Ok(())
    }
}

pub struct PathCommand;

impl Handler for PathCommand {
    fn spec(&self) -> &'static CommandSpec {
        &PATH
    }

    fn execute(&self, ctx: &RunContext<'_>, args: &ArgMatches) -> Result<()> {
        let name = words(args, "name").pop().unwrap_or_default();
        if !name.is_empty() {
            config::profile::validate_profile_name(&name)?;
        }
        println!("{}", config::profile_path(ctx.config_dir()?, &name).display());
        Ok(())
    }
}
