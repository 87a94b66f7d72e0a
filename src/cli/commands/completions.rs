//! `completions SHELL` — generate shell completion scripts.
//!
//! Usage:
//!   vault-keepass-client completions bash > ~/.bash_completion.d/vault-keepass-client
//!   vault-keepass-client completions zsh
//!   vault-keepass-client completions fish

use std::io;

use clap::{ArgMatches, ValueEnum};
use clap_complete::{generate, Shell};

use crate::cli::dispatch::{CommandSpec, Handler, Positional, BIN_NAME, HELP_OPTION};
use crate::cli::RunContext;
use crate::errors::{Result, VaultClientError};

pub static COMPLETIONS: CommandSpec = CommandSpec {
    name: "completions",
    usage: "completions SHELL",
    about: "Print a shell completion script",
    options: &[HELP_OPTION],
    positionals: &[Positional {
        id: "shell",
        metavar: "SHELL",
        required: true,
        multiple: false,
        description: "bash, zsh, fish, powershell or elvish",
    }],
};

pub struct Completions;

impl Handler for Completions {
    fn spec(&self) -> &'static CommandSpec {
        &COMPLETIONS
    }

    fn execute(&self, ctx: &RunContext<'_>, args: &ArgMatches) -> Result<()> {
        let name = args
            .get_one::<String>("shell")
            .map(String::as_str)
            .unwrap_or_default();
        let shell = parse_shell(name)?;
        let mut cmd = ctx.registry.to_clap();
        generate(shell, &mut cmd, BIN_NAME, &mut io::stdout());
        Ok(())
    }
}

/// Look `name` up among the shells clap_complete can generate for.
fn parse_shell(name: &str) -> Result<Shell> {
    <Shell as ValueEnum>::from_str(name.trim(), true).map_err(|_| {
        VaultClientError::Usage(format!(
            "unknown shell '{name}', expected one of: {}",
            supported_shells().join(", ")
        ))
    })
}

fn supported_shells() -> Vec<String> {
    Shell::value_variants()
        .iter()
        .filter_map(ValueEnum::to_possible_value)
        .map(|v| v.get_name().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::build_registry;

    #[test]
    fn parse_shell_known_names() {
        assert_eq!(parse_shell("bash").unwrap(), Shell::Bash);
        assert_eq!(parse_shell("zsh").unwrap(), Shell::Zsh);
        assert_eq!(parse_shell(" fish ").unwrap(), Shell::Fish);
        assert_eq!(parse_shell("powershell").unwrap(), Shell::PowerShell);
    }

    #[test]
    fn parse_shell_case_insensitive() {
        assert_eq!(parse_shell("BASH").unwrap(), Shell::Bash);
        assert_eq!(parse_shell("Zsh").unwrap(), Shell::Zsh);
    }

    #[test]
    fn parse_shell_unknown_is_usage_error() {
        let err = parse_shell("csh").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let message = err.to_string();
        for shell in supported_shells() {
            assert!(message.contains(&shell), "missing {shell}");
        }
        assert!(parse_shell("").is_err());
    }

    #[test]
    fn bash_script_mentions_every_command() {
        let mut cmd = build_registry(None).to_clap();
        let mut buf = Vec::new();
        generate(Shell::Bash, &mut cmd, BIN_NAME, &mut buf);
        let script = String::from_utf8(buf).unwrap();
        for name in ["get", "query", "shell", "info", "profile", "completions"] {
            assert!(script.contains(name), "missing {name}");
        }
        assert!(script.contains("--vault-id"));
    }
}
