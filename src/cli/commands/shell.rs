//! `shell [PROFILE__]KEY` — emit exports that make ansible-vault call us.
//!
//! Usage:
//!   eval "$(vault-keepass-client shell john__Ansible/admin)"
//!
//! ansible-vault only runs a vault-id source as a client script (passing
//! `--vault-id <label>`) when the file name ends in `-client`, so the
//! exports are refused for any other program name.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use clap::ArgMatches;

use super::words;
use crate::cli::dispatch::{CommandSpec, Handler, OptionSpec, Positional, ValueKind, HELP_OPTION};
use crate::cli::RunContext;
use crate::errors::{Result, VaultClientError};
use crate::query::Query;

/// File name suffix ansible-vault requires of client scripts.
pub const CLIENT_SUFFIX: &str = "-client";

pub static SHELL: CommandSpec = CommandSpec {
    name: "shell",
    usage: "shell [OPTIONS] [PROFILE__]KEY",
    about: "Print export statements wiring ansible-vault to this program",
    options: &[
        OptionSpec {
            id: "program",
            short: None,
            long: "program",
            value: ValueKind::Required("PATH"),
            description: "Program path to bind (default: this executable)",
        },
        HELP_OPTION,
    ],
    positionals: &[Positional {
        id: "query",
        metavar: "[PROFILE__]KEY",
        required: false,
        multiple: false,
        description: "Query reference (default: built from --profile/--key)",
    }],
};

pub struct Shell;

impl Handler for Shell {
    fn spec(&self) -> &'static CommandSpec {
        &SHELL
    }

    fn execute(&self, ctx: &RunContext<'_>, args: &ArgMatches) -> Result<()> {
        let reference = match words(args, "query").pop() {
            Some(reference) => Query::new("", reference)?.key,
            None => match ctx.globals.flag_query() {
                Some(query) => query?.reference(),
                None => return Err(VaultClientError::EmptyKey),
            },
        };

        let program = match args.get_one::<String>("program") {
            Some(path) => PathBuf::from(path),
            None => std::env::current_exe()?,
        };

        print!("{}", render_exports(&reference, &program)?);
        Ok(())
    }
}

/// Render the export statements for `reference` bound to `program`.
pub fn render_exports(reference: &str, program: &Path) -> Result<String> {
    let file_name = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !file_name.ends_with(CLIENT_SUFFIX) {
        return Err(VaultClientError::ClientNameMismatch(file_name));
    }

    let identity = quote(&format!("{reference}@{}", program.display()));

    let mut out = String::new();
    let _ = writeln!(out, "export ANSIBLE_VAULT_IDENTITY={identity}");
    let _ = writeln!(out, "export ANSIBLE_VAULT_IDENTITY_LIST={identity}");
    let _ = writeln!(out, "export ANSIBLE_VAULT_ID_MATCH=\"true\"");
    Ok(out)
}

/// Double-quote a value for POSIX shells.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_bind_query_to_program() {
        let out = render_exports(
            "john__Ansible/admin",
            Path::new("/opt/x/vault-keepass-client"),
        )
        .unwrap();

        let identity = "export ANSIBLE_VAULT_IDENTITY=\"john__Ansible/admin@/opt/x/vault-keepass-client\"";
        assert_eq!(out.lines().filter(|l| *l == identity).count(), 1);
        assert_eq!(out.lines().filter(|l| l.starts_with("export ")).count(), 3);
    }

    #[test]
    fn refuses_program_without_client_suffix() {
        let err = render_exports("k", Path::new("/opt/x/vault-keepass")).unwrap_err();
        assert!(matches!(err, VaultClientError::ClientNameMismatch(ref n) if n == "vault-keepass"));
        assert_eq!(err.exit_code(), 14);
    }

    #[test]
    fn quotes_shell_metacharacters() {
        assert_eq!(quote("a\"b$c`d\\e"), "\"a\\\"b\\$c\\`d\\\\e\"");
        assert_eq!(quote("plain"), "\"plain\"");
    }
}
