//! Command dispatch.
//!
//! Every command declares a [`CommandSpec`]: usage line, summary, options and
//! positionals. The same schema drives argument parsing (it is turned into a
//! `clap::Command`), the help screens and shell completions, so adding a flag
//! to a spec is all it takes to document it.
//!
//! Commands are registered by internal name. A `__` in a name marks a
//! second level: `profile__list` is shown and invoked as `profile list`.

use std::fmt::Write;

use clap::{Arg, ArgAction, ArgMatches, ColorChoice};
use console::style;
use tracing::debug;

use super::RunContext;
use crate::errors::{Result, VaultClientError};

/// Separator between levels in internal command names.
pub const LEVEL_SEPARATOR: &str = "__";

/// Binary name used in usage banners and completions.
pub const BIN_NAME: &str = "vault-keepass-client";

/// Whether an option takes a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Boolean switch.
    Flag,
    /// `--opt VALUE`
    Required(&'static str),
    /// `--opt[=VALUE]`
    Optional(&'static str),
}

/// One declared option.
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    /// Id used to read the value back from `ArgMatches`.
    pub id: &'static str,
    pub short: Option<char>,
    pub long: &'static str,
    pub value: ValueKind,
    pub description: &'static str,
}

/// One declared positional argument.
#[derive(Debug, Clone, Copy)]
pub struct Positional {
    pub id: &'static str,
    pub metavar: &'static str,
    pub required: bool,
    /// Collects all remaining words. Once the first word is seen, later
    /// hyphenated words are values too; before it they are still options.
    pub multiple: bool,
    pub description: &'static str,
}

/// Declarative description of a command.
#[derive(Debug)]
pub struct CommandSpec {
    /// Internal name; `__` separates levels.
    pub name: &'static str,
    /// Usage line after the binary name.
    pub usage: &'static str,
    pub about: &'static str,
    pub options: &'static [OptionSpec],
    pub positionals: &'static [Positional],
}

/// `-h, --help`, declared by every command.
pub const HELP_OPTION: OptionSpec = OptionSpec {
    id: "help",
    short: Some('h'),
    long: "help",
    value: ValueKind::Flag,
    description: "Show this help",
};

/// A row of the options table: flags, metavariable, description.
pub type OptionRow = (String, Option<&'static str>, &'static str);

impl OptionSpec {
    /// `-v, --verbose` style flag list, without the metavariable.
    pub fn flags(&self) -> String {
        match self.short {
            Some(short) => format!("-{short}, --{}", self.long),
            None => format!("--{}", self.long),
        }
    }

    pub fn metavar(&self) -> Option<&'static str> {
        match self.value {
            ValueKind::Flag => None,
            ValueKind::Required(mv) | ValueKind::Optional(mv) => Some(mv),
        }
    }

    /// Flags and metavariable as shown in the options table.
    pub fn display(&self) -> String {
        match self.value {
            ValueKind::Flag => self.flags(),
            ValueKind::Required(mv) => format!("{} {mv}", self.flags()),
            ValueKind::Optional(mv) => format!("{}[={mv}]", self.flags()),
        }
    }

    fn to_arg(self) -> Arg {
        let mut arg = Arg::new(self.id).long(self.long).help(self.description);
        if let Some(short) = self.short {
            arg = arg.short(short);
        }
        match self.value {
            ValueKind::Flag => arg.action(ArgAction::SetTrue),
            ValueKind::Required(mv) => arg.action(ArgAction::Set).num_args(1).value_name(mv),
            ValueKind::Optional(mv) => arg
                .action(ArgAction::Set)
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value("")
                .value_name(mv),
        }
    }
}

impl Positional {
    fn to_arg(self) -> Arg {
        let arg = Arg::new(self.id)
            .value_name(self.metavar)
            .help(self.description)
            .required(self.required);
        if self.multiple {
            arg.action(ArgAction::Append)
                .num_args(1..)
                .trailing_var_arg(true)
        } else {
            arg.action(ArgAction::Set)
        }
    }
}

impl CommandSpec {
    /// Last level of the name: `list` for `profile__list`.
    pub fn leaf_name(&self) -> &'static str {
        self.name
            .rsplit(LEVEL_SEPARATOR)
            .next()
            .unwrap_or(self.name)
    }

    /// Whether an option with `id` is declared.
    pub fn declares(&self, id: &str) -> bool {
        self.options.iter().any(|o| o.id == id)
    }

    /// clap command with this spec's options only.
    fn clap_base(&self) -> clap::Command {
        let name = match self.leaf_name() {
            "" => BIN_NAME,
            leaf => leaf,
        };
        let mut cmd = clap::Command::new(name)
            .about(self.about)
            .color(ColorChoice::Never)
            .disable_help_flag(true)
            .disable_help_subcommand(true)
            .disable_version_flag(true)
            .args_override_self(true);
        for option in self.options {
            cmd = cmd.arg(option.to_arg());
        }
        cmd
    }

    /// clap command with options and positionals, used for parsing.
    pub fn to_clap(&self) -> clap::Command {
        let mut cmd = self.clap_base();
        for positional in self.positionals {
            cmd = cmd.arg(positional.to_arg());
        }
        cmd
    }

    /// Parse `args` (without the command name) against this spec.
    pub fn parse<S: AsRef<str>>(&self, args: &[S]) -> Result<ArgMatches> {
        self.to_clap()
            .no_binary_name(true)
            .try_get_matches_from(args.iter().map(|a| a.as_ref().to_string()))
            .map_err(|e| usage_error(self, &e))
    }
}

fn usage_error(spec: &CommandSpec, err: &clap::Error) -> VaultClientError {
    let rendered = err.to_string();
    let first = rendered
        .lines()
        .next()
        .unwrap_or_default()
        .trim_start_matches("error: ")
        .to_string();
    VaultClientError::Usage(format!("{first} (usage: {BIN_NAME} {})", spec.usage))
}

/// Display name for an internal name below `prefix`.
pub fn display_name(prefix: &str, name: &str) -> String {
    name.strip_prefix(prefix)
        .unwrap_or(name)
        .replace(LEVEL_SEPARATOR, " ")
}

/// A command implementation.
pub trait Handler {
    fn spec(&self) -> &'static CommandSpec;

    /// Run the command with its already-parsed arguments.
    fn execute(&self, ctx: &RunContext<'_>, args: &ArgMatches) -> Result<()>;
}

/// Maps command names to handlers and renders help from their specs.
pub struct Registry {
    root: &'static CommandSpec,
    groups: Vec<&'static CommandSpec>,
    handlers: Vec<Box<dyn Handler>>,
    footer: Vec<(&'static str, String)>,
}

impl Registry {
    pub fn new(root: &'static CommandSpec) -> Self {
        Self {
            root,
            groups: Vec::new(),
            handlers: Vec::new(),
            footer: Vec::new(),
        }
    }

    /// Register a command; registration order is display order.
    pub fn register(&mut self, handler: Box<dyn Handler>) {
        self.handlers.push(handler);
    }

    /// Register a first-level name whose commands live at `name__*`.
    pub fn group(&mut self, spec: &'static CommandSpec) {
        self.groups.push(spec);
    }

    /// Label/value lines appended to the top-level help only.
    pub fn with_footer(mut self, footer: Vec<(&'static str, String)>) -> Self {
        self.footer = footer;
        self
    }

    pub fn root(&self) -> &'static CommandSpec {
        self.root
    }

    pub fn is_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.name == name)
    }

    fn handler(&self, name: &str) -> Option<&dyn Handler> {
        self.handlers
            .iter()
            .find(|h| h.spec().name == name)
            .map(|h| h.as_ref())
    }

    /// Spec for the root, a group, or a command.
    pub fn spec(&self, name: &str) -> Option<&'static CommandSpec> {
        if name == self.root.name {
            return Some(self.root);
        }
        self.groups
            .iter()
            .copied()
            .find(|g| g.name == name)
            .or_else(|| self.handler(name).map(|h| h.spec()))
    }

    /// Run the command `prefix + name` with `args`.
    ///
    /// A group name consumes the next word as its subcommand.
    pub fn dispatch<S: AsRef<str>>(
        &self,
        ctx: &RunContext<'_>,
        prefix: &str,
        name: &str,
        args: &[S],
    ) -> Result<()> {
        if name.is_empty() {
            return Err(VaultClientError::MissingCommand);
        }

        let full = format!("{prefix}{name}");

        if self.is_group(&full) {
            let sub_prefix = format!("{full}{LEVEL_SEPARATOR}");
            return match args.split_first() {
                None => Err(VaultClientError::MissingCommand),
                Some((sub, _)) if matches!(sub.as_ref(), "-h" | "--help") => {
                    print!("{}", self.render_help(&full)?);
                    Ok(())
                }
                Some((sub, rest)) => self.dispatch(ctx, &sub_prefix, sub.as_ref(), rest),
            };
        }

        let handler = self
            .handler(&full)
            .ok_or_else(|| VaultClientError::UnknownCommand(display_name("", &full)))?;

        let spec = handler.spec();
        let matches = spec.parse(args)?;
        if spec.declares(HELP_OPTION.id) && matches.get_flag(HELP_OPTION.id) {
            print!("{}", self.render_help(&full)?);
            return Ok(());
        }

        debug!(command = %display_name("", &full), "dispatching");
        handler.execute(ctx, &matches)
    }

    /// Options declared by `name`, in declaration order.
    pub fn describe_options(&self, name: &str) -> Result<Vec<OptionRow>> {
        let spec = self
            .spec(name)
            .ok_or_else(|| VaultClientError::UnknownCommand(display_name("", name)))?;
        Ok(spec
            .options
            .iter()
            .map(|o| (o.flags(), o.metavar(), o.description))
            .collect())
    }

    /// Commands below `prefix`, as (display name, summary).
    pub fn describe_subcommands(&self, prefix: &str) -> Vec<(String, &'static str)> {
        self.handlers
            .iter()
            .map(|h| h.spec())
            .filter(|s| s.name.starts_with(prefix) && s.name != prefix)
            .map(|s| (display_name(prefix, s.name), s.about))
            .collect()
    }

    /// Full help text for the root, a group, or a command.
    pub fn render_help(&self, name: &str) -> Result<String> {
        let spec = self
            .spec(name)
            .ok_or_else(|| VaultClientError::UnknownCommand(display_name("", name)))?;
        let is_root = name == self.root.name;

        let mut out = String::new();
        let _ = writeln!(out, "{} {BIN_NAME} {}", style("Usage:").bold(), spec.usage);
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", spec.about);

        let subcommands = if is_root {
            self.describe_subcommands("")
        } else if self.is_group(name) {
            self.describe_subcommands(&format!("{name}{LEVEL_SEPARATOR}"))
        } else {
            Vec::new()
        };
        if !subcommands.is_empty() {
            section(&mut out, "Commands:", &subcommands);
        }

        if !spec.positionals.is_empty() {
            let rows: Vec<(String, &str)> = spec
                .positionals
                .iter()
                .map(|p| (p.metavar.to_string(), p.description))
                .collect();
            section(&mut out, "Arguments:", &rows);
        }

        let options: Vec<(String, &str)> = spec
            .options
            .iter()
            .map(|o| (o.display(), o.description))
            .collect();
        if !options.is_empty() {
            section(&mut out, "Options:", &options);
        }

        if is_root && !self.footer.is_empty() {
            let width = self.footer.iter().map(|(l, _)| l.len()).max().unwrap_or(0) + 1;
            let _ = writeln!(out);
            for (label, value) in &self.footer {
                let _ = writeln!(out, "{:<width$} {value}", format!("{label}:"), width = width);
            }
        }

        Ok(out)
    }

    /// Whole command tree as a clap command, for shell completions.
    pub fn to_clap(&self) -> clap::Command {
        let mut root = self.root.clap_base().name(BIN_NAME);

        let mut top_level: Vec<&'static str> = Vec::new();
        for spec in self.handlers.iter().map(|h| h.spec()) {
            let first = spec.name.split(LEVEL_SEPARATOR).next().unwrap_or(spec.name);
            if !top_level.contains(&first) {
                top_level.push(first);
            }
        }

        for first in top_level {
            if let Some(group) = self.groups.iter().find(|g| g.name == first) {
                let prefix = format!("{first}{LEVEL_SEPARATOR}");
                let mut cmd = group.clap_base();
                for spec in self.handlers.iter().map(|h| h.spec()) {
                    if spec.name.starts_with(&prefix) {
                        cmd = cmd.subcommand(spec.to_clap());
                    }
                }
                root = root.subcommand(cmd);
            } else if let Some(handler) = self.handler(first) {
                root = root.subcommand(handler.spec().to_clap());
            }
        }

        root
    }
}

fn section(out: &mut String, title: &str, rows: &[(String, &str)]) {
    let width = rows.iter().map(|(left, _)| left.len()).max().unwrap_or(0);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", style(title).bold());
    for (left, right) in rows {
        let _ = writeln!(out, "  {left:<width$}  {right}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ROOT: CommandSpec = CommandSpec {
        name: "",
        usage: "[OPTIONS] [COMMAND]",
        about: "Test root",
        options: &[
            OptionSpec {
                id: "db",
                short: None,
                long: "db",
                value: ValueKind::Required("PATH"),
                description: "Database file",
            },
            OptionSpec {
                id: "verbose",
                short: Some('v'),
                long: "verbose",
                value: ValueKind::Optional("LEVEL"),
                description: "Log more",
            },
            HELP_OPTION,
        ],
        positionals: &[],
    };

    static ECHO: CommandSpec = CommandSpec {
        name: "echo",
        usage: "echo [OPTIONS] WORDS...",
        about: "Echo words",
        options: &[
            OptionSpec {
                id: "upper",
                short: Some('u'),
                long: "upper",
                value: ValueKind::Flag,
                description: "Uppercase",
            },
            HELP_OPTION,
        ],
        positionals: &[Positional {
            id: "words",
            metavar: "WORDS...",
            required: true,
            multiple: true,
            description: "Words to echo",
        }],
    };

    static TEAM: CommandSpec = CommandSpec {
        name: "team",
        usage: "team COMMAND",
        about: "Team commands",
        options: &[HELP_OPTION],
        positionals: &[],
    };

    static TEAM_LIST: CommandSpec = CommandSpec {
        name: "team__list",
        usage: "team list",
        about: "List teams",
        options: &[HELP_OPTION],
        positionals: &[],
    };

    struct Static(&'static CommandSpec);

    impl Handler for Static {
        fn spec(&self) -> &'static CommandSpec {
            self.0
        }

        fn execute(&self, _ctx: &RunContext<'_>, _args: &ArgMatches) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> Registry {
        let mut r = Registry::new(&ROOT);
        r.register(Box::new(Static(&ECHO)));
        r.group(&TEAM);
        r.register(Box::new(Static(&TEAM_LIST)));
        r.with_footer(vec![("Version", "1.2.3".to_string())])
    }

    #[test]
    fn describe_options_keeps_declaration_order() {
        let rows = registry().describe_options("").unwrap();
        assert_eq!(rows[0], ("--db".to_string(), Some("PATH"), "Database file"));
        assert_eq!(rows[1], ("-v, --verbose".to_string(), Some("LEVEL"), "Log more"));
        assert_eq!(rows[2].0, "-h, --help");
    }

    #[test]
    fn describe_subcommands_flattens_levels() {
        let names: Vec<String> = registry()
            .describe_subcommands("")
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["echo", "team list"]);

        let team: Vec<String> = registry()
            .describe_subcommands("team__")
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(team, vec!["list"]);
    }

    #[test]
    fn help_lists_each_option_once_on_every_call() {
        let r = registry();
        for _ in 0..3 {
            let help = r.render_help("").unwrap();
            assert_eq!(help.matches("--db PATH").count(), 1);
            assert_eq!(help.matches("-v, --verbose[=LEVEL]").count(), 1);
            assert_eq!(help.matches("--help").count(), 1);
            assert!(help.find("--db").unwrap() < help.find("--verbose").unwrap());
        }
        assert_eq!(r.render_help("").unwrap(), r.render_help("").unwrap());
    }

    #[test]
    fn footer_only_on_root_help() {
        let r = registry();
        assert!(r.render_help("").unwrap().contains("Version: 1.2.3"));
        assert!(!r.render_help("echo").unwrap().contains("1.2.3"));
    }

    #[test]
    fn command_help_shows_arguments() {
        let help = registry().render_help("echo").unwrap();
        assert!(help.contains("echo [OPTIONS] WORDS..."));
        assert!(help.contains("WORDS..."));
        assert!(help.contains("-u, --upper"));
    }

    #[test]
    fn group_help_lists_its_commands() {
        let help = registry().render_help("team").unwrap();
        assert!(help.contains("list"));
        assert!(!help.contains("echo"));
    }

    #[test]
    fn parse_collects_trailing_words() {
        let m = ECHO.parse(&["-u", "a", "-b", "c"]).unwrap();
        assert!(m.get_flag("upper"));
        let words: Vec<&String> = m.get_many::<String>("words").unwrap().collect();
        assert_eq!(words, vec!["a", "-b", "c"]);
    }

    #[test]
    fn optional_value_accepts_bare_flag() {
        let m = ROOT.parse(&["--verbose"]).unwrap();
        assert_eq!(m.get_one::<String>("verbose").map(String::as_str), Some(""));
        let m = ROOT.parse(&["--verbose=3"]).unwrap();
        assert_eq!(m.get_one::<String>("verbose").map(String::as_str), Some("3"));
        let m = ROOT.parse::<&str>(&[]).unwrap();
        assert!(m.get_one::<String>("verbose").is_none());
    }

    #[test]
    fn later_flag_wins() {
        let m = ROOT.parse(&["--db", "/a", "--db", "/b"]).unwrap();
        assert_eq!(m.get_one::<String>("db").map(String::as_str), Some("/b"));
    }

    #[test]
    fn unknown_flag_is_usage_error() {
        let err = ECHO.parse(&["--nope", "x"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn mistyped_flag_before_words_is_not_a_word() {
        let err = ECHO.parse(&["--uper", "a", "b"]).unwrap_err();
        assert!(matches!(err, VaultClientError::Usage(ref m) if m.contains("--uper")));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn display_name_strips_prefix_and_separators() {
        assert_eq!(display_name("", "profile__list"), "profile list");
        assert_eq!(display_name("profile__", "profile__list"), "list");
    }

    #[test]
    fn completion_tree_nests_groups() {
        let cmd = registry().to_clap();
        let team = cmd.find_subcommand("team").unwrap();
        assert!(team.find_subcommand("list").is_some());
        assert!(cmd.find_subcommand("echo").is_some());
    }
}
