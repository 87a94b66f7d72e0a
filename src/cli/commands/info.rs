//! `info [PROFILE] KEY...` — show how a lookup would be resolved, without
//! unlocking anything.

use clap::ArgMatches;
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;
use tracing::warn;

use super::{query_from, words};
use crate::cli::dispatch::{CommandSpec, Handler, OptionSpec, Positional, ValueKind, HELP_OPTION};
use crate::cli::RunContext;
use crate::config::{Settings, Source};
use crate::errors::{Result, VaultClientError};
use crate::query::parse_get;

pub static INFO: CommandSpec = CommandSpec {
    name: "info",
    usage: "info [OPTIONS] [PROFILE] KEY...",
    about: "Show the profile, database and backend a lookup would use",
    options: &[
        OptionSpec {
            id: "format",
            short: Some('f'),
            long: "format",
            value: ValueKind::Required("FORMAT"),
            description: "Output format: table (default) or json",
        },
        HELP_OPTION,
    ],
    positionals: &[Positional {
        id: "words",
        metavar: "[PROFILE] KEY...",
        required: false,
        multiple: true,
        description: "Same as for `get`",
    }],
};

pub struct Info;

/// What `info` reports. Never contains the password itself.
#[derive(Debug, Serialize)]
pub struct InfoReport {
    pub profile: String,
    pub config_file: String,
    pub config_file_present: bool,
    pub key: String,
    pub database: Option<String>,
    pub database_source: Option<Source>,
    pub database_present: bool,
    pub password_source: Option<Source>,
    pub backend: Option<String>,
    pub backend_version: Option<String>,
}

impl InfoReport {
    pub fn new(settings: &Settings) -> Self {
        let database = settings.database.as_ref();
        Self {
            profile: settings.profile.display_name().to_string(),
            config_file: settings.profile.config_file.display().to_string(),
            config_file_present: settings.profile.loaded,
            key: settings.key.clone(),
            database: database.map(|d| d.value.display().to_string()),
            database_source: database.map(|d| d.source),
            database_present: database.is_some_and(|d| d.value.exists()),
            password_source: settings.password.as_ref().map(|p| p.source),
            backend: None,
            backend_version: None,
        }
    }
}

impl Handler for Info {
    fn spec(&self) -> &'static CommandSpec {
        &INFO
    }

    fn execute(&self, ctx: &RunContext<'_>, args: &ArgMatches) -> Result<()> {
        let format = args
            .get_one::<String>("format")
            .map(String::as_str)
            .unwrap_or("table");
        if !matches!(format, "table" | "json") {
            return Err(VaultClientError::Usage(format!(
                "unknown format '{format}' — use 'table' or 'json'"
            )));
        }

        let words = words(args, "words");
        let query = query_from(ctx, &words, |ctx, words| {
            parse_get(words, |name| ctx.profile_exists(name))
        })?;
        let settings = ctx.settings_for(&query)?;
        let mut report = InfoReport::new(&settings);

        match ctx.backend() {
            Ok(backend) => {
                report.backend = Some(backend.describe());
                report.backend_version = backend.version(&ctx.executor).unwrap_or_else(|e| {
                    warn!(error = %e, "could not read backend version");
                    None
                });
            }
            Err(e) => warn!(error = %e, "backend not available"),
        }

        if format == "json" {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| VaultClientError::SerializationError(format!("info: {e}")))?;
            println!("{json}");
        } else {
            println!("{}", render_table(&report));
        }
        Ok(())
    }
}

fn render_table(report: &InfoReport) -> Table {
    let source = |s: Option<Source>| match s {
        Some(Source::Flag) => " (flag)",
        Some(Source::Profile) => " (profile)",
        Some(Source::Environment) => " (environment)",
        None => "",
    };

    let config_file = if report.config_file_present {
        report.config_file.clone()
    } else {
        format!("{} (not present)", report.config_file)
    };

    let database = match &report.database {
        Some(db) if report.database_present => format!("{db}{}", source(report.database_source)),
        Some(db) => format!("{db}{} (missing)", source(report.database_source)),
        None => "(not configured)".to_string(),
    };

    let password = match report.password_source {
        Some(_) => format!("configured{}", source(report.password_source)),
        None => "prompted".to_string(),
    };

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Setting", "Value"]);
    table.add_row(vec!["Profile".to_string(), report.profile.clone()]);
    table.add_row(vec!["Config file".to_string(), config_file]);
    table.add_row(vec!["Key".to_string(), report.key.clone()]);
    table.add_row(vec!["Database".to_string(), database]);
    table.add_row(vec!["Password".to_string(), password]);
    table.add_row(vec![
        "Backend".to_string(),
        report.backend.clone().unwrap_or_else(|| "(not found)".to_string()),
    ]);
    if let Some(version) = &report.backend_version {
        table.add_row(vec!["Backend version".to_string(), version.clone()]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Overrides, Profile};
    use std::path::PathBuf;
    use zeroize::Zeroizing;

    fn settings() -> Settings {
        let profile = Profile {
            name: "john".into(),
            config_file: PathBuf::from("/cfg/conf.john.env"),
            loaded: true,
            database: Some(PathBuf::from("/nonexistent/john.kdbx")),
            password: Some(Zeroizing::new("hunter2".into())),
        };
        Settings::resolve(profile, "Ansible/admin", &Overrides::default(), &Overrides::default())
    }

    #[test]
    fn report_never_contains_password() {
        let report = InfoReport::new(&settings());
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"password_source\":\"profile\""));
    }

    #[test]
    fn table_marks_missing_database() {
        let table = render_table(&InfoReport::new(&settings())).to_string();
        assert!(table.contains("(missing)"));
        assert!(table.contains("configured (profile)"));
        assert!(table.contains("Ansible/admin"));
    }
}
