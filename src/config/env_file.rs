//! Profile file parsing.
//!
//! Profile files are shell-style `KEY=VALUE` files. Only [`KC_DB`] and
//! [`KC_PASS`] are read; everything else is ignored with a debug log.

use zeroize::Zeroizing;

/// Database path variable.
pub const KC_DB: &str = "KC_DB";

/// Database password variable.
pub const KC_PASS: &str = "KC_PASS";

/// Values read from one profile file. Absent and empty are both `None`.
#[derive(Default)]
pub struct ProfileValues {
    pub database: Option<String>,
    pub password: Option<Zeroizing<String>>,
}

/// A line of a profile file that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    /// 1-based line number.
    pub line: usize,
    pub reason: &'static str,
}

/// Read one line as a `NAME=VALUE` assignment.
///
/// Blank lines and `#` comments yield `Ok(None)`. An optional `export`
/// keyword and one pair of matching quotes around the value are accepted.
pub fn parse_env_line(line: &str) -> std::result::Result<Option<(&str, &str)>, &'static str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let assignment = match line.strip_prefix("export") {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => line,
    };

    let (name, raw) = assignment
        .split_once('=')
        .ok_or("expected NAME=VALUE")?;
    let name = name.trim_end();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("invalid variable name");
    }

    Ok(Some((name, unquote(raw.trim())?)))
}

/// Strip one pair of matching quotes; an opening quote must be closed.
fn unquote(raw: &str) -> std::result::Result<&str, &'static str> {
    let Some(quote) = raw.chars().next().filter(|c| matches!(c, '"' | '\'')) else {
        return Ok(raw);
    };
    raw[1..].strip_suffix(quote).ok_or("unterminated quote")
}

/// Collect `KC_DB` and `KC_PASS` from a profile file's contents.
///
/// A later assignment of the same variable wins, as it would when sourcing
/// the file from a shell.
pub fn parse_profile(content: &str) -> std::result::Result<ProfileValues, LineError> {
    let mut values = ProfileValues::default();

    for (index, line) in content.lines().enumerate() {
        let parsed = parse_env_line(line).map_err(|reason| LineError {
            line: index + 1,
            reason,
        })?;
        let Some((name, value)) = parsed else {
            continue;
        };
        let value = (!value.is_empty()).then(|| value.to_string());
        match name {
            KC_DB => values.database = value,
            KC_PASS => values.password = value.map(Zeroizing::new),
            other => tracing::debug!(variable = other, "ignoring unrecognized profile variable"),
        }
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_assignment() {
        assert_eq!(parse_env_line("KC_DB=/data/db.kdbx"), Ok(Some(("KC_DB", "/data/db.kdbx"))));
    }

    #[test]
    fn parse_export_keyword() {
        assert_eq!(
            parse_env_line("export KC_DB=~/vaults/ops.kdbx"),
            Ok(Some(("KC_DB", "~/vaults/ops.kdbx")))
        );
        assert_eq!(parse_env_line("exportKC_DB=x"), Ok(Some(("exportKC_DB", "x"))));
    }

    #[test]
    fn parse_value_with_equals() {
        assert_eq!(parse_env_line("KC_PASS=a=b=c"), Ok(Some(("KC_PASS", "a=b=c"))));
    }

    #[test]
    fn parse_quoted_values() {
        assert_eq!(
            parse_env_line(r#"KC_DB="/my vaults/db.kdbx""#),
            Ok(Some(("KC_DB", "/my vaults/db.kdbx")))
        );
        assert_eq!(parse_env_line("KC_PASS='p w'"), Ok(Some(("KC_PASS", "p w"))));
        assert_eq!(parse_env_line("KC_PASS=''"), Ok(Some(("KC_PASS", ""))));
    }

    #[test]
    fn parse_rejects_unterminated_quotes() {
        assert_eq!(parse_env_line(r#"KC_PASS="hunter2"#), Err("unterminated quote"));
        assert_eq!(parse_env_line("KC_PASS='"), Err("unterminated quote"));
        assert_eq!(parse_env_line(r#"KC_DB="/a.kdbx'"#), Err("unterminated quote"));
    }

    #[test]
    fn parse_skips_comments_and_blanks() {
        assert_eq!(parse_env_line("# KC_DB=/nope"), Ok(None));
        assert_eq!(parse_env_line("   "), Ok(None));
    }

    #[test]
    fn parse_rejects_lines_that_are_not_assignments() {
        assert_eq!(parse_env_line("NOEQUALS"), Err("expected NAME=VALUE"));
        assert_eq!(parse_env_line("=value"), Err("invalid variable name"));
        assert_eq!(parse_env_line("KC-DB=x"), Err("invalid variable name"));
    }

    #[test]
    fn profile_reports_the_bad_line() {
        let err = parse_profile("# ops vault\nKC_DB=/a.kdbx\nKC_PASS=\"oops\n").err().unwrap();
        assert_eq!(
            err,
            LineError {
                line: 3,
                reason: "unterminated quote"
            }
        );
    }

    #[test]
    fn profile_reads_only_recognized_keys() {
        let values = parse_profile("KC_DB=/a.kdbx\nKC_PASS=hunter2\nOTHER=1\n").unwrap();
        assert_eq!(values.database.as_deref(), Some("/a.kdbx"));
        assert_eq!(values.password.as_deref().map(String::as_str), Some("hunter2"));
    }

    #[test]
    fn profile_treats_empty_values_as_unset() {
        let values = parse_profile("KC_DB=/a.kdbx\nKC_PASS=\n").unwrap();
        assert!(values.password.is_none());
    }

    #[test]
    fn profile_last_assignment_wins() {
        let values = parse_profile("KC_DB=/first.kdbx\nKC_DB=/second.kdbx\n").unwrap();
        assert_eq!(values.database.as_deref(), Some("/second.kdbx"));
    }
}
