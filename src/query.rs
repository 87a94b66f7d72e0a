//! Query references: `[<profile>__]<key>`.
//!
//! A key may itself contain `__` (KeePassXC entry paths are free-form), so a
//! prefix is only taken as a profile when a profile file with that name
//! exists. The existence test is passed in by the caller.

use crate::errors::{Result, VaultClientError};

/// Separator between profile and key.
pub const SEPARATOR: &str = "__";

/// A parsed secret reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    /// Profile name; empty selects the default profile.
    pub profile: String,
    /// Entry path inside the database.
    pub key: String,
}

impl Query {
    pub fn new(profile: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(VaultClientError::EmptyKey);
        }
        Ok(Self {
            profile: profile.into(),
            key,
        })
    }

    /// Render back to the `[<profile>__]<key>` form.
    pub fn reference(&self) -> String {
        if self.profile.is_empty() {
            self.key.clone()
        } else {
            format!("{}{SEPARATOR}{}", self.profile, self.key)
        }
    }
}

/// Split on the first `__` without looking at the filesystem.
///
/// Returns `(Some(profile), key)` when a non-empty prefix precedes the
/// separator, `(None, reference)` otherwise.
pub fn split_query(reference: &str) -> (Option<&str>, &str) {
    match reference.split_once(SEPARATOR) {
        Some((profile, key)) if !profile.is_empty() => (Some(profile), key),
        _ => (None, reference),
    }
}

/// Parse a `query` argument.
///
/// The prefix becomes the profile only if `exists(prefix)`; otherwise the
/// whole reference is the key.
pub fn parse_query(reference: &str, exists: impl Fn(&str) -> bool) -> Result<Query> {
    match split_query(reference) {
        (Some(profile), key) if exists(profile) => Query::new(profile, key),
        _ => Query::new("", reference),
    }
}

/// Parse `get [PROFILE] KEY...` positionals.
///
/// With more than one argument the first is a candidate profile, consumed
/// only if `exists` says so; the remaining arguments are joined with single
/// spaces to form the key.
pub fn parse_get<S: AsRef<str>>(args: &[S], exists: impl Fn(&str) -> bool) -> Result<Query> {
    let words: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();

    match words.split_first() {
        Some((first, rest)) if !rest.is_empty() && exists(*first) => {
            Query::new(*first, rest.join(" "))
        }
        _ => Query::new("", words.join(" ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only(name: &'static str) -> impl Fn(&str) -> bool {
        move |candidate: &str| candidate == name
    }

    #[test]
    fn split_on_first_separator() {
        assert_eq!(split_query("john__Ansible/admin"), (Some("john"), "Ansible/admin"));
        assert_eq!(split_query("a__b__c"), (Some("a"), "b__c"));
    }

    #[test]
    fn split_without_separator_or_prefix() {
        assert_eq!(split_query("Ansible/admin"), (None, "Ansible/admin"));
        assert_eq!(split_query("__key"), (None, "__key"));
    }

    #[test]
    fn query_with_existing_profile() {
        let q = parse_query("john__Ansible/admin", only("john")).unwrap();
        assert_eq!(q, Query::new("john", "Ansible/admin").unwrap());
    }

    #[test]
    fn query_with_unknown_profile_keeps_whole_key() {
        let q = parse_query("john__Ansible/admin", only("jane")).unwrap();
        assert_eq!(q.profile, "");
        assert_eq!(q.key, "john__Ansible/admin");
    }

    #[test]
    fn query_rejects_empty_key() {
        assert!(matches!(
            parse_query("", only("x")),
            Err(VaultClientError::EmptyKey)
        ));
        assert!(matches!(
            parse_query("john__", only("john")),
            Err(VaultClientError::EmptyKey)
        ));
    }

    #[test]
    fn get_consumes_existing_profile() {
        let q = parse_get(&["store1", "my_pass"], only("store1")).unwrap();
        assert_eq!(q.profile, "store1");
        assert_eq!(q.key, "my_pass");
    }

    #[test]
    fn get_joins_words_when_profile_absent() {
        let q = parse_get(&["store1", "my_pass"], only("other")).unwrap();
        assert_eq!(q.profile, "");
        assert_eq!(q.key, "store1 my_pass");
    }

    #[test]
    fn get_single_argument_is_always_the_key() {
        let q = parse_get(&["store1"], only("store1")).unwrap();
        assert_eq!(q.profile, "");
        assert_eq!(q.key, "store1");
    }

    #[test]
    fn get_rejects_no_arguments() {
        let none: [&str; 0] = [];
        assert!(matches!(
            parse_get(&none, only("x")),
            Err(VaultClientError::EmptyKey)
        ));
    }

    #[test]
    fn reference_round_trips_profile_and_key() {
        assert_eq!(Query::new("john", "a/b").unwrap().reference(), "john__a/b");
        assert_eq!(Query::new("", "a/b").unwrap().reference(), "a/b");
    }
}
