use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in vault-keepass-client.
#[derive(Debug, Error)]
pub enum VaultClientError {
    // --- Usage errors ---
    #[error("{0}")]
    Usage(String),

    #[error("No command given — run `vault-keepass-client help` for a list of commands")]
    MissingCommand,

    #[error("Unknown command '{0}' — run `vault-keepass-client help` for a list of commands")]
    UnknownCommand(String),

    #[error("No key given — expected `[PROFILE__]KEY`")]
    EmptyKey,

    #[error("--vault-id misuse: {0}")]
    VaultIdMisuse(String),

    // --- Config errors ---
    #[error("Cannot locate the config directory, set KC_CONFIG_DIR or HOME")]
    ConfigDirUnknown,

    #[error("Profile '{name}' not found — expected config file at {}", path.display())]
    MissingProfile { name: String, path: PathBuf },

    #[error("Cannot read profile {}:{line}: {reason}", path.display())]
    InvalidProfile {
        path: PathBuf,
        line: usize,
        reason: &'static str,
    },

    #[error("No database configured — set KC_DB in the profile file or pass --db")]
    MissingDatabase,

    #[error("Database not found at {0}")]
    DatabaseNotFound(PathBuf),

    // --- Backend errors ---
    #[error("keepassxc-cli not found — install KeePassXC or set KC_CLI")]
    BackendNotFound,

    #[error("Could not find entry '{0}' in the database")]
    KeyNotFound(String),

    #[error("Unlocking the database failed — wrong password or key file")]
    AuthenticationFailed,

    #[error("Unrecognized response from keepassxc-cli (no password line in output)")]
    UnrecognizedResponse,

    #[error("keepassxc-cli did not respond within {0} seconds ({1})")]
    BackendTimeout(u64, &'static str),

    #[error("Backend failed: {0}")]
    BackendFailed(String),

    // --- Shell errors ---
    #[error("Program name '{0}' must end in '-client' for ansible-vault to treat it as a client script")]
    ClientNameMismatch(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl VaultClientError {
    /// Process exit code for this error.
    ///
    /// Every fatal condition has its own code so wrapper scripts can tell
    /// them apart; anything unexpected falls back to `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) | Self::EmptyKey => 2,
            Self::MissingCommand => 3,
            Self::UnknownCommand(_) => 4,
            Self::MissingProfile { .. } | Self::InvalidProfile { .. } => 5,
            Self::MissingDatabase => 6,
            Self::DatabaseNotFound(_) => 7,
            Self::BackendNotFound => 8,
            Self::VaultIdMisuse(_) => 9,
            Self::KeyNotFound(_) => 10,
            Self::AuthenticationFailed => 11,
            Self::UnrecognizedResponse => 12,
            Self::BackendTimeout(..) => 13,
            Self::ClientNameMismatch(_) => 14,
            Self::BackendFailed(_)
            | Self::ConfigDirUnknown
            | Self::Io(_)
            | Self::SerializationError(_)
            | Self::CommandFailed(_) => 1,
        }
    }
}

/// Convenience type alias for vault-keepass-client results.
pub type Result<T> = std::result::Result<T, VaultClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_for_fatal_conditions() {
        let errors = [
            VaultClientError::Usage("bad".into()),
            VaultClientError::MissingCommand,
            VaultClientError::UnknownCommand("nope".into()),
            VaultClientError::MissingProfile {
                name: "ghost".into(),
                path: PathBuf::from("/tmp/conf.ghost.env"),
            },
            VaultClientError::MissingDatabase,
            VaultClientError::DatabaseNotFound(PathBuf::from("/tmp/x.kdbx")),
            VaultClientError::BackendNotFound,
            VaultClientError::VaultIdMisuse("x".into()),
            VaultClientError::KeyNotFound("k".into()),
            VaultClientError::AuthenticationFailed,
            VaultClientError::UnrecognizedResponse,
            VaultClientError::BackendTimeout(30, "awaiting prompt"),
            VaultClientError::ClientNameMismatch("x".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|c| *c > 1));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn unexpected_errors_use_generic_code() {
        let io = VaultClientError::Io(std::io::Error::other("boom"));
        assert_eq!(io.exit_code(), 1);
        assert_eq!(VaultClientError::CommandFailed("x".into()).exit_code(), 1);
    }

    #[test]
    fn missing_profile_message_names_the_file() {
        let err = VaultClientError::MissingProfile {
            name: "ghost".into(),
            path: PathBuf::from("/cfg/conf.ghost.env"),
        };
        assert!(err.to_string().contains("/cfg/conf.ghost.env"));
    }
}
