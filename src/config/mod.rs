//! Configuration: profile files and the resolved per-invocation settings.

pub mod env_file;
pub mod profile;
pub mod settings;

pub use profile::{
    config_dir, list_profiles, load_profile, profile_exists, profile_path, Profile, ProfileEntry,
};
pub use settings::{Overrides, Settings, Source, Sourced};
