pub mod backend;
pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod process;
pub mod query;
