pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliArgs;

pub use adapters::{LdapDirectoryClient, SlackClient};
pub use config::{Config, RunMode};
pub use core::engine::{RunReport, RunSettings, SyncEngine};
pub use utils::error::{Result, SyncError};
