pub mod commands;
pub mod config;

pub use commands::{run, AccountReport, Command, DomainReport};
pub use config::CliConfig;
