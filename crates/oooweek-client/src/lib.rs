//! CLI, configuration, authorization setup and the weekly report.
//!
//! This crate provides the `oooweek` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod signals;

pub use cli::Cli;
pub use config::{ClientConfig, Settings};
pub use error::{ClientError, ClientResult};
pub use signals::SignalHandler;
