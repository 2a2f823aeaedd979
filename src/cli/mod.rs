//! CLI module for layerview
//!
//! Provides command-line interface for:
//! - query: One-shot read of the merged view
//! - write: One-shot write through the view's write layer

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{query, run, run_command, write, Config, StorageConfig};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{parse_features, read_features, write_error, write_response};
