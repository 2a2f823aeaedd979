//! CLI argument definitions using clap
//!
//! Commands:
//! - layerview query --config <path> [--collection <name>]... [--id <id>]...
//! - layerview write --config <path> --collection <name>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// layerview - federated reads and writes over layered feature storages
#[derive(Parser, Debug)]
#[command(name = "layerview")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read the merged view and print it
    Query {
        /// Path to configuration file
        #[arg(long, default_value = "./layerview.json")]
        config: PathBuf,

        /// Restrict to these collections (repeatable; default all)
        #[arg(long = "collection")]
        collections: Vec<String>,

        /// Restrict to these feature ids (repeatable; default all)
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Return at most this many features per layer
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Write features read from stdin to the write layer
    Write {
        /// Path to configuration file
        #[arg(long, default_value = "./layerview.json")]
        config: PathBuf,

        /// Collection the features belong to
        #[arg(long)]
        collection: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
