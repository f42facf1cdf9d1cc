//! CLI command definitions for task-rollover.
//!
//! The `Cli` struct carries global flags; each subcommand owns its argument
//! struct.

pub mod import;
pub mod rollover;
pub mod tree;

use clap::{Args, Parser, Subcommand};
use import::ImportArgs;
use rollover::{GenerateArgs, RolloverArgs};
use tree::TreeArgs;

/// Recurring task generation and daily rollover engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API (default if no subcommand given)
    Serve(ServeArgs),

    /// Run the daily rollover once and print the summary
    Rollover(RolloverArgs),

    /// Generate one template's client tasks for a month
    Generate(GenerateArgs),

    /// Print a user's task tree
    Tree(TreeArgs),

    /// Load users, clients, templates and tasks from a YAML fixture
    Import(ImportArgs),
}

/// Arguments for the serve subcommand
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to bind (overrides config)
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,
}
