//! Import subcommand: seed the database from a YAML fixture.

use clap::Args;
use std::path::PathBuf;

/// Arguments for the import subcommand
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Path to the fixture file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Parse the file and report what would be created without writing
    #[arg(long)]
    pub dry_run: bool,
}
