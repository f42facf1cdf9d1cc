//! Rollover and generation subcommands.

use chrono::NaiveDate;
use clap::Args;

use crate::types::MonthRef;

/// Arguments for the rollover subcommand
#[derive(Args, Debug)]
pub struct RolloverArgs {
    /// Treat this date as every user's local today (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub date: Option<NaiveDate>,

    /// Only roll over this user
    #[arg(long, value_name = "USER_ID")]
    pub user: Option<String>,
}

/// Arguments for the generate subcommand
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Client owning the template
    #[arg(long)]
    pub client: String,

    /// Template to expand
    #[arg(long)]
    pub template: String,

    /// Month to generate (YYYY-MM)
    #[arg(long, value_name = "YYYY-MM")]
    pub month: MonthRef,
}
