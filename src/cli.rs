//! CLI argument parsing for the fleet-planner-worker binary.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fleet-planner-worker", about = "Recurring transport schedule planner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Delete expired distance cache entries and exit
    SweepCache,
    /// Run conflict detection and suggestion generation for one date and print the report
    RunDay {
        /// Date to plan (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
    },
}
